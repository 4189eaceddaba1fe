use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    InvalidData(String),
    InvalidConfig(String),
    InvalidShape(String),
    /// A fitted-state accessor was used before `fit`. Holds the missing attribute.
    NotFitted(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Error::InvalidShape(msg) => write!(f, "invalid shape: {msg}"),
            Error::NotFitted(what) => write!(
                f,
                "detector is not fitted yet ({what} is missing); call `fit` first"
            ),
        }
    }
}

impl std::error::Error for Error {}
