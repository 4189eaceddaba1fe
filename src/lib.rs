//! SO-GAAL: Single-Objective Generative Adversarial Active Learning for outlier detection.
//!
//! A generator network learns to synthesize "potential outliers" from uniform noise
//! while a discriminator learns to separate the real training rows from those
//! synthetic points. Once trained, the discriminator's output is used as an outlier
//! score for arbitrary rows.
//!
//! # Panics vs `Result`
//!
//! The crate exposes two layers of API:
//!
//! - Low-level hot path (panics on misuse):
//!   - [`network::Network::forward`], [`network::Network::backward`]
//!   - [`gaal::DiscriminatorBinding::train_on_batch`], [`gaal::CombinedModel::train_on_batch`]
//!     Shape mismatches are programmer error and panic via `assert!`.
//!
//! - High-level APIs (shape-checked):
//!   - [`SoGaal::fit`](Detector::fit), [`Detector::decision_function`], [`Detector::predict`]
//!   - [`network::Network::predict`]
//!     These validate inputs and return [`Result`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f32`.
//! - [`Inputs`] stores samples contiguously in row-major layout and rejects
//!   non-finite values at construction.
//! - Layer weights are row-major with shape `(out_dim, in_dim)`.
//!
//! # Logging
//!
//! Training progress goes through the [`log`] facade: per-epoch headers at `info`,
//! per-batch losses at `debug`, non-finite losses at `warn`. Install any logger
//! (e.g. `env_logger`) to see it.
//!
//! # Quick start
//!
//! ```rust
//! use so_gaal::{Detector, EpochSchedule, Inputs, SoGaal, SoGaalConfig};
//!
//! # fn main() -> so_gaal::Result<()> {
//! let mut rows: Vec<Vec<f32>> = (0..200)
//!     .map(|i| vec![0.5 + 0.01 * (i % 10) as f32, 0.5 - 0.01 * (i % 7) as f32])
//!     .collect();
//! rows.push(vec![5.0, -4.0]);
//! let x = Inputs::from_rows(&rows)?;
//!
//! let config = SoGaalConfig {
//!     stop_epochs: 2,
//!     contamination: 0.05,
//!     ..SoGaalConfig::default()
//! }
//! .with_seed(0)
//! .with_schedule(EpochSchedule::Full);
//!
//! let mut clf = SoGaal::new(config)?;
//! clf.fit(&x, None)?;
//!
//! let scores = clf.decision_function(&x)?;
//! assert_eq!(scores.len(), x.len());
//! assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
//! let _labels = clf.labels()?;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod builder;
pub mod data;
pub mod detector;
pub mod error;
pub mod gaal;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optim;
pub mod so_gaal;

#[cfg(feature = "serde")]
pub mod serde_model;

pub use activation::Activation;
pub use builder::{NetworkBuilder, create_discriminator, create_generator};
pub use data::Inputs;
pub use detector::{Detector, DetectorState, FittedScores, ProbaMethod};
pub use error::{Error, Result};
pub use gaal::{BatchPlan, CombinedModel, EpochSchedule, Shuffle, TrainHistory};
pub use layer::{Init, Layer};
pub use network::{Gradients, Network, Scratch};
pub use optim::{Sgd, SgdState};
pub use so_gaal::{SoGaal, SoGaalConfig};
