//! Network serialization/deserialization (feature: `serde`).
//!
//! Defines a versioned on-disk format for a `Network`, typically the fitted
//! discriminator, so scores can be reproduced without refitting.
//!
//! Internal `Network`/`Layer` structs are not serialized directly; all
//! deserialization validates dimensions, parameter lengths, and finiteness.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Layer, Network, Result};

pub const NETWORK_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedNetwork {
    pub format_version: u32,
    pub layers: Vec<SerializedLayer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedLayer {
    pub in_dim: usize,
    pub out_dim: usize,
    pub activation: SerializedActivation,
    /// Row-major (out_dim, in_dim).
    pub weights: Vec<f32>,
    pub biases: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializedActivation {
    Relu,
    Sigmoid,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::ReLU => SerializedActivation::Relu,
            Activation::Sigmoid => SerializedActivation::Sigmoid,
        }
    }
}

impl From<SerializedActivation> for Activation {
    fn from(value: SerializedActivation) -> Self {
        match value {
            SerializedActivation::Relu => Activation::ReLU,
            SerializedActivation::Sigmoid => Activation::Sigmoid,
        }
    }
}

impl From<&Network> for SerializedNetwork {
    fn from(network: &Network) -> Self {
        let layers = (0..network.num_layers())
            .filter_map(|i| network.layer(i))
            .map(|layer| SerializedLayer {
                in_dim: layer.in_dim(),
                out_dim: layer.out_dim(),
                activation: layer.activation().into(),
                weights: layer.weights().to_vec(),
                biases: layer.biases().to_vec(),
            })
            .collect();
        Self {
            format_version: NETWORK_FORMAT_VERSION,
            layers,
        }
    }
}

impl TryFrom<SerializedNetwork> for Network {
    type Error = Error;

    fn try_from(value: SerializedNetwork) -> std::result::Result<Self, Self::Error> {
        if value.format_version != NETWORK_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported network format_version {}; expected {}",
                value.format_version, NETWORK_FORMAT_VERSION
            )));
        }

        let mut layers = Vec::with_capacity(value.layers.len());
        for (i, layer) in value.layers.into_iter().enumerate() {
            let l = Layer::from_parts(
                layer.in_dim,
                layer.out_dim,
                layer.activation.into(),
                layer.weights,
                layer.biases,
            )
            .map_err(|e| Error::InvalidData(format!("layer {i} invalid: {e}")))?;
            layers.push(l);
        }

        // Checks non-emptiness and that layer dims chain.
        Network::from_layers(layers).map_err(|e| Error::InvalidData(e.to_string()))
    }
}

impl Network {
    /// Serialize the network to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&SerializedNetwork::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize network: {e}")))
    }

    /// Parse a network from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let ser: SerializedNetwork = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse network json: {e}")))?;
        ser.try_into()
    }

    /// Save the network to a JSON file (pretty-printed).
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::InvalidData(format!("failed to write {}: {e}", p.display())))
    }

    /// Load a network from a JSON file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::InvalidData(format!("failed to read {}: {e}", p.display())))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{Detector, Inputs, SoGaal, SoGaalConfig};

    #[test]
    fn reloaded_discriminator_reproduces_scores() {
        let rows: Vec<Vec<f32>> = (0..40).map(|i| vec![(i % 5) as f32 * 0.2, 0.3]).collect();
        let x = Inputs::from_rows(&rows).unwrap();
        let mut clf = SoGaal::new(SoGaalConfig::default().with_seed(5)).unwrap();
        clf.fit(&x, None).unwrap();

        let json = clf.discriminator().unwrap().to_json_string_pretty().unwrap();
        assert!(json.contains("\"activation\": \"sigmoid\""));

        let loaded = Network::from_json_str(&json).unwrap();
        assert_eq!(loaded.predict(&x).unwrap(), clf.decision_scores().unwrap());
    }

    #[test]
    fn rejects_unknown_version_and_broken_chains() {
        let err = Network::from_json_str(r#"{"format_version":999,"layers":[]}"#).unwrap_err();
        assert!(format!("{err}").contains("format_version"));

        let bad = r#"{"format_version":1,"layers":[
            {"in_dim":2,"out_dim":1,"activation":"relu","weights":[1.0,1.0],"biases":[0.0]},
            {"in_dim":3,"out_dim":1,"activation":"sigmoid","weights":[1.0,1.0,1.0],"biases":[0.0]}
        ]}"#;
        assert!(Network::from_json_str(bad).is_err());
        assert!(Network::from_json_str(r#"{"format_version":1,"layers":[]}"#).is_err());
    }
}
