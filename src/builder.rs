//! Network builders.
//!
//! `NetworkBuilder` makes structure explicit (layer sizes, activations, initializers).
//! `create_generator` and `create_discriminator` are the two fixed architectures the
//! adversarial trainer needs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Error, Init, Layer, Network, Result};

#[derive(Debug, Clone, Copy)]
struct LayerSpec {
    out_dim: usize,
    activation: Activation,
    init: Init,
}

#[derive(Debug, Clone)]
/// Builder for a `Network`.
///
/// ```rust
/// use so_gaal::{Activation, Init, NetworkBuilder};
///
/// # fn main() -> so_gaal::Result<()> {
/// let net = NetworkBuilder::new(2)?
///     .add_layer(8, Activation::ReLU, Init::VarianceScaling { scale: 1.0 })?
///     .add_layer(1, Activation::Sigmoid, Init::VarianceScaling { scale: 1.0 })?
///     .build_with_seed(0)?;
/// assert_eq!(net.output_dim(), 1);
/// # Ok(())
/// # }
/// ```
pub struct NetworkBuilder {
    input_dim: usize,
    layers: Vec<LayerSpec>,
}

impl NetworkBuilder {
    /// Start building a network that accepts inputs of length `input_dim`.
    pub fn new(input_dim: usize) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::InvalidConfig("input_dim must be > 0".to_owned()));
        }
        Ok(Self {
            input_dim,
            layers: Vec::new(),
        })
    }

    /// Add a dense layer with `out_dim` outputs.
    pub fn add_layer(mut self, out_dim: usize, activation: Activation, init: Init) -> Result<Self> {
        if out_dim == 0 {
            return Err(Error::InvalidConfig("layer out_dim must be > 0".to_owned()));
        }
        init.validate()?;

        self.layers.push(LayerSpec {
            out_dim,
            activation,
            init,
        });
        Ok(self)
    }

    /// Build using a deterministic seed.
    pub fn build_with_seed(self, seed: u64) -> Result<Network> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.build_with_rng(&mut rng)
    }

    /// Build using the provided RNG.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<Network> {
        if self.layers.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one layer".to_owned(),
            ));
        }

        let mut layers = Vec::with_capacity(self.layers.len());
        let mut in_dim = self.input_dim;
        for spec in self.layers {
            layers.push(Layer::new_with_rng(
                in_dim,
                spec.out_dim,
                spec.init,
                spec.activation,
                rng,
            )?);
            in_dim = spec.out_dim;
        }

        Network::from_layers(layers)
    }
}

/// Hidden width of the discriminator for `data_size` training samples:
/// `ceil(sqrt(data_size))`.
pub fn discriminator_hidden_width(data_size: usize) -> usize {
    let mut width = (data_size as f64).sqrt().ceil() as usize;
    // Guard against float rounding around perfect squares.
    while width > 0 && (width - 1) * (width - 1) >= data_size {
        width -= 1;
    }
    while width * width < data_size {
        width += 1;
    }
    width
}

/// Generator: `latent_size -> latent_size -> latent_size`, ReLU on both layers,
/// weights initialized to the identity so it starts as an identity map on
/// non-negative noise.
pub fn create_generator<R: Rng + ?Sized>(latent_size: usize, rng: &mut R) -> Result<Network> {
    let init = Init::Identity { gain: 1.0 };
    NetworkBuilder::new(latent_size)?
        .add_layer(latent_size, Activation::ReLU, init)?
        .add_layer(latent_size, Activation::ReLU, init)?
        .build_with_rng(rng)
}

/// Discriminator: `latent_size -> ceil(sqrt(data_size))` (ReLU) `-> 1` (sigmoid),
/// both layers fan-in variance-scaled.
pub fn create_discriminator<R: Rng + ?Sized>(
    latent_size: usize,
    data_size: usize,
    rng: &mut R,
) -> Result<Network> {
    if data_size == 0 {
        return Err(Error::InvalidConfig("data_size must be > 0".to_owned()));
    }
    let init = Init::VarianceScaling { scale: 1.0 };
    NetworkBuilder::new(latent_size)?
        .add_layer(discriminator_hidden_width(data_size), Activation::ReLU, init)?
        .add_layer(1, Activation::Sigmoid, init)?
        .build_with_rng(rng)
}
