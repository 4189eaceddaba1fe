//! SGD with momentum and time-based learning-rate decay.
//!
//! Optimizer *state* (velocities, iteration count) lives outside the network, so two
//! independent bindings can target different networks: one for the discriminator and
//! one for the generator half of the combined model.
//!
//! Update rule, per parameter `w` with gradient `g` at iteration `t` (0-based):
//!
//! - `lr_t = lr / (1 + decay * t)`
//! - `v = momentum * v - lr_t * g`
//! - `w = w + v`

use crate::{Error, Gradients, Network, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// SGD hyperparameters.
pub struct Sgd {
    pub lr: f32,
    pub decay: f32,
    pub momentum: f32,
}

impl Sgd {
    /// Validate hyperparameters.
    pub fn validate(self) -> Result<()> {
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.lr
            )));
        }
        if !(self.decay.is_finite() && self.decay >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "decay must be finite and >= 0, got {}",
                self.decay
            )));
        }
        if !(self.momentum.is_finite() && (0.0..=1.0).contains(&self.momentum)) {
            return Err(Error::InvalidConfig(format!(
                "momentum must be finite and in [0,1], got {}",
                self.momentum
            )));
        }
        Ok(())
    }

    /// Allocate optimizer state shaped like `network`'s parameters.
    pub fn state(self, network: &Network) -> Result<SgdState> {
        self.validate()?;

        let mut v_weights = Vec::with_capacity(network.num_layers());
        let mut v_biases = Vec::with_capacity(network.num_layers());
        for i in 0..network.num_layers() {
            let layer = network.layer(i).ok_or_else(|| {
                Error::InvalidConfig(format!("network has no layer {i}"))
            })?;
            v_weights.push(vec![0.0; layer.weights().len()]);
            v_biases.push(vec![0.0; layer.biases().len()]);
        }

        Ok(SgdState {
            config: self,
            iterations: 0,
            v_weights,
            v_biases,
        })
    }
}

#[derive(Debug, Clone)]
/// Owned SGD state bound to one network's parameter shapes.
pub struct SgdState {
    config: Sgd,
    iterations: u64,
    v_weights: Vec<Vec<f32>>,
    v_biases: Vec<Vec<f32>>,
}

impl SgdState {
    #[inline]
    pub fn config(&self) -> Sgd {
        self.config
    }

    /// Number of steps applied so far.
    #[inline]
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Learning rate the next step will use.
    #[inline]
    pub fn current_lr(&self) -> f32 {
        self.config.lr / (1.0 + self.config.decay * self.iterations as f32)
    }

    /// Apply one optimizer step to `network` using `grads`.
    pub fn step(&mut self, network: &mut Network, grads: &Gradients) {
        assert_eq!(
            self.v_weights.len(),
            network.num_layers(),
            "optimizer state has {} layers, network has {}",
            self.v_weights.len(),
            network.num_layers()
        );
        assert_eq!(grads.num_layers(), network.num_layers());

        let lr = self.current_lr();
        let momentum = self.config.momentum;

        for layer_idx in 0..network.num_layers() {
            let vw = &mut self.v_weights[layer_idx];
            let vb = &mut self.v_biases[layer_idx];

            for (v, &g) in vw.iter_mut().zip(grads.d_weights(layer_idx)) {
                *v = momentum * *v - lr * g;
            }
            for (v, &g) in vb.iter_mut().zip(grads.d_biases(layer_idx)) {
                *v = momentum * *v - lr * g;
            }

            if let Some(layer) = network.layer_mut(layer_idx) {
                layer.apply_deltas(vw, vb);
            }
        }

        self.iterations += 1;
    }
}
