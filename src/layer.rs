//! Dense (fully connected) layer.
//!
//! Weights are stored row-major with shape `(out_dim, in_dim)`, so row `o` holds the
//! incoming weights of output unit `o`.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::{Activation, Error, Result};

/// Stddev correction for a standard normal truncated at two standard deviations.
const TRUNCATED_NORMAL_STDDEV: f32 = 0.879_625_66;

#[derive(Debug, Clone, Copy, PartialEq)]
/// Weight initializer. Biases always start at zero.
pub enum Init {
    /// `gain * I`. Rectangular shapes get ones on the main diagonal only.
    Identity { gain: f32 },
    /// Fan-in variance scaling with a normal distribution truncated at two
    /// standard deviations: `stddev = sqrt(scale / in_dim) / 0.8796...`.
    VarianceScaling { scale: f32 },
}

impl Init {
    pub fn validate(self) -> Result<()> {
        match self {
            Init::Identity { gain } => {
                if !gain.is_finite() {
                    return Err(Error::InvalidConfig(format!(
                        "identity gain must be finite, got {gain}"
                    )));
                }
            }
            Init::VarianceScaling { scale } => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(Error::InvalidConfig(format!(
                        "variance scaling scale must be finite and > 0, got {scale}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn fill<R: Rng + ?Sized>(
        self,
        in_dim: usize,
        out_dim: usize,
        weights: &mut [f32],
        rng: &mut R,
    ) -> Result<()> {
        match self {
            Init::Identity { gain } => {
                weights.fill(0.0);
                for d in 0..in_dim.min(out_dim) {
                    weights[d * in_dim + d] = gain;
                }
            }
            Init::VarianceScaling { scale } => {
                let stddev = (scale / in_dim as f32).sqrt() / TRUNCATED_NORMAL_STDDEV;
                let normal = Normal::new(0.0_f32, stddev).map_err(|e| {
                    Error::InvalidConfig(format!("invalid variance scaling stddev {stddev}: {e}"))
                })?;
                let bound = 2.0 * stddev;
                for w in weights.iter_mut() {
                    *w = loop {
                        let v = normal.sample(rng);
                        if v.abs() <= bound {
                            break v;
                        }
                    };
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    in_dim: usize,
    out_dim: usize,
    activation: Activation,
    /// Row-major matrix with shape (out_dim, in_dim).
    weights: Vec<f32>,
    biases: Vec<f32>,
}

impl Layer {
    pub fn new_with_rng<R: Rng + ?Sized>(
        in_dim: usize,
        out_dim: usize,
        init: Init,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        init.validate()?;

        let mut weights = vec![0.0; in_dim * out_dim];
        init.fill(in_dim, out_dim, &mut weights, rng)?;

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases: vec![0.0; out_dim],
        })
    }

    /// Build a layer from raw parameters, validating shapes and finiteness.
    pub fn from_parts(
        in_dim: usize,
        out_dim: usize,
        activation: Activation,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Result<Self> {
        if in_dim == 0 || out_dim == 0 {
            return Err(Error::InvalidConfig(format!(
                "layer dims must be > 0, got in_dim={in_dim} out_dim={out_dim}"
            )));
        }
        if weights.len() != in_dim * out_dim {
            return Err(Error::InvalidData(format!(
                "weights length {} does not match out_dim * in_dim ({out_dim} * {in_dim})",
                weights.len()
            )));
        }
        if biases.len() != out_dim {
            return Err(Error::InvalidData(format!(
                "biases length {} does not match out_dim {out_dim}",
                biases.len()
            )));
        }
        if weights.iter().chain(&biases).any(|v| !v.is_finite()) {
            return Err(Error::InvalidData(
                "layer parameters must be finite".to_owned(),
            ));
        }

        Ok(Self {
            in_dim,
            out_dim,
            activation,
            weights,
            biases,
        })
    }

    #[inline]
    pub fn in_dim(&self) -> usize {
        self.in_dim
    }

    #[inline]
    pub fn out_dim(&self) -> usize {
        self.out_dim
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    #[inline]
    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    #[inline]
    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.weights
    }

    #[inline]
    pub fn biases_mut(&mut self) -> &mut [f32] {
        &mut self.biases
    }

    /// Forward pass for a single sample.
    ///
    /// Computes `outputs = activation(W * inputs + b)`.
    ///
    /// Shape contract:
    /// - `inputs.len() == self.in_dim`
    /// - `outputs.len() == self.out_dim`
    #[inline]
    pub fn forward(&self, inputs: &[f32], outputs: &mut [f32]) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);

        for o in 0..self.out_dim {
            let mut sum = self.biases[o];
            let row = &self.weights[o * self.in_dim..(o + 1) * self.in_dim];
            for (&w, &x) in row.iter().zip(inputs) {
                sum = w.mul_add(x, sum);
            }
            outputs[o] = self.activation.forward(sum);
        }
    }

    /// Backward pass for a single sample.
    ///
    /// This uses overwrite semantics:
    /// - `d_inputs` is overwritten (and internally zeroed before accumulation)
    /// - `d_weights` is overwritten
    /// - `d_biases` is overwritten
    ///
    /// Inputs:
    /// - `inputs`: the same inputs passed to `forward`
    /// - `outputs`: the outputs previously produced by `forward` (post-activation)
    /// - `d_outputs`: upstream gradient dL/d(outputs)
    #[inline]
    pub fn backward(
        &self,
        inputs: &[f32],
        outputs: &[f32],
        d_outputs: &[f32],
        d_inputs: &mut [f32],
        d_weights: &mut [f32],
        d_biases: &mut [f32],
    ) {
        debug_assert_eq!(inputs.len(), self.in_dim);
        debug_assert_eq!(outputs.len(), self.out_dim);
        debug_assert_eq!(d_outputs.len(), self.out_dim);
        debug_assert_eq!(d_inputs.len(), self.in_dim);
        debug_assert_eq!(d_weights.len(), self.weights.len());
        debug_assert_eq!(d_biases.len(), self.out_dim);

        // d_inputs accumulates contributions from all outputs.
        d_inputs.fill(0.0);

        for o in 0..self.out_dim {
            let d_z = d_outputs[o] * self.activation.grad_from_output(outputs[o]);
            d_biases[o] = d_z;

            let row = o * self.in_dim;
            for i in 0..self.in_dim {
                let w = self.weights[row + i];
                d_weights[row + i] = d_z * inputs[i];
                d_inputs[i] = w.mul_add(d_z, d_inputs[i]);
            }
        }
    }

    /// Adds precomputed parameter deltas: `W += delta_w`, `b += delta_b`.
    #[inline]
    pub(crate) fn apply_deltas(&mut self, delta_w: &[f32], delta_b: &[f32]) {
        debug_assert_eq!(delta_w.len(), self.weights.len());
        debug_assert_eq!(delta_b.len(), self.biases.len());

        for (w, &d) in self.weights.iter_mut().zip(delta_w) {
            *w += d;
        }
        for (b, &d) in self.biases.iter_mut().zip(delta_b) {
            *b += d;
        }
    }
}
