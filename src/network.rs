use crate::{Error, Inputs, Layer, Result};

/// A sequential stack of dense layers.
///
/// Both the generator and the discriminator are `Network`s; the combined model is
/// not a separate network but a composition evaluated by `gaal::CombinedModel`.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Layer>,
}

/// Reusable buffers for `Network::forward`.
///
/// The output of the most recent forward pass lives inside `Scratch`.
#[derive(Debug, Clone)]
pub struct Scratch {
    layer_outputs: Vec<Vec<f32>>,
}

/// Parameter gradients for a `Network`.
///
/// `Network::backward` overwrites them for one sample; `accumulate_scaled` sums
/// per-sample gradients into a batch gradient.
#[derive(Debug, Clone)]
pub struct Gradients {
    d_weights: Vec<Vec<f32>>,
    d_biases: Vec<Vec<f32>>,

    // Backprop intermediate: gradient w.r.t each layer output.
    // This includes the final layer output; `Network::backward` reads the upstream
    // gradient from this buffer so it can uniformly backprop layer-by-layer.
    d_layer_outputs: Vec<Vec<f32>>,

    d_input: Vec<f32>,
}

impl Network {
    /// Assemble a network from layers, checking that consecutive dims chain.
    pub fn from_layers(layers: Vec<Layer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InvalidConfig(
                "network must have at least one layer".to_owned(),
            ));
        }
        for (i, pair) in layers.windows(2).enumerate() {
            if pair[0].out_dim() != pair[1].in_dim() {
                return Err(Error::InvalidConfig(format!(
                    "layer {} in_dim {} does not match previous out_dim {}",
                    i + 1,
                    pair[1].in_dim(),
                    pair[0].out_dim()
                )));
            }
        }
        Ok(Self { layers })
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layers[0].in_dim()
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].out_dim()
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn layer(&self, idx: usize) -> Option<&Layer> {
        self.layers.get(idx)
    }

    #[inline]
    pub fn layer_mut(&mut self, idx: usize) -> Option<&mut Layer> {
        self.layers.get_mut(idx)
    }

    pub fn scratch(&self) -> Scratch {
        Scratch::new(self)
    }

    pub fn gradients(&self) -> Gradients {
        Gradients::new(self)
    }

    /// Forward pass for a single sample.
    ///
    /// Writes intermediate activations into `scratch` and returns the final output slice.
    ///
    /// Shape contract:
    /// - `input.len() == self.input_dim()`
    /// - `scratch` must be built for this `Network`
    pub fn forward<'a>(&self, input: &[f32], scratch: &'a mut Scratch) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match network input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(
            scratch.layer_outputs.len(),
            self.layers.len(),
            "scratch has {} layer outputs, network has {} layers",
            scratch.layer_outputs.len(),
            self.layers.len()
        );

        for (idx, layer) in self.layers.iter().enumerate() {
            if idx == 0 {
                let out = &mut scratch.layer_outputs[0];
                assert_eq!(out.len(), layer.out_dim());
                layer.forward(input, out);
            } else {
                // Borrow the previous output immutably and the current output mutably.
                let (left, right) = scratch.layer_outputs.split_at_mut(idx);
                let prev = &left[idx - 1];
                let out = &mut right[0];
                assert_eq!(
                    out.len(),
                    layer.out_dim(),
                    "scratch layer {idx} output len {} does not match layer out_dim {}",
                    out.len(),
                    layer.out_dim()
                );
                layer.forward(prev, out);
            }
        }

        scratch.output()
    }

    /// Backward pass for a single sample.
    ///
    /// You must call `forward` first using the same `input` and `scratch`, then write
    /// the upstream gradient `dL/d(output)` into `grads.d_output_mut()`.
    ///
    /// `grads` is overwritten with the gradients for this sample. Returns dL/d(input).
    pub fn backward<'a>(
        &self,
        input: &[f32],
        scratch: &Scratch,
        grads: &'a mut Gradients,
    ) -> &'a [f32] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match network input_dim {}",
            input.len(),
            self.input_dim()
        );
        assert_eq!(scratch.layer_outputs.len(), self.layers.len());
        assert_eq!(
            grads.d_weights.len(),
            self.layers.len(),
            "grads has {} d_weights entries, network has {} layers",
            grads.d_weights.len(),
            self.layers.len()
        );
        assert_eq!(grads.d_input.len(), self.input_dim());

        for idx in (0..self.layers.len()).rev() {
            let layer = &self.layers[idx];

            let layer_input: &[f32] = if idx == 0 {
                input
            } else {
                &scratch.layer_outputs[idx - 1]
            };
            let layer_output: &[f32] = &scratch.layer_outputs[idx];

            if idx == 0 {
                let d_outputs = &grads.d_layer_outputs[0];
                layer.backward(
                    layer_input,
                    layer_output,
                    d_outputs,
                    &mut grads.d_input,
                    &mut grads.d_weights[0],
                    &mut grads.d_biases[0],
                );
            } else {
                // `d_outputs` of this layer is read-only; its `d_inputs` becomes the
                // `d_outputs` of the previous layer.
                let (left, right) = grads.d_layer_outputs.split_at_mut(idx);
                let d_inputs_prev = &mut left[idx - 1];
                let d_outputs = &right[0];
                layer.backward(
                    layer_input,
                    layer_output,
                    d_outputs,
                    d_inputs_prev,
                    &mut grads.d_weights[idx],
                    &mut grads.d_biases[idx],
                );
            }
        }

        &grads.d_input
    }

    /// Shape-checked inference over every row of `inputs`.
    ///
    /// Returns a flat buffer with shape `(len, output_dim)`.
    pub fn predict(&self, inputs: &Inputs) -> Result<Vec<f32>> {
        if inputs.input_dim() != self.input_dim() {
            return Err(Error::InvalidShape(format!(
                "inputs have {} features, network expects {}",
                inputs.input_dim(),
                self.input_dim()
            )));
        }

        let mut scratch = self.scratch();
        let out_dim = self.output_dim();
        let mut preds = vec![0.0_f32; inputs.len() * out_dim];

        for (idx, chunk) in preds.chunks_exact_mut(out_dim).enumerate() {
            let y = self.forward(inputs.input(idx), &mut scratch);
            chunk.copy_from_slice(y);
        }

        Ok(preds)
    }
}

impl Scratch {
    pub fn new(network: &Network) -> Self {
        let layer_outputs = network
            .layers
            .iter()
            .map(|layer| vec![0.0; layer.out_dim()])
            .collect();
        Self { layer_outputs }
    }

    #[inline]
    pub fn output(&self) -> &[f32] {
        &self.layer_outputs[self.layer_outputs.len() - 1]
    }
}

impl Gradients {
    pub fn new(network: &Network) -> Self {
        let n = network.layers.len();
        let mut d_weights = Vec::with_capacity(n);
        let mut d_biases = Vec::with_capacity(n);
        let mut d_layer_outputs = Vec::with_capacity(n);

        for layer in &network.layers {
            d_weights.push(vec![0.0; layer.in_dim() * layer.out_dim()]);
            d_biases.push(vec![0.0; layer.out_dim()]);
            d_layer_outputs.push(vec![0.0; layer.out_dim()]);
        }

        Self {
            d_weights,
            d_biases,
            d_layer_outputs,
            d_input: vec![0.0; network.input_dim()],
        }
    }

    #[inline]
    pub fn num_layers(&self) -> usize {
        self.d_weights.len()
    }

    /// Mutable view of the upstream gradient buffer for the final network output.
    #[inline]
    pub fn d_output_mut(&mut self) -> &mut [f32] {
        let last = self.d_layer_outputs.len() - 1;
        &mut self.d_layer_outputs[last]
    }

    #[inline]
    pub fn d_input(&self) -> &[f32] {
        &self.d_input
    }

    #[inline]
    pub fn d_weights(&self, layer_idx: usize) -> &[f32] {
        &self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases(&self, layer_idx: usize) -> &[f32] {
        &self.d_biases[layer_idx]
    }

    #[inline]
    pub fn d_weights_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_weights[layer_idx]
    }

    #[inline]
    pub fn d_biases_mut(&mut self, layer_idx: usize) -> &mut [f32] {
        &mut self.d_biases[layer_idx]
    }

    /// Zero the parameter gradients.
    pub fn zero(&mut self) {
        for v in self.d_weights.iter_mut().chain(self.d_biases.iter_mut()) {
            v.fill(0.0);
        }
    }

    /// `self += scale * other` over the parameter gradients.
    pub fn accumulate_scaled(&mut self, other: &Gradients, scale: f32) {
        assert_eq!(self.num_layers(), other.num_layers());

        let pairs = self
            .d_weights
            .iter_mut()
            .zip(&other.d_weights)
            .chain(self.d_biases.iter_mut().zip(&other.d_biases));
        for (acc, g) in pairs {
            debug_assert_eq!(acc.len(), g.len());
            for (a, &v) in acc.iter_mut().zip(g) {
                *a = v.mul_add(scale, *a);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::{Activation, Init, loss};

    fn small_network(seed: u64) -> Network {
        let mut rng = StdRng::seed_from_u64(seed);
        let init = Init::VarianceScaling { scale: 1.0 };
        Network::from_layers(vec![
            Layer::new_with_rng(2, 3, init, Activation::ReLU, &mut rng).unwrap(),
            Layer::new_with_rng(3, 1, init, Activation::Sigmoid, &mut rng).unwrap(),
        ])
        .unwrap()
    }

    fn loss_for(net: &Network, input: &[f32], target: &[f32], scratch: &mut Scratch) -> f32 {
        net.forward(input, scratch);
        loss::binary_cross_entropy(scratch.output(), target)
    }

    fn assert_close(analytic: f32, numeric: f32, abs_tol: f32, rel_tol: f32) {
        let diff = (analytic - numeric).abs();
        let scale = analytic.abs().max(numeric.abs()).max(1.0);
        assert!(
            diff <= abs_tol || diff / scale <= rel_tol,
            "analytic={analytic} numeric={numeric} diff={diff}"
        );
    }

    #[test]
    fn from_layers_rejects_broken_chains() {
        let mut rng = StdRng::seed_from_u64(0);
        let init = Init::Identity { gain: 1.0 };
        let a = Layer::new_with_rng(2, 3, init, Activation::ReLU, &mut rng).unwrap();
        let b = Layer::new_with_rng(4, 1, init, Activation::Sigmoid, &mut rng).unwrap();
        assert!(Network::from_layers(vec![a, b]).is_err());
        assert!(Network::from_layers(Vec::new()).is_err());
    }

    #[test]
    fn seeded_init_is_deterministic() {
        let a = small_network(123);
        let b = small_network(123);
        let input = [0.3_f32, -0.7_f32];

        let out_a = a.forward(&input, &mut a.scratch()).to_vec();
        let out_b = b.forward(&input, &mut b.scratch()).to_vec();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn backward_matches_numeric_gradients() {
        let mut net = small_network(3);
        let mut scratch = net.scratch();
        let mut grads = net.gradients();

        // Inputs chosen away from the ReLU kink.
        let input = [0.8_f32, 0.4_f32];
        let target = [1.0_f32];

        net.forward(&input, &mut scratch);
        loss::binary_cross_entropy_backward(scratch.output(), &target, grads.d_output_mut());
        let d_input = net.backward(&input, &scratch, &mut grads).to_vec();

        let eps = 1e-3_f32;
        let mut scratch_tmp = net.scratch();

        for layer_idx in 0..net.num_layers() {
            let w_len = net.layers[layer_idx].weights().len();
            for p in 0..w_len {
                let orig = net.layers[layer_idx].weights()[p];
                net.layers[layer_idx].weights_mut()[p] = orig + eps;
                let plus = loss_for(&net, &input, &target, &mut scratch_tmp);
                net.layers[layer_idx].weights_mut()[p] = orig - eps;
                let minus = loss_for(&net, &input, &target, &mut scratch_tmp);
                net.layers[layer_idx].weights_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.d_weights(layer_idx)[p], numeric, 1e-3, 1e-2);
            }

            let b_len = net.layers[layer_idx].biases().len();
            for p in 0..b_len {
                let orig = net.layers[layer_idx].biases()[p];
                net.layers[layer_idx].biases_mut()[p] = orig + eps;
                let plus = loss_for(&net, &input, &target, &mut scratch_tmp);
                net.layers[layer_idx].biases_mut()[p] = orig - eps;
                let minus = loss_for(&net, &input, &target, &mut scratch_tmp);
                net.layers[layer_idx].biases_mut()[p] = orig;

                let numeric = (plus - minus) / (2.0 * eps);
                assert_close(grads.d_biases(layer_idx)[p], numeric, 1e-3, 1e-2);
            }
        }

        let mut input_var = input;
        for i in 0..input_var.len() {
            let orig = input_var[i];
            input_var[i] = orig + eps;
            let plus = loss_for(&net, &input_var, &target, &mut scratch_tmp);
            input_var[i] = orig - eps;
            let minus = loss_for(&net, &input_var, &target, &mut scratch_tmp);
            input_var[i] = orig;

            let numeric = (plus - minus) / (2.0 * eps);
            assert_close(d_input[i], numeric, 1e-3, 1e-2);
        }
    }

    #[test]
    fn accumulate_scaled_sums_gradients() {
        let net = small_network(0);
        let mut acc = net.gradients();
        let mut g = net.gradients();
        g.d_weights_mut(0).fill(2.0);
        g.d_biases_mut(1).fill(-4.0);

        acc.accumulate_scaled(&g, 0.5);
        acc.accumulate_scaled(&g, 0.5);
        assert!(acc.d_weights(0).iter().all(|&v| v == 2.0));
        assert!(acc.d_biases(1).iter().all(|&v| v == -4.0));

        acc.zero();
        assert!(acc.d_weights(0).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn predict_checks_feature_count() {
        let net = small_network(0);
        let inputs = Inputs::from_flat(vec![0.0; 6], 3).unwrap();
        assert!(matches!(net.predict(&inputs), Err(Error::InvalidShape(_))));

        let inputs = Inputs::from_flat(vec![0.1, 0.2, 0.3, 0.4], 2).unwrap();
        let preds = net.predict(&inputs).unwrap();
        assert_eq!(preds.len(), 2);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let net = small_network(0);
        let mut scratch = net.scratch();
        net.forward(&[0.0_f32; 3], &mut scratch);
    }
}
