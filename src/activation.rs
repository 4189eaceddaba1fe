//! Activation functions.
//!
//! A dense layer computes a pre-activation value `z = W x + b` and then applies an
//! activation function element-wise: `y = activation(z)`.
//!
//! Post-activation outputs `y` are cached in `Scratch`. During backprop we compute
//! `dL/dz` from `dL/dy` using `y`, so no separate `z` buffer is needed.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Element-wise activation function.
pub enum Activation {
    ReLU,
    Sigmoid,
}

impl Activation {
    #[inline]
    pub(crate) fn forward(self, x: f32) -> f32 {
        match self {
            Activation::ReLU => x.max(0.0),
            Activation::Sigmoid => sigmoid(x),
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub(crate) fn grad_from_output(self, y: f32) -> f32 {
        match self {
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => y * (1.0 - y),
        }
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_basic_values() {
        let y0 = Activation::Sigmoid.forward(0.0);
        assert!((y0 - 0.5).abs() < 1e-6);

        let y_pos = Activation::Sigmoid.forward(10.0);
        let y_neg = Activation::Sigmoid.forward(-10.0);
        assert!(y_pos > 0.999);
        assert!(y_neg < 0.001);

        // Saturates without producing NaN.
        assert_eq!(Activation::Sigmoid.forward(1e4), 1.0);
        assert_eq!(Activation::Sigmoid.forward(-1e4), 0.0);
    }

    #[test]
    fn relu_clamps_negatives() {
        assert_eq!(Activation::ReLU.forward(-2.0), 0.0);
        assert_eq!(Activation::ReLU.forward(3.0), 3.0);

        assert_eq!(Activation::ReLU.grad_from_output(0.0), 0.0);
        assert_eq!(Activation::ReLU.grad_from_output(1.0), 1.0);
    }

    #[test]
    fn sigmoid_gradient_from_output() {
        let y_sig = Activation::Sigmoid.forward(0.0);
        let g_sig = Activation::Sigmoid.grad_from_output(y_sig);
        assert!((g_sig - 0.25).abs() < 1e-6);
    }
}
