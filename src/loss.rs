//! Binary cross-entropy on probabilities.
//!
//! Both networks are trained against this loss: the discriminator on `[real; fake]`
//! with targets `[1; 0]`, the generator through the frozen discriminator with an
//! all-ones target.
//!
//! Predictions are sigmoid outputs in `[0, 1]`. They are clipped to
//! `[EPSILON, 1 - EPSILON]` before taking logarithms so saturated outputs yield a
//! large but finite loss.

/// Clipping applied to probabilities before taking logarithms.
pub const EPSILON: f32 = 1e-7;

/// Mean binary cross-entropy.
///
/// Returns `-mean(t * ln(p) + (1 - t) * ln(1 - p))` with `p` clipped.
#[inline]
pub fn binary_cross_entropy(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );

    if pred.is_empty() {
        return 0.0;
    }

    let sum: f32 = pred
        .iter()
        .zip(target)
        .map(|(&p, &t)| element_loss(clip(p), t))
        .sum();
    sum / pred.len() as f32
}

/// Binary cross-entropy + gradient w.r.t. `pred`.
///
/// Writes `d_pred = dL/d(pred)` into `d_pred` and returns the loss. Combined with a
/// sigmoid output layer (whose local gradient is `p * (1 - p)`) this reduces to
/// `(p - t) / N` away from the clipping bounds.
#[inline]
pub fn binary_cross_entropy_backward(pred: &[f32], target: &[f32], d_pred: &mut [f32]) -> f32 {
    assert_eq!(
        pred.len(),
        target.len(),
        "pred len {} does not match target len {}",
        pred.len(),
        target.len()
    );
    assert_eq!(
        pred.len(),
        d_pred.len(),
        "pred len {} does not match d_pred len {}",
        pred.len(),
        d_pred.len()
    );

    if pred.is_empty() {
        return 0.0;
    }

    let inv_n = 1.0 / pred.len() as f32;
    let mut sum = 0.0_f32;
    for i in 0..pred.len() {
        let p = clip(pred[i]);
        let t = target[i];
        sum += element_loss(p, t);
        d_pred[i] = (p - t) / (p * (1.0 - p)) * inv_n;
    }

    sum * inv_n
}

#[inline]
fn clip(p: f32) -> f32 {
    p.clamp(EPSILON, 1.0 - EPSILON)
}

#[inline]
fn element_loss(p: f32, t: f32) -> f32 {
    -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bce_at_half_is_ln2() {
        let loss = binary_cross_entropy(&[0.5, 0.5], &[1.0, 0.0]);
        assert!((loss - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn bce_is_finite_for_saturated_predictions() {
        let loss = binary_cross_entropy(&[0.0, 1.0], &[1.0, 0.0]);
        assert!(loss.is_finite());
        assert!(loss > 10.0);

        let loss = binary_cross_entropy(&[1.0, 0.0], &[1.0, 0.0]);
        assert!(loss < 1e-3);
    }

    #[test]
    fn bce_backward_times_sigmoid_grad_is_p_minus_t() {
        let pred = [0.8_f32, 0.3];
        let target = [1.0_f32, 0.0];
        let mut d = [0.0_f32; 2];
        let loss = binary_cross_entropy_backward(&pred, &target, &mut d);
        assert!((loss - binary_cross_entropy(&pred, &target)).abs() < 1e-7);

        for i in 0..2 {
            let d_z = d[i] * pred[i] * (1.0 - pred[i]);
            assert!((d_z - (pred[i] - target[i]) / 2.0).abs() < 1e-6);
        }
    }
}
