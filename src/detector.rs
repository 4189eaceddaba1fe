//! Generic outlier-detector contract.
//!
//! A detector produces raw outlier scores (higher means more abnormal). From the
//! training scores and a `contamination` ratio the shared state derives a threshold
//! and binary training labels (`1` = outlier, `0` = inlier); `predict` applies the
//! same threshold to new data.

use log::warn;

use crate::{Error, Inputs, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// How `predict_proba` maps raw scores to an outlier probability.
pub enum ProbaMethod {
    /// Min-max scaling against the training scores, clipped to `[0, 1]`.
    #[default]
    Linear,
    /// `erf((score - mean) / (std * sqrt(2)))` over the training scores, clipped to `[0, 1]`.
    Unify,
}

/// Training-score summary derived once per fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedScores {
    pub decision_scores: Vec<f32>,
    pub threshold: f32,
    pub labels: Vec<u8>,
    pub mean: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

/// State every detector carries: configuration for thresholding plus fitted scores.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorState {
    contamination: f32,
    n_classes: usize,
    fitted: Option<FittedScores>,
}

impl DetectorState {
    pub fn new(contamination: f32) -> Result<Self> {
        validate_contamination(contamination)?;
        Ok(Self {
            contamination,
            n_classes: 2,
            fitted: None,
        })
    }

    #[inline]
    pub fn contamination(&self) -> f32 {
        self.contamination
    }

    #[inline]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    #[inline]
    pub fn fitted(&self) -> Option<&FittedScores> {
        self.fitted.as_ref()
    }

    /// Drop derived state ahead of a new fit.
    pub fn reset(&mut self) {
        self.fitted = None;
    }

    /// Record the class count. Outlier detection is binary; `y` is only inspected so
    /// that callers passing multi-class labels hear about it.
    pub fn set_n_classes(&mut self, y: Option<&[i32]>) {
        self.n_classes = 2;

        if let Some(y) = y {
            let mut classes = y.to_vec();
            classes.sort_unstable();
            classes.dedup();
            if classes.len() > 2 {
                warn!(
                    "y has {} classes; outlier detection only uses two (inlier / outlier)",
                    classes.len()
                );
            }
        }
    }

    /// Derive threshold and labels from raw training scores.
    ///
    /// The threshold is the `100 * (1 - contamination)` percentile of the scores
    /// (linear interpolation between order statistics); labels are `score > threshold`.
    pub fn process_decision_scores(&mut self, decision_scores: Vec<f32>) -> Result<()> {
        if decision_scores.is_empty() {
            return Err(Error::InvalidData(
                "decision scores must not be empty".to_owned(),
            ));
        }

        let threshold = percentile(&decision_scores, 100.0 * (1.0 - self.contamination));
        let labels = decision_scores
            .iter()
            .map(|&s| u8::from(s > threshold))
            .collect();

        let n = decision_scores.len() as f32;
        let mean = decision_scores.iter().sum::<f32>() / n;
        let var = decision_scores
            .iter()
            .map(|&s| (s - mean) * (s - mean))
            .sum::<f32>()
            / n;
        let (min, max) = decision_scores
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
                (lo.min(s), hi.max(s))
            });

        self.fitted = Some(FittedScores {
            decision_scores,
            threshold,
            labels,
            mean,
            std: var.sqrt(),
            min,
            max,
        });
        Ok(())
    }

    fn require_fitted(&self) -> Result<&FittedScores> {
        self.fitted
            .as_ref()
            .ok_or(Error::NotFitted("decision_scores"))
    }

    /// Outlier probability for each raw score.
    pub fn scores_to_proba(&self, scores: &[f32], method: ProbaMethod) -> Result<Vec<f32>> {
        let fitted = self.require_fitted()?;

        let proba = match method {
            ProbaMethod::Linear => {
                let range = fitted.max - fitted.min;
                let range = if range > 0.0 { range } else { 1.0 };
                scores
                    .iter()
                    .map(|&s| ((s - fitted.min) / range).clamp(0.0, 1.0))
                    .collect()
            }
            ProbaMethod::Unify => {
                let denom = fitted.std * std::f32::consts::SQRT_2;
                scores
                    .iter()
                    .map(|&s| {
                        if denom > 0.0 {
                            erf((s - fitted.mean) / denom).clamp(0.0, 1.0)
                        } else {
                            0.0
                        }
                    })
                    .collect()
            }
        };
        Ok(proba)
    }
}

/// An unsupervised outlier detector.
pub trait Detector {
    /// Fit on `x`. `y` is accepted for interface compatibility and never used as
    /// supervision.
    fn fit(&mut self, x: &Inputs, y: Option<&[i32]>) -> Result<&mut Self>;

    /// Raw outlier score per row of `x`.
    fn decision_function(&self, x: &Inputs) -> Result<Vec<f32>>;

    fn state(&self) -> &DetectorState;

    /// Outlier scores of the training data.
    fn decision_scores(&self) -> Result<&[f32]> {
        Ok(&self.state().require_fitted()?.decision_scores)
    }

    fn threshold(&self) -> Result<f32> {
        Ok(self.state().require_fitted()?.threshold)
    }

    /// Binary labels of the training data.
    fn labels(&self) -> Result<&[u8]> {
        Ok(&self.state().require_fitted()?.labels)
    }

    /// Binary labels for `x` using the training threshold.
    fn predict(&self, x: &Inputs) -> Result<Vec<u8>> {
        let threshold = self.threshold()?;
        let scores = self.decision_function(x)?;
        Ok(scores.iter().map(|&s| u8::from(s > threshold)).collect())
    }

    /// `[p_inlier, p_outlier]` per row of `x`.
    fn predict_proba(&self, x: &Inputs, method: ProbaMethod) -> Result<Vec<[f32; 2]>> {
        let scores = self.decision_function(x)?;
        let proba = self.state().scores_to_proba(&scores, method)?;
        Ok(proba.into_iter().map(|p| [1.0 - p, p]).collect())
    }

    /// Fit, then return the training labels.
    fn fit_predict(&mut self, x: &Inputs, y: Option<&[i32]>) -> Result<Vec<u8>> {
        self.fit(x, y)?;
        Ok(self.labels()?.to_vec())
    }
}

pub fn validate_contamination(contamination: f32) -> Result<()> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(Error::InvalidConfig(format!(
            "contamination must be in (0, 0.5], got {contamination}"
        )));
    }
    Ok(())
}

/// `q`-th percentile (`0..=100`) with linear interpolation, like numpy's default.
pub fn percentile(values: &[f32], q: f32) -> f32 {
    assert!(!values.is_empty(), "percentile of an empty slice");

    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(f32::total_cmp);

    let pos = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Abramowitz-Stegun 7.1.26 approximation, max error ~1.5e-7.
fn erf(x: f32) -> f32 {
    let a1 = 0.254_829_6;
    let a2 = -0.284_496_74;
    let a3 = 1.421_413_8;
    let a4 = -1.453_152;
    let a5 = 1.061_405_4;
    let p = 0.327_591_1;

    let sign = if x >= 0.0 { 1.0 } else { -1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_interpolates_like_numpy() {
        let v = [1.0_f32, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 4.0);
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-6);
        // 90th of 10 values 0..9: pos 8.1
        let v: Vec<f32> = (0..10).rev().map(|i| i as f32).collect();
        assert!((percentile(&v, 90.0) - 8.1).abs() < 1e-5);
    }

    #[test]
    fn contamination_range() {
        assert!(DetectorState::new(0.1).is_ok());
        assert!(DetectorState::new(0.5).is_ok());
        assert!(DetectorState::new(0.0).is_err());
        assert!(DetectorState::new(0.6).is_err());
        assert!(DetectorState::new(f32::NAN).is_err());
    }

    #[test]
    fn process_decision_scores_flags_top_fraction() {
        let mut state = DetectorState::new(0.1).unwrap();
        let scores: Vec<f32> = (0..20).map(|i| i as f32).collect();
        state.process_decision_scores(scores).unwrap();

        let fitted = state.fitted().unwrap();
        // pos = 0.9 * 19 = 17.1
        assert!((fitted.threshold - 17.1).abs() < 1e-4);
        assert_eq!(fitted.labels.iter().filter(|&&l| l == 1).count(), 2);
        assert_eq!(&fitted.labels[18..], &[1, 1]);
        assert!((fitted.mean - 9.5).abs() < 1e-6);
    }

    #[test]
    fn proba_methods_are_bounded() {
        let mut state = DetectorState::new(0.1).unwrap();
        assert!(matches!(
            state.scores_to_proba(&[0.0], ProbaMethod::Linear),
            Err(Error::NotFitted(_))
        ));

        state
            .process_decision_scores(vec![0.0, 0.25, 0.5, 0.75, 1.0])
            .unwrap();
        let linear = state
            .scores_to_proba(&[-1.0, 0.5, 2.0], ProbaMethod::Linear)
            .unwrap();
        assert_eq!(linear, vec![0.0, 0.5, 1.0]);

        let unify = state
            .scores_to_proba(&[0.0, 0.5, 1.0], ProbaMethod::Unify)
            .unwrap();
        assert_eq!(unify[0], 0.0);
        assert!(unify[1].abs() < 1e-6);
        assert!(unify[2] > 0.5 && unify[2] <= 1.0);
    }

    #[test]
    fn erf_reference_values() {
        assert!(erf(0.0).abs() < 1e-6);
        assert!((erf(1.0) - 0.842_700_8).abs() < 1e-5);
        assert!((erf(-1.0) + 0.842_700_8).abs() < 1e-5);
    }

    #[test]
    fn constant_scores_do_not_divide_by_zero() {
        let mut state = DetectorState::new(0.2).unwrap();
        state.process_decision_scores(vec![0.3; 4]).unwrap();
        let fitted = state.fitted().unwrap();
        assert!(fitted.labels.iter().all(|&l| l == 0));
        let p = state
            .scores_to_proba(&[0.3], ProbaMethod::Linear)
            .unwrap();
        assert_eq!(p, vec![0.0]);
    }
}
