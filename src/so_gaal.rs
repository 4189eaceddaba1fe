//! The SO-GAAL detector.
//!
//! A generator learns to synthesize potential outliers from uniform noise while a
//! discriminator learns to tell real rows from synthetic ones. The trained
//! discriminator's sigmoid output is the outlier score.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detector::{Detector, DetectorState, validate_contamination};
use crate::gaal::{
    self, BatchPlan, CombinedModel, EpochSchedule, Shuffle, TrainHistory, TrainedGaal,
    TrainerConfig,
};
use crate::{Error, Inputs, Network, Result, Sgd};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SoGaalConfig {
    /// Epochs of active generator training; total planned epochs are three times this.
    pub stop_epochs: usize,
    /// Discriminator learning rate.
    pub lr_d: f32,
    /// Generator learning rate.
    pub lr_g: f32,
    /// Time-based learning-rate decay shared by both optimizers.
    pub decay: f32,
    /// Momentum shared by both optimizers.
    pub momentum: f32,
    /// Expected proportion of outliers, used to threshold the training scores.
    pub contamination: f32,
    /// Seed for network initialization and noise; `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub shuffle: Shuffle,
    pub schedule: EpochSchedule,
}

impl Default for SoGaalConfig {
    fn default() -> Self {
        Self {
            stop_epochs: 20,
            lr_d: 0.01,
            lr_g: 0.0001,
            decay: 1e-6,
            momentum: 0.9,
            contamination: 0.1,
            seed: None,
            shuffle: Shuffle::None,
            schedule: EpochSchedule::FirstEpochOnly,
        }
    }
}

impl SoGaalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stop_epochs == 0 {
            return Err(Error::InvalidConfig("stop_epochs must be > 0".to_owned()));
        }
        gaal::planned_epochs(self.stop_epochs)?;
        self.discriminator_sgd().validate()?;
        self.generator_sgd().validate()?;
        validate_contamination(self.contamination)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_schedule(mut self, schedule: EpochSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_shuffle(mut self, shuffle: Shuffle) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Planned epoch count, `stop_epochs * 3`.
    pub fn epochs(&self) -> Result<usize> {
        gaal::planned_epochs(self.stop_epochs)
    }

    fn discriminator_sgd(&self) -> Sgd {
        Sgd {
            lr: self.lr_d,
            decay: self.decay,
            momentum: self.momentum,
        }
    }

    fn generator_sgd(&self) -> Sgd {
        Sgd {
            lr: self.lr_g,
            decay: self.decay,
            momentum: self.momentum,
        }
    }

    fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            stop_epochs: self.stop_epochs,
            discriminator: self.discriminator_sgd(),
            generator: self.generator_sgd(),
            schedule: self.schedule,
            shuffle: self.shuffle,
        }
    }
}

/// Single-Objective Generative Adversarial Active Learning outlier detector.
///
/// ```rust
/// use so_gaal::{Detector, Inputs, SoGaal, SoGaalConfig};
///
/// # fn main() -> so_gaal::Result<()> {
/// let rows: Vec<Vec<f32>> = (0..64).map(|i| vec![(i % 8) as f32 * 0.1, 0.5]).collect();
/// let x = Inputs::from_rows(&rows)?;
///
/// let mut clf = SoGaal::new(SoGaalConfig::default().with_seed(0))?;
/// clf.fit(&x, None)?;
/// assert_eq!(clf.decision_scores()?.len(), 64);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SoGaal {
    config: SoGaalConfig,
    state: DetectorState,
    trained: Option<TrainedGaal>,
}

impl SoGaal {
    pub fn new(config: SoGaalConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: DetectorState::new(config.contamination)?,
            config,
            trained: None,
        })
    }

    #[inline]
    pub fn config(&self) -> &SoGaalConfig {
        &self.config
    }

    /// Fit with an explicit RNG for network initialization and noise.
    pub fn fit_with_rng<R: Rng + ?Sized>(
        &mut self,
        x: &Inputs,
        y: Option<&[i32]>,
        rng: &mut R,
    ) -> Result<&mut Self> {
        if x.is_empty() {
            return Err(Error::InvalidData(
                "training data must not be empty".to_owned(),
            ));
        }
        if let Some(y) = y {
            if y.len() != x.len() {
                return Err(Error::InvalidShape(format!(
                    "y has {} labels, x has {} rows",
                    y.len(),
                    x.len()
                )));
            }
        }

        self.trained = None;
        self.state.reset();
        self.state.set_n_classes(y);

        let trained = gaal::train(x, &self.config.trainer_config(), rng)?;
        let scores = score_rows(&trained.discriminator, x)?;
        self.state.process_decision_scores(scores)?;
        self.trained = Some(trained);

        if let Some(fitted) = self.state.fitted() {
            info!(
                "fit done: threshold={} outliers={}/{}",
                fitted.threshold,
                fitted.labels.iter().filter(|&&l| l == 1).count(),
                fitted.labels.len()
            );
        }
        Ok(self)
    }

    fn trained(&self) -> Result<&TrainedGaal> {
        self.trained.as_ref().ok_or(Error::NotFitted("discriminator"))
    }

    pub fn generator(&self) -> Result<&Network> {
        Ok(&self.trained()?.generator)
    }

    pub fn discriminator(&self) -> Result<&Network> {
        Ok(&self.trained()?.discriminator)
    }

    pub fn combined(&self) -> Result<&CombinedModel> {
        Ok(&self.trained()?.combined)
    }

    pub fn train_history(&self) -> Result<&TrainHistory> {
        Ok(&self.trained()?.history)
    }

    pub fn batch_plan(&self) -> Result<BatchPlan> {
        Ok(self.trained()?.plan)
    }

    /// Epochs whose batch loop actually ran during the last fit.
    pub fn epochs_run(&self) -> Result<usize> {
        Ok(self.trained()?.epochs_run)
    }

    pub fn generator_frozen(&self) -> Result<bool> {
        Ok(self.trained()?.generator_frozen)
    }
}

impl Detector for SoGaal {
    fn fit(&mut self, x: &Inputs, y: Option<&[i32]>) -> Result<&mut Self> {
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.fit_with_rng(x, y, &mut rng)
    }

    fn decision_function(&self, x: &Inputs) -> Result<Vec<f32>> {
        let discriminator = self.discriminator()?;
        if x.is_empty() {
            return Err(Error::InvalidData("inputs must not be empty".to_owned()));
        }
        score_rows(discriminator, x)
    }

    fn state(&self) -> &DetectorState {
        &self.state
    }
}

/// One discriminator output per row.
fn score_rows(discriminator: &Network, x: &Inputs) -> Result<Vec<f32>> {
    debug_assert_eq!(discriminator.output_dim(), 1);
    discriminator.predict(x)
}
