//! Adversarial training loop.
//!
//! Each mini-batch runs two phases:
//!
//! 1. the discriminator takes one SGD step on `[real; generated]` with targets `[1; 0]`;
//! 2. the combined model (generator followed by the frozen discriminator) takes one
//!    SGD step on the same noise with an all-ones target, which only moves the
//!    generator. Once the generator is frozen the combined loss is still evaluated and
//!    recorded, but no step is applied.
//!
//! The generator freezes for good after epoch index `e` once `e + 1 > stop_epochs`.

use log::{debug, info, warn};
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::builder::{create_discriminator, create_generator};
use crate::loss;
use crate::{Error, Gradients, Inputs, Network, Result, Scratch, Sgd, SgdState};

/// Upper bound on the mini-batch size.
pub const MAX_BATCH_SIZE: usize = 500;

/// Total epochs are this multiple of `stop_epochs`.
pub const EPOCH_MULTIPLIER: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Row order used to cut mini-batches.
pub enum Shuffle {
    /// Fixed contiguous windows `[i * batch_size, (i + 1) * batch_size)` every epoch.
    #[default]
    None,
    /// Permute the rows at the start of every epoch with a seeded RNG.
    Seeded(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// How many of the planned epochs are actually run.
pub enum EpochSchedule {
    /// Scores are taken and training returns right after the first epoch, whatever
    /// `stop_epochs` says.
    #[default]
    FirstEpochOnly,
    /// Run all `stop_epochs * 3` epochs, then score.
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Epoch and mini-batch layout for one fit.
pub struct BatchPlan {
    pub epochs: usize,
    pub batch_size: usize,
    pub num_batches: usize,
}

impl BatchPlan {
    pub fn new(n_samples: usize, stop_epochs: usize) -> Result<Self> {
        if n_samples == 0 {
            return Err(Error::InvalidData(
                "training data must not be empty".to_owned(),
            ));
        }
        if stop_epochs == 0 {
            return Err(Error::InvalidConfig("stop_epochs must be > 0".to_owned()));
        }

        let epochs = planned_epochs(stop_epochs)?;
        let batch_size = MAX_BATCH_SIZE.min(n_samples);
        Ok(Self {
            epochs,
            batch_size,
            num_batches: n_samples / batch_size,
        })
    }

    /// Trailing rows that never land in a batch.
    pub fn unused_rows(&self, n_samples: usize) -> usize {
        n_samples - self.batch_size * self.num_batches
    }
}

/// `stop_epochs * EPOCH_MULTIPLIER`, rejecting values that overflow `usize`.
pub fn planned_epochs(stop_epochs: usize) -> Result<usize> {
    stop_epochs.checked_mul(EPOCH_MULTIPLIER).ok_or_else(|| {
        Error::InvalidConfig(format!(
            "stop_epochs {stop_epochs} is too large: {EPOCH_MULTIPLIER} * stop_epochs overflows"
        ))
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Per-batch losses accumulated over one fit.
pub struct TrainHistory {
    discriminator_loss: Vec<f32>,
    generator_loss: Vec<f32>,
}

impl TrainHistory {
    #[inline]
    pub fn discriminator_loss(&self) -> &[f32] {
        &self.discriminator_loss
    }

    /// Generator-phase losses: training losses while the generator is active,
    /// evaluation-only losses after it froze.
    #[inline]
    pub fn generator_loss(&self) -> &[f32] {
        &self.generator_loss
    }

    /// Number of recorded batches.
    #[inline]
    pub fn len(&self) -> usize {
        self.discriminator_loss.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.discriminator_loss.is_empty()
    }
}

/// Discriminator optimizer binding: SGD over the discriminator's own parameters.
#[derive(Debug, Clone)]
pub struct DiscriminatorBinding {
    optimizer: SgdState,
    scratch: Scratch,
    sample_grads: Gradients,
    batch_grads: Gradients,
}

impl DiscriminatorBinding {
    pub fn new(discriminator: &Network, sgd: Sgd) -> Result<Self> {
        Ok(Self {
            optimizer: sgd.state(discriminator)?,
            scratch: discriminator.scratch(),
            sample_grads: discriminator.gradients(),
            batch_grads: discriminator.gradients(),
        })
    }

    #[inline]
    pub fn optimizer(&self) -> &SgdState {
        &self.optimizer
    }

    /// One SGD step on a flat row-major batch `x` with one target per row.
    ///
    /// Returns the mean binary cross-entropy measured before the update.
    pub fn train_on_batch(&mut self, discriminator: &mut Network, x: &[f32], y: &[f32]) -> f32 {
        let dim = discriminator.input_dim();
        assert_eq!(x.len(), y.len() * dim);

        let inv_n = 1.0 / y.len() as f32;
        let mut total = 0.0_f32;
        self.batch_grads.zero();

        for (row, target) in x.chunks_exact(dim).zip(y) {
            let pred = discriminator.forward(row, &mut self.scratch);
            total += loss::binary_cross_entropy_backward(
                pred,
                std::slice::from_ref(target),
                self.sample_grads.d_output_mut(),
            );
            discriminator.backward(row, &self.scratch, &mut self.sample_grads);
            self.batch_grads.accumulate_scaled(&self.sample_grads, inv_n);
        }

        self.optimizer.step(discriminator, &self.batch_grads);
        total * inv_n
    }
}

/// The generator composed with the discriminator, bound to its own optimizer.
///
/// Only the generator is trainable through this binding: the discriminator is taken by
/// shared reference, its gradients are used solely to reach the generator's output.
#[derive(Debug, Clone)]
pub struct CombinedModel {
    optimizer: SgdState,
    discriminator_trainable: bool,
    gen_scratch: Scratch,
    gen_sample_grads: Gradients,
    gen_batch_grads: Gradients,
    dis_scratch: Scratch,
    dis_sample_grads: Gradients,
}

impl CombinedModel {
    pub fn new(generator: &Network, discriminator: &Network, sgd: Sgd) -> Result<Self> {
        if generator.output_dim() != discriminator.input_dim() {
            return Err(Error::InvalidShape(format!(
                "generator output_dim {} does not match discriminator input_dim {}",
                generator.output_dim(),
                discriminator.input_dim()
            )));
        }
        Ok(Self {
            optimizer: sgd.state(generator)?,
            discriminator_trainable: false,
            gen_scratch: generator.scratch(),
            gen_sample_grads: generator.gradients(),
            gen_batch_grads: generator.gradients(),
            dis_scratch: discriminator.scratch(),
            dis_sample_grads: discriminator.gradients(),
        })
    }

    #[inline]
    pub fn optimizer(&self) -> &SgdState {
        &self.optimizer
    }

    /// Always `false`: this binding never updates the discriminator.
    #[inline]
    pub fn discriminator_trainable(&self) -> bool {
        self.discriminator_trainable
    }

    /// One SGD step on the generator for a flat noise batch and one target per row.
    ///
    /// Returns the mean loss measured before the update.
    pub fn train_on_batch(
        &mut self,
        generator: &mut Network,
        discriminator: &Network,
        noise: &[f32],
        y: &[f32],
    ) -> f32 {
        let loss = self.run(generator, discriminator, noise, y, true);
        self.optimizer.step(generator, &self.gen_batch_grads);
        loss
    }

    /// Mean loss on a flat noise batch without touching any parameters.
    pub fn evaluate(
        &mut self,
        generator: &Network,
        discriminator: &Network,
        noise: &[f32],
        y: &[f32],
    ) -> f32 {
        self.run(generator, discriminator, noise, y, false)
    }

    fn run(
        &mut self,
        generator: &Network,
        discriminator: &Network,
        noise: &[f32],
        y: &[f32],
        with_grads: bool,
    ) -> f32 {
        let dim = generator.input_dim();
        assert_eq!(noise.len(), y.len() * dim);

        let inv_n = 1.0 / y.len() as f32;
        let mut total = 0.0_f32;
        if with_grads {
            self.gen_batch_grads.zero();
        }

        for (z, target) in noise.chunks_exact(dim).zip(y) {
            let fake = generator.forward(z, &mut self.gen_scratch);
            let pred = discriminator.forward(fake, &mut self.dis_scratch);
            let target = std::slice::from_ref(target);

            if !with_grads {
                total += loss::binary_cross_entropy(pred, target);
                continue;
            }

            total += loss::binary_cross_entropy_backward(
                pred,
                target,
                self.dis_sample_grads.d_output_mut(),
            );
            let d_fake =
                discriminator.backward(fake, &self.dis_scratch, &mut self.dis_sample_grads);
            self.gen_sample_grads.d_output_mut().copy_from_slice(d_fake);
            generator.backward(z, &self.gen_scratch, &mut self.gen_sample_grads);
            self.gen_batch_grads
                .accumulate_scaled(&self.gen_sample_grads, inv_n);
        }

        total * inv_n
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
/// Hyperparameters of the adversarial loop.
pub struct TrainerConfig {
    pub stop_epochs: usize,
    pub discriminator: Sgd,
    pub generator: Sgd,
    pub schedule: EpochSchedule,
    pub shuffle: Shuffle,
}

/// Everything one adversarial fit leaves behind.
#[derive(Debug, Clone)]
pub struct TrainedGaal {
    pub generator: Network,
    pub discriminator: Network,
    pub discriminator_binding: DiscriminatorBinding,
    pub combined: CombinedModel,
    pub history: TrainHistory,
    pub plan: BatchPlan,
    /// Epochs whose batch loop actually ran.
    pub epochs_run: usize,
    /// Whether the generator had been frozen by the time training returned.
    pub generator_frozen: bool,
}

/// Run the adversarial protocol on `x`.
///
/// Builds fresh networks from `rng`, which also drives noise sampling.
pub fn train<R: Rng + ?Sized>(
    x: &Inputs,
    cfg: &TrainerConfig,
    rng: &mut R,
) -> Result<TrainedGaal> {
    if x.is_empty() {
        return Err(Error::InvalidData(
            "training data must not be empty".to_owned(),
        ));
    }
    let plan = BatchPlan::new(x.len(), cfg.stop_epochs)?;
    let latent_size = x.input_dim();
    let data_size = x.len();

    let mut discriminator = create_discriminator(latent_size, data_size, rng)?;
    let mut discriminator_binding = DiscriminatorBinding::new(&discriminator, cfg.discriminator)?;

    let mut generator = create_generator(latent_size, rng)?;
    let mut combined = CombinedModel::new(&generator, &discriminator, cfg.generator)?;

    info!(
        "adversarial training: {data_size} samples x {latent_size} features, {} epochs, \
         {} batches of {} ({} trailing rows unused)",
        plan.epochs,
        plan.num_batches,
        plan.batch_size,
        plan.unused_rows(data_size)
    );
    if cfg.schedule == EpochSchedule::FirstEpochOnly && plan.epochs > 1 {
        warn!(
            "epoch schedule stops after the first of {} planned epochs",
            plan.epochs
        );
    }

    let batch_size = plan.batch_size;
    let uniform = Uniform::new(0.0_f32, 1.0);
    let mut noise = vec![0.0_f32; batch_size * latent_size];
    let mut generated = vec![0.0_f32; batch_size * latent_size];
    let mut batch_x = vec![0.0_f32; 2 * batch_size * latent_size];
    let batch_y: Vec<f32> = std::iter::repeat_n(1.0, batch_size)
        .chain(std::iter::repeat_n(0.0, batch_size))
        .collect();
    let trick = vec![1.0_f32; batch_size];

    let mut order: Vec<usize> = (0..data_size).collect();
    let mut shuffle_rng = match cfg.shuffle {
        Shuffle::None => None,
        Shuffle::Seeded(seed) => Some(StdRng::seed_from_u64(seed)),
    };

    let mut gen_scratch = generator.scratch();
    let mut history = TrainHistory::default();
    let mut stop = false;
    let mut warned_non_finite = false;
    let mut epochs_run = 0;

    for epoch in 0..plan.epochs {
        info!("epoch {} of {}", epoch + 1, plan.epochs);
        if let Some(shuffle_rng) = shuffle_rng.as_mut() {
            order.shuffle(shuffle_rng);
        }

        for index in 0..plan.num_batches {
            for v in noise.iter_mut() {
                *v = uniform.sample(rng);
            }

            // Real rows first, generated rows after.
            let (real_half, fake_half) = batch_x.split_at_mut(batch_size * latent_size);
            let rows = &order[index * batch_size..(index + 1) * batch_size];
            for (dst, &row) in real_half.chunks_exact_mut(latent_size).zip(rows) {
                dst.copy_from_slice(x.input(row));
            }
            for (z, dst) in noise
                .chunks_exact(latent_size)
                .zip(generated.chunks_exact_mut(latent_size))
            {
                dst.copy_from_slice(generator.forward(z, &mut gen_scratch));
            }
            fake_half.copy_from_slice(&generated);

            let d_loss =
                discriminator_binding.train_on_batch(&mut discriminator, &batch_x, &batch_y);
            history.discriminator_loss.push(d_loss);

            let g_loss = if stop {
                combined.evaluate(&generator, &discriminator, &noise, &trick)
            } else {
                combined.train_on_batch(&mut generator, &discriminator, &noise, &trick)
            };
            history.generator_loss.push(g_loss);

            debug!(
                "epoch {} batch {}: discriminator_loss={d_loss} generator_loss={g_loss}{}",
                epoch + 1,
                index + 1,
                if stop { " (generator frozen)" } else { "" }
            );

            if !warned_non_finite && !(d_loss.is_finite() && g_loss.is_finite()) {
                warn!(
                    "non-finite loss at epoch {} batch {}: \
                     discriminator={d_loss} generator={g_loss}",
                    epoch + 1,
                    index + 1
                );
                warned_non_finite = true;
            }
        }

        epochs_run += 1;
        if epoch + 1 > cfg.stop_epochs {
            if !stop {
                info!("generator frozen after epoch {}", epoch + 1);
            }
            stop = true;
        }

        if cfg.schedule == EpochSchedule::FirstEpochOnly {
            break;
        }
    }

    Ok(TrainedGaal {
        generator,
        discriminator,
        discriminator_binding,
        combined,
        history,
        plan,
        epochs_run,
        generator_frozen: stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(stop_epochs: usize, schedule: EpochSchedule) -> TrainerConfig {
        TrainerConfig {
            stop_epochs,
            discriminator: Sgd {
                lr: 0.01,
                decay: 1e-6,
                momentum: 0.9,
            },
            generator: Sgd {
                lr: 0.0001,
                decay: 1e-6,
                momentum: 0.9,
            },
            schedule,
            shuffle: Shuffle::None,
        }
    }

    fn grid(n: usize, dim: usize) -> Inputs {
        let data = (0..n * dim).map(|i| (i % 17) as f32 / 17.0).collect();
        Inputs::from_flat(data, dim).unwrap()
    }

    #[test]
    fn batch_plan_layout() {
        let plan = BatchPlan::new(1200, 20).unwrap();
        assert_eq!(plan.epochs, 60);
        assert_eq!(plan.batch_size, 500);
        assert_eq!(plan.num_batches, 2);
        assert_eq!(plan.unused_rows(1200), 200);

        let small = BatchPlan::new(37, 1).unwrap();
        assert_eq!(small.batch_size, 37);
        assert_eq!(small.num_batches, 1);
        assert_eq!(small.unused_rows(37), 0);

        assert!(BatchPlan::new(0, 1).is_err());
        assert!(BatchPlan::new(10, 0).is_err());
        assert!(matches!(
            BatchPlan::new(10, usize::MAX / 2),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn first_epoch_only_runs_one_epoch() {
        let x = grid(40, 3);
        let mut rng = StdRng::seed_from_u64(0);
        let trained = train(&x, &config(20, EpochSchedule::FirstEpochOnly), &mut rng).unwrap();

        assert_eq!(trained.plan.epochs, 60);
        assert_eq!(trained.epochs_run, 1);
        assert_eq!(trained.history.len(), 1);
        assert_eq!(trained.history.generator_loss().len(), 1);
        assert!(!trained.generator_frozen);
        assert_eq!(trained.combined.optimizer().iterations(), 1);
        assert_eq!(trained.discriminator_binding.optimizer().iterations(), 1);
    }

    #[test]
    fn full_schedule_freezes_generator_after_stop_epochs() {
        let x = grid(1100, 2);
        let mut rng = StdRng::seed_from_u64(1);
        let trained = train(&x, &config(2, EpochSchedule::Full), &mut rng).unwrap();

        assert_eq!(trained.epochs_run, 6);
        // 2 batches of 500 per epoch, 100 rows dropped.
        assert_eq!(trained.history.len(), 12);
        assert_eq!(trained.history.generator_loss().len(), 12);
        assert!(trained.generator_frozen);
        // Generator steps only during epochs 1..=3: the flag flips after epoch 3.
        assert_eq!(trained.combined.optimizer().iterations(), 6);
        assert_eq!(trained.discriminator_binding.optimizer().iterations(), 12);
        assert!(!trained.combined.discriminator_trainable());
    }

    #[test]
    fn combined_step_leaves_discriminator_untouched() {
        let mut rng = StdRng::seed_from_u64(2);
        let discriminator = create_discriminator(3, 100, &mut rng).unwrap();
        let mut generator = create_generator(3, &mut rng).unwrap();
        let before_d = discriminator.clone();
        let before_g = generator.clone();

        let sgd = Sgd {
            lr: 0.5,
            decay: 0.0,
            momentum: 0.0,
        };
        let mut combined = CombinedModel::new(&generator, &discriminator, sgd).unwrap();
        let noise = [0.2, 0.4, 0.6, 0.9, 0.1, 0.3];
        let y = [1.0, 1.0];

        let eval = combined.evaluate(&generator, &discriminator, &noise, &y);
        let loss = combined.train_on_batch(&mut generator, &discriminator, &noise, &y);
        assert!((eval - loss).abs() < 1e-6);

        for i in 0..discriminator.num_layers() {
            assert_eq!(
                discriminator.layer(i).unwrap().weights(),
                before_d.layer(i).unwrap().weights()
            );
        }
        let moved = (0..generator.num_layers()).any(|i| {
            generator.layer(i).unwrap().weights() != before_g.layer(i).unwrap().weights()
                || generator.layer(i).unwrap().biases() != before_g.layer(i).unwrap().biases()
        });
        assert!(moved, "generator parameters should change after a step");
    }

    #[test]
    fn discriminator_step_reduces_loss_on_separable_batch() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut discriminator = create_discriminator(2, 16, &mut rng).unwrap();
        let sgd = Sgd {
            lr: 0.5,
            decay: 0.0,
            momentum: 0.0,
        };
        let mut binding = DiscriminatorBinding::new(&discriminator, sgd).unwrap();

        let x = [1.0, 1.0, 0.9, 1.1, -1.0, -1.0, -0.9, -1.1];
        let y = [1.0, 1.0, 0.0, 0.0];
        let first = binding.train_on_batch(&mut discriminator, &x, &y);
        let mut last = first;
        for _ in 0..50 {
            last = binding.train_on_batch(&mut discriminator, &x, &y);
        }
        assert!(last < first, "first={first} last={last}");
    }

    #[test]
    fn seeded_shuffle_still_records_every_batch() {
        let x = grid(30, 2);
        let mut cfg = config(1, EpochSchedule::Full);
        cfg.shuffle = Shuffle::Seeded(9);
        let trained = train(&x, &cfg, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(trained.epochs_run, 3);
        assert_eq!(trained.history.len(), 3);
    }
}
