use ndarray::{Array, Array1, Dimension, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::lstm::{LstmGrads, LstmLayer};
use crate::deadline::Deadline;
use crate::error::ForecastError;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPS: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub clip_norm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_requested: usize,
    pub epochs_completed: usize,
    pub final_loss: f64,
    pub loss_history: Vec<f64>,
    pub stopped_at_deadline: bool,
}

/// LSTM(full sequence) → dropout → LSTM(last state) → dropout → dense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRegressor {
    pub layer1: LstmLayer,
    pub layer2: LstmLayer,
    pub dense_w: Array1<f64>,
    pub dense_b: Array1<f64>,
    pub dropout: f64,
}

#[derive(Debug, Clone)]
struct Grads {
    l1: LstmGrads,
    l2: LstmGrads,
    dense_w: Array1<f64>,
    dense_b: Array1<f64>,
}

impl Grads {
    fn zeros_like(net: &SequenceRegressor) -> Self {
        Self {
            l1: LstmGrads::zeros_like(&net.layer1),
            l2: LstmGrads::zeros_like(&net.layer2),
            dense_w: Array1::zeros(net.dense_w.raw_dim()),
            dense_b: Array1::zeros(1),
        }
    }

    fn fill_zero(&mut self) {
        self.l1.fill_zero();
        self.l2.fill_zero();
        self.dense_w.fill(0.0);
        self.dense_b.fill(0.0);
    }

    fn norm(&self) -> f64 {
        let dense: f64 = self
            .dense_w
            .iter()
            .chain(self.dense_b.iter())
            .map(|g| g * g)
            .sum();
        (self.l1.sum_sq() + self.l2.sum_sq() + dense).sqrt()
    }

    fn scale(&mut self, factor: f64) {
        self.l1.scale(factor);
        self.l2.scale(factor);
        self.dense_w *= factor;
        self.dense_b *= factor;
    }
}

struct Adam {
    m: Grads,
    v: Grads,
    step: i32,
    lr: f64,
}

impl Adam {
    fn new(net: &SequenceRegressor, lr: f64) -> Self {
        Self {
            m: Grads::zeros_like(net),
            v: Grads::zeros_like(net),
            step: 0,
            lr,
        }
    }

    fn apply(&mut self, net: &mut SequenceRegressor, g: &Grads) {
        self.step += 1;
        let bc1 = 1.0 - ADAM_BETA1.powi(self.step);
        let bc2 = 1.0 - ADAM_BETA2.powi(self.step);
        let lr = self.lr;
        adam_update(&mut net.layer1.w, &g.l1.w, &mut self.m.l1.w, &mut self.v.l1.w, lr, bc1, bc2);
        adam_update(&mut net.layer1.u, &g.l1.u, &mut self.m.l1.u, &mut self.v.l1.u, lr, bc1, bc2);
        adam_update(&mut net.layer1.b, &g.l1.b, &mut self.m.l1.b, &mut self.v.l1.b, lr, bc1, bc2);
        adam_update(&mut net.layer2.w, &g.l2.w, &mut self.m.l2.w, &mut self.v.l2.w, lr, bc1, bc2);
        adam_update(&mut net.layer2.u, &g.l2.u, &mut self.m.l2.u, &mut self.v.l2.u, lr, bc1, bc2);
        adam_update(&mut net.layer2.b, &g.l2.b, &mut self.m.l2.b, &mut self.v.l2.b, lr, bc1, bc2);
        adam_update(&mut net.dense_w, &g.dense_w, &mut self.m.dense_w, &mut self.v.dense_w, lr, bc1, bc2);
        adam_update(&mut net.dense_b, &g.dense_b, &mut self.m.dense_b, &mut self.v.dense_b, lr, bc1, bc2);
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f64, D>,
    grad: &Array<f64, D>,
    m: &mut Array<f64, D>,
    v: &mut Array<f64, D>,
    lr: f64,
    bc1: f64,
    bc2: f64,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g;
            *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + ADAM_EPS);
        });
}

impl SequenceRegressor {
    pub fn new(units: [usize; 2], dropout: f64, rng: &mut StdRng) -> Self {
        let layer1 = LstmLayer::new(1, units[0], rng);
        let layer2 = LstmLayer::new(units[0], units[1], rng);
        let limit = (1.0 / units[1] as f64).sqrt();
        let dense_w = Array1::from_shape_fn(units[1], |_| rng.gen_range(-limit..limit));
        Self {
            layer1,
            layer2,
            dense_w,
            dense_b: Array1::zeros(1),
            dropout: dropout.clamp(0.0, 0.95),
        }
    }

    fn inputs(window: &[f64]) -> Vec<Array1<f64>> {
        window.iter().map(|v| Array1::from_elem(1, *v)).collect()
    }

    /// Inference without dropout.
    pub fn predict(&self, window: &[f64]) -> f64 {
        let h1 = self.layer1.run(&Self::inputs(window));
        let h2 = self.layer2.run(&h1);
        match h2.last() {
            Some(last) => self.dense_w.dot(last) + self.dense_b[0],
            None => self.dense_b[0],
        }
    }

    fn dropout_mask(&self, len: usize, rng: &mut StdRng) -> Array1<f64> {
        if self.dropout <= 0.0 {
            return Array1::ones(len);
        }
        let keep = 1.0 - self.dropout;
        Array1::from_shape_fn(len, |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        })
    }

    /// Forward and backward pass for one sample; gradients of `scale * (ŷ - y)^2` are
    /// accumulated into `grads`. Returns the unscaled squared error.
    fn accumulate(
        &self,
        window: &[f64],
        target: f64,
        scale: f64,
        grads: &mut Grads,
        rng: &mut StdRng,
    ) -> f64 {
        let xs = Self::inputs(window);
        let (h1, cache1) = self.layer1.forward(&xs);
        let masks1: Vec<Array1<f64>> = (0..h1.len())
            .map(|_| self.dropout_mask(self.layer1.hidden_size, rng))
            .collect();
        let h1_drop: Vec<Array1<f64>> = h1.iter().zip(&masks1).map(|(h, m)| h * m).collect();
        let (h2, cache2) = self.layer2.forward(&h1_drop);
        let steps = h2.len();
        let mask2 = self.dropout_mask(self.layer2.hidden_size, rng);
        let last = &h2[steps - 1] * &mask2;
        let y = self.dense_w.dot(&last) + self.dense_b[0];
        let err = y - target;

        let dy = 2.0 * err * scale;
        grads.dense_w.scaled_add(dy, &last);
        grads.dense_b[0] += dy;

        let mut dh2 = vec![Array1::zeros(self.layer2.hidden_size); steps];
        dh2[steps - 1] = &self.dense_w * dy * &mask2;
        let (g2, dx2) = self.layer2.backward(&cache2, &dh2);
        grads.l2.add_assign(&g2);

        let dh1: Vec<Array1<f64>> = dx2.iter().zip(&masks1).map(|(d, m)| d * m).collect();
        let (g1, _) = self.layer1.backward(&cache1, &dh1);
        grads.l1.add_assign(&g1);

        err * err
    }

    /// Mini-batch training on MSE. Stops between epochs once the deadline has expired.
    pub fn train(
        &mut self,
        windows: &[Vec<f64>],
        targets: &[f64],
        cfg: &TrainConfig,
        deadline: &Deadline,
        rng: &mut StdRng,
    ) -> Result<TrainingReport, ForecastError> {
        if windows.is_empty() || windows.len() != targets.len() {
            return Err(ForecastError::Training(format!(
                "need matching non-empty windows and targets, got {} and {}",
                windows.len(),
                targets.len()
            )));
        }
        if windows.iter().any(|w| w.is_empty()) {
            return Err(ForecastError::Training("empty input window".to_string()));
        }
        let epochs = cfg.epochs.max(1);
        let batch_size = cfg.batch_size.max(1);
        let mut adam = Adam::new(self, cfg.learning_rate);
        let mut grads = Grads::zeros_like(self);
        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut loss_history = Vec::with_capacity(epochs);
        let mut stopped_at_deadline = false;

        for epoch in 0..epochs {
            if deadline.expired() {
                if epoch == 0 {
                    return Err(ForecastError::Training(
                        "deadline expired before the first epoch".to_string(),
                    ));
                }
                stopped_at_deadline = true;
                tracing::warn!(epoch, "Training stopped at deadline");
                break;
            }
            order.shuffle(rng);
            let mut total = 0.0;
            for batch in order.chunks(batch_size) {
                grads.fill_zero();
                let scale = 1.0 / batch.len() as f64;
                for &idx in batch {
                    total += self.accumulate(&windows[idx], targets[idx], scale, &mut grads, rng);
                }
                let norm = grads.norm();
                if !norm.is_finite() {
                    return Err(ForecastError::Training(format!(
                        "non-finite gradient in epoch {}",
                        epoch + 1
                    )));
                }
                if cfg.clip_norm > 0.0 && norm > cfg.clip_norm {
                    grads.scale(cfg.clip_norm / norm);
                }
                adam.apply(self, &grads);
            }
            let loss = total / windows.len() as f64;
            if !loss.is_finite() {
                return Err(ForecastError::Training(format!(
                    "loss became non-finite in epoch {}",
                    epoch + 1
                )));
            }
            tracing::debug!(epoch = epoch + 1, loss, "Epoch finished");
            loss_history.push(loss);
        }

        let final_loss = loss_history.last().copied().unwrap_or(f64::NAN);
        Ok(TrainingReport {
            epochs_requested: epochs,
            epochs_completed: loss_history.len(),
            final_loss,
            loss_history,
            stopped_at_deadline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn learns_a_constant_target() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut net = SequenceRegressor::new([4, 4], 0.0, &mut rng);
        let windows: Vec<Vec<f64>> = (0..32).map(|i| vec![0.1 * (i % 5) as f64; 3]).collect();
        let targets = vec![0.5; 32];
        let cfg = TrainConfig {
            epochs: 40,
            batch_size: 8,
            learning_rate: 0.01,
            clip_norm: 5.0,
        };
        let report = net
            .train(&windows, &targets, &cfg, &Deadline::unbounded(), &mut rng)
            .unwrap();
        assert_eq!(report.epochs_completed, 40);
        assert!(report.final_loss < report.loss_history[0]);
        assert!((net.predict(&[0.2, 0.2, 0.2]) - 0.5).abs() < 0.1);
    }

    #[test]
    fn expired_deadline_fails_before_first_epoch() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut net = SequenceRegressor::new([2, 2], 0.2, &mut rng);
        let cfg = TrainConfig {
            epochs: 3,
            batch_size: 4,
            learning_rate: 0.001,
            clip_norm: 5.0,
        };
        let err = net
            .train(
                &[vec![0.1, 0.2]],
                &[0.3],
                &cfg,
                &Deadline::after(std::time::Duration::ZERO),
                &mut rng,
            )
            .unwrap_err();
        assert!(matches!(err, ForecastError::Training(_)));
    }
}
