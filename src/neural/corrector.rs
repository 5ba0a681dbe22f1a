use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::network::{SequenceRegressor, TrainConfig, TrainingReport};
use super::scaler::MinMaxScaler;
use crate::deadline::Deadline;
use crate::error::ForecastError;
use crate::prep::build_windows;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrectorConfig {
    pub look_back: usize,
    pub units: [usize; 2],
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub dropout: f64,
    pub clip_norm: f64,
    pub seed: u64,
}

/// Residual corrector: predicts the next linear-model residual from the last `look_back` ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedResidualModel {
    pub look_back: usize,
    pub scaler: MinMaxScaler,
    pub network: SequenceRegressor,
    pub report: TrainingReport,
}

impl FittedResidualModel {
    /// Fits on train residuals only; the scaler never sees test data.
    pub fn fit(
        train_residuals: &[f64],
        cfg: &CorrectorConfig,
        deadline: &Deadline,
    ) -> Result<Self, ForecastError> {
        if cfg.look_back == 0 {
            return Err(ForecastError::InvalidParameter(
                "look_back must be at least 1".to_string(),
            ));
        }
        if train_residuals.len() <= cfg.look_back {
            return Err(ForecastError::Training(format!(
                "{} train residuals cannot fill a look_back of {}",
                train_residuals.len(),
                cfg.look_back
            )));
        }
        if train_residuals.iter().any(|r| !r.is_finite()) {
            return Err(ForecastError::Training(
                "train residuals contain non-finite values".to_string(),
            ));
        }
        let scaler = MinMaxScaler::fit(train_residuals);
        let scaled = scaler.transform_all(train_residuals);
        let (windows, targets) = build_windows(&scaled, cfg.look_back);

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut network = SequenceRegressor::new(cfg.units, cfg.dropout, &mut rng);
        let train_cfg = TrainConfig {
            epochs: cfg.epochs,
            batch_size: cfg.batch_size,
            learning_rate: cfg.learning_rate,
            clip_norm: cfg.clip_norm,
        };
        let report = network.train(&windows, &targets, &train_cfg, deadline, &mut rng)?;
        tracing::info!(
            samples = windows.len(),
            epochs = report.epochs_completed,
            final_loss = report.final_loss,
            "Residual corrector trained"
        );
        Ok(Self {
            look_back: cfg.look_back,
            scaler,
            network,
            report,
        })
    }

    /// Next residual given a history in original units, `None` when it is too short.
    pub fn predict_next(&self, history: &[f64]) -> Option<f64> {
        if history.len() < self.look_back {
            return None;
        }
        let window = self
            .scaler
            .transform_all(&history[history.len() - self.look_back..]);
        let out = self.scaler.inverse(self.network.predict(&window));
        Some(if out.is_finite() { out } else { 0.0 })
    }

    /// Prediction for each `observed[t]` using `prior` followed by `observed[..t]`.
    pub fn predict_aligned(&self, prior: &[f64], observed: &[f64]) -> Vec<Option<f64>> {
        let mut history = prior.to_vec();
        let mut out = Vec::with_capacity(observed.len());
        for value in observed {
            out.push(self.predict_next(&history));
            history.push(*value);
        }
        out
    }

    /// Autoregressive rollout: every prediction is fed back as the newest input.
    /// A history shorter than `look_back` yields zero corrections.
    pub fn rollout(&self, history: &[f64], horizon: usize) -> Vec<f64> {
        if history.len() < self.look_back {
            return vec![0.0; horizon];
        }
        let mut window = history[history.len() - self.look_back..].to_vec();
        let mut out = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let next = self.predict_next(&window).unwrap_or(0.0);
            out.push(next);
            window.remove(0);
            window.push(next);
        }
        out
    }
}
