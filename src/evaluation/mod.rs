pub mod realism;

use std::cmp::Ordering;

use crate::model::prediction::{ModelMetricsRow, PredictionSet};

const MAPE_MIN_ACTUAL: f64 = 1e-8;
const RMSE_TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Arima,
    Lstm,
    Hybrid,
}

impl ModelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::Arima => "ARIMA",
            ModelKind::Lstm => "LSTM",
            ModelKind::Hybrid => "Hybrid",
        }
    }

    /// Lower wins when RMSE and MAE tie.
    fn preference(name: &str) -> usize {
        match name {
            "Hybrid" => 0,
            "ARIMA" => 1,
            "LSTM" => 2,
            _ => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitTimings {
    pub linear_seconds: f64,
    pub corrector_seconds: f64,
}

/// Error metrics over `(actual, predicted)` pairs.
#[derive(Debug, Clone, Default)]
pub struct PairMetrics {
    pairs: Vec<(f64, f64)>,
}

impl PairMetrics {
    /// Pairs only the positions where a prediction exists.
    pub fn from_aligned(actual: &[f64], predicted: &[Option<f64>]) -> Self {
        let mut out = Self::default();
        for (y, yhat) in actual.iter().zip(predicted.iter()) {
            if let Some(yhat) = yhat {
                out.observe(*y, *yhat);
            }
        }
        out
    }

    pub fn observe(&mut self, y_real: f64, y_pred: f64) {
        if !y_real.is_finite() || !y_pred.is_finite() {
            return;
        }
        self.pairs.push((y_real, y_pred));
    }

    pub fn sample_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn mae(&self) -> f64 {
        let n = self.pairs.len();
        if n == 0 {
            return 0.0;
        }
        self.pairs.iter().map(|(y, yhat)| (y - yhat).abs()).sum::<f64>() / n as f64
    }

    pub fn rmse(&self) -> f64 {
        let n = self.pairs.len();
        if n == 0 {
            return 0.0;
        }
        (self
            .pairs
            .iter()
            .map(|(y, yhat)| (y - yhat).powi(2))
            .sum::<f64>()
            / n as f64)
            .sqrt()
    }

    /// Percentage error skipping near-zero actuals.
    pub fn mape(&self) -> f64 {
        let usable: Vec<&(f64, f64)> = self
            .pairs
            .iter()
            .filter(|(y, _)| y.abs() >= MAPE_MIN_ACTUAL)
            .collect();
        if usable.is_empty() {
            return 0.0;
        }
        usable
            .iter()
            .map(|(y, yhat)| ((y - yhat) / y).abs())
            .sum::<f64>()
            / usable.len() as f64
            * 100.0
    }

    pub fn r2(&self) -> f64 {
        let n = self.pairs.len();
        if n == 0 {
            return 0.0;
        }
        let mean_y = self.pairs.iter().map(|(y, _)| *y).sum::<f64>() / n as f64;
        let mut sse = 0.0;
        let mut sst = 0.0;
        for (y, yhat) in &self.pairs {
            let err = y - yhat;
            sse += err * err;
            let d = y - mean_y;
            sst += d * d;
        }
        if sst <= 1e-18 {
            return 0.0;
        }
        1.0 - (sse / sst)
    }

    pub fn to_row(&self, model: ModelKind, fit_seconds: f64) -> ModelMetricsRow {
        ModelMetricsRow {
            model: model.as_str().to_string(),
            mae: sanitize(self.mae()),
            rmse: sanitize(self.rmse()),
            mape: sanitize(self.mape()),
            r2: sanitize(self.r2()),
            fit_seconds: sanitize(fit_seconds),
            samples: self.sample_count(),
            rank: 0,
        }
    }
}

pub fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Builds the ranked comparison table for the three models.
///
/// Every row is scored against the test actuals. The LSTM row is the linear prediction plus
/// the predicted correction, restricted to positions where the corrector produced a value;
/// the Hybrid row also covers the leading positions where it falls back to the linear model.
pub fn compare_models(predictions: &PredictionSet, timings: FitTimings) -> Vec<ModelMetricsRow> {
    let corrected: Vec<Option<f64>> = predictions
        .arima
        .iter()
        .zip(predictions.lstm.iter())
        .map(|(a, l)| match (a, l) {
            (Some(a), Some(l)) => Some(a + l),
            _ => None,
        })
        .collect();
    let mut rows = vec![
        PairMetrics::from_aligned(&predictions.actual, &predictions.arima)
            .to_row(ModelKind::Arima, timings.linear_seconds),
        PairMetrics::from_aligned(&predictions.actual, &corrected)
            .to_row(ModelKind::Lstm, timings.corrector_seconds),
        PairMetrics::from_aligned(&predictions.actual, &predictions.hybrid).to_row(
            ModelKind::Hybrid,
            timings.linear_seconds + timings.corrector_seconds,
        ),
    ];
    rank_rows(&mut rows);
    rows
}

/// RMSE ascending; near-equal RMSE falls back to MAE and then to the fixed preference.
/// Rows without samples always rank last.
pub fn rank_rows(rows: &mut [ModelMetricsRow]) {
    rows.sort_by(compare_rows);
    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = idx + 1;
    }
}

fn compare_rows(a: &ModelMetricsRow, b: &ModelMetricsRow) -> Ordering {
    match (a.samples == 0, b.samples == 0) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    let scale = a.rmse.abs().max(b.rmse.abs()).max(f64::MIN_POSITIVE);
    if (a.rmse - b.rmse).abs() > RMSE_TIE_TOLERANCE * scale {
        return a.rmse.total_cmp(&b.rmse);
    }
    let scale = a.mae.abs().max(b.mae.abs()).max(f64::MIN_POSITIVE);
    if (a.mae - b.mae).abs() > RMSE_TIE_TOLERANCE * scale {
        return a.mae.total_cmp(&b.mae);
    }
    ModelKind::preference(&a.model).cmp(&ModelKind::preference(&b.model))
}

pub fn best_model(rows: &[ModelMetricsRow]) -> Option<String> {
    rows.iter()
        .find(|r| r.rank == 1)
        .map(|r| r.model.clone())
}
