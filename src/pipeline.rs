//! Full analysis run: split, stationarity, linear fit, residual corrector, evaluation
//! and the default forecast. Pure with respect to its inputs; publishing the result
//! is the caller's job.

use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::TradingCalendar;
use crate::deadline::Deadline;
use crate::error::ForecastError;
use crate::evaluation::{self, realism, FitTimings};
use crate::future;
use crate::linear::{self, ArimaOrder, LinearModel, OrderSearch};
use crate::model::prediction::{
    DataInfo, FutureForecast, ModelMetricsRow, PredictionSet, RealismMetrics,
};
use crate::model::price::PriceSeries;
use crate::model::report::StationarityReport;
use crate::neural::{CorrectorConfig, FittedResidualModel};
use crate::prep::{self, PREVIEW_AVG_WINDOW};
use crate::stationarity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    pub train_ratio: f64,
    pub min_test_size: usize,
    pub order_search: OrderSearch,
    pub dropout: f64,
    pub learning_rate: f64,
    pub clip_norm: f64,
    pub seed: u64,
    pub confidence_z: f64,
    pub max_look_back: usize,
    pub max_units: usize,
    pub max_epochs: usize,
    pub max_batch_size: usize,
    pub default_horizon: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            train_ratio: prep::DEFAULT_TRAIN_RATIO,
            min_test_size: 10,
            order_search: OrderSearch::default(),
            dropout: 0.2,
            learning_rate: 0.001,
            clip_norm: 5.0,
            seed: 42,
            confidence_z: 1.96,
            max_look_back: 365,
            max_units: 512,
            max_epochs: 500,
            max_batch_size: 4096,
            default_horizon: 30,
        }
    }
}

/// Per-request hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub look_back: usize,
    pub lstm_units: [usize; 2],
    pub epochs: usize,
    pub batch_size: usize,
    pub include_forecast: bool,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            look_back: 60,
            lstm_units: [50, 50],
            epochs: 30,
            batch_size: 32,
            include_forecast: true,
        }
    }
}

impl AnalysisParams {
    pub fn validate(&self, settings: &AnalysisSettings) -> Result<(), ForecastError> {
        check_range("look_back", self.look_back, settings.max_look_back)?;
        for units in self.lstm_units {
            check_range("lstm_units", units, settings.max_units)?;
        }
        check_range("epochs", self.epochs, settings.max_epochs)?;
        check_range("batch_size", self.batch_size, settings.max_batch_size)?;
        Ok(())
    }
}

fn check_range(name: &str, value: usize, max: usize) -> Result<(), ForecastError> {
    if value == 0 || value > max {
        return Err(ForecastError::InvalidParameter(format!(
            "{} must be between 1 and {}, got {}",
            name, max, value
        )));
    }
    Ok(())
}

/// Everything needed to forecast from the end of the observed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedState {
    pub last_date: NaiveDate,
    pub closes: Vec<f64>,
    pub linear: LinearModel,
    pub residual: Option<FittedResidualModel>,
    /// Linear residuals over the whole observed series, burn-in dropped.
    pub residual_history: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub arima_order: ArimaOrder,
    pub arima_aic: f64,
    pub arima_fallback: bool,
    pub look_back: usize,
    pub lstm_units: [usize; 2],
    pub lstm_epochs_completed: Option<usize>,
    pub lstm_final_loss: Option<f64>,
    pub degraded: Vec<String>,
    pub total_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifacts {
    pub series: PriceSeries,
    pub avg_price: Vec<f64>,
    pub params: AnalysisParams,
    pub fitted: FittedState,
    pub predictions: PredictionSet,
    pub stationarity: StationarityReport,
    pub comparison_table: Vec<ModelMetricsRow>,
    pub best_model: String,
    pub data_info: DataInfo,
    pub forecast: Option<FutureForecast>,
    pub model_info: ModelInfo,
    pub realism: RealismMetrics,
}

pub fn run_full_analysis(
    series: &PriceSeries,
    params: &AnalysisParams,
    settings: &AnalysisSettings,
    calendar: &TradingCalendar,
    deadline: &Deadline,
) -> Result<AnalysisArtifacts, ForecastError> {
    params.validate(settings)?;
    let started = Instant::now();
    let closes = series.closes();
    let dates = series.date_strings();
    let split = prep::split_series(
        &closes,
        params.look_back,
        settings.train_ratio,
        settings.min_test_size,
    )?;
    let train_len = split.train_len();
    tracing::info!(
        total = closes.len(),
        train = train_len,
        test = split.test_len(),
        look_back = params.look_back,
        "Analysis started"
    );

    let stationarity = stationarity::analyze(&closes);
    let mut degraded = Vec::new();

    let linear_started = Instant::now();
    let linear = match linear::select_order(&split.train, &settings.order_search, deadline) {
        Ok(model) => model,
        Err(e) => {
            tracing::warn!(error = %e, "ARIMA search failed, using random walk");
            degraded.push(format!("arima: {}; fell back to naive (0,1,0)", e));
            LinearModel::fit_naive(&split.train)?
        }
    };
    let linear_seconds = linear_started.elapsed().as_secs_f64();

    let one_step = linear.one_step(&closes);
    let full_residuals = linear.residuals(&closes);
    let train_residuals: Vec<f64> = full_residuals[..train_len].iter().flatten().copied().collect();
    let test_residuals: Vec<f64> = full_residuals[train_len..]
        .iter()
        .map(|r| r.unwrap_or(0.0))
        .collect();

    let corrector_started = Instant::now();
    let corrector_cfg = CorrectorConfig {
        look_back: params.look_back,
        units: params.lstm_units,
        epochs: params.epochs,
        batch_size: params.batch_size,
        learning_rate: settings.learning_rate,
        dropout: settings.dropout,
        clip_norm: settings.clip_norm,
        seed: settings.seed,
    };
    let residual = match FittedResidualModel::fit(&train_residuals, &corrector_cfg, deadline) {
        Ok(model) => {
            if model.report.stopped_at_deadline {
                degraded.push(format!(
                    "lstm: stopped after {} of {} epochs at the time budget",
                    model.report.epochs_completed, model.report.epochs_requested
                ));
            }
            Some(model)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Residual corrector dropped");
            degraded.push(format!("lstm: {}; hybrid uses the linear model only", e));
            None
        }
    };
    let corrector_seconds = corrector_started.elapsed().as_secs_f64();

    let arima_test: Vec<Option<f64>> = one_step[train_len..].to_vec();
    let lstm_test: Vec<Option<f64>> = match &residual {
        Some(model) => model.predict_aligned(&train_residuals, &test_residuals),
        None => vec![None; split.test_len()],
    };
    let hybrid_test: Vec<Option<f64>> = arima_test
        .iter()
        .zip(&lstm_test)
        .map(|(a, l)| a.map(|a| a + l.unwrap_or(0.0)))
        .collect();
    let predictions = PredictionSet {
        dates: dates[train_len..].to_vec(),
        actual: split.test.clone(),
        arima: arima_test,
        lstm: lstm_test,
        hybrid: hybrid_test,
    };

    let comparison_table = evaluation::compare_models(
        &predictions,
        FitTimings {
            linear_seconds,
            corrector_seconds,
        },
    );
    let best_model =
        evaluation::best_model(&comparison_table).unwrap_or_else(|| "ARIMA".to_string());

    let fitted = FittedState {
        last_date: series.last_date(),
        closes: closes.clone(),
        linear,
        residual,
        residual_history: full_residuals.iter().flatten().copied().collect(),
    };

    let forecast = if params.include_forecast {
        Some(future::forecast_future(
            &fitted,
            settings.default_horizon,
            calendar,
            settings.confidence_z,
        )?)
    } else {
        None
    };

    let test_path: Vec<f64> = predictions.hybrid.iter().flatten().copied().collect();
    let realism = RealismMetrics {
        test_hybrid: (!test_path.is_empty())
            .then(|| realism::path_realism(&test_path, &split.train)),
        future_hybrid: forecast
            .as_ref()
            .map(|f| realism::path_realism(&f.hybrid, &closes)),
    };

    let model_info = ModelInfo {
        arima_order: fitted.linear.order,
        arima_aic: evaluation::sanitize(fitted.linear.aic),
        arima_fallback: fitted.linear.fallback,
        look_back: params.look_back,
        lstm_units: params.lstm_units,
        lstm_epochs_completed: fitted.residual.as_ref().map(|m| m.report.epochs_completed),
        lstm_final_loss: fitted
            .residual
            .as_ref()
            .map(|m| evaluation::sanitize(m.report.final_loss)),
        degraded,
        total_seconds: started.elapsed().as_secs_f64(),
    };
    tracing::info!(
        order = %model_info.arima_order,
        best_model = %best_model,
        degraded = model_info.degraded.len(),
        seconds = model_info.total_seconds,
        "Analysis finished"
    );

    Ok(AnalysisArtifacts {
        series: series.clone(),
        avg_price: prep::rolling_average(&closes, PREVIEW_AVG_WINDOW),
        params: params.clone(),
        data_info: DataInfo {
            total_records: closes.len(),
            train_records: train_len,
            test_records: split.test_len(),
        },
        fitted,
        predictions,
        stationarity,
        comparison_table,
        best_model,
        forecast,
        model_info,
        realism,
    })
}
