//! Request and response bodies of the `{action, params}` call contract.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ForecastError;
use crate::model::prediction::{
    DataInfo, FutureForecast, ModelMetricsRow, PredictionSet, RealismMetrics,
};
use crate::model::price::{parse_date, PriceSeries};
use crate::model::report::StationarityReport;
use crate::pipeline::{AnalysisParams, ModelInfo};

pub const ACTION_HEALTH: &str = "healthCheck";
pub const ACTION_PREVIEW: &str = "getDataPreview";
pub const ACTION_ANALYZE: &str = "runFullAnalysis";
pub const ACTION_FORECAST: &str = "forecastFuture";
pub const ACTION_PREDICTIONS: &str = "makePredictions";
pub const ACTION_STATIONARITY: &str = "analyzeStationarity";
pub const ACTION_TRAIN: &str = "trainModels";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ApiRequest {
    pub fn new(action: &str, params: serde_json::Value) -> Self {
        Self {
            action: Some(action.to_string()),
            params,
        }
    }

    /// Decodes `params`; a missing or `null` object means all defaults.
    pub fn params<T: DeserializeOwned + Default>(&self) -> Result<T, ForecastError> {
        if self.params.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.params.clone())
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid params: {}", e)))
    }
}

fn parse_optional_date(name: &str, raw: &Option<String>) -> Result<Option<NaiveDate>, ForecastError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s).map(Some).map_err(|_| {
            ForecastError::InvalidParameter(format!("{} must be YYYY-MM-DD, got '{}'", name, s))
        }),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreviewParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl PreviewParams {
    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ForecastError> {
        Ok((
            parse_optional_date("start_date", &self.start_date)?,
            parse_optional_date("end_date", &self.end_date)?,
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisRequest {
    pub look_back: usize,
    pub lstm_units: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub include_forecast: bool,
    pub timeout_secs: Option<u64>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Inline series pushed by the gateway; takes precedence over the configured source.
    pub dates: Option<Vec<String>>,
    pub close: Option<Vec<f64>>,
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        let defaults = AnalysisParams::default();
        Self {
            look_back: defaults.look_back,
            lstm_units: defaults.lstm_units.to_vec(),
            epochs: defaults.epochs,
            batch_size: defaults.batch_size,
            include_forecast: defaults.include_forecast,
            timeout_secs: None,
            start_date: None,
            end_date: None,
            dates: None,
            close: None,
        }
    }
}

impl AnalysisRequest {
    pub fn analysis_params(&self) -> Result<AnalysisParams, ForecastError> {
        let lstm_units = match self.lstm_units.as_slice() {
            [u] => [*u, *u],
            [a, b] => [*a, *b],
            other => {
                return Err(ForecastError::InvalidParameter(format!(
                    "lstm_units must hold one or two layer sizes, got {}",
                    other.len()
                )))
            }
        };
        Ok(AnalysisParams {
            look_back: self.look_back,
            lstm_units,
            epochs: self.epochs,
            batch_size: self.batch_size,
            include_forecast: self.include_forecast,
        })
    }

    pub fn date_range(&self) -> Result<(Option<NaiveDate>, Option<NaiveDate>), ForecastError> {
        Ok((
            parse_optional_date("start_date", &self.start_date)?,
            parse_optional_date("end_date", &self.end_date)?,
        ))
    }

    /// `None` when the request does not carry prices.
    pub fn inline_series(&self) -> Option<Result<PriceSeries, ForecastError>> {
        match (&self.dates, &self.close) {
            (Some(dates), Some(close)) => Some(
                PriceSeries::from_columns(dates, close).map_err(|e| match e {
                    ForecastError::UpstreamData(msg) => ForecastError::InvalidParameter(msg),
                    other => other,
                }),
            ),
            (None, None) => None,
            _ => Some(Err(ForecastError::InvalidParameter(
                "dates and close must be sent together".to_string(),
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForecastRequest {
    pub days: i64,
    pub recalculate: bool,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            days: 30,
            recalculate: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub session: &'static str,
    pub runtime: &'static str,
    pub source: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub success: bool,
    pub dates: Vec<String>,
    pub close: Vec<f64>,
    pub avg_price: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub success: bool,
    pub session_id: Uuid,
    pub data_info: DataInfo,
    pub comparison_table: Vec<ModelMetricsRow>,
    pub best_model: String,
    pub predictions: PredictionSet,
    pub stationarity: StationarityReport,
    pub forecast: Option<FutureForecast>,
    pub dates: Vec<String>,
    pub close: Vec<f64>,
    pub avg_price: Vec<f64>,
    pub model_info: ModelInfo,
    pub realism_metrics: RealismMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub success: bool,
    pub forecast: FutureForecast,
    /// Whether the forecast came from the session instead of a fresh run. The forecast
    /// body is the same either way; only this flag differs between the first and a
    /// repeated default-horizon request.
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionsResponse {
    pub success: bool,
    pub predictions: PredictionSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct StationarityResponse {
    pub success: bool,
    pub stationarity: StationarityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub kind: &'static str,
}

impl From<&ForecastError> for ErrorResponse {
    fn from(err: &ForecastError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_params_mean_defaults() {
        let req = ApiRequest::new(ACTION_FORECAST, serde_json::Value::Null);
        let p: ForecastRequest = req.params().unwrap();
        assert_eq!(p.days, 30);
        assert!(!p.recalculate);
    }

    #[test]
    fn analysis_defaults_fill_missing_fields() {
        let req = ApiRequest::new(ACTION_ANALYZE, serde_json::json!({"look_back": 30}));
        let p: AnalysisRequest = req.params().unwrap();
        let params = p.analysis_params().unwrap();
        assert_eq!(params.look_back, 30);
        assert_eq!(params.lstm_units, [50, 50]);
        assert_eq!(params.epochs, 30);
        assert!(params.include_forecast);
    }

    #[test]
    fn negative_look_back_is_invalid() {
        let req = ApiRequest::new(ACTION_ANALYZE, serde_json::json!({"look_back": -1}));
        let err = req.params::<AnalysisRequest>().unwrap_err();
        assert!(matches!(err, ForecastError::InvalidParameter(_)));
    }

    #[test]
    fn malformed_date_is_invalid() {
        let p = PreviewParams {
            start_date: Some("01.02.2024".to_string()),
            end_date: None,
        };
        assert!(matches!(
            p.date_range(),
            Err(ForecastError::InvalidParameter(_))
        ));
    }
}
