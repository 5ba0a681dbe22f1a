use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ForecastError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("model fit failed: {0}")]
    ModelFit(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("no analysis available yet: run runFullAnalysis first")]
    NoAnalysisYet,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("upstream data error: {0}")]
    UpstreamData(String),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("another analysis job is already running")]
    Busy,

    #[error("job exceeded its {budget_secs}s time budget")]
    DeadlineExceeded { budget_secs: u64 },

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ForecastError {
    /// Errors caused by the request itself rather than by the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::InsufficientData(_)
                | ForecastError::InvalidParameter(_)
                | ForecastError::NoAnalysisYet
                | ForecastError::UnknownAction(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::InsufficientData(_) => "insufficient_data",
            ForecastError::ModelFit(_) => "model_fit",
            ForecastError::Training(_) => "training",
            ForecastError::NoAnalysisYet => "no_analysis_yet",
            ForecastError::InvalidParameter(_) => "invalid_parameter",
            ForecastError::UpstreamData(_) => "upstream_data",
            ForecastError::UnknownAction(_) => "unknown_action",
            ForecastError::Busy => "busy",
            ForecastError::DeadlineExceeded { .. } => "deadline_exceeded",
            ForecastError::Runtime(_) => "runtime",
        }
    }
}
