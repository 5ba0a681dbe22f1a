use serde::{Deserialize, Serialize};

/// Back-tested predictions over the test segment. `None` only appears in a leading run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSet {
    pub dates: Vec<String>,
    pub actual: Vec<f64>,
    pub arima: Vec<Option<f64>>,
    pub lstm: Vec<Option<f64>>,
    pub hybrid: Vec<Option<f64>>,
}

impl PredictionSet {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FutureForecast {
    pub dates: Vec<String>,
    pub hybrid: Vec<f64>,
    pub arima: Vec<f64>,
    pub conf_int_lower: Vec<f64>,
    pub conf_int_upper: Vec<f64>,
}

impl FutureForecast {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetricsRow {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "MAE")]
    pub mae: f64,
    #[serde(rename = "RMSE")]
    pub rmse: f64,
    #[serde(rename = "MAPE")]
    pub mape: f64,
    #[serde(rename = "R2")]
    pub r2: f64,
    pub fit_seconds: f64,
    pub samples: usize,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInfo {
    pub total_records: usize,
    pub train_records: usize,
    pub test_records: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathRealism {
    pub monotonic_flag: bool,
    pub monotonic_run_max: usize,
    pub diff_vol_ratio: f64,
    pub sign_flip_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealismMetrics {
    pub test_hybrid: Option<PathRealism>,
    pub future_hybrid: Option<PathRealism>,
}
