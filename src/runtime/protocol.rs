//! JSON messages exchanged with the `forecast-worker` process: one job on stdin,
//! one reply on stdout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calendar::TradingCalendar;
use crate::deadline::Deadline;
use crate::error::ForecastError;
use crate::future;
use crate::model::prediction::FutureForecast;
use crate::model::price::PriceSeries;
use crate::pipeline::{self, AnalysisArtifacts, AnalysisParams, AnalysisSettings, FittedState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeJob {
    pub series: PriceSeries,
    pub params: AnalysisParams,
    pub settings: AnalysisSettings,
    pub calendar: TradingCalendar,
    /// Soft budget for the fit; the pipeline degrades once it is spent.
    pub budget_ms: Option<u64>,
}

impl AnalyzeJob {
    pub fn deadline(&self) -> Deadline {
        self.budget_ms
            .map(|ms| Deadline::after(Duration::from_millis(ms)))
            .unwrap_or_default()
    }

    pub fn execute(&self) -> Result<AnalysisArtifacts, ForecastError> {
        pipeline::run_full_analysis(
            &self.series,
            &self.params,
            &self.settings,
            &self.calendar,
            &self.deadline(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastJob {
    pub fitted: FittedState,
    pub horizon: usize,
    pub calendar: TradingCalendar,
    pub confidence_z: f64,
    pub budget_ms: Option<u64>,
}

impl ForecastJob {
    pub fn execute(&self) -> Result<FutureForecast, ForecastError> {
        future::forecast_future(&self.fitted, self.horizon, &self.calendar, self.confidence_z)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum WorkerJob {
    Analyze(AnalyzeJob),
    Forecast(ForecastJob),
}

impl WorkerJob {
    pub fn budget(&self) -> Option<Duration> {
        let ms = match self {
            WorkerJob::Analyze(job) => job.budget_ms,
            WorkerJob::Forecast(job) => job.budget_ms,
        };
        ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    Analysis { artifacts: Box<AnalysisArtifacts> },
    Forecast { forecast: FutureForecast },
    Failed { error: ForecastError },
}

/// Runs a job in the current process. Shared by the worker binary and the in-process runtime.
pub fn run_job(job: &WorkerJob) -> WorkerReply {
    let result = match job {
        WorkerJob::Analyze(job) => job.execute().map(|artifacts| WorkerReply::Analysis {
            artifacts: Box::new(artifacts),
        }),
        WorkerJob::Forecast(job) => job
            .execute()
            .map(|forecast| WorkerReply::Forecast { forecast }),
    };
    result.unwrap_or_else(|error| WorkerReply::Failed { error })
}
