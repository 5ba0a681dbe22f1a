use super::protocol::{AnalyzeJob, ForecastJob};
use super::ModelRuntime;
use crate::error::ForecastError;
use crate::model::prediction::FutureForecast;
use crate::pipeline::AnalysisArtifacts;

/// Runs the pipeline on the calling (blocking) thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessRuntime;

impl ModelRuntime for InProcessRuntime {
    fn name(&self) -> &'static str {
        "in_process"
    }

    fn analyze(&self, job: AnalyzeJob) -> Result<AnalysisArtifacts, ForecastError> {
        job.execute()
    }

    fn forecast(&self, job: ForecastJob) -> Result<FutureForecast, ForecastError> {
        job.execute()
    }
}
