pub mod in_process;
pub mod protocol;
pub mod subprocess;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ForecastError;
use crate::model::prediction::FutureForecast;
use crate::pipeline::AnalysisArtifacts;

pub use in_process::InProcessRuntime;
pub use protocol::{AnalyzeJob, ForecastJob};
pub use subprocess::SubprocessRuntime;

/// Executes model jobs. Calls block; the service runs them on the blocking pool.
pub trait ModelRuntime: Send + Sync {
    fn name(&self) -> &'static str;
    fn analyze(&self, job: AnalyzeJob) -> Result<AnalysisArtifacts, ForecastError>;
    fn forecast(&self, job: ForecastJob) -> Result<FutureForecast, ForecastError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    InProcess,
    Subprocess,
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "in_process" | "in-process" | "inprocess" => Ok(RuntimeMode::InProcess),
            "subprocess" => Ok(RuntimeMode::Subprocess),
            other => Err(format!(
                "unknown runtime mode '{}', expected in_process or subprocess",
                other
            )),
        }
    }
}

pub fn build_runtime(mode: RuntimeMode, worker_path: PathBuf, grace: Duration) -> Arc<dyn ModelRuntime> {
    match mode {
        RuntimeMode::InProcess => Arc::new(InProcessRuntime),
        RuntimeMode::Subprocess => Arc::new(SubprocessRuntime::new(worker_path, grace)),
    }
}
