use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::protocol::{AnalyzeJob, ForecastJob, WorkerJob, WorkerReply};
use super::ModelRuntime;
use crate::error::ForecastError;
use crate::model::prediction::FutureForecast;
use crate::pipeline::AnalysisArtifacts;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs each job in a fresh `forecast-worker` process and kills it past the budget.
#[derive(Debug, Clone)]
pub struct SubprocessRuntime {
    program: PathBuf,
    grace: Duration,
}

impl SubprocessRuntime {
    pub fn new(program: impl Into<PathBuf>, grace: Duration) -> Self {
        Self {
            program: program.into(),
            grace,
        }
    }

    fn call(&self, job: &WorkerJob) -> Result<WorkerReply, ForecastError> {
        let payload = serde_json::to_vec(job)
            .map_err(|e| ForecastError::Runtime(format!("failed to encode worker job: {}", e)))?;
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                ForecastError::Runtime(format!(
                    "failed to start worker {}: {}",
                    self.program.display(),
                    e
                ))
            })?;
        let pid = child.id();
        tracing::debug!(pid, program = %self.program.display(), "Worker started");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ForecastError::Runtime("worker stdin unavailable".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ForecastError::Runtime("worker stdout unavailable".to_string()))?;

        // Both pipes are drained on their own threads so a large reply cannot block the worker.
        let writer = thread::spawn(move || stdin.write_all(&payload));
        let reader = thread::spawn(move || {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).map(|_| buf)
        });

        let limit = job.budget().map(|b| b + self.grace);
        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(limit) = limit {
                        if started.elapsed() >= limit {
                            let _ = child.kill();
                            let _ = child.wait();
                            tracing::warn!(pid, "Worker killed at deadline");
                            return Err(ForecastError::DeadlineExceeded {
                                budget_secs: limit.as_secs(),
                            });
                        }
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(ForecastError::Runtime(format!("failed to poll worker: {}", e)));
                }
            }
        };

        if let Ok(Err(e)) = writer.join() {
            tracing::debug!(pid, error = %e, "Worker closed stdin early");
        }
        let out = reader
            .join()
            .map_err(|_| ForecastError::Runtime("worker reader thread panicked".to_string()))?
            .map_err(|e| ForecastError::Runtime(format!("failed to read worker reply: {}", e)))?;

        tracing::debug!(
            pid,
            status = %status,
            bytes = out.len(),
            seconds = started.elapsed().as_secs_f64(),
            "Worker finished"
        );
        serde_json::from_slice::<WorkerReply>(&out).map_err(|e| {
            ForecastError::Runtime(format!(
                "worker exited with {} and an unreadable reply: {}",
                status, e
            ))
        })
    }
}

impl ModelRuntime for SubprocessRuntime {
    fn name(&self) -> &'static str {
        "subprocess"
    }

    fn analyze(&self, job: AnalyzeJob) -> Result<AnalysisArtifacts, ForecastError> {
        match self.call(&WorkerJob::Analyze(job))? {
            WorkerReply::Analysis { artifacts } => Ok(*artifacts),
            WorkerReply::Failed { error } => Err(error),
            WorkerReply::Forecast { .. } => Err(ForecastError::Runtime(
                "worker answered an analysis job with a forecast".to_string(),
            )),
        }
    }

    fn forecast(&self, job: ForecastJob) -> Result<FutureForecast, ForecastError> {
        match self.call(&WorkerJob::Forecast(job))? {
            WorkerReply::Forecast { forecast } => Ok(forecast),
            WorkerReply::Failed { error } => Err(error),
            WorkerReply::Analysis { .. } => Err(ForecastError::Runtime(
                "worker answered a forecast job with an analysis".to_string(),
            )),
        }
    }
}
