use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::ForecastError;
use crate::model::prediction::FutureForecast;
use crate::pipeline::AnalysisArtifacts;

/// Result of the last successful analysis.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub artifacts: AnalysisArtifacts,
    default_forecast: RwLock<Option<FutureForecast>>,
}

impl Session {
    pub fn new(artifacts: AnalysisArtifacts) -> Self {
        let default_forecast = RwLock::new(artifacts.forecast.clone());
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            artifacts,
            default_forecast,
        }
    }

    pub fn default_forecast(&self) -> Result<Option<FutureForecast>, ForecastError> {
        let guard = self
            .default_forecast
            .read()
            .map_err(|_| ForecastError::Runtime("session forecast lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn set_default_forecast(&self, forecast: FutureForecast) -> Result<(), ForecastError> {
        let mut guard = self
            .default_forecast
            .write()
            .map_err(|_| ForecastError::Runtime("session forecast lock poisoned".to_string()))?;
        *guard = Some(forecast);
        Ok(())
    }
}

/// Permit for the single heavy job. Dropping it lets the next job in.
pub type JobPermit = OwnedMutexGuard<()>;

/// Holds at most one published session and gates heavy jobs to one at a time.
#[derive(Debug, Default)]
pub struct SessionCache {
    slot: RwLock<Option<Arc<Session>>>,
    gate: Arc<Mutex<()>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Result<Arc<Session>, ForecastError> {
        self.peek()?.ok_or(ForecastError::NoAnalysisYet)
    }

    pub fn peek(&self) -> Result<Option<Arc<Session>>, ForecastError> {
        let guard = self
            .slot
            .read()
            .map_err(|_| ForecastError::Runtime("session slot lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.peek(), Ok(None))
    }

    /// Replaces the published session in one step; readers see the old or the new one.
    pub fn publish(&self, artifacts: AnalysisArtifacts) -> Result<Arc<Session>, ForecastError> {
        let session = Arc::new(Session::new(artifacts));
        let mut guard = self
            .slot
            .write()
            .map_err(|_| ForecastError::Runtime("session slot lock poisoned".to_string()))?;
        *guard = Some(session.clone());
        tracing::info!(session_id = %session.id, "Session published");
        Ok(session)
    }

    pub fn try_begin_job(&self) -> Result<JobPermit, ForecastError> {
        self.gate.clone().try_lock_owned().map_err(|_| ForecastError::Busy)
    }

    /// Writes a recomputed default forecast back, unless a newer session replaced `session_id`.
    pub fn store_default_forecast(
        &self,
        session_id: Uuid,
        forecast: FutureForecast,
    ) -> Result<bool, ForecastError> {
        match self.peek()? {
            Some(session) if session.id == session_id => {
                session.set_default_forecast(forecast)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
