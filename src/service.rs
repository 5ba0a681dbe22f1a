use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::api::{
    self, AnalysisRequest, AnalysisResponse, ApiRequest, ForecastRequest, ForecastResponse,
    HealthResponse, MessageResponse, PredictionsResponse, PreviewParams, PreviewResponse,
    StationarityResponse,
};
use crate::calendar::TradingCalendar;
use crate::data::PriceSource;
use crate::error::ForecastError;
use crate::future::clamp_horizon;
use crate::model::prediction::FutureForecast;
use crate::pipeline::{AnalysisArtifacts, AnalysisSettings};
use crate::prep::{self, PREVIEW_AVG_WINDOW};
use crate::runtime::{AnalyzeJob, ForecastJob, ModelRuntime};
use crate::session::{Session, SessionCache};

/// Time limits applied around each runtime call.
#[derive(Debug, Clone, Copy)]
pub struct JobLimits {
    /// Budget handed to the pipeline; requests may lower it, never raise it.
    pub job_timeout: Duration,
    /// Extra wall time past the budget before the caller gives up.
    pub grace: Duration,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(600),
            grace: Duration::from_secs(5),
        }
    }
}

/// Action handlers behind `POST /api/ml`. Owns the session cache.
pub struct ForecastService {
    settings: AnalysisSettings,
    calendar: TradingCalendar,
    source: PriceSource,
    runtime: Arc<dyn ModelRuntime>,
    cache: SessionCache,
    limits: JobLimits,
}

impl ForecastService {
    pub fn new(
        settings: AnalysisSettings,
        calendar: TradingCalendar,
        source: PriceSource,
        runtime: Arc<dyn ModelRuntime>,
        limits: JobLimits,
    ) -> Self {
        Self {
            settings,
            calendar,
            source,
            runtime,
            cache: SessionCache::new(),
            limits,
        }
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    pub fn health_check(&self) -> HealthResponse {
        HealthResponse {
            success: true,
            status: "online",
            session: if self.cache.is_empty() { "empty" } else { "ready" },
            runtime: self.runtime.name(),
            source: self.source.name(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub async fn data_preview(&self, params: PreviewParams) -> Result<PreviewResponse, ForecastError> {
        let (start, end) = params.date_range()?;
        let series = self.source.fetch(start, end).await?;
        let close = series.closes();
        Ok(PreviewResponse {
            success: true,
            dates: series.date_strings(),
            avg_price: prep::rolling_average(&close, PREVIEW_AVG_WINDOW),
            close,
        })
    }

    pub async fn run_full_analysis(
        &self,
        request: AnalysisRequest,
    ) -> Result<AnalysisResponse, ForecastError> {
        let params = request.analysis_params()?;
        params.validate(&self.settings)?;
        let (start, end) = request.date_range()?;
        let budget = self.budget_for(request.timeout_secs)?;

        let permit = self.cache.try_begin_job()?;
        let started = Instant::now();
        let series = match request.inline_series() {
            Some(series) => series?.between(start, end)?,
            None => self.source.fetch(start, end).await?,
        };
        tracing::info!(
            points = series.len(),
            fingerprint = %series.fingerprint(),
            budget_secs = budget.as_secs(),
            runtime = self.runtime.name(),
            "Analysis job accepted"
        );

        let job = AnalyzeJob {
            series,
            params,
            settings: self.settings.clone(),
            calendar: self.calendar.clone(),
            budget_ms: Some(budget.as_millis() as u64),
        };
        let runtime = self.runtime.clone();
        let artifacts = self
            .run_blocking(budget, move || {
                // Released when the computation really ends, even after a timeout.
                let _permit = permit;
                runtime.analyze(job)
            })
            .await?;

        let session = self.cache.publish(artifacts)?;
        tracing::info!(
            session_id = %session.id,
            best_model = %session.artifacts.best_model,
            seconds = started.elapsed().as_secs_f64(),
            "Analysis job finished"
        );
        Ok(analysis_response(&session))
    }

    pub async fn forecast_future(
        &self,
        request: ForecastRequest,
    ) -> Result<ForecastResponse, ForecastError> {
        let session = self.cache.current()?;
        let days = clamp_horizon(request.days);
        let is_default = days == self.settings.default_horizon;

        if is_default && !request.recalculate {
            if let Some(forecast) = session.default_forecast()? {
                tracing::debug!(session_id = %session.id, days, "Forecast cache hit");
                return Ok(ForecastResponse {
                    success: true,
                    forecast,
                    cached: true,
                });
            }
        }

        let budget = self.limits.job_timeout;
        let job = ForecastJob {
            fitted: session.artifacts.fitted.clone(),
            horizon: days,
            calendar: self.calendar.clone(),
            confidence_z: self.settings.confidence_z,
            budget_ms: Some(budget.as_millis() as u64),
        };
        let runtime = self.runtime.clone();
        let forecast: FutureForecast = self
            .run_blocking(budget, move || runtime.forecast(job))
            .await?;

        if is_default {
            let stored = self
                .cache
                .store_default_forecast(session.id, forecast.clone())?;
            if !stored {
                tracing::debug!(session_id = %session.id, "Session replaced, forecast not cached");
            }
        }
        tracing::info!(session_id = %session.id, days, "Forecast computed");
        Ok(ForecastResponse {
            success: true,
            forecast,
            cached: false,
        })
    }

    pub fn make_predictions(&self) -> Result<PredictionsResponse, ForecastError> {
        let session = self.cache.current()?;
        Ok(PredictionsResponse {
            success: true,
            predictions: session.artifacts.predictions.clone(),
        })
    }

    pub fn analyze_stationarity(&self) -> Result<StationarityResponse, ForecastError> {
        let session = self.cache.current()?;
        Ok(StationarityResponse {
            success: true,
            stationarity: session.artifacts.stationarity.clone(),
        })
    }

    pub fn train_models(&self) -> MessageResponse {
        MessageResponse {
            success: true,
            message: "Models are trained by runFullAnalysis; call it to refit.".to_string(),
        }
    }

    /// Dispatches one `{action, params}` call.
    pub async fn handle(&self, request: ApiRequest) -> Result<serde_json::Value, ForecastError> {
        let action = request
            .action
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ForecastError::UnknownAction("missing action".to_string()))?;
        let started = Instant::now();
        let result = match action {
            api::ACTION_HEALTH => to_json(self.health_check()),
            api::ACTION_PREVIEW => to_json(self.data_preview(request.params()?).await?),
            api::ACTION_ANALYZE => to_json(self.run_full_analysis(request.params()?).await?),
            api::ACTION_FORECAST => to_json(self.forecast_future(request.params()?).await?),
            api::ACTION_PREDICTIONS => to_json(self.make_predictions()?),
            api::ACTION_STATIONARITY => to_json(self.analyze_stationarity()?),
            api::ACTION_TRAIN => to_json(self.train_models()),
            other => Err(ForecastError::UnknownAction(other.to_string())),
        };
        tracing::debug!(
            action,
            ok = result.is_ok(),
            ms = started.elapsed().as_millis() as u64,
            "Action handled"
        );
        result
    }

    fn budget_for(&self, requested: Option<u64>) -> Result<Duration, ForecastError> {
        match requested {
            Some(0) => Err(ForecastError::InvalidParameter(
                "timeout_secs must be positive".to_string(),
            )),
            Some(secs) => Ok(Duration::from_secs(secs).min(self.limits.job_timeout)),
            None => Ok(self.limits.job_timeout),
        }
    }

    async fn run_blocking<T, F>(&self, budget: Duration, work: F) -> Result<T, ForecastError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ForecastError> + Send + 'static,
    {
        let handle = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(budget + self.limits.grace, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(ForecastError::Runtime(format!("model job aborted: {}", join))),
            Err(_) => {
                tracing::warn!(budget_secs = budget.as_secs(), "Model job timed out");
                Err(ForecastError::DeadlineExceeded {
                    budget_secs: budget.as_secs(),
                })
            }
        }
    }
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, ForecastError> {
    serde_json::to_value(value)
        .map_err(|e| ForecastError::Runtime(format!("failed to encode response: {}", e)))
}

fn analysis_response(session: &Session) -> AnalysisResponse {
    let a: &AnalysisArtifacts = &session.artifacts;
    AnalysisResponse {
        success: true,
        session_id: session.id,
        data_info: a.data_info.clone(),
        comparison_table: a.comparison_table.clone(),
        best_model: a.best_model.clone(),
        predictions: a.predictions.clone(),
        stationarity: a.stationarity.clone(),
        forecast: a.forecast.clone(),
        dates: a.series.date_strings(),
        close: a.series.closes(),
        avg_price: a.avg_price.clone(),
        model_info: a.model_info.clone(),
        realism_metrics: a.realism.clone(),
    }
}
