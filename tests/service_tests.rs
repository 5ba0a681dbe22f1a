use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use hybrid_forecast::api::{
    AnalysisRequest, ApiRequest, ForecastRequest, PreviewParams, ACTION_ANALYZE, ACTION_FORECAST,
    ACTION_HEALTH, ACTION_STATIONARITY, ACTION_TRAIN,
};
use hybrid_forecast::calendar::TradingCalendar;
use hybrid_forecast::data::PriceSource;
use hybrid_forecast::error::ForecastError;
use hybrid_forecast::linear::OrderSearch;
use hybrid_forecast::model::price::{PricePoint, PriceSeries};
use hybrid_forecast::pipeline::AnalysisSettings;
use hybrid_forecast::runtime::InProcessRuntime;
use hybrid_forecast::service::{ForecastService, JobLimits};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;

fn sample_series(n: usize) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(42);
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let dates = TradingCalendar::weekends_only().next_trading_days(start, n);
    let points = dates
        .into_iter()
        .enumerate()
        .map(|(t, date)| PricePoint {
            date,
            close: 250.0 + 0.05 * t as f64 + rng.gen_range(-2.0..2.0),
        })
        .collect();
    PriceSeries::new(points).unwrap()
}

fn service() -> ForecastService {
    service_with(sample_series(260), JobLimits::default())
}

fn service_with(series: PriceSeries, limits: JobLimits) -> ForecastService {
    let settings = AnalysisSettings {
        order_search: OrderSearch {
            max_p: 2,
            max_d: 1,
            max_q: 1,
        },
        ..AnalysisSettings::default()
    };
    ForecastService::new(
        settings,
        TradingCalendar::weekends_only(),
        PriceSource::Memory(series),
        Arc::new(InProcessRuntime),
        limits,
    )
}

fn quick_analysis() -> AnalysisRequest {
    AnalysisRequest {
        look_back: 20,
        lstm_units: vec![8],
        epochs: 3,
        batch_size: 32,
        ..AnalysisRequest::default()
    }
}

#[tokio::test]
async fn forecast_before_analysis_fails() {
    let svc = service();
    let err = svc.forecast_future(ForecastRequest::default()).await.unwrap_err();
    assert_eq!(err, ForecastError::NoAnalysisYet);
    assert_eq!(svc.make_predictions().unwrap_err(), ForecastError::NoAnalysisYet);
    assert_eq!(svc.analyze_stationarity().unwrap_err(), ForecastError::NoAnalysisYet);
}

#[tokio::test]
async fn health_reports_session_state() {
    let svc = service();
    let health = svc.health_check();
    assert_eq!(health.status, "online");
    assert_eq!(health.session, "empty");
    assert_eq!(health.runtime, "in_process");
    svc.run_full_analysis(quick_analysis()).await.unwrap();
    assert_eq!(svc.health_check().session, "ready");
}

#[tokio::test]
async fn preview_returns_aligned_columns() {
    let svc = service();
    let preview = svc
        .data_preview(PreviewParams {
            start_date: Some("2023-02-01".to_string()),
            end_date: Some("2023-03-01".to_string()),
        })
        .await
        .unwrap();
    assert!(!preview.dates.is_empty());
    assert_eq!(preview.dates.len(), preview.close.len());
    assert_eq!(preview.dates.len(), preview.avg_price.len());
    assert!(preview.dates.iter().all(|d| d.as_str() >= "2023-02-01" && d.as_str() <= "2023-03-01"));
}

#[tokio::test]
async fn default_forecast_is_served_from_cache() {
    let svc = service();
    let analysis = svc.run_full_analysis(quick_analysis()).await.unwrap();
    assert_eq!(analysis.comparison_table.len(), 3);
    assert_eq!(analysis.dates.len(), 260);

    let first = svc.forecast_future(ForecastRequest::default()).await.unwrap();
    let second = svc.forecast_future(ForecastRequest::default()).await.unwrap();
    assert!(first.cached && second.cached);
    assert_eq!(first.forecast, second.forecast);
    assert_eq!(Some(first.forecast.clone()), analysis.forecast);

    let recomputed = svc
        .forecast_future(ForecastRequest {
            days: 30,
            recalculate: true,
        })
        .await
        .unwrap();
    assert!(!recomputed.cached);
    assert_eq!(recomputed.forecast, first.forecast);
}

#[tokio::test]
async fn oversized_horizon_is_clamped() {
    let svc = service();
    svc.run_full_analysis(quick_analysis()).await.unwrap();
    let out = svc
        .forecast_future(ForecastRequest {
            days: 400,
            recalculate: false,
        })
        .await
        .unwrap();
    assert!(!out.cached);
    assert_eq!(out.forecast.len(), 365);
    assert_eq!(out.forecast.conf_int_upper.len(), 365);
}

#[tokio::test]
async fn default_forecast_is_computed_and_cached_when_analysis_skipped_it() {
    let svc = service();
    let mut req = quick_analysis();
    req.include_forecast = false;
    let analysis = svc.run_full_analysis(req).await.unwrap();
    assert!(analysis.forecast.is_none());

    let first = svc.forecast_future(ForecastRequest::default()).await.unwrap();
    assert!(!first.cached);
    let second = svc.forecast_future(ForecastRequest::default()).await.unwrap();
    assert!(second.cached);
    assert_eq!(first.forecast, second.forecast);
}

#[tokio::test]
async fn failed_analysis_keeps_previous_session() {
    let svc = service();
    let ok = svc.run_full_analysis(quick_analysis()).await.unwrap();

    let mut too_long = quick_analysis();
    too_long.look_back = 300;
    let err = svc.run_full_analysis(too_long).await.unwrap_err();
    assert!(matches!(err, ForecastError::InsufficientData(_)));

    let current = svc.cache().current().unwrap();
    assert_eq!(current.id, ok.session_id);
    assert!(svc.make_predictions().is_ok());
}

#[tokio::test]
async fn concurrent_analysis_is_rejected_as_busy() {
    let svc = service();
    let _permit = svc.cache().try_begin_job().unwrap();
    let err = svc.run_full_analysis(quick_analysis()).await.unwrap_err();
    assert_eq!(err, ForecastError::Busy);
    assert!(svc.cache().is_empty());
}

#[tokio::test]
async fn invalid_parameters_are_rejected_before_fitting() {
    let svc = service();
    let mut req = quick_analysis();
    req.lstm_units = vec![8, 8, 8];
    assert!(matches!(
        svc.run_full_analysis(req).await.unwrap_err(),
        ForecastError::InvalidParameter(_)
    ));

    let mut req = quick_analysis();
    req.timeout_secs = Some(0);
    assert!(matches!(
        svc.run_full_analysis(req).await.unwrap_err(),
        ForecastError::InvalidParameter(_)
    ));

    let mut req = quick_analysis();
    req.look_back = 1000;
    assert!(matches!(
        svc.run_full_analysis(req).await.unwrap_err(),
        ForecastError::InvalidParameter(_)
    ));
    assert!(svc.cache().is_empty());
}

#[tokio::test]
async fn inline_series_takes_precedence_over_source() {
    let svc = service();
    let inline = sample_series(180);
    let mut req = quick_analysis();
    req.dates = Some(inline.date_strings());
    req.close = Some(inline.closes());
    let out = svc.run_full_analysis(req).await.unwrap();
    assert_eq!(out.data_info.total_records, 180);
}

#[tokio::test]
async fn dispatch_routes_actions() {
    let svc = service();
    let health = svc.handle(ApiRequest::new(ACTION_HEALTH, json!({}))).await.unwrap();
    assert_eq!(health["status"], "online");

    let err = svc
        .handle(ApiRequest::new("deleteEverything", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ForecastError::UnknownAction(_)));

    let err = svc.handle(ApiRequest::default()).await.unwrap_err();
    assert!(matches!(err, ForecastError::UnknownAction(_)));

    let err = svc
        .handle(ApiRequest::new(ACTION_STATIONARITY, serde_json::Value::Null))
        .await
        .unwrap_err();
    assert_eq!(err, ForecastError::NoAnalysisYet);

    let train = svc.handle(ApiRequest::new(ACTION_TRAIN, json!({}))).await.unwrap();
    assert_eq!(train["success"], true);

    let analysis = svc
        .handle(ApiRequest::new(
            ACTION_ANALYZE,
            json!({"look_back": 20, "lstm_units": [8, 8], "epochs": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(analysis["success"], true);
    assert_eq!(analysis["comparison_table"].as_array().unwrap().len(), 3);

    let forecast = svc
        .handle(ApiRequest::new(ACTION_FORECAST, json!({"days": 5})))
        .await
        .unwrap();
    assert_eq!(forecast["forecast"]["hybrid"].as_array().unwrap().len(), 5);
    assert_eq!(forecast["cached"], false);
}

#[tokio::test]
async fn timed_out_analysis_leaves_session_empty() {
    let limits = JobLimits {
        job_timeout: Duration::from_millis(1),
        grace: Duration::ZERO,
    };
    let svc = service_with(sample_series(3000), limits);
    let err = svc.run_full_analysis(quick_analysis()).await.unwrap_err();
    assert!(matches!(err, ForecastError::DeadlineExceeded { .. }));
    assert!(svc.cache().is_empty());
    assert_eq!(svc.make_predictions().unwrap_err(), ForecastError::NoAnalysisYet);
}
