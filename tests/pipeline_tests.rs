use std::time::Duration;

use chrono::NaiveDate;
use hybrid_forecast::calendar::TradingCalendar;
use hybrid_forecast::deadline::Deadline;
use hybrid_forecast::error::ForecastError;
use hybrid_forecast::future::forecast_future;
use hybrid_forecast::linear::{ArimaOrder, OrderSearch};
use hybrid_forecast::model::prediction::PredictionSet;
use hybrid_forecast::model::price::{PricePoint, PriceSeries};
use hybrid_forecast::pipeline::{run_full_analysis, AnalysisParams, AnalysisSettings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn series_from(closes: &[f64]) -> PriceSeries {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let dates = TradingCalendar::weekends_only().next_trading_days(start, closes.len());
    let points = dates
        .into_iter()
        .zip(closes)
        .map(|(date, close)| PricePoint { date, close: *close })
        .collect();
    PriceSeries::new(points).unwrap()
}

fn trend_with_noise(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|t| 100.0 + 0.1 * t as f64 + rng.gen_range(-1.0..1.0))
        .collect()
}

fn fast_settings() -> AnalysisSettings {
    AnalysisSettings {
        order_search: OrderSearch {
            max_p: 2,
            max_d: 1,
            max_q: 2,
        },
        ..AnalysisSettings::default()
    }
}

fn params(look_back: usize, epochs: usize) -> AnalysisParams {
    AnalysisParams {
        look_back,
        lstm_units: [8, 8],
        epochs,
        batch_size: 32,
        include_forecast: true,
    }
}

fn assert_nulls_only_in_prefix(column: &[Option<f64>]) {
    let first = column.iter().position(Option::is_some).unwrap_or(column.len());
    assert!(column[first..].iter().all(Option::is_some));
}

fn assert_prediction_shape(p: &PredictionSet) {
    let n = p.dates.len();
    assert_eq!(p.actual.len(), n);
    assert_eq!(p.arima.len(), n);
    assert_eq!(p.lstm.len(), n);
    assert_eq!(p.hybrid.len(), n);
    assert_nulls_only_in_prefix(&p.arima);
    assert_nulls_only_in_prefix(&p.lstm);
    assert_nulls_only_in_prefix(&p.hybrid);
}

#[test]
fn trend_with_noise_runs_end_to_end() {
    let series = series_from(&trend_with_noise(500, 42));
    let out = run_full_analysis(
        &series,
        &params(30, 5),
        &fast_settings(),
        &TradingCalendar::weekends_only(),
        &Deadline::unbounded(),
    )
    .unwrap();

    assert_eq!(out.data_info.total_records, 500);
    assert_eq!(out.data_info.train_records, 400);
    assert_eq!(out.data_info.test_records, 100);

    assert_eq!(out.comparison_table.len(), 3);
    let ranks: Vec<usize> = out.comparison_table.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert!(["ARIMA", "LSTM", "Hybrid"].contains(&out.best_model.as_str()));
    assert!(out
        .comparison_table
        .iter()
        .all(|r| r.rmse.is_finite() && r.mae.is_finite() && r.mape.is_finite() && r.r2.is_finite()));

    let p = &out.predictions;
    assert_eq!(p.len(), 100);
    assert_prediction_shape(p);
    for i in 0..p.len() {
        if let (Some(a), Some(l), Some(h)) = (p.arima[i], p.lstm[i], p.hybrid[i]) {
            assert!((h - (a + l)).abs() < 1e-6, "index {}", i);
        }
    }

    let fc = out.forecast.as_ref().unwrap();
    assert_eq!(fc.len(), 30);
    assert_eq!(fc.hybrid.len(), 30);
    assert_eq!(fc.arima.len(), 30);
    for k in 0..30 {
        assert!(fc.conf_int_lower[k] <= fc.hybrid[k] + 1e-9);
        assert!(fc.hybrid[k] <= fc.conf_int_upper[k] + 1e-9);
    }
    assert!(fc.dates[0] > series.date_strings().last().unwrap().clone());

    assert_eq!(out.avg_price.len(), 500);
    assert_eq!(out.model_info.lstm_epochs_completed, Some(5));
    assert!(out.realism.future_hybrid.is_some());
    assert!(out.realism.test_hybrid.is_some());
}

#[test]
fn flat_series_completes_with_finite_metrics_and_stable_winner() {
    let series = series_from(&vec![100.0; 150]);
    let run = || {
        run_full_analysis(
            &series,
            &params(10, 2),
            &fast_settings(),
            &TradingCalendar::weekends_only(),
            &Deadline::unbounded(),
        )
        .unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first.best_model, second.best_model);
    for row in &first.comparison_table {
        assert!(row.mae.is_finite());
        assert!(row.rmse.is_finite());
        assert!(row.mape.is_finite());
        assert!(row.r2.is_finite());
    }
    assert_prediction_shape(&first.predictions);
    let fc = first.forecast.unwrap();
    assert!(fc.hybrid.iter().all(|v| v.is_finite()));
}

#[test]
fn future_forecast_is_reproducible_from_fitted_state() {
    let series = series_from(&trend_with_noise(300, 9));
    let cal = TradingCalendar::weekends_only();
    let settings = fast_settings();
    let out = run_full_analysis(&series, &params(20, 3), &settings, &cal, &Deadline::unbounded()).unwrap();
    let again = forecast_future(&out.fitted, 30, &cal, settings.confidence_z).unwrap();
    assert_eq!(out.forecast.unwrap(), again);
    let long = forecast_future(&out.fitted, 400, &cal, settings.confidence_z).unwrap();
    assert_eq!(long.len(), 365);
}

#[test]
fn forecast_can_be_skipped() {
    let series = series_from(&trend_with_noise(200, 4));
    let mut p = params(15, 2);
    p.include_forecast = false;
    let out = run_full_analysis(
        &series,
        &p,
        &fast_settings(),
        &TradingCalendar::weekends_only(),
        &Deadline::unbounded(),
    )
    .unwrap();
    assert!(out.forecast.is_none());
    assert!(out.realism.future_hybrid.is_none());
}

#[test]
fn invalid_parameters_fail_before_any_fit() {
    let series = series_from(&trend_with_noise(200, 4));
    let mut p = params(15, 2);
    p.epochs = 0;
    let err = run_full_analysis(
        &series,
        &p,
        &fast_settings(),
        &TradingCalendar::weekends_only(),
        &Deadline::unbounded(),
    )
    .unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
}

#[test]
fn short_series_is_insufficient_data() {
    let series = series_from(&trend_with_noise(50, 4));
    let err = run_full_analysis(
        &series,
        &params(60, 2),
        &fast_settings(),
        &TradingCalendar::weekends_only(),
        &Deadline::unbounded(),
    )
    .unwrap_err();
    assert!(matches!(err, ForecastError::InsufficientData(_)));
}

#[test]
fn expired_budget_degrades_both_models() {
    let series = series_from(&trend_with_noise(200, 11));
    let out = run_full_analysis(
        &series,
        &params(15, 3),
        &fast_settings(),
        &TradingCalendar::weekends_only(),
        &Deadline::after(Duration::ZERO),
    )
    .unwrap();

    let info = &out.model_info;
    assert_eq!(info.degraded.len(), 2);
    assert!(info.degraded[0].starts_with("arima:"));
    assert!(info.degraded[1].starts_with("lstm:"));
    assert!(info.arima_fallback);
    assert_eq!(info.arima_order, ArimaOrder { p: 0, d: 1, q: 0 });
    assert_eq!(info.lstm_epochs_completed, None);

    let p = &out.predictions;
    assert_prediction_shape(p);
    assert!(p.lstm.iter().all(Option::is_none));
    assert_eq!(p.hybrid, p.arima);

    let lstm_row = out.comparison_table.iter().find(|r| r.model == "LSTM").unwrap();
    assert_eq!(lstm_row.samples, 0);
    assert_eq!(lstm_row.rank, 3);
    assert_ne!(out.best_model, "LSTM");
}
