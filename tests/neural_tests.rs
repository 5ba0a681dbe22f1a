use std::time::Duration;

use hybrid_forecast::deadline::Deadline;
use hybrid_forecast::error::ForecastError;
use hybrid_forecast::neural::scaler::MinMaxScaler;
use hybrid_forecast::neural::{CorrectorConfig, FittedResidualModel};

fn small_config() -> CorrectorConfig {
    CorrectorConfig {
        look_back: 8,
        units: [6, 6],
        epochs: 4,
        batch_size: 16,
        learning_rate: 0.01,
        dropout: 0.2,
        clip_norm: 5.0,
        seed: 42,
    }
}

fn wave(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * 0.3).sin() * 2.0).collect()
}

#[test]
fn scaler_maps_training_range_to_unit_interval() {
    let scaler = MinMaxScaler::fit(&[-2.0, 0.0, 6.0]);
    assert!(scaler.transform(-2.0).abs() < f64::EPSILON);
    assert!((scaler.transform(6.0) - 1.0).abs() < f64::EPSILON);
    assert!((scaler.inverse(scaler.transform(1.5)) - 1.5).abs() < 1e-12);
}

#[test]
fn scaler_on_constant_input_has_unit_span() {
    let scaler = MinMaxScaler::fit(&[3.0, 3.0, 3.0]);
    assert!(scaler.transform(3.0).abs() < f64::EPSILON);
    assert!((scaler.transform(4.0) - 1.0).abs() < f64::EPSILON);
}

#[test]
fn corrector_fits_and_reports_epochs() {
    let model = FittedResidualModel::fit(&wave(120), &small_config(), &Deadline::unbounded()).unwrap();
    assert_eq!(model.report.epochs_requested, 4);
    assert_eq!(model.report.epochs_completed, 4);
    assert_eq!(model.report.loss_history.len(), 4);
    assert!(model.report.final_loss.is_finite());
    assert!(!model.report.stopped_at_deadline);
}

#[test]
fn training_is_deterministic_for_a_seed() {
    let residuals = wave(100);
    let a = FittedResidualModel::fit(&residuals, &small_config(), &Deadline::unbounded()).unwrap();
    let b = FittedResidualModel::fit(&residuals, &small_config(), &Deadline::unbounded()).unwrap();
    assert_eq!(a.report.loss_history, b.report.loss_history);
    assert_eq!(a.predict_next(&residuals), b.predict_next(&residuals));
}

#[test]
fn aligned_predictions_cover_every_observation() {
    let residuals = wave(130);
    let (train, test) = residuals.split_at(100);
    let model = FittedResidualModel::fit(train, &small_config(), &Deadline::unbounded()).unwrap();
    let aligned = model.predict_aligned(train, test);
    assert_eq!(aligned.len(), test.len());
    assert!(aligned.iter().all(|p| p.map_or(false, f64::is_finite)));
}

#[test]
fn aligned_predictions_are_null_until_window_fills() {
    let residuals = wave(100);
    let model = FittedResidualModel::fit(&residuals, &small_config(), &Deadline::unbounded()).unwrap();
    let aligned = model.predict_aligned(&[], &residuals[..12]);
    assert!(aligned[..8].iter().all(Option::is_none));
    assert!(aligned[8..].iter().all(Option::is_some));
}

#[test]
fn rollout_has_requested_length() {
    let residuals = wave(100);
    let model = FittedResidualModel::fit(&residuals, &small_config(), &Deadline::unbounded()).unwrap();
    let path = model.rollout(&residuals, 30);
    assert_eq!(path.len(), 30);
    assert!(path.iter().all(|v| v.is_finite()));
    assert_eq!(model.rollout(&residuals[..3], 5), vec![0.0; 5]);
}

#[test]
fn too_few_residuals_is_a_training_error() {
    let err = FittedResidualModel::fit(&wave(8), &small_config(), &Deadline::unbounded()).unwrap_err();
    assert!(matches!(err, ForecastError::Training(_)));
}

#[test]
fn expired_deadline_before_first_epoch_is_a_training_error() {
    let err = FittedResidualModel::fit(&wave(60), &small_config(), &Deadline::after(Duration::ZERO))
        .unwrap_err();
    assert!(matches!(err, ForecastError::Training(_)));
}
