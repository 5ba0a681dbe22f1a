use hybrid_forecast::model::report::{StationarityReport, StationarityTest, StationarityType};
use hybrid_forecast::stationarity::{adf_test, analyze, kpss_p, kpss_test, mackinnon_p};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn test_result(p_value: f64, is_stationary: bool) -> StationarityTest {
    StationarityTest {
        test_statistic: 0.0,
        p_value,
        used_lag: 0,
        is_stationary,
        interpretation: String::new(),
    }
}

#[test]
fn adf_and_kpss_both_rejecting_is_labelled_as_disagreement() {
    // ADF p=0.01 says stationary, KPSS p=0.01 says non-stationary.
    let report = StationarityReport::from_tests(test_result(0.01, true), test_result(0.01, false));
    assert_eq!(report.stationarity_type, StationarityType::DifferenceStationary);
    assert!(!report.tests_agree);
}

#[test]
fn classification_table() {
    assert_eq!(StationarityType::classify(true, true), StationarityType::Stationary);
    assert_eq!(StationarityType::classify(false, false), StationarityType::NonStationary);
    assert_eq!(StationarityType::classify(false, true), StationarityType::TrendStationary);
    assert_eq!(
        StationarityType::classify(true, false).as_str(),
        "difference-stationary"
    );
}

#[test]
fn label_serializes_in_kebab_case() {
    let json = serde_json::to_string(&StationarityType::NonStationary).unwrap();
    assert_eq!(json, "\"non-stationary\"");
}

#[test]
fn adf_rejects_unit_root_for_white_noise() {
    let mut rng = StdRng::seed_from_u64(7);
    let noise: Vec<f64> = (0..500).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let adf = adf_test(&noise);
    assert!(adf.test_statistic < -3.5, "stat {}", adf.test_statistic);
    assert!(adf.is_stationary);
    assert!(adf.p_value < 0.05);
}

#[test]
fn kpss_rejects_level_stationarity_for_a_trend() {
    let mut rng = StdRng::seed_from_u64(11);
    let trend: Vec<f64> = (0..500)
        .map(|t| 100.0 + 0.5 * t as f64 + rng.gen_range(-1.0..1.0))
        .collect();
    let kpss = kpss_test(&trend);
    assert!(!kpss.is_stationary);
    assert!((kpss.p_value - 0.01).abs() < f64::EPSILON);
}

#[test]
fn p_values_stay_in_unit_interval_and_are_monotone() {
    let mut last = 0.0;
    for i in 0..40 {
        let stat = -8.0 + i as f64 * 0.25;
        let p = mackinnon_p(stat);
        assert!((0.0..=1.0).contains(&p));
        assert!(p + 1e-12 >= last, "p-value fell at stat {}", stat);
        last = p;
    }
    assert!((kpss_p(0.1) - 0.10).abs() < f64::EPSILON);
    assert!((kpss_p(5.0) - 0.01).abs() < f64::EPSILON);
}

#[test]
fn flat_series_produces_finite_report() {
    let flat = vec![250.0; 120];
    let report = analyze(&flat);
    assert!(report.adf.test_statistic.is_finite());
    assert!(report.adf.p_value.is_finite());
    assert!(report.kpss.p_value.is_finite());
    assert!(!report.adf.is_stationary);
}
