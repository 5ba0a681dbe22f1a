//! Unit-root (ADF) and level-stationarity (KPSS) tests on the close series.
//!
//! The two tests have opposite nulls, so they are combined through
//! [`crate::model::report::StationarityType::classify`] rather than averaged.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::model::report::{StationarityReport, StationarityTest};
use crate::stats::{mean, ols, variance};

pub const SIGNIFICANCE: f64 = 0.05;

// MacKinnon (1994) response surface, constant-only regression, one variable.
const ADF_TAU_MAX: f64 = 2.74;
const ADF_TAU_MIN: f64 = -18.83;
const ADF_TAU_STAR: f64 = -1.61;
const ADF_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const ADF_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

// Kwiatkowski et al. (1992), level stationarity.
const KPSS_CRIT: [f64; 4] = [0.347, 0.463, 0.574, 0.739];
const KPSS_PVALS: [f64; 4] = [0.10, 0.05, 0.025, 0.01];

const MIN_OBSERVATIONS: usize = 8;

pub fn analyze(values: &[f64]) -> StationarityReport {
    let adf = adf_test(values);
    let kpss = kpss_test(values);
    let report = StationarityReport::from_tests(adf, kpss);
    tracing::debug!(
        adf_p = report.adf.p_value,
        kpss_p = report.kpss.p_value,
        label = report.stationarity_type.as_str(),
        "Stationarity tests finished"
    );
    report
}

pub fn adf_test(values: &[f64]) -> StationarityTest {
    match adf_statistic(values) {
        Some((stat, lag)) => {
            let p_value = mackinnon_p(stat);
            let is_stationary = p_value < SIGNIFICANCE;
            StationarityTest {
                test_statistic: stat,
                p_value,
                used_lag: lag,
                is_stationary,
                interpretation: adf_interpretation(is_stationary),
            }
        }
        None => StationarityTest {
            test_statistic: 0.0,
            p_value: 1.0,
            used_lag: 0,
            is_stationary: false,
            interpretation: adf_interpretation(false),
        },
    }
}

pub fn kpss_test(values: &[f64]) -> StationarityTest {
    match kpss_statistic(values) {
        Some((stat, lags)) => {
            let p_value = kpss_p(stat);
            let is_stationary = p_value >= SIGNIFICANCE;
            StationarityTest {
                test_statistic: stat,
                p_value,
                used_lag: lags,
                is_stationary,
                interpretation: kpss_interpretation(is_stationary),
            }
        }
        None => StationarityTest {
            test_statistic: 0.0,
            p_value: KPSS_PVALS[0],
            used_lag: 0,
            is_stationary: true,
            interpretation: kpss_interpretation(true),
        },
    }
}

fn adf_interpretation(stationary: bool) -> String {
    if stationary {
        "unit root rejected at 5%: series looks stationary".to_string()
    } else {
        "unit root not rejected at 5%: series looks non-stationary".to_string()
    }
}

fn kpss_interpretation(stationary: bool) -> String {
    if stationary {
        "level stationarity not rejected at 5%".to_string()
    } else {
        "level stationarity rejected at 5%: series looks non-stationary".to_string()
    }
}

/// Regression `Δy_t = α + γ y_{t-1} + Σ δ_i Δy_{t-i}` with the lag picked by AIC.
/// Returns the t-ratio of `γ` and the lag, or `None` for degenerate input.
fn adf_statistic(values: &[f64]) -> Option<(f64, usize)> {
    let n = values.len();
    if n < MIN_OBSERVATIONS || values.iter().any(|v| !v.is_finite()) || variance(values) <= 1e-18 {
        return None;
    }
    let dy: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();

    let mut max_lag = (12.0 * (n as f64 / 100.0).powf(0.25)).floor() as usize;
    max_lag = max_lag.min((n / 2).saturating_sub(2));
    // Keep a few residual degrees of freedom at the largest lag.
    while max_lag > 0 && dy.len() - max_lag < max_lag + 2 + 3 {
        max_lag -= 1;
    }
    if dy.len() - max_lag < 2 + 3 {
        return None;
    }

    // Common sample so the AIC values are comparable across lags.
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let Some(fit) = adf_regression(values, &dy, lag, max_lag) else {
            continue;
        };
        let rows = fit.residuals.len() as f64;
        let k = fit.beta.len() as f64;
        let aic = rows * (fit.sse.max(1e-300) / rows).ln() + 2.0 * k;
        if best.map_or(true, |(b, _)| aic < b) {
            best = Some((aic, lag));
        }
    }
    let (_, lag) = best?;

    let fit = adf_regression(values, &dy, lag, lag)?;
    let se = fit.std_error(1);
    let stat = fit.beta[1] / se;
    if !stat.is_finite() {
        return None;
    }
    Some((stat, lag))
}

fn adf_regression(
    values: &[f64],
    dy: &[f64],
    lag: usize,
    start: usize,
) -> Option<crate::stats::OlsFit> {
    let rows = dy.len().checked_sub(start)?;
    let cols = 2 + lag;
    if rows <= cols {
        return None;
    }
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        let t = start + r;
        match c {
            0 => 1.0,
            1 => values[t],
            i => dy[t - (i - 1)],
        }
    });
    let y = DVector::from_iterator(rows, dy[start..].iter().copied());
    ols(&x, &y).ok()
}

/// Approximate p-value of the ADF statistic from the response surface.
pub fn mackinnon_p(stat: f64) -> f64 {
    if stat > ADF_TAU_MAX {
        return 1.0;
    }
    if stat < ADF_TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if stat <= ADF_TAU_STAR {
        &ADF_SMALL_P
    } else {
        &ADF_LARGE_P
    };
    let z = coefs
        .iter()
        .rev()
        .fold(0.0, |acc, c| acc * stat + c);
    match Normal::new(0.0, 1.0) {
        Ok(normal) => normal.cdf(z),
        Err(_) => 1.0,
    }
}

fn kpss_statistic(values: &[f64]) -> Option<(f64, usize)> {
    let n = values.len();
    if n < MIN_OBSERVATIONS || values.iter().any(|v| !v.is_finite()) || variance(values) <= 1e-18 {
        return None;
    }
    let m = mean(values);
    let resid: Vec<f64> = values.iter().map(|v| v - m).collect();

    let lags = ((12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize).min(n - 1);

    let mut partial = 0.0;
    let mut eta = 0.0;
    for r in &resid {
        partial += r;
        eta += partial * partial;
    }
    eta /= (n * n) as f64;

    let mut s2: f64 = resid.iter().map(|r| r * r).sum();
    for lag in 1..=lags {
        let weight = 1.0 - lag as f64 / (lags + 1) as f64;
        let gamma: f64 = resid[lag..]
            .iter()
            .zip(resid[..n - lag].iter())
            .map(|(a, b)| a * b)
            .sum();
        s2 += 2.0 * weight * gamma;
    }
    s2 /= n as f64;
    if !(s2 > 1e-300) {
        return None;
    }
    let stat = eta / s2;
    stat.is_finite().then_some((stat, lags))
}

/// Linear interpolation in the KPSS table, clipped to `[0.01, 0.10]`.
pub fn kpss_p(stat: f64) -> f64 {
    if stat <= KPSS_CRIT[0] {
        return KPSS_PVALS[0];
    }
    if stat >= KPSS_CRIT[KPSS_CRIT.len() - 1] {
        return KPSS_PVALS[KPSS_PVALS.len() - 1];
    }
    for i in 1..KPSS_CRIT.len() {
        if stat <= KPSS_CRIT[i] {
            let w = (stat - KPSS_CRIT[i - 1]) / (KPSS_CRIT[i] - KPSS_CRIT[i - 1]);
            return KPSS_PVALS[i - 1] + w * (KPSS_PVALS[i] - KPSS_PVALS[i - 1]);
        }
    }
    KPSS_PVALS[KPSS_PVALS.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mackinnon_is_monotone_and_bounded() {
        assert!((mackinnon_p(3.0) - 1.0).abs() < f64::EPSILON);
        assert!(mackinnon_p(-20.0).abs() < f64::EPSILON);
        assert!(mackinnon_p(-4.0) < mackinnon_p(-2.0));
        assert!(mackinnon_p(-2.0) < mackinnon_p(0.0));
    }

    #[test]
    fn mackinnon_matches_known_critical_value() {
        // The 5% critical value for the constant-only case is about -2.86.
        let p = mackinnon_p(-2.86);
        assert!((p - 0.05).abs() < 0.01, "p={}", p);
    }

    #[test]
    fn kpss_table_interpolation() {
        assert!((kpss_p(0.463) - 0.05).abs() < 1e-12);
        assert!((kpss_p(0.1) - 0.10).abs() < 1e-12);
        assert!((kpss_p(5.0) - 0.01).abs() < 1e-12);
        let mid = kpss_p((0.347 + 0.463) / 2.0);
        assert!((mid - 0.075).abs() < 1e-12);
    }

    #[test]
    fn flat_series_is_degenerate_not_an_error() {
        let flat = vec![100.0; 60];
        let adf = adf_test(&flat);
        let kpss = kpss_test(&flat);
        assert!(adf.test_statistic.abs() < f64::EPSILON);
        assert!((adf.p_value - 1.0).abs() < f64::EPSILON);
        assert!((kpss.p_value - 0.10).abs() < f64::EPSILON);
    }
}
