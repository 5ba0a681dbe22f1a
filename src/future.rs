use crate::calendar::TradingCalendar;
use crate::error::ForecastError;
use crate::model::prediction::FutureForecast;
use crate::model::price::format_date;
use crate::pipeline::FittedState;

pub const MIN_HORIZON: usize = 1;
pub const MAX_HORIZON: usize = 365;

/// Out-of-range horizons are clamped rather than rejected.
pub fn clamp_horizon(days: i64) -> usize {
    days.clamp(MIN_HORIZON as i64, MAX_HORIZON as i64) as usize
}

/// Hybrid forecast past the last observed date.
///
/// The linear interval is shifted by the residual correction; the corrector's own
/// uncertainty is not added to the band.
pub fn forecast_future(
    state: &FittedState,
    horizon: usize,
    calendar: &TradingCalendar,
    z: f64,
) -> Result<FutureForecast, ForecastError> {
    let horizon = horizon.clamp(MIN_HORIZON, MAX_HORIZON);
    let linear = state.linear.forecast(&state.closes, horizon, z)?;
    let correction = match &state.residual {
        Some(model) => model.rollout(&state.residual_history, horizon),
        None => vec![0.0; horizon],
    };
    let dates = calendar
        .next_trading_days(state.last_date, horizon)
        .into_iter()
        .map(format_date)
        .collect();

    let mut hybrid = Vec::with_capacity(horizon);
    let mut lower = Vec::with_capacity(horizon);
    let mut upper = Vec::with_capacity(horizon);
    for k in 0..horizon {
        let r = correction[k];
        hybrid.push(finite_or(linear.point[k] + r, linear.point[k]));
        lower.push(finite_or(linear.lower[k] + r, linear.point[k]));
        upper.push(finite_or(linear.upper[k] + r, linear.point[k]));
    }
    tracing::debug!(horizon, order = %state.linear.order, "Future forecast computed");
    Ok(FutureForecast {
        dates,
        hybrid,
        arima: linear.point,
        conf_int_lower: lower,
        conf_int_upper: upper,
    })
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else if fallback.is_finite() {
        fallback
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn horizon_is_clamped() {
        assert_eq!(clamp_horizon(0), 1);
        assert_eq!(clamp_horizon(-5), 1);
        assert_eq!(clamp_horizon(30), 30);
        assert_eq!(clamp_horizon(400), 365);
    }
}
