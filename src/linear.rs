//! ARIMA-class linear forecaster.
//!
//! Candidates are estimated by Hannan–Rissanen on the differenced series and then
//! re-expressed on the level scale, `y_t = c + Σ a_i y_{t-i} + Σ θ_j e_{t-j} + e_t`,
//! where `a` are the coefficients of `φ(B)(1-B)^d`. Residuals, AIC, one-step
//! predictions and forecasts all run through that single recursion.

use std::fmt;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::ForecastError;
use crate::stats::{difference, mean, ols};

const MIN_FIT_OBSERVATIONS: usize = 10;
const STABILITY_LIMIT: f64 = 1.0 - 1e-8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    pub fn complexity(&self) -> usize {
        self.p + self.d + self.q
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

/// Inclusive grid bounds for the order search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSearch {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for OrderSearch {
    fn default() -> Self {
        Self {
            max_p: 5,
            max_d: 2,
            max_q: 5,
        }
    }
}

impl OrderSearch {
    /// Candidates ordered by complexity so ties and early stops keep the simpler model.
    pub fn candidates(&self) -> Vec<ArimaOrder> {
        let mut out = Vec::new();
        for p in 0..=self.max_p {
            for d in 0..=self.max_d {
                for q in 0..=self.max_q {
                    out.push(ArimaOrder::new(p, d, q));
                }
            }
        }
        out.sort_by_key(|o| (o.complexity(), o.d, o.p, o.q));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub order: ArimaOrder,
    pub constant: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// Coefficients of `φ(B)(1-B)^d` moved to the right-hand side, length `p + d`.
    pub level_ar: Vec<f64>,
    pub sigma2: f64,
    pub aic: f64,
    pub n_obs: usize,
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearForecast {
    pub point: Vec<f64>,
    pub std_error: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl LinearModel {
    pub fn fit(values: &[f64], order: ArimaOrder) -> Result<Self, ForecastError> {
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::ModelFit("series has non-finite values".to_string()));
        }
        if values.len() < order.complexity() + MIN_FIT_OBSERVATIONS {
            return Err(ForecastError::ModelFit(format!(
                "ARIMA{} needs at least {} observations, got {}",
                order,
                order.complexity() + MIN_FIT_OBSERVATIONS,
                values.len()
            )));
        }
        let w = difference(values, order.d);
        let (constant, ar, ma) = hannan_rissanen(&w, order.p, order.q)?;

        if !is_stable(&ar) {
            return Err(ForecastError::ModelFit(format!(
                "ARIMA{} AR part is not stationary",
                order
            )));
        }
        let ma_companion: Vec<f64> = ma.iter().map(|t| -t).collect();
        if !is_stable(&ma_companion) {
            return Err(ForecastError::ModelFit(format!(
                "ARIMA{} MA part is not invertible",
                order
            )));
        }

        let mut model = Self {
            order,
            constant,
            level_ar: level_coefficients(&ar, order.d),
            ar,
            ma,
            sigma2: 0.0,
            aic: 0.0,
            n_obs: values.len(),
            fallback: false,
        };
        model.score(values)?;
        Ok(model)
    }

    /// Random walk `(0,1,0)` without drift, used when the search yields nothing.
    pub fn fit_naive(values: &[f64]) -> Result<Self, ForecastError> {
        if values.len() < 2 {
            return Err(ForecastError::InsufficientData(
                "naive model needs at least two observations".to_string(),
            ));
        }
        let mut model = Self {
            order: ArimaOrder::new(0, 1, 0),
            constant: 0.0,
            ar: Vec::new(),
            ma: Vec::new(),
            level_ar: vec![1.0],
            sigma2: 0.0,
            aic: 0.0,
            n_obs: values.len(),
            fallback: true,
        };
        model.score(values)?;
        Ok(model)
    }

    fn score(&mut self, values: &[f64]) -> Result<(), ForecastError> {
        let (_, resid) = self.filter(values);
        let start = self.start();
        let n_eff = values.len().saturating_sub(start);
        if n_eff == 0 {
            return Err(ForecastError::ModelFit("no observations after burn-in".to_string()));
        }
        let sse: f64 = resid[start..].iter().map(|e| e * e).sum();
        let sigma2 = sse / n_eff as f64;
        let k = (self.order.p + self.order.q + 2) as f64;
        let aic = n_eff as f64 * sigma2.max(1e-12).ln() + 2.0 * k;
        if !sigma2.is_finite() || !aic.is_finite() {
            return Err(ForecastError::ModelFit(format!(
                "ARIMA{} produced non-finite residuals",
                self.order
            )));
        }
        self.sigma2 = sigma2;
        self.aic = aic;
        Ok(())
    }

    /// Index of the first observation the recursion can predict.
    pub fn start(&self) -> usize {
        self.level_ar.len()
    }

    /// One-step predictions and innovations over `values`; burn-in innovations are zero.
    fn filter(&self, values: &[f64]) -> (Vec<Option<f64>>, Vec<f64>) {
        let start = self.start();
        let mut preds = vec![None; values.len()];
        let mut resid = vec![0.0; values.len()];
        for t in start..values.len() {
            let yhat = self.predict_at(values, &resid, t);
            preds[t] = Some(yhat);
            resid[t] = values[t] - yhat;
        }
        (preds, resid)
    }

    fn predict_at(&self, values: &[f64], resid: &[f64], t: usize) -> f64 {
        let mut yhat = self.constant;
        for (i, a) in self.level_ar.iter().enumerate() {
            yhat += a * values[t - 1 - i];
        }
        for (j, theta) in self.ma.iter().enumerate() {
            if t > j {
                yhat += theta * resid[t - 1 - j];
            }
        }
        yhat
    }

    /// Walk-forward one-step predictions with frozen coefficients: each actual value is
    /// consumed after it is predicted. Burn-in positions are `None`.
    pub fn one_step(&self, values: &[f64]) -> Vec<Option<f64>> {
        self.filter(values).0
    }

    /// `y_t - ŷ_t` aligned with `values`, `None` during burn-in.
    pub fn residuals(&self, values: &[f64]) -> Vec<Option<f64>> {
        let (preds, _) = self.filter(values);
        preds
            .iter()
            .zip(values.iter())
            .map(|(p, y)| p.map(|p| y - p))
            .collect()
    }

    pub fn psi_weights(&self, horizon: usize) -> Vec<f64> {
        let mut psi = Vec::with_capacity(horizon);
        for j in 0..horizon {
            if j == 0 {
                psi.push(1.0);
                continue;
            }
            let mut v = self.ma.get(j - 1).copied().unwrap_or(0.0);
            for (i, a) in self.level_ar.iter().enumerate() {
                let lag = i + 1;
                if lag > j {
                    break;
                }
                v += a * psi[j - lag];
            }
            psi.push(v);
        }
        psi
    }

    /// Multi-step forecast after the end of `history`, future innovations set to zero.
    pub fn forecast(
        &self,
        history: &[f64],
        horizon: usize,
        z: f64,
    ) -> Result<LinearForecast, ForecastError> {
        if history.len() < self.start().max(1) {
            return Err(ForecastError::InsufficientData(format!(
                "forecasting ARIMA{} needs {} observations, got {}",
                self.order,
                self.start().max(1),
                history.len()
            )));
        }
        let (_, resid) = self.filter(history);
        let mut ext = history.to_vec();
        let mut ext_resid = resid;
        let mut point = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = ext.len();
            let yhat = self.predict_at(&ext, &ext_resid, t);
            ext.push(yhat);
            ext_resid.push(0.0);
            point.push(yhat);
        }

        let sigma = self.sigma2.max(0.0).sqrt();
        let psi = self.psi_weights(horizon);
        let mut acc = 0.0;
        let mut std_error = Vec::with_capacity(horizon);
        for w in &psi {
            acc += w * w;
            std_error.push(sigma * acc.sqrt());
        }
        let lower = point
            .iter()
            .zip(&std_error)
            .map(|(p, s)| p - z * s)
            .collect();
        let upper = point
            .iter()
            .zip(&std_error)
            .map(|(p, s)| p + z * s)
            .collect();
        Ok(LinearForecast {
            point,
            std_error,
            lower,
            upper,
        })
    }
}

/// AIC grid search. Returns the best candidate fitted before the deadline expired.
pub fn select_order(
    values: &[f64],
    search: &OrderSearch,
    deadline: &Deadline,
) -> Result<LinearModel, ForecastError> {
    let mut best: Option<LinearModel> = None;
    let mut tried = 0usize;
    let mut rejected = 0usize;
    for order in search.candidates() {
        if deadline.expired() {
            tracing::warn!(tried, "ARIMA order search stopped at deadline");
            break;
        }
        tried += 1;
        match LinearModel::fit(values, order) {
            Ok(model) => {
                let better = match &best {
                    Some(b) => model.aic < b.aic - 1e-9 * b.aic.abs().max(1.0),
                    None => true,
                };
                if better {
                    best = Some(model);
                }
            }
            Err(e) => {
                rejected += 1;
                tracing::trace!(order = %order, error = %e, "ARIMA candidate rejected");
            }
        }
    }
    match best {
        Some(model) => {
            tracing::info!(
                order = %model.order,
                aic = model.aic,
                tried,
                rejected,
                "ARIMA order selected"
            );
            Ok(model)
        }
        None => Err(ForecastError::ModelFit(format!(
            "no ARIMA candidate could be fitted ({} tried, {} rejected)",
            tried, rejected
        ))),
    }
}

/// Returns `(constant, ar, ma)` for an ARMA(p, q) on `w`.
fn hannan_rissanen(w: &[f64], p: usize, q: usize) -> Result<(f64, Vec<f64>, Vec<f64>), ForecastError> {
    let n = w.len();
    if p == 0 && q == 0 {
        if n == 0 {
            return Err(ForecastError::ModelFit("empty series".to_string()));
        }
        return Ok((mean(w), Vec::new(), Vec::new()));
    }
    if q == 0 {
        let (c, ar, _) = fit_ar(w, p)?;
        return Ok((c, ar, Vec::new()));
    }

    // Stage 1: long AR to approximate the innovations.
    let m = (p + q).max(10).min(n / 4);
    if m == 0 {
        return Err(ForecastError::ModelFit("series too short for MA terms".to_string()));
    }
    let (_, _, stage1) = fit_ar(w, m)?;
    let mut innovations = vec![0.0; n];
    for (k, e) in stage1.iter().enumerate() {
        innovations[m + k] = *e;
    }

    // Stage 2: regress on own lags and lagged innovations.
    let start = (m + q).max(p);
    let cols = 1 + p + q;
    if n <= start || n - start < cols + 2 {
        return Err(ForecastError::ModelFit(format!(
            "{} observations are too few for ARMA({},{})",
            n, p, q
        )));
    }
    let rows = n - start;
    let x = DMatrix::from_fn(rows, cols, |r, c| {
        let t = start + r;
        if c == 0 {
            1.0
        } else if c <= p {
            w[t - c]
        } else {
            innovations[t - (c - p)]
        }
    });
    let y = DVector::from_iterator(rows, w[start..].iter().copied());
    let fit = ols(&x, &y)?;
    let constant = fit.beta[0];
    let ar = (1..=p).map(|i| fit.beta[i]).collect();
    let ma = (1..=q).map(|j| fit.beta[p + j]).collect();
    Ok((constant, ar, ma))
}

/// OLS AR(p) with intercept; residuals start at index `p` of `w`.
fn fit_ar(w: &[f64], p: usize) -> Result<(f64, Vec<f64>, Vec<f64>), ForecastError> {
    let n = w.len();
    if n < p + 2 + p {
        return Err(ForecastError::ModelFit(format!(
            "{} observations are too few for AR({})",
            n, p
        )));
    }
    let rows = n - p;
    let x = DMatrix::from_fn(rows, p + 1, |r, c| if c == 0 { 1.0 } else { w[p + r - c] });
    let y = DVector::from_iterator(rows, w[p..].iter().copied());
    let fit = ols(&x, &y)?;
    let ar = (1..=p).map(|i| fit.beta[i]).collect();
    Ok((fit.beta[0], ar, fit.residuals.iter().copied().collect()))
}

/// Right-hand-side coefficients of `φ(B)(1-B)^d`.
pub fn level_coefficients(ar: &[f64], d: usize) -> Vec<f64> {
    let mut poly = Vec::with_capacity(ar.len() + 1);
    poly.push(1.0);
    poly.extend(ar.iter().map(|a| -a));
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    poly.iter().skip(1).map(|c| -c).collect()
}

/// True when every root of `z^k - c_1 z^{k-1} - ... - c_k` lies strictly inside the unit circle.
fn is_stable(coefs: &[f64]) -> bool {
    if coefs.iter().any(|c| !c.is_finite()) {
        return false;
    }
    if coefs.iter().all(|c| *c == 0.0) {
        return true;
    }
    let k = coefs.len();
    if k == 1 {
        return coefs[0].abs() < STABILITY_LIMIT;
    }
    let companion = DMatrix::from_fn(k, k, |r, c| {
        if r == 0 {
            coefs[c]
        } else if r == c + 1 {
            1.0
        } else {
            0.0
        }
    });
    companion
        .complex_eigenvalues()
        .iter()
        .all(|lambda| lambda.norm().is_finite() && lambda.norm() < STABILITY_LIMIT)
}
