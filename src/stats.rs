use nalgebra::{DMatrix, DVector};

use crate::error::ForecastError;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn difference(values: &[f64], d: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    for _ in 0..d {
        if out.len() < 2 {
            return Vec::new();
        }
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

/// Ordinary least squares fit.
#[derive(Debug, Clone)]
pub struct OlsFit {
    pub beta: DVector<f64>,
    pub residuals: DVector<f64>,
    pub sse: f64,
    /// `(X'X)^-1`, kept for standard errors.
    pub xtx_inv: DMatrix<f64>,
}

impl OlsFit {
    pub fn sigma2(&self) -> f64 {
        let n = self.residuals.len();
        let k = self.beta.len();
        if n <= k {
            return f64::NAN;
        }
        self.sse / (n - k) as f64
    }

    pub fn std_error(&self, idx: usize) -> f64 {
        (self.sigma2() * self.xtx_inv[(idx, idx)]).sqrt()
    }
}

pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit, ForecastError> {
    if x.nrows() != y.len() || x.nrows() < x.ncols() || x.ncols() == 0 {
        return Err(ForecastError::ModelFit(format!(
            "regression needs at least {} rows, got {}",
            x.ncols(),
            x.nrows()
        )));
    }
    let xt = x.transpose();
    let xtx_inv = (&xt * x)
        .try_inverse()
        .ok_or_else(|| ForecastError::ModelFit("singular normal equations".to_string()))?;
    let beta = &xtx_inv * (&xt * y);
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(ForecastError::ModelFit(
            "non-finite regression coefficients".to_string(),
        ));
    }
    let residuals = y - x * &beta;
    let sse = residuals.dot(&residuals);
    Ok(OlsFit {
        beta,
        residuals,
        sse,
        xtx_inv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ols_recovers_line() {
        let x = DMatrix::from_fn(5, 2, |r, c| if c == 0 { 1.0 } else { r as f64 });
        let y = DVector::from_iterator(5, (0..5).map(|r| 2.0 + 3.0 * r as f64));
        let fit = ols(&x, &y).unwrap();
        assert!((fit.beta[0] - 2.0).abs() < 1e-9);
        assert!((fit.beta[1] - 3.0).abs() < 1e-9);
        assert!(fit.sse < 1e-12);
    }

    #[test]
    fn collinear_design_is_rejected() {
        let x = DMatrix::from_fn(4, 2, |_, _| 1.0);
        let y = DVector::from_element(4, 1.0);
        assert!(ols(&x, &y).is_err());
    }

    #[test]
    fn differencing_twice() {
        assert_eq!(difference(&[1.0, 4.0, 9.0, 16.0], 2), vec![2.0, 2.0]);
    }
}
