use serde::{Deserialize, Serialize};

/// Maps the fitted range onto `[0, 1]`. A constant input gets a unit span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: f64,
    pub max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values.iter().filter(|v| v.is_finite()) {
            min = min.min(*v);
            max = max.max(*v);
        }
        if !min.is_finite() || !max.is_finite() {
            return Self { min: 0.0, max: 1.0 };
        }
        Self { min, max }
    }

    fn span(&self) -> f64 {
        let span = self.max - self.min;
        if span.abs() <= 1e-12 {
            1.0
        } else {
            span
        }
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.span()
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.span() + self.min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|v| self.transform(*v)).collect()
    }
}
