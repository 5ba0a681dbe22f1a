use crate::error::ForecastError;

pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;
pub const PREVIEW_AVG_WINDOW: usize = 5;

/// Chronological train/test split of a close series.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitDataset {
    pub train: Vec<f64>,
    pub test: Vec<f64>,
    pub look_back: usize,
}

impl SplitDataset {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }

    pub fn full(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.train.len() + self.test.len());
        out.extend_from_slice(&self.train);
        out.extend_from_slice(&self.test);
        out
    }
}

pub fn split_series(
    values: &[f64],
    look_back: usize,
    train_ratio: f64,
    min_test_size: usize,
) -> Result<SplitDataset, ForecastError> {
    if look_back == 0 {
        return Err(ForecastError::InvalidParameter(
            "look_back must be at least 1".to_string(),
        ));
    }
    if !(train_ratio > 0.0 && train_ratio < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "train_ratio must be in (0, 1), got {}",
            train_ratio
        )));
    }
    let min_test_size = min_test_size.max(1);
    let n = values.len();
    if n <= look_back + min_test_size {
        return Err(ForecastError::InsufficientData(format!(
            "{} observations cannot cover look_back {} plus {} test points",
            n, look_back, min_test_size
        )));
    }
    let train_len = (n as f64 * train_ratio).floor() as usize;
    let test_len = n - train_len;
    if train_len <= look_back {
        return Err(ForecastError::InsufficientData(format!(
            "train segment of {} is not longer than look_back {}",
            train_len, look_back
        )));
    }
    if test_len < min_test_size {
        return Err(ForecastError::InsufficientData(format!(
            "test segment of {} is shorter than the minimum {}",
            test_len, min_test_size
        )));
    }
    Ok(SplitDataset {
        train: values[..train_len].to_vec(),
        test: values[train_len..].to_vec(),
        look_back,
    })
}

/// Sliding windows over `values`: window `i` is `values[i..i+look_back]`, target `values[i+look_back]`.
pub fn build_windows(values: &[f64], look_back: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    if look_back == 0 || values.len() <= look_back {
        return (Vec::new(), Vec::new());
    }
    let count = values.len() - look_back;
    let mut windows = Vec::with_capacity(count);
    let mut targets = Vec::with_capacity(count);
    for i in 0..count {
        windows.push(values[i..i + look_back].to_vec());
        targets.push(values[i + look_back]);
    }
    (windows, targets)
}

/// Trailing mean with a shrinking window at the start, rounded to 4 decimals.
pub fn rolling_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= window {
            sum -= values[i - window];
        }
        let count = (i + 1).min(window);
        out.push(round_to(sum / count as f64, 4));
    }
    out
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
