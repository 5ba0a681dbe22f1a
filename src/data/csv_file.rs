use std::path::Path;

use crate::error::ForecastError;
use crate::model::price::{parse_date, PricePoint, PriceSeries};

/// Reads a `date,close` file; other columns are ignored and rows are sorted by date.
pub fn load_series(path: &Path) -> Result<PriceSeries, ForecastError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        ForecastError::UpstreamData(format!("failed to open {}: {}", path.display(), e))
    })?;
    let headers = reader
        .headers()
        .map_err(|e| ForecastError::UpstreamData(format!("{}: {}", path.display(), e)))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                ForecastError::UpstreamData(format!(
                    "{} has no '{}' column",
                    path.display(),
                    name
                ))
            })
    };
    let date_idx = column("date")?;
    let close_idx = column("close")?;

    let mut points = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| ForecastError::UpstreamData(format!("{}: {}", path.display(), e)))?;
        let bad_row = || {
            ForecastError::UpstreamData(format!("{}: malformed row {}", path.display(), line + 2))
        };
        let date = record
            .get(date_idx)
            .and_then(|s| parse_date(s).ok())
            .ok_or_else(bad_row)?;
        let close = record
            .get(close_idx)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .ok_or_else(bad_row)?;
        points.push(PricePoint { date, close });
    }
    if points.is_empty() {
        return Err(ForecastError::UpstreamData(format!(
            "{} contains no prices",
            path.display()
        )));
    }
    PriceSeries::from_unordered(points)
}
