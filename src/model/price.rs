use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ForecastError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closing prices with strictly increasing dates and positive closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self, ForecastError> {
        if points.is_empty() {
            return Err(ForecastError::UpstreamData(
                "price series is empty".to_string(),
            ));
        }
        for (idx, p) in points.iter().enumerate() {
            if !p.close.is_finite() || p.close <= 0.0 {
                return Err(ForecastError::UpstreamData(format!(
                    "close at {} must be a positive finite number, got {}",
                    p.date, p.close
                )));
            }
            if idx > 0 && points[idx - 1].date >= p.date {
                return Err(ForecastError::UpstreamData(format!(
                    "dates must be strictly increasing: {} follows {}",
                    p.date,
                    points[idx - 1].date
                )));
            }
        }
        Ok(Self { points })
    }

    /// Builds a series from parallel `dates`/`close` columns as sent by the gateway.
    pub fn from_columns(dates: &[String], close: &[f64]) -> Result<Self, ForecastError> {
        if dates.len() != close.len() {
            return Err(ForecastError::UpstreamData(format!(
                "dates ({}) and close ({}) have different lengths",
                dates.len(),
                close.len()
            )));
        }
        let mut points = Vec::with_capacity(dates.len());
        for (raw, close) in dates.iter().zip(close.iter()) {
            let date = parse_date(raw).map_err(|_| {
                ForecastError::UpstreamData(format!("malformed date '{}'", raw))
            })?;
            points.push(PricePoint {
                date,
                close: *close,
            });
        }
        Self::new(points)
    }

    /// Sorts by date and keeps the last close seen for a duplicated date.
    pub fn from_unordered(mut points: Vec<PricePoint>) -> Result<Self, ForecastError> {
        points.retain(|p| p.close.is_finite() && p.close > 0.0);
        points.sort_by_key(|p| p.date);
        let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
        for p in points {
            match out.last_mut() {
                Some(last) if last.date == p.date => *last = p,
                _ => out.push(p),
            }
        }
        Self::new(out)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn date_strings(&self) -> Vec<String> {
        self.points.iter().map(|p| format_date(p.date)).collect()
    }

    pub fn last_date(&self) -> NaiveDate {
        // Non-empty by construction.
        self.points[self.points.len() - 1].date
    }

    /// Inclusive date-range slice.
    pub fn between(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Self, ForecastError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(ForecastError::InvalidParameter(format!(
                    "start_date {} is after end_date {}",
                    s, e
                )));
            }
        }
        let points: Vec<PricePoint> = self
            .points
            .iter()
            .filter(|p| start.map_or(true, |s| p.date >= s))
            .filter(|p| end.map_or(true, |e| p.date <= e))
            .copied()
            .collect();
        if points.is_empty() {
            return Err(ForecastError::UpstreamData(format!(
                "no prices between {} and {}",
                start.map(format_date).unwrap_or_else(|| "start".to_string()),
                end.map(format_date).unwrap_or_else(|| "end".to_string())
            )));
        }
        Ok(Self { points })
    }

    /// Short content hash, stable across runs for identical data.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for p in &self.points {
            hasher.update(format_date(p.date).as_bytes());
            hasher.update(p.close.to_bits().to_le_bytes());
        }
        hex::encode(&hasher.finalize()[..12])
    }
}

impl TryFrom<Vec<PricePoint>> for PriceSeries {
    type Error = ForecastError;

    fn try_from(points: Vec<PricePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<PriceSeries> for Vec<PricePoint> {
    fn from(series: PriceSeries) -> Self {
        series.points
    }
}

/// Accepts `YYYY-MM-DD` and timestamps starting with it (`2024-03-01 10:00:00`).
pub fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    let trimmed = raw.trim();
    let head = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
