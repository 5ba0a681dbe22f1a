use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::ForecastError;
use crate::model::price::{format_date, parse_date, PricePoint, PriceSeries};

pub const PAGE_STEP: usize = 100;
pub const MAX_START: usize = 20_000;

#[derive(Debug, Deserialize)]
pub struct CandlesPayload {
    pub candles: Option<CandlesTable>,
}

#[derive(Debug, Deserialize)]
pub struct CandlesTable {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<serde_json::Value>>,
}

struct CacheEntry {
    fetched_at: Instant,
    series: PriceSeries,
}

/// Daily candles from the MOEX ISS API, cached per date range.
pub struct MoexClient {
    http: reqwest::Client,
    base_url: String,
    default_start: NaiveDate,
    ttl: Duration,
    page_timeout: Duration,
    // Held for the whole fetch so a concurrent identical request waits and then hits the cache.
    cache: Mutex<HashMap<(NaiveDate, NaiveDate), CacheEntry>>,
}

impl MoexClient {
    pub fn new(base_url: &str, default_start: NaiveDate, ttl: Duration, page_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_start,
            ttl,
            page_timeout,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn fetch(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, ForecastError> {
        let from = start.unwrap_or(self.default_start);
        let till = end.unwrap_or_else(|| Utc::now().date_naive());
        if from > till {
            return Err(ForecastError::InvalidParameter(format!(
                "start_date {} is after end_date {}",
                from, till
            )));
        }
        let key = (from, till);

        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(&key) {
            if entry.fetched_at.elapsed() < self.ttl {
                tracing::debug!(from = %from, till = %till, "MOEX cache hit");
                return Ok(entry.series.clone());
            }
        }

        let started = Instant::now();
        let series = self.fetch_pages(from, till).await?;
        tracing::info!(
            from = %from,
            till = %till,
            points = series.len(),
            ms = started.elapsed().as_millis() as u64,
            "MOEX candles fetched"
        );
        let ttl = self.ttl;
        cache.retain(|_, e| e.fetched_at.elapsed() < ttl);
        cache.insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                series: series.clone(),
            },
        );
        Ok(series)
    }

    async fn fetch_pages(&self, from: NaiveDate, till: NaiveDate) -> Result<PriceSeries, ForecastError> {
        let mut points = Vec::new();
        let mut last_page_date: Option<NaiveDate> = None;
        let mut start = 0;
        while start <= MAX_START {
            let (rows, page) = self.fetch_page(from, till, start).await?;
            if rows == 0 || page.is_empty() {
                break;
            }
            let page_last = page.last().map(|p| p.date);
            points.extend(page);
            // ISS repeats the final page for out-of-range offsets.
            if page_last.is_none() || page_last == last_page_date {
                break;
            }
            last_page_date = page_last;
            if rows < PAGE_STEP {
                break;
            }
            start += PAGE_STEP;
        }
        if points.is_empty() {
            return Err(ForecastError::UpstreamData(format!(
                "MOEX returned no candles between {} and {}",
                format_date(from),
                format_date(till)
            )));
        }
        PriceSeries::from_unordered(points)
    }

    async fn fetch_page(
        &self,
        from: NaiveDate,
        till: NaiveDate,
        start: usize,
    ) -> Result<(usize, Vec<PricePoint>), ForecastError> {
        let url = format!(
            "{}?from={}&till={}&interval=24&start={}",
            self.base_url,
            format_date(from),
            format_date(till),
            start
        );
        let resp = self
            .http
            .get(&url)
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| ForecastError::UpstreamData(format!("MOEX request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ForecastError::UpstreamData(format!(
                "MOEX error: {}",
                status.as_u16()
            )));
        }
        let payload: CandlesPayload = resp
            .json()
            .await
            .map_err(|e| ForecastError::UpstreamData(format!("MOEX payload unreadable: {}", e)))?;
        parse_page(&payload)
    }
}

/// Returns the raw row count and the parsed `(begin, close)` points of one page.
pub fn parse_page(payload: &CandlesPayload) -> Result<(usize, Vec<PricePoint>), ForecastError> {
    let Some(table) = &payload.candles else {
        return Ok((0, Vec::new()));
    };
    if table.data.is_empty() {
        return Ok((0, Vec::new()));
    }
    let close_idx = table.columns.iter().position(|c| c == "close");
    let begin_idx = table.columns.iter().position(|c| c == "begin");
    let (Some(close_idx), Some(begin_idx)) = (close_idx, begin_idx) else {
        return Err(ForecastError::UpstreamData(
            "MOEX candles payload is invalid".to_string(),
        ));
    };
    let mut points = Vec::with_capacity(table.data.len());
    for row in &table.data {
        let close = row.get(close_idx).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        });
        let date = row
            .get(begin_idx)
            .and_then(|v| v.as_str())
            .and_then(|s| parse_date(s).ok());
        if let (Some(close), Some(date)) = (close, date) {
            if close.is_finite() {
                points.push(PricePoint { date, close });
            }
        }
    }
    Ok((table.data.len(), points))
}
