pub mod csv_file;
pub mod moex;

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::ForecastError;
use crate::model::price::PriceSeries;

pub use moex::MoexClient;

/// Where closing prices come from when a request does not carry them inline.
pub enum PriceSource {
    Moex(MoexClient),
    Csv(PathBuf),
    Memory(PriceSeries),
}

impl PriceSource {
    pub fn name(&self) -> &'static str {
        match self {
            PriceSource::Moex(_) => "moex",
            PriceSource::Csv(_) => "csv",
            PriceSource::Memory(_) => "memory",
        }
    }

    pub async fn fetch(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceSeries, ForecastError> {
        match self {
            PriceSource::Moex(client) => client.fetch(start, end).await,
            PriceSource::Csv(path) => {
                let path = path.clone();
                let series = tokio::task::spawn_blocking(move || csv_file::load_series(&path))
                    .await
                    .map_err(|e| ForecastError::Runtime(format!("csv loader failed: {}", e)))??;
                series.between(start, end)
            }
            PriceSource::Memory(series) => series.between(start, end),
        }
    }
}
