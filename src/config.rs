use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calendar::TradingCalendar;
use crate::data::{MoexClient, PriceSource};
use crate::linear::OrderSearch;
use crate::model::price::parse_date;
use crate::pipeline::AnalysisSettings;
use crate::runtime::RuntimeMode;
use crate::service::JobLimits;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub analysis: AnalysisConfig,
    pub arima: ArimaConfig,
    pub runtime: RuntimeConfig,
    pub data: DataConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub train_ratio: f64,
    pub min_test_size: usize,
    pub max_look_back: usize,
    pub max_units: usize,
    pub max_epochs: usize,
    pub max_batch_size: usize,
    pub default_horizon: usize,
    pub job_timeout_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    pub dropout: f64,
    pub learning_rate: f64,
    pub clip_norm: f64,
    pub seed: u64,
}

fn default_grace_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArimaConfig {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
    pub confidence_z: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub mode: RuntimeMode,
    #[serde(default = "default_worker_path")]
    pub worker_path: PathBuf,
}

fn default_worker_path() -> PathBuf {
    PathBuf::from("forecast-worker")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    Moex,
    Csv,
}

impl std::str::FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "moex" => Ok(DataSourceKind::Moex),
            "csv" => Ok(DataSourceKind::Csv),
            other => Err(format!("unknown data source '{}', expected moex or csv", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    pub source: DataSourceKind,
    pub moex_url: String,
    pub default_start: String,
    pub cache_ttl_secs: u64,
    pub page_timeout_secs: u64,
    #[serde(default)]
    pub csv_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarConfig {
    /// `MM-DD` days closed every year.
    #[serde(default)]
    pub recurring_holidays: Vec<String>,
    /// One-off `YYYY-MM-DD` closures.
    #[serde(default)]
    pub holidays: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Plain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = std::env::var("FORECAST_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = Self::from_file(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&config_str).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw).context("invalid configuration")?;
        Ok(config)
    }

    /// Applies `FORECAST_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("FORECAST_BIND") {
            self.server.bind = bind;
        }
        if let Some(mode) = lookup("FORECAST_RUNTIME") {
            self.runtime.mode = mode
                .parse()
                .map_err(anyhow::Error::msg)
                .context("FORECAST_RUNTIME is invalid")?;
        }
        if let Some(path) = lookup("FORECAST_WORKER_PATH") {
            self.runtime.worker_path = PathBuf::from(path);
        }
        if let Some(source) = lookup("FORECAST_DATA_SOURCE") {
            self.data.source = source
                .parse()
                .map_err(anyhow::Error::msg)
                .context("FORECAST_DATA_SOURCE is invalid")?;
        }
        if let Some(path) = lookup("FORECAST_CSV_PATH") {
            self.data.csv_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if !(a.train_ratio > 0.0 && a.train_ratio < 1.0) {
            bail!("analysis.train_ratio must be in (0, 1), got {}", a.train_ratio);
        }
        if !(0.0..1.0).contains(&a.dropout) {
            bail!("analysis.dropout must be in [0, 1), got {}", a.dropout);
        }
        if a.learning_rate <= 0.0 || a.clip_norm <= 0.0 {
            bail!("analysis.learning_rate and analysis.clip_norm must be positive");
        }
        if a.job_timeout_secs == 0 {
            bail!("analysis.job_timeout_secs must be > 0");
        }
        if a.default_horizon == 0 || a.default_horizon > crate::future::MAX_HORIZON {
            bail!(
                "analysis.default_horizon must be between 1 and {}",
                crate::future::MAX_HORIZON
            );
        }
        if self.arima.confidence_z <= 0.0 {
            bail!("arima.confidence_z must be positive");
        }
        self.data_start().context("data.default_start is invalid")?;
        if self.data.source == DataSourceKind::Csv && self.data.csv_path.is_none() {
            bail!("data.csv_path is required when data.source = \"csv\"");
        }
        self.trading_calendar()
            .context("calendar section is invalid")?;
        Ok(())
    }

    pub fn analysis_settings(&self) -> AnalysisSettings {
        let a = &self.analysis;
        AnalysisSettings {
            train_ratio: a.train_ratio,
            min_test_size: a.min_test_size,
            order_search: OrderSearch {
                max_p: self.arima.max_p,
                max_d: self.arima.max_d,
                max_q: self.arima.max_q,
            },
            dropout: a.dropout,
            learning_rate: a.learning_rate,
            clip_norm: a.clip_norm,
            seed: a.seed,
            confidence_z: self.arima.confidence_z,
            max_look_back: a.max_look_back,
            max_units: a.max_units,
            max_epochs: a.max_epochs,
            max_batch_size: a.max_batch_size,
            default_horizon: a.default_horizon,
        }
    }

    pub fn job_limits(&self) -> JobLimits {
        JobLimits {
            job_timeout: Duration::from_secs(self.analysis.job_timeout_secs),
            grace: Duration::from_secs(self.analysis.grace_secs),
        }
    }

    pub fn trading_calendar(&self) -> Result<TradingCalendar> {
        TradingCalendar::new(&self.calendar.recurring_holidays, &self.calendar.holidays)
            .map_err(anyhow::Error::from)
    }

    pub fn data_start(&self) -> Result<NaiveDate> {
        parse_date(&self.data.default_start)
            .with_context(|| format!("'{}' is not YYYY-MM-DD", self.data.default_start))
    }

    pub fn price_source(&self) -> Result<PriceSource> {
        match self.data.source {
            DataSourceKind::Moex => Ok(PriceSource::Moex(MoexClient::new(
                &self.data.moex_url,
                self.data_start()?,
                Duration::from_secs(self.data.cache_ttl_secs),
                Duration::from_secs(self.data.page_timeout_secs),
            ))),
            DataSourceKind::Csv => {
                let Some(path) = &self.data.csv_path else {
                    bail!("data.csv_path is required when data.source = \"csv\"");
                };
                Ok(PriceSource::Csv(path.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
bind = "127.0.0.1:8000"

[analysis]
train_ratio = 0.8
min_test_size = 10
max_look_back = 365
max_units = 512
max_epochs = 500
max_batch_size = 4096
default_horizon = 30
job_timeout_secs = 600
dropout = 0.2
learning_rate = 0.001
clip_norm = 5.0
seed = 42

[arima]
max_p = 3
max_d = 2
max_q = 3
confidence_z = 1.96

[runtime]
mode = "in_process"

[data]
source = "moex"
moex_url = "https://iss.moex.com/iss/engines/stock/markets/shares/securities/SBER/candles.json"
default_start = "2021-01-01"
cache_ttl_secs = 120
page_timeout_secs = 15

[logging]
level = "debug"
"#;

    #[test]
    fn parse_sample_toml() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.runtime.mode, RuntimeMode::InProcess);
        assert_eq!(config.analysis.grace_secs, 5);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.calendar.recurring_holidays.is_empty());
        config.validate().unwrap();

        let settings = config.analysis_settings();
        assert_eq!(settings.order_search.max_p, 3);
        assert!((settings.confidence_z - 1.96).abs() < f64::EPSILON);
    }

    #[test]
    fn env_overrides_replace_fields() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            ("FORECAST_BIND", "0.0.0.0:9000"),
            ("FORECAST_RUNTIME", "subprocess"),
            ("FORECAST_DATA_SOURCE", "csv"),
            ("FORECAST_CSV_PATH", "data/sber.csv"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.runtime.mode, RuntimeMode::Subprocess);
        assert_eq!(config.data.source, DataSourceKind::Csv);
        assert_eq!(config.data.csv_path, Some(PathBuf::from("data/sber.csv")));
        config.validate().unwrap();
    }

    #[test]
    fn unknown_runtime_override_is_rejected() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        let err = config
            .apply_overrides(|k| (k == "FORECAST_RUNTIME").then(|| "gpu".to_string()))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("FORECAST_RUNTIME"));
    }
}
