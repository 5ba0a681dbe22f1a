use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::model::price::parse_date;

/// Exchange trading days: weekdays minus recurring (`MM-DD`) and one-off holidays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    recurring: BTreeSet<(u32, u32)>,
    explicit: BTreeSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn weekends_only() -> Self {
        Self::default()
    }

    pub fn new(recurring: &[String], explicit: &[String]) -> Result<Self, ForecastError> {
        let mut cal = Self::default();
        for raw in recurring {
            cal.recurring.insert(parse_month_day(raw)?);
        }
        for raw in explicit {
            let date = parse_date(raw).map_err(|_| {
                ForecastError::InvalidParameter(format!("invalid holiday date '{}'", raw))
            })?;
            cal.explicit.insert(date);
        }
        Ok(cal)
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        if self.recurring.contains(&(date.month(), date.day())) {
            return false;
        }
        !self.explicit.contains(&date)
    }

    /// The next `count` trading days strictly after `last`.
    pub fn next_trading_days(&self, last: NaiveDate, count: usize) -> Vec<NaiveDate> {
        let mut out = Vec::with_capacity(count);
        let mut day = last;
        while out.len() < count {
            day += Duration::days(1);
            if self.is_trading_day(day) {
                out.push(day);
            }
        }
        out
    }
}

fn parse_month_day(raw: &str) -> Result<(u32, u32), ForecastError> {
    let invalid = || ForecastError::InvalidParameter(format!("invalid recurring holiday '{}'", raw));
    let (m, d) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    let day: u32 = d.parse().map_err(|_| invalid())?;
    // 2024 is a leap year so 02-29 is accepted.
    NaiveDate::from_ymd_opt(2024, month, day).ok_or_else(invalid)?;
    Ok((month, day))
}
