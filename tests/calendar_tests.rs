use chrono::{Datelike, NaiveDate, Weekday};
use hybrid_forecast::calendar::TradingCalendar;
use hybrid_forecast::error::ForecastError;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn weekends_are_skipped() {
    let cal = TradingCalendar::weekends_only();
    // 2024-05-03 is a Friday.
    let days = cal.next_trading_days(date(2024, 5, 3), 3);
    assert_eq!(days, vec![date(2024, 5, 6), date(2024, 5, 7), date(2024, 5, 8)]);
    assert!(days.iter().all(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun)));
}

#[test]
fn recurring_and_explicit_holidays_are_skipped() {
    let cal = TradingCalendar::new(
        &["05-09".to_string()],
        &["2024-05-10".to_string()],
    )
    .unwrap();
    assert!(!cal.is_trading_day(date(2024, 5, 9)));
    assert!(!cal.is_trading_day(date(2025, 5, 9)));
    assert!(!cal.is_trading_day(date(2024, 5, 10)));
    assert_eq!(cal.next_trading_days(date(2024, 5, 8), 1), vec![date(2024, 5, 13)]);
}

#[test]
fn generated_dates_are_strictly_after_last_observation() {
    let cal = TradingCalendar::weekends_only();
    let last = date(2024, 12, 31);
    let days = cal.next_trading_days(last, 365);
    assert_eq!(days.len(), 365);
    assert!(days[0] > last);
    assert!(days.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn malformed_holiday_is_rejected() {
    let err = TradingCalendar::new(&["13-40".to_string()], &[]).unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
    let err = TradingCalendar::new(&[], &["2024/01/01".to_string()]).unwrap_err();
    assert!(matches!(err, ForecastError::InvalidParameter(_)));
}
