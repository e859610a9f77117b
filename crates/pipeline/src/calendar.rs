//! Trading calendars and business-day arithmetic.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("unknown trading calendar '{0}' (expected weekdays, CME_Agriculture or NYSE)")]
    Unknown(String),
}

/// A set of trading days.
pub trait TradingCalendar: Send + Sync {
    fn name(&self) -> &str;

    fn is_trading_day(&self, date: NaiveDate) -> bool;

    /// Trading days in `start..=end`, ascending. Empty when `start > end`.
    fn valid_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            if self.is_trading_day(current) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }
}

#[must_use]
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Moves `date` forward by `days` business days (Monday to Friday).
///
/// A weekend date first rolls to the following Monday, and that roll counts
/// as one step. With `days == 0` only the weekend roll applies.
#[must_use]
pub fn add_business_days(date: NaiveDate, days: u32) -> NaiveDate {
    let mut current = date;
    let mut remaining = days;

    if !is_weekday(current) {
        while !is_weekday(current) {
            current += Duration::days(1);
        }
        remaining = remaining.saturating_sub(1);
    }

    while remaining > 0 {
        current += Duration::days(1);
        if is_weekday(current) {
            remaining -= 1;
        }
    }
    current
}

/// Monday to Friday, no holidays.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeekdayCalendar;

impl TradingCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        "weekdays"
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        is_weekday(date)
    }
}

/// Weekdays minus the US exchange holiday schedule shared by NYSE and the
/// CME agricultural products.
#[derive(Debug, Clone)]
pub struct UsExchangeCalendar {
    name: &'static str,
}

impl UsExchangeCalendar {
    #[must_use]
    pub fn cme_agriculture() -> Self {
        Self {
            name: "CME_Agriculture",
        }
    }

    #[must_use]
    pub fn nyse() -> Self {
        Self { name: "NYSE" }
    }
}

impl TradingCalendar for UsExchangeCalendar {
    fn name(&self) -> &str {
        self.name
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        is_weekday(date) && !us_exchange_holidays(date.year()).contains(&date)
    }

    fn valid_days(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }
        let holidays: Vec<NaiveDate> = (start.year()..=end.year())
            .flat_map(us_exchange_holidays)
            .collect();

        let mut days = Vec::new();
        let mut current = start;
        while current <= end {
            if is_weekday(current) && !holidays.contains(&current) {
                days.push(current);
            }
            current += Duration::days(1);
        }
        days
    }
}

/// Looks up a calendar by name, ignoring case.
///
/// # Errors
/// Returns [`CalendarError::Unknown`] for unrecognized names.
pub fn calendar_by_name(name: &str) -> Result<Box<dyn TradingCalendar>, CalendarError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "weekdays" | "weekday" | "business_days" => Ok(Box::new(WeekdayCalendar)),
        "cme_agriculture" | "cme_ag" | "cbot_agriculture" => {
            Ok(Box::new(UsExchangeCalendar::cme_agriculture()))
        }
        "nyse" | "xnys" => Ok(Box::new(UsExchangeCalendar::nyse())),
        _ => Err(CalendarError::Unknown(name.to_string())),
    }
}

/// Observed full-day closures of US exchanges in `year`.
#[must_use]
pub fn us_exchange_holidays(year: i32) -> Vec<NaiveDate> {
    let mut holidays = Vec::with_capacity(10);

    // New Year's Day on a Saturday is not observed on the Friday before.
    if let Some(new_year) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match new_year.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => holidays.push(new_year + Duration::days(1)),
            _ => holidays.push(new_year),
        }
    }
    if year >= 1998 {
        holidays.extend(NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3));
    }
    holidays.extend(NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3));
    holidays.extend(easter_sunday(year).map(|easter| easter - Duration::days(2)));
    holidays.extend(last_weekday_of_month(year, 5, Weekday::Mon));
    if year >= 2022 {
        holidays.extend(NaiveDate::from_ymd_opt(year, 6, 19).map(nearest_weekday));
    }
    holidays.extend(NaiveDate::from_ymd_opt(year, 7, 4).map(nearest_weekday));
    holidays.extend(NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1));
    holidays.extend(NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4));
    holidays.extend(NaiveDate::from_ymd_opt(year, 12, 25).map(nearest_weekday));

    holidays
}

/// Saturday holidays move to Friday, Sunday holidays to Monday.
fn nearest_weekday(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
        .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4))
}

/// Gregorian Easter Sunday (anonymous computus).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}
