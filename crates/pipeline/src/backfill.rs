//! Business-day backfill of a weekly report series.
//!
//! Reports are released a few business days after their as-of date. The
//! delayed series moves every observation to the day it became available,
//! forward-fills the business days in between and then carries the latest
//! observation across the trading calendar up to a cut-off date.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::calendar::{add_business_days, is_weekday, TradingCalendar};

/// How a point of the delayed series was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// The shifted date of a real report
    Reported,
    /// A business day between two reports, carried from the earlier one
    Filled,
    /// A trading day after the last report
    Extended,
}

/// One day of the delayed series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelayedPoint<T> {
    /// Day the value applies to
    pub date: NaiveDate,
    /// As-of date of the report the value comes from
    pub report_date: NaiveDate,
    pub kind: PointKind,
    pub value: T,
}

/// Builds the delayed series, newest first.
///
/// Every observation is shifted by `lag` business days. The business days
/// between the first and last shifted date are forward-filled; when two
/// observations shift onto the same day the one with the later report date
/// is kept. Trading days of `calendar` after the last shifted date through
/// `through` repeat the latest observation.
pub fn delayed_series<T: Clone>(
    observations: &[(NaiveDate, T)],
    lag: u32,
    calendar: &dyn TradingCalendar,
    through: NaiveDate,
) -> Vec<DelayedPoint<T>> {
    let mut ordered: Vec<&(NaiveDate, T)> = observations.iter().collect();
    ordered.sort_by_key(|(date, _)| *date);

    let mut shifted: BTreeMap<NaiveDate, (NaiveDate, &T)> = BTreeMap::new();
    for (report_date, value) in ordered {
        shifted.insert(add_business_days(*report_date, lag), (*report_date, value));
    }

    let (Some(first), Some(last)) = (
        shifted.keys().next().copied(),
        shifted.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    let mut points = Vec::new();
    let mut current: Option<(NaiveDate, &T)> = None;
    let mut day = first;
    while day <= last {
        if is_weekday(day) {
            if let Some(&(report_date, value)) = shifted.get(&day) {
                current = Some((report_date, value));
                points.push(DelayedPoint {
                    date: day,
                    report_date,
                    kind: PointKind::Reported,
                    value: value.clone(),
                });
            } else if let Some((report_date, value)) = current {
                points.push(DelayedPoint {
                    date: day,
                    report_date,
                    kind: PointKind::Filled,
                    value: value.clone(),
                });
            }
        }
        day += Duration::days(1);
    }

    if let Some((report_date, value)) = current {
        for date in calendar.valid_days(last + Duration::days(1), through) {
            points.push(DelayedPoint {
                date,
                report_date,
                kind: PointKind::Extended,
                value: value.clone(),
            });
        }
    }

    points.reverse();
    points
}
