//! COT collection pipeline.
//!
//! This crate provides:
//! - The fetch, dedup, append and upsert run over configured report types
//! - Trading calendars and business-day arithmetic
//! - The delayed (release-lagged, forward-filled) business-day series

pub mod backfill;
pub mod calendar;
pub mod dedup;
pub mod pipeline;

pub use backfill::{delayed_series, DelayedPoint, PointKind};
pub use calendar::{
    add_business_days, calendar_by_name, is_weekday, us_exchange_holidays, CalendarError,
    TradingCalendar, UsExchangeCalendar, WeekdayCalendar,
};
pub use dedup::filter_unseen;
pub use pipeline::{Pipeline, PipelineSummary, ReportOutcome};
