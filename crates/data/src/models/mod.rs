//! Data models for COT report storage.
//!
//! Numeric values use `rust_decimal::Decimal` so derived columns are exact.

pub mod cot_record;
pub mod query;

pub use cot_record::CotRecord;
pub use query::{QueryField, QueryFilter};
