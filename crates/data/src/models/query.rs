//! Typed filters for the COT query helpers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::CotRecord;

/// Columns a COT table can be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryField {
    Date,
    MarketCode,
    ReportType,
}

impl QueryField {
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            QueryField::Date => "date",
            QueryField::MarketCode => "market_code",
            QueryField::ReportType => "report_type",
        }
    }

    /// Postgres type the bound text value is cast to.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            QueryField::Date => "date",
            QueryField::MarketCode | QueryField::ReportType => "text",
        }
    }

    /// Text form of this field on a record.
    #[must_use]
    pub fn value_of(self, record: &CotRecord) -> String {
        match self {
            QueryField::Date => record.date.format("%Y-%m-%d").to_string(),
            QueryField::MarketCode => record.market_code.clone(),
            QueryField::ReportType => record.report_type.as_str().to_string(),
        }
    }

    /// Checks that `value` is acceptable for this field.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidQueryValue`] for dates not in `YYYY-MM-DD` form.
    pub fn check(self, value: &str) -> Result<(), StoreError> {
        if self == QueryField::Date && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
            return Err(StoreError::InvalidQueryValue {
                field: self,
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for QueryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for QueryField {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "date" => Ok(QueryField::Date),
            "market_code" => Ok(QueryField::MarketCode),
            "report_type" => Ok(QueryField::ReportType),
            other => Err(StoreError::UnknownQueryField(other.to_string())),
        }
    }
}

/// Row selection for [`crate::ReportStore::query`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryFilter {
    /// Every row
    #[default]
    All,
    /// Rows where the field equals the value
    Equals(QueryField, String),
    /// Rows where the field equals any of the values
    AnyOf(QueryField, Vec<String>),
}

impl QueryFilter {
    /// Builds a filter from zero, one or many values.
    #[must_use]
    pub fn from_values(field: QueryField, mut values: Vec<String>) -> Self {
        match values.len() {
            0 => QueryFilter::All,
            1 => QueryFilter::Equals(field, values.remove(0)),
            _ => QueryFilter::AnyOf(field, values),
        }
    }

    /// Validates every value against its field.
    ///
    /// # Errors
    /// Returns the first invalid value.
    pub fn check(&self) -> Result<(), StoreError> {
        match self {
            QueryFilter::All => Ok(()),
            QueryFilter::Equals(field, value) => field.check(value),
            QueryFilter::AnyOf(field, values) => values.iter().try_for_each(|v| field.check(v)),
        }
    }

    #[must_use]
    pub fn matches(&self, record: &CotRecord) -> bool {
        match self {
            QueryFilter::All => true,
            QueryFilter::Equals(field, value) => field.value_of(record) == *value,
            QueryFilter::AnyOf(field, values) => {
                let actual = field.value_of(record);
                values.iter().any(|v| *v == actual)
            }
        }
    }
}
