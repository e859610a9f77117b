//! COT report row model.
//!
//! One market-day observation of a single report type. Numeric columns follow
//! the order of [`ReportFamily::fields`] for the record's family, which keeps
//! CSV and SQL layouts in lockstep.

use chrono::NaiveDate;
use cot_etl_core::{ReportFamily, ReportType};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A normalized COT observation.
///
/// Identity is `(date, market_code, report_type)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotRecord {
    /// Report as-of date (a Tuesday for regular weekly releases)
    pub date: NaiveDate,
    /// CFTC contract market code (e.g., "058643")
    pub market_code: String,
    pub report_type: ReportType,
    /// Values aligned with `report_type.family().fields()`; `None` marks a missing cell
    pub values: Vec<Option<Decimal>>,
    /// Speculative long minus speculative short
    pub net_spec_length: Option<Decimal>,
    /// Speculative long minus short as percent of open interest
    pub pct_of_oi_net_spec: Option<Decimal>,
}

impl CotRecord {
    /// Creates a record with every numeric field missing.
    pub fn new(date: NaiveDate, market_code: impl Into<String>, report_type: ReportType) -> Self {
        Self {
            date,
            market_code: market_code.into(),
            report_type,
            values: vec![None; report_type.family().fields().len()],
            net_spec_length: None,
            pct_of_oi_net_spec: None,
        }
    }

    #[must_use]
    pub fn family(&self) -> ReportFamily {
        self.report_type.family()
    }

    /// Value of a canonical field, `None` if missing or not part of this family.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Decimal> {
        self.family()
            .field_index(field)
            .and_then(|idx| self.values.get(idx).copied().flatten())
    }

    /// Sets a canonical field. Returns false if the family has no such field.
    pub fn set(&mut self, field: &str, value: Option<Decimal>) -> bool {
        match self.family().field_index(field) {
            Some(idx) => {
                self.values[idx] = value;
                true
            }
            None => false,
        }
    }

    /// Builder form of [`CotRecord::set`]; unknown fields are ignored.
    #[must_use]
    pub fn with_value(mut self, field: &str, value: Decimal) -> Self {
        self.set(field, Some(value));
        self
    }

    /// Computes the net speculative columns from the family's long/short fields.
    pub fn derive_net_positions(&mut self) {
        let spec = self.family().speculative_fields();
        self.net_spec_length = match (self.get(spec.long), self.get(spec.short)) {
            (Some(long), Some(short)) => Some(long - short),
            _ => None,
        };
        self.pct_of_oi_net_spec = match (self.get(spec.pct_long), self.get(spec.pct_short)) {
            (Some(long), Some(short)) => Some(long - short),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn test_new_record_has_all_fields_missing() {
        let record = CotRecord::new(sample_date(), "058643", ReportType::DisaggregatedFut);
        assert_eq!(
            record.values.len(),
            ReportFamily::Disaggregated.fields().len()
        );
        assert!(record.values.iter().all(Option::is_none));
        assert!(record.net_spec_length.is_none());
    }

    #[test]
    fn test_set_rejects_fields_of_other_families() {
        let mut record = CotRecord::new(sample_date(), "058643", ReportType::LegacyFut);
        assert!(!record.set("m_money_positions_long_all", Some(dec!(1))));
        assert!(record.set("noncomm_positions_long_all", Some(dec!(1))));
        assert_eq!(record.get("noncomm_positions_long_all"), Some(dec!(1)));
    }

    #[test]
    fn test_net_spec_length_disaggregated_fut_and_futopt() {
        for report in [ReportType::DisaggregatedFut, ReportType::DisaggregatedFutopt] {
            let mut record = CotRecord::new(sample_date(), "058643", report)
                .with_value("m_money_positions_long_all", dec!(100))
                .with_value("m_money_positions_short_all", dec!(30))
                .with_value("pct_of_oi_m_money_long_all", dec!(25.4))
                .with_value("pct_of_oi_m_money_short_all", dec!(7.1));
            record.derive_net_positions();

            assert_eq!(record.net_spec_length, Some(dec!(70)));
            assert_eq!(record.pct_of_oi_net_spec, Some(dec!(18.3)));
        }
    }

    #[test]
    fn test_net_spec_length_legacy_uses_noncommercials() {
        let mut record = CotRecord::new(sample_date(), "058643", ReportType::LegacyFutopt)
            .with_value("noncomm_positions_long_all", dec!(1500))
            .with_value("noncomm_positions_short_all", dec!(2250));
        record.derive_net_positions();

        assert_eq!(record.net_spec_length, Some(dec!(-750)));
        assert!(record.pct_of_oi_net_spec.is_none());
    }

    #[test]
    fn test_net_spec_length_missing_when_one_side_missing() {
        let mut record = CotRecord::new(sample_date(), "058643", ReportType::DisaggregatedFut)
            .with_value("m_money_positions_long_all", dec!(100));
        record.derive_net_positions();
        assert!(record.net_spec_length.is_none());
    }
}
