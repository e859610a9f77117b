//! Report kinds and the field layout of each report family.
//!
//! The CFTC publishes several Commitment of Traders reports. Each report type
//! belongs to a family that fixes which numeric columns are kept and which
//! database table stores them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One raw report row as delivered by a source: column name to cell text.
pub type RawReportRow = BTreeMap<String, String>;

/// A single COT report kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Legacy report, futures only
    LegacyFut,
    /// Legacy report, futures and options combined
    LegacyFutopt,
    /// Disaggregated report, futures only
    DisaggregatedFut,
    /// Disaggregated report, futures and options combined
    DisaggregatedFutopt,
    /// Traders in Financial Futures, futures only
    TradersInFinancialFuturesFut,
    /// Traders in Financial Futures, futures and options combined
    TradersInFinancialFuturesFutopt,
}

impl ReportType {
    pub const ALL: [ReportType; 6] = [
        ReportType::LegacyFut,
        ReportType::LegacyFutopt,
        ReportType::DisaggregatedFut,
        ReportType::DisaggregatedFutopt,
        ReportType::TradersInFinancialFuturesFut,
        ReportType::TradersInFinancialFuturesFutopt,
    ];

    /// Tag stored alongside every row and used in file names.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::LegacyFut => "legacy_fut",
            ReportType::LegacyFutopt => "legacy_futopt",
            ReportType::DisaggregatedFut => "disaggregated_fut",
            ReportType::DisaggregatedFutopt => "disaggregated_futopt",
            ReportType::TradersInFinancialFuturesFut => "traders_in_financial_futures_fut",
            ReportType::TradersInFinancialFuturesFutopt => "traders_in_financial_futures_futopt",
        }
    }

    #[must_use]
    pub fn family(self) -> ReportFamily {
        match self {
            ReportType::LegacyFut | ReportType::LegacyFutopt => ReportFamily::Legacy,
            ReportType::DisaggregatedFut | ReportType::DisaggregatedFutopt => {
                ReportFamily::Disaggregated
            }
            ReportType::TradersInFinancialFuturesFut
            | ReportType::TradersInFinancialFuturesFutopt => ReportFamily::FinancialFutures,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown report type '{0}'")]
pub struct ParseReportError(pub String);

impl FromStr for ReportType {
    type Err = ParseReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or_else(|| ParseReportError(s.to_string()))
    }
}

/// Columns that make up the net speculative position of a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeculativeFields {
    pub long: &'static str,
    pub short: &'static str,
    pub pct_long: &'static str,
    pub pct_short: &'static str,
}

/// Group of report types sharing a column layout and a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFamily {
    Legacy,
    Disaggregated,
    FinancialFutures,
}

const LEGACY_FIELDS: &[&str] = &[
    "open_interest_all",
    "noncomm_positions_long_all",
    "noncomm_positions_short_all",
    "noncomm_postions_spread_all",
    "comm_positions_long_all",
    "comm_positions_short_all",
    "tot_rept_positions_long_all",
    "tot_rept_positions_short",
    "nonrept_positions_long_all",
    "nonrept_positions_short_all",
    "change_in_open_interest_all",
    "change_in_noncomm_long_all",
    "change_in_noncomm_short_all",
    "change_in_comm_long_all",
    "change_in_comm_short_all",
    "pct_of_open_interest_all",
    "pct_of_oi_noncomm_long_all",
    "pct_of_oi_noncomm_short_all",
    "pct_of_oi_comm_long_all",
    "pct_of_oi_comm_short_all",
];

const DISAGGREGATED_FIELDS: &[&str] = &[
    "open_interest_all",
    "prod_merc_positions_long_all",
    "prod_merc_positions_short_all",
    "m_money_positions_long_all",
    "m_money_positions_short_all",
    "m_money_positions_spread_all",
    "tot_rept_positions_long_all",
    "tot_rept_positions_short_all",
    "change_in_open_interest_all",
    "change_in_prod_merc_long_all",
    "change_in_prod_merc_short_all",
    "change_in_m_money_long_all",
    "change_in_m_money_short_all",
    "pct_of_open_interest_all",
    "pct_of_oi_prod_merc_long_all",
    "pct_of_oi_prod_merc_short_all",
    "pct_of_oi_m_money_long_all",
    "pct_of_oi_m_money_short_all",
    "pct_of_oi_m_money_spread_all",
];

const FINANCIAL_FUTURES_FIELDS: &[&str] = &[
    "open_interest_all",
    "dealer_positions_long_all",
    "dealer_positions_short_all",
    "dealer_positions_spread_all",
    "asset_mgr_positions_long",
    "asset_mgr_positions_short",
    "asset_mgr_positions_spread",
    "lev_money_positions_long",
    "lev_money_positions_short",
    "lev_money_positions_spread",
    "other_rept_positions_long",
    "other_rept_positions_short",
    "tot_rept_positions_long_all",
    "tot_rept_positions_short",
    "nonrept_positions_long_all",
    "nonrept_positions_short_all",
    "change_in_open_interest_all",
    "pct_of_oi_lev_money_long",
    "pct_of_oi_lev_money_short",
];

impl ReportFamily {
    pub const ALL: [ReportFamily; 3] = [
        ReportFamily::Legacy,
        ReportFamily::Disaggregated,
        ReportFamily::FinancialFutures,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReportFamily::Legacy => "legacy",
            ReportFamily::Disaggregated => "disaggregated",
            ReportFamily::FinancialFutures => "financial_futures",
        }
    }

    /// Database table holding this family's rows.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            ReportFamily::Legacy => "cot_legacy",
            ReportFamily::Disaggregated => "cot_disaggregated",
            ReportFamily::FinancialFutures => "cot_financial_futures",
        }
    }

    /// Canonical numeric columns kept for this family, in storage order.
    #[must_use]
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            ReportFamily::Legacy => LEGACY_FIELDS,
            ReportFamily::Disaggregated => DISAGGREGATED_FIELDS,
            ReportFamily::FinancialFutures => FINANCIAL_FUTURES_FIELDS,
        }
    }

    /// Position of `field` in [`ReportFamily::fields`].
    #[must_use]
    pub fn field_index(self, field: &str) -> Option<usize> {
        self.fields().iter().position(|f| *f == field)
    }

    /// The trader category treated as speculative for this family:
    /// managed money (disaggregated), non-commercials (legacy) and
    /// leveraged funds (financial futures).
    #[must_use]
    pub fn speculative_fields(self) -> SpeculativeFields {
        match self {
            ReportFamily::Legacy => SpeculativeFields {
                long: "noncomm_positions_long_all",
                short: "noncomm_positions_short_all",
                pct_long: "pct_of_oi_noncomm_long_all",
                pct_short: "pct_of_oi_noncomm_short_all",
            },
            ReportFamily::Disaggregated => SpeculativeFields {
                long: "m_money_positions_long_all",
                short: "m_money_positions_short_all",
                pct_long: "pct_of_oi_m_money_long_all",
                pct_short: "pct_of_oi_m_money_short_all",
            },
            ReportFamily::FinancialFutures => SpeculativeFields {
                long: "lev_money_positions_long",
                short: "lev_money_positions_short",
                pct_long: "pct_of_oi_lev_money_long",
                pct_short: "pct_of_oi_lev_money_short",
            },
        }
    }
}

impl fmt::Display for ReportFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFamily {
    type Err = ParseReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == wanted || f.table() == wanted)
            .ok_or_else(|| ParseReportError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_type_round_trips_through_str() {
        for report in ReportType::ALL {
            assert_eq!(report.as_str().parse::<ReportType>().unwrap(), report);
        }
    }

    #[test]
    fn test_report_type_parse_accepts_dashes_and_case() {
        assert_eq!(
            "Disaggregated-FutOpt".parse::<ReportType>().unwrap(),
            ReportType::DisaggregatedFutopt
        );
        assert!("supplemental_futopt".parse::<ReportType>().is_err());
    }

    #[test]
    fn test_families() {
        assert_eq!(ReportType::LegacyFut.family(), ReportFamily::Legacy);
        assert_eq!(
            ReportType::DisaggregatedFutopt.family(),
            ReportFamily::Disaggregated
        );
        assert_eq!(
            ReportType::TradersInFinancialFuturesFut.family(),
            ReportFamily::FinancialFutures
        );
    }

    #[test]
    fn test_speculative_fields_are_part_of_family_fields() {
        for family in ReportFamily::ALL {
            let spec = family.speculative_fields();
            for field in [spec.long, spec.short, spec.pct_long, spec.pct_short] {
                assert!(
                    family.field_index(field).is_some(),
                    "{field} missing from {family}"
                );
            }
        }
    }

    #[test]
    fn test_fields_are_unique_per_family() {
        for family in ReportFamily::ALL {
            let mut fields = family.fields().to_vec();
            fields.sort_unstable();
            fields.dedup();
            assert_eq!(fields.len(), family.fields().len());
        }
    }

    #[test]
    fn test_family_parse_accepts_table_name() {
        assert_eq!(
            "cot_legacy".parse::<ReportFamily>().unwrap(),
            ReportFamily::Legacy
        );
        assert_eq!(
            "financial-futures".parse::<ReportFamily>().unwrap(),
            ReportFamily::FinancialFutures
        );
    }

    #[test]
    fn test_report_type_serde_uses_tag() {
        let json = serde_json::to_string(&ReportType::DisaggregatedFut).unwrap();
        assert_eq!(json, "\"disaggregated_fut\"");
    }
}
