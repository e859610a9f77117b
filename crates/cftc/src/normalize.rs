//! Turns raw report rows into [`CotRecord`]s.
//!
//! Header spellings differ between the API datasets and the yearly text
//! files, so names are cleaned and then mapped onto the canonical family
//! fields before values are read.

use chrono::NaiveDate;
use cot_etl_core::{RawReportRow, ReportFamily, ReportType};
use cot_etl_data::CotRecord;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;

const MARKET_CODE_COLUMN: &str = "cftc_contract_market_code";

const ISO_DATE_COLUMNS: &[&str] = &[
    "report_date_as_yyyy_mm_dd",
    "as_of_date_in_form_yyyy_mm_dd",
];
const SHORT_DATE_COLUMN: &str = "as_of_date_in_form_yymmdd";

/// Text-file spellings that do not reduce to a canonical field on their own.
const LEGACY_ALIASES: &[(&str, &str)] = &[
    ("noncomm_positions_spreading_all", "noncomm_postions_spread_all"),
    ("noncomm_positions_spread_all", "noncomm_postions_spread_all"),
    ("tot_rept_positions_short_all", "tot_rept_positions_short"),
];
const DISAGGREGATED_ALIASES: &[(&str, &str)] = &[
    ("m_money_positions_spreading_all", "m_money_positions_spread_all"),
    ("pct_of_oi_m_money_spreading_all", "pct_of_oi_m_money_spread_all"),
];
const FINANCIAL_FUTURES_ALIASES: &[(&str, &str)] = &[
    ("tot_rept_positions_short_all", "tot_rept_positions_short"),
];

/// Cleans a raw column header: spaces and dashes become underscores,
/// parentheses and `=` are dropped, `%` becomes `Per`, then lower-cased.
#[must_use]
pub fn clean_column_name(raw: &str) -> String {
    raw.trim()
        .replace(' ', "_")
        .replace(['(', ')'], "")
        .replace('-', "_")
        .replace('%', "Per")
        .replace('=', "")
        .to_lowercase()
}

fn aliases(family: ReportFamily) -> &'static [(&'static str, &'static str)] {
    match family {
        ReportFamily::Legacy => LEGACY_ALIASES,
        ReportFamily::Disaggregated => DISAGGREGATED_ALIASES,
        ReportFamily::FinancialFutures => FINANCIAL_FUTURES_ALIASES,
    }
}

/// Maps a cleaned column name onto the family's canonical field, if any.
#[must_use]
pub fn canonical_field(family: ReportFamily, cleaned: &str) -> Option<&'static str> {
    let name = match cleaned.strip_prefix("per_of_") {
        Some(rest) => format!("pct_of_{rest}"),
        None => cleaned.to_string(),
    };

    if let Some(idx) = family.field_index(&name) {
        return Some(family.fields()[idx]);
    }
    if let Some((_, target)) = aliases(family).iter().find(|(from, _)| *from == name) {
        return Some(*target);
    }
    name.strip_suffix("_all")
        .and_then(|short| family.field_index(short))
        .map(|idx| family.fields()[idx])
}

/// Parses a cell; `"."` and blanks are missing values.
fn parse_value(raw: &str) -> Result<Option<Decimal>, rust_decimal::Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Ok(None);
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map(Some)
}

fn parse_date(row: &BTreeMap<String, &str>) -> Option<NaiveDate> {
    for column in ISO_DATE_COLUMNS {
        if let Some(raw) = row.get(*column) {
            let raw = raw.trim();
            if let Some(head) = raw.get(..10) {
                if let Ok(date) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
                    return Some(date);
                }
            }
        }
    }
    row.get(SHORT_DATE_COLUMN)
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%y%m%d").ok())
}

/// Normalizes raw rows of one report type for one market.
///
/// Rows for other markets and rows without a usable date are dropped. When a
/// date repeats, the later row wins. The result is ordered by date.
#[must_use]
pub fn normalize(report: ReportType, market_code: &str, rows: &[RawReportRow]) -> Vec<CotRecord> {
    let family = report.family();
    let market_code = market_code.trim();
    let mut by_date: BTreeMap<NaiveDate, CotRecord> = BTreeMap::new();
    let mut skipped = 0usize;

    for raw in rows {
        let row: BTreeMap<String, &str> = raw
            .iter()
            .map(|(k, v)| (clean_column_name(k), v.as_str()))
            .collect();

        if let Some(code) = row.get(MARKET_CODE_COLUMN) {
            if code.trim() != market_code {
                continue;
            }
        }

        let Some(date) = parse_date(&row) else {
            skipped += 1;
            tracing::warn!("Skipping {} row without a valid report date", report);
            continue;
        };

        let mut record = CotRecord::new(date, market_code, report);
        for (column, cell) in &row {
            let Some(field) = canonical_field(family, column) else {
                continue;
            };
            match parse_value(cell) {
                Ok(value) => {
                    record.set(field, value);
                }
                Err(e) => {
                    tracing::warn!(
                        "Unparseable {} value '{}' for {} on {}: {}",
                        field,
                        cell,
                        report,
                        date,
                        e
                    );
                }
            }
        }
        record.derive_net_positions();
        by_date.insert(date, record);
    }

    if skipped > 0 {
        tracing::warn!("Skipped {} {} rows with no date", skipped, report);
    }
    tracing::debug!("Normalized {} {} rows", by_date.len(), report);
    by_date.into_values().collect()
}
