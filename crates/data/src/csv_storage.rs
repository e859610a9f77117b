//! Append-only CSV history files, one per (report type, market code).
//!
//! The history file is the authoritative record of which report dates have
//! already been collected for a series.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use cot_etl_core::{ReportFamily, ReportType};
use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::CotRecord;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct HistoryStore {
    root: PathBuf,
}

impl HistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the history of one series, e.g. `FILEDB/legacy_fut_058643.csv`.
    #[must_use]
    pub fn path_for(&self, report: ReportType, market_code: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.csv", report.as_str(), market_code.trim()))
    }

    /// CSV header for a family: identity columns, numeric fields, derived columns.
    #[must_use]
    pub fn header(family: ReportFamily) -> Vec<&'static str> {
        let mut header = vec!["date", "market_code", "report_type"];
        header.extend_from_slice(family.fields());
        header.extend_from_slice(&["net_spec_length", "pct_of_oi_net_spec"]);
        header
    }

    /// Appends records to their series files, writing the header only when a file is new.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    /// Returns an error if the directory or a file cannot be written.
    pub fn append(&self, records: &[CotRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut by_series: BTreeMap<(ReportType, &str), Vec<&CotRecord>> = BTreeMap::new();
        for record in records {
            by_series
                .entry((record.report_type, record.market_code.as_str()))
                .or_default()
                .push(record);
        }

        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create data directory: {}", self.root.display()))?;

        let mut written = 0;
        for ((report, market_code), rows) in by_series {
            let path = self.path_for(report, market_code);
            let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open history file: {}", path.display()))?;
            let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

            if is_new {
                writer.write_record(Self::header(report.family()))?;
            }

            for record in rows {
                writer.write_record(Self::to_csv_row(record))?;
                written += 1;
            }
            writer.flush()?;

            tracing::debug!("Appended to {} (new file: {})", path.display(), is_new);
        }

        Ok(written)
    }

    /// Dates already stored for a series. A missing file means no history.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or has a bad date.
    pub fn seen_dates(&self, report: ReportType, market_code: &str) -> Result<BTreeSet<NaiveDate>> {
        let path = self.path_for(report, market_code);
        if !path.exists() {
            tracing::debug!("No history at {}, treating as empty", path.display());
            return Ok(BTreeSet::new());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;
        let date_idx = reader
            .headers()?
            .iter()
            .position(|h| h == "date")
            .ok_or_else(|| anyhow!("History file {} has no date column", path.display()))?;

        let mut dates = BTreeSet::new();
        for (line, row) in reader.records().enumerate() {
            let row = row?;
            let raw = row.get(date_idx).unwrap_or_default();
            let date = NaiveDate::parse_from_str(raw, DATE_FORMAT).with_context(|| {
                format!("Bad date '{}' on row {} of {}", raw, line + 1, path.display())
            })?;
            dates.insert(date);
        }

        Ok(dates)
    }

    /// Reads every stored record of a series, in file order.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a cell cannot be parsed.
    pub fn load(&self, report: ReportType, market_code: &str) -> Result<Vec<CotRecord>> {
        let path = self.path_for(report, market_code);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let family = report.family();
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .with_context(|| format!("Failed to open history file: {}", path.display()))?;
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for (line, row) in reader.records().enumerate() {
            let row = row?;
            let mut record: Option<CotRecord> = None;
            let mut cells: Vec<(&str, &str)> = Vec::new();

            for (name, cell) in headers.iter().zip(row.iter()) {
                match name {
                    "date" => {
                        let date =
                            NaiveDate::parse_from_str(cell, DATE_FORMAT).with_context(|| {
                                format!("Bad date '{}' on row {} of {}", cell, line + 1, path.display())
                            })?;
                        record = Some(CotRecord::new(date, market_code.trim(), report));
                    }
                    "market_code" | "report_type" => {}
                    _ => cells.push((name, cell)),
                }
            }

            let mut record = record
                .ok_or_else(|| anyhow!("History file {} has no date column", path.display()))?;
            for (name, cell) in cells {
                let value = parse_cell(cell)
                    .with_context(|| format!("Bad value for {} on row {}", name, line + 1))?;
                match name {
                    "net_spec_length" => record.net_spec_length = value,
                    "pct_of_oi_net_spec" => record.pct_of_oi_net_spec = value,
                    _ if family.field_index(name).is_some() => {
                        record.set(name, value);
                    }
                    _ => {}
                }
            }
            records.push(record);
        }

        Ok(records)
    }

    fn to_csv_row(record: &CotRecord) -> Vec<String> {
        let mut row = vec![
            record.date.format(DATE_FORMAT).to_string(),
            record.market_code.clone(),
            record.report_type.as_str().to_string(),
        ];
        row.extend(record.values.iter().map(format_cell));
        row.push(format_cell(&record.net_spec_length));
        row.push(format_cell(&record.pct_of_oi_net_spec));
        row
    }
}

fn format_cell(value: &Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn parse_cell(cell: &str) -> Result<Option<Decimal>> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(None);
    }
    Ok(Some(Decimal::from_str(cell)?))
}
