use crate::types::ReportType;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CFTC contract market code for random length lumber.
pub const LUMBER_MARKET_CODE: &str = "058643";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    /// Schema placed on the connection's `search_path`.
    pub schema: Option<String>,
    pub max_connections: u32,
    /// Drop and recreate the COT tables before each run.
    pub reset_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Rows requested per page.
    pub page_size: u32,
    pub timeout_secs: u64,
    pub app_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub market_code: String,
    pub reports: Vec<ReportType>,
    /// Directory holding the per-report history CSV files.
    pub data_dir: PathBuf,
    /// Only keep rows whose date is not already in the history file.
    /// When off, every fetched row is resent and the tables must be rebuilt
    /// first, since the update fallback cannot add new dates.
    pub skip_seen: bool,
    /// Business days between a report's as-of date and its availability.
    pub lag_business_days: u32,
    /// Trading calendar used to extend the delayed series.
    pub calendar: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/cot".to_string(),
            schema: None,
            max_connections: 5,
            reset_on_start: false,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://publicreporting.cftc.gov/resource".to_string(),
            page_size: 5000,
            timeout_secs: 60,
            app_token: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            market_code: LUMBER_MARKET_CODE.to_string(),
            reports: vec![
                ReportType::DisaggregatedFutopt,
                ReportType::DisaggregatedFut,
                ReportType::LegacyFutopt,
                ReportType::LegacyFut,
            ],
            data_dir: PathBuf::from("FILEDB"),
            skip_seen: true,
            lag_business_days: 4,
            calendar: "CME_Agriculture".to_string(),
        }
    }
}

impl AppConfig {
    /// Rejects settings the pipeline cannot run with.
    ///
    /// # Errors
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.market_code.trim().is_empty() {
            bail!("pipeline.market_code must not be empty");
        }
        if self.pipeline.reports.is_empty() {
            bail!("pipeline.reports must list at least one report type");
        }
        if self.source.page_size == 0 {
            bail!("source.page_size must be greater than zero");
        }
        if self.database.max_connections == 0 {
            bail!("database.max_connections must be greater than zero");
        }
        Ok(())
    }
}
