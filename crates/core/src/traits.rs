use crate::types::{RawReportRow, ReportType};
use anyhow::Result;
use async_trait::async_trait;

/// A provider of raw COT report tables.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Fetches every published row of `report` for `market_code`.
    ///
    /// Implementations may return rows for other markets; callers filter.
    async fn fetch(&self, report: ReportType, market_code: &str) -> Result<Vec<RawReportRow>>;
    fn name(&self) -> &str;
}
