//! CFTC Public Reporting Environment client.
//!
//! COT reports are published as Socrata datasets. Rows are requested page by
//! page, filtered server-side to one contract market code.

use anyhow::Result;
use async_trait::async_trait;
use cot_etl_core::{RawReportRow, ReportSource, ReportType, SourceConfig};
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::CftcError;

/// Default CFTC public reporting base URL.
pub const CFTC_PUBLIC_REPORTING_URL: &str = "https://publicreporting.cftc.gov/resource";

const DEFAULT_PAGE_SIZE: u32 = 5000;
const MAX_ATTEMPTS: u32 = 3;

/// Socrata dataset identifier of a report type.
#[must_use]
pub fn dataset_id(report: ReportType) -> &'static str {
    match report {
        ReportType::LegacyFut => "6dca-aqww",
        ReportType::LegacyFutopt => "jun7-fc8e",
        ReportType::DisaggregatedFut => "72hh-3qpy",
        ReportType::DisaggregatedFutopt => "kh3c-gbw2",
        ReportType::TradersInFinancialFuturesFut => "gpe5-46if",
        ReportType::TradersInFinancialFuturesFutopt => "yw9f-hn96",
    }
}

/// CFTC report client.
pub struct CftcClient {
    /// HTTP client
    http: Client,
    /// Base URL for API
    base_url: String,
    /// Rows per page request
    page_size: u32,
    /// Optional Socrata application token
    app_token: Option<String>,
}

impl Default for CftcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CftcClient {
    /// Creates a new client with default settings.
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: CFTC_PUBLIC_REPORTING_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            app_token: None,
        }
    }

    /// Creates a client from the `[source]` configuration section.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
            app_token: config.app_token.clone(),
        })
    }

    /// Sets a custom base URL (useful for testing).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetches every row of a report for one market, following pages until a short page.
    ///
    /// # Errors
    /// Returns an error if any page fails after retries or cannot be decoded.
    pub async fn fetch_report(
        &self,
        report: ReportType,
        market_code: &str,
    ) -> Result<Vec<RawReportRow>, CftcError> {
        let dataset = dataset_id(report);
        let mut rows = Vec::new();
        let mut offset: u64 = 0;

        tracing::info!(
            "Fetching {} ({}) for market {}",
            report,
            dataset,
            market_code
        );

        loop {
            let page = self.fetch_page_with_retry(dataset, market_code, offset).await?;
            let page_len = page.len();
            rows.extend(page);

            if page_len < self.page_size as usize {
                break;
            }
            offset += page_len as u64;
        }

        tracing::info!("Fetched {} rows of {}", rows.len(), report);
        Ok(rows)
    }

    async fn fetch_page_with_retry(
        &self,
        dataset: &str,
        market_code: &str,
        offset: u64,
    ) -> Result<Vec<RawReportRow>, CftcError> {
        let mut attempt = 1;
        loop {
            match self.fetch_page(dataset, market_code, offset).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let backoff = Duration::from_millis(500 * 2u64.pow(attempt - 1));
                    tracing::warn!(
                        "Request for {} offset {} failed ({}), retrying in {:?}",
                        dataset,
                        offset,
                        e,
                        backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_page(
        &self,
        dataset: &str,
        market_code: &str,
        offset: u64,
    ) -> Result<Vec<RawReportRow>, CftcError> {
        let url = format!("{}/{}.json", self.base_url, dataset);
        let filter = format!(
            "cftc_contract_market_code='{}'",
            market_code.trim().replace('\'', "''")
        );
        tracing::debug!("GET {} offset={}", url, offset);

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("$where", filter),
                ("$order", ":id".to_string()),
                ("$limit", self.page_size.to_string()),
                ("$offset", offset.to_string()),
            ]);
        if let Some(token) = &self.app_token {
            request = request.header("X-App-Token", token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(CftcError::Api {
                status_code,
                message,
            });
        }

        let body = response.text().await?;
        let objects: Vec<Map<String, Value>> =
            serde_json::from_str(&body).map_err(|source| CftcError::Decode {
                dataset: dataset.to_string(),
                offset,
                source,
            })?;

        Ok(objects.into_iter().map(to_raw_row).collect())
    }
}

fn to_raw_row(object: Map<String, Value>) -> RawReportRow {
    object
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) => Some((key, s)),
            other => Some((key, other.to_string())),
        })
        .collect()
}

#[async_trait]
impl ReportSource for CftcClient {
    async fn fetch(&self, report: ReportType, market_code: &str) -> Result<Vec<RawReportRow>> {
        Ok(self.fetch_report(report, market_code).await?)
    }

    fn name(&self) -> &str {
        "cftc-public-reporting"
    }
}
