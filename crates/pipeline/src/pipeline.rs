//! The COT collection pipeline.
//!
//! For each configured report type: fetch, normalize, optionally drop dates
//! already in the history file, append the rest to history and upsert them
//! into the store.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use cot_etl_cftc::normalize;
use cot_etl_core::{PipelineConfig, ReportSource, ReportType};
use cot_etl_data::{upsert_batch, BatchOutcome, CotRecord, HistoryStore, ReportStore};
use serde::Serialize;
use std::sync::Arc;

use crate::backfill::{delayed_series, DelayedPoint};
use crate::calendar::{calendar_by_name, CalendarError, TradingCalendar};
use crate::dedup::filter_unseen;

/// What happened to one report type during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportOutcome {
    pub report_type: ReportType,
    /// Raw rows returned by the source
    pub fetched: usize,
    /// Rows left after normalization (one per date)
    pub normalized: usize,
    /// Rows left after the history filter
    pub kept: usize,
    /// Rows appended to the history file
    pub appended: usize,
    pub batch: BatchOutcome,
}

/// Per-report outcomes of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub market_code: String,
    pub reports: Vec<ReportOutcome>,
}

impl PipelineSummary {
    #[must_use]
    pub fn total_appended(&self) -> usize {
        self.reports.iter().map(|r| r.appended).sum()
    }

    #[must_use]
    pub fn total_stored(&self) -> u64 {
        self.reports.iter().map(|r| r.batch.rows_written()).sum()
    }

    /// Report types whose database batch failed.
    #[must_use]
    pub fn failed_reports(&self) -> Vec<ReportType> {
        self.reports
            .iter()
            .filter(|r| r.batch.is_failed())
            .map(|r| r.report_type)
            .collect()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    source: Arc<dyn ReportSource>,
    store: Arc<dyn ReportStore>,
    history: HistoryStore,
    calendar: Box<dyn TradingCalendar>,
}

impl Pipeline {
    /// Creates a pipeline writing history files under `config.data_dir`.
    ///
    /// # Errors
    /// Returns [`CalendarError::Unknown`] if `config.calendar` is not a known calendar.
    pub fn new(
        config: PipelineConfig,
        source: Arc<dyn ReportSource>,
        store: Arc<dyn ReportStore>,
    ) -> Result<Self, CalendarError> {
        let calendar = calendar_by_name(&config.calendar)?;
        let history = HistoryStore::new(config.data_dir.clone());
        Ok(Self {
            config,
            source,
            store,
            history,
            calendar,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    async fn fetch_normalized(&self, report: ReportType) -> Result<(usize, Vec<CotRecord>)> {
        let market_code = &self.config.market_code;
        let raw = self
            .source
            .fetch(report, market_code)
            .await
            .with_context(|| format!("Failed to fetch {report} for market {market_code}"))?;
        let records = normalize(report, market_code, &raw);
        Ok((raw.len(), records))
    }

    /// Collects one report type.
    ///
    /// # Errors
    /// Returns an error if the fetch fails or the history file cannot be read
    /// or written. A failed database batch is reported in the outcome instead.
    pub async fn populate_report(&self, report: ReportType) -> Result<ReportOutcome> {
        let market_code = &self.config.market_code;
        let (fetched, records) = self.fetch_normalized(report).await?;
        let normalized = records.len();

        let kept = if self.config.skip_seen {
            let seen = self.history.seen_dates(report, market_code)?;
            filter_unseen(records, &seen)
        } else {
            records
        };

        if kept.is_empty() {
            tracing::info!("No new {} rows for {}", report, market_code);
        }

        let appended = self
            .history
            .append(&kept)
            .with_context(|| format!("Failed to append {report} history"))?;
        let batch = upsert_batch(self.store.as_ref(), report.family(), &kept).await;

        tracing::info!(
            "{}: fetched {}, normalized {}, kept {}, appended {}, db: {}",
            report,
            fetched,
            normalized,
            kept.len(),
            appended,
            batch
        );

        Ok(ReportOutcome {
            report_type: report,
            fetched,
            normalized,
            kept: kept.len(),
            appended,
            batch,
        })
    }

    /// Collects every configured report type in order, stopping at the first error.
    ///
    /// # Errors
    /// Propagates the first error from [`Pipeline::populate_report`].
    pub async fn run(&self) -> Result<PipelineSummary> {
        tracing::info!(
            "Starting COT run for market {} ({} reports, source {})",
            self.config.market_code,
            self.config.reports.len(),
            self.source.name()
        );

        let mut reports = Vec::with_capacity(self.config.reports.len());
        for report in &self.config.reports {
            reports.push(self.populate_report(*report).await?);
        }

        let summary = PipelineSummary {
            market_code: self.config.market_code.clone(),
            reports,
        };
        tracing::info!(
            "COT run finished: {} rows appended, {} rows stored",
            summary.total_appended(),
            summary.total_stored()
        );
        Ok(summary)
    }

    /// Business-day series of one report type, newest first, extended through `through`.
    ///
    /// Reads the history file, or fetches the report again when `fresh` is set.
    ///
    /// # Errors
    /// Returns an error if the fetch or the history read fails.
    pub async fn delayed(
        &self,
        report: ReportType,
        fresh: bool,
        through: NaiveDate,
    ) -> Result<Vec<DelayedPoint<CotRecord>>> {
        let records = if fresh {
            self.fetch_normalized(report).await?.1
        } else {
            self.history
                .load(report, &self.config.market_code)
                .with_context(|| format!("Failed to load {report} history"))?
        };

        let observations: Vec<(NaiveDate, CotRecord)> =
            records.into_iter().map(|r| (r.date, r)).collect();
        let points = delayed_series(
            &observations,
            self.config.lag_business_days,
            self.calendar.as_ref(),
            through,
        );

        tracing::info!(
            "Delayed {} series: {} points from {} reports (lag {}, calendar {})",
            report,
            points.len(),
            observations.len(),
            self.config.lag_business_days,
            self.calendar.name()
        );
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::PointKind;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use cot_etl_core::{RawReportRow, ReportFamily};
    use cot_etl_data::{MemoryReportStore, QueryFilter};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeSource {
        rows: Mutex<BTreeMap<ReportType, Vec<RawReportRow>>>,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                rows: Mutex::new(BTreeMap::new()),
            }
        }

        fn set(&self, report: ReportType, rows: Vec<RawReportRow>) {
            self.rows.lock().unwrap().insert(report, rows);
        }
    }

    #[async_trait]
    impl ReportSource for FakeSource {
        async fn fetch(&self, report: ReportType, _market_code: &str) -> Result<Vec<RawReportRow>> {
            self.rows
                .lock()
                .unwrap()
                .get(&report)
                .cloned()
                .ok_or_else(|| anyhow!("report {report} unavailable"))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn row(date: &str, long: &str, short: &str) -> RawReportRow {
        [
            ("report_date_as_yyyy_mm_dd", date),
            ("cftc_contract_market_code", "058643"),
            ("m_money_positions_long_all", long),
            ("m_money_positions_short_all", short),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn config(dir: &TempDir, reports: Vec<ReportType>, skip_seen: bool) -> PipelineConfig {
        PipelineConfig {
            reports,
            data_dir: dir.path().to_path_buf(),
            skip_seen,
            calendar: "weekdays".to_string(),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_unknown_calendar_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut cfg = config(&dir, vec![], false);
        cfg.calendar = "moon".to_string();

        let result = Pipeline::new(
            cfg,
            Arc::new(FakeSource::new()),
            Arc::new(MemoryReportStore::new()),
        );
        assert!(matches!(result, Err(CalendarError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_run_inserts_then_updates() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        let store = Arc::new(MemoryReportStore::new());
        source.set(
            ReportType::DisaggregatedFut,
            vec![row("2024-01-02", "100", "30"), row("2024-01-09", "120", "20")],
        );

        let pipeline = Pipeline::new(
            config(&dir, vec![ReportType::DisaggregatedFut], false),
            source.clone(),
            store.clone(),
        )
        .unwrap();

        let first = pipeline.run().await.unwrap();
        assert_eq!(first.reports[0].fetched, 2);
        assert_eq!(first.reports[0].appended, 2);
        assert_eq!(first.reports[0].batch, BatchOutcome::Inserted { rows: 2 });

        // Without the history filter the same rows go through the update path
        let second = pipeline.run().await.unwrap();
        assert!(matches!(
            second.reports[0].batch,
            BatchOutcome::Updated { rows: 2, attempted: 2, .. }
        ));
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 2);

        let latest = store
            .latest(ReportFamily::Disaggregated, &QueryFilter::All)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.date, date(2024, 1, 9));
        assert_eq!(latest.net_spec_length, Some(dec!(100)));

        // History is append-only, so it now holds every row twice
        let history = pipeline
            .history()
            .load(ReportType::DisaggregatedFut, "058643")
            .unwrap();
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn test_skip_seen_only_appends_new_dates() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        let store = Arc::new(MemoryReportStore::new());
        let pipeline = Pipeline::new(
            config(&dir, vec![ReportType::DisaggregatedFut], true),
            source.clone(),
            store.clone(),
        )
        .unwrap();

        source.set(
            ReportType::DisaggregatedFut,
            vec![row("2024-01-02", "100", "30"), row("2024-01-09", "120", "20")],
        );
        pipeline.run().await.unwrap();

        source.set(
            ReportType::DisaggregatedFut,
            vec![
                row("2024-01-02", "100", "30"),
                row("2024-01-09", "120", "20"),
                row("2024-01-16", "90", "45"),
            ],
        );
        let summary = pipeline.run().await.unwrap();
        let outcome = &summary.reports[0];

        assert_eq!(outcome.normalized, 3);
        assert_eq!(outcome.kept, 1);
        assert_eq!(outcome.appended, 1);
        assert_eq!(outcome.batch, BatchOutcome::Inserted { rows: 1 });
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 3);

        // Nothing new: empty batch, nothing appended
        let again = pipeline.run().await.unwrap();
        assert_eq!(again.reports[0].batch, BatchOutcome::Empty);
        assert_eq!(again.total_appended(), 0);
    }

    #[tokio::test]
    async fn test_default_config_stores_each_new_week() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        let store = Arc::new(MemoryReportStore::new());
        let pipeline = Pipeline::new(
            PipelineConfig {
                reports: vec![ReportType::DisaggregatedFut],
                data_dir: dir.path().to_path_buf(),
                ..PipelineConfig::default()
            },
            source.clone(),
            store.clone(),
        )
        .unwrap();

        source.set(
            ReportType::DisaggregatedFut,
            vec![row("2024-01-02", "100", "30"), row("2024-01-09", "120", "20")],
        );
        pipeline.run().await.unwrap();
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 2);

        source.set(
            ReportType::DisaggregatedFut,
            vec![
                row("2024-01-02", "100", "30"),
                row("2024-01-09", "120", "20"),
                row("2024-01-16", "90", "45"),
            ],
        );
        let summary = pipeline.run().await.unwrap();

        assert_eq!(summary.reports[0].batch, BatchOutcome::Inserted { rows: 1 });
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 3);
        let history = pipeline
            .history()
            .load(ReportType::DisaggregatedFut, "058643")
            .unwrap();
        let dates: Vec<_> = history.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![date(2024, 1, 2), date(2024, 1, 9), date(2024, 1, 16)]);
    }

    #[tokio::test]
    async fn test_run_stops_at_first_fetch_error() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        source.set(ReportType::DisaggregatedFut, vec![row("2024-01-02", "1", "1")]);
        let store = Arc::new(MemoryReportStore::new());

        let pipeline = Pipeline::new(
            config(
                &dir,
                vec![ReportType::LegacyFut, ReportType::DisaggregatedFut],
                false,
            ),
            source,
            store.clone(),
        )
        .unwrap();

        let err = pipeline.run().await.unwrap_err();
        assert!(format!("{err:#}").contains("Failed to fetch legacy_fut"));
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delayed_from_history_and_fresh() {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(FakeSource::new());
        source.set(
            ReportType::DisaggregatedFut,
            vec![row("2024-01-02", "100", "30"), row("2024-01-09", "120", "20")],
        );
        let pipeline = Pipeline::new(
            config(&dir, vec![ReportType::DisaggregatedFut], false),
            source,
            Arc::new(MemoryReportStore::new()),
        )
        .unwrap();

        // No history yet
        let empty = pipeline
            .delayed(ReportType::DisaggregatedFut, false, date(2024, 1, 17))
            .await
            .unwrap();
        assert!(empty.is_empty());

        let fresh = pipeline
            .delayed(ReportType::DisaggregatedFut, true, date(2024, 1, 17))
            .await
            .unwrap();
        assert_eq!(fresh.len(), 8);
        assert_eq!(fresh[0].date, date(2024, 1, 17));
        assert_eq!(fresh[0].kind, PointKind::Extended);
        assert_eq!(fresh[0].value.net_spec_length, Some(dec!(100)));

        pipeline.run().await.unwrap();
        let from_history = pipeline
            .delayed(ReportType::DisaggregatedFut, false, date(2024, 1, 17))
            .await
            .unwrap();
        assert_eq!(from_history, fresh);
    }

    #[test]
    fn test_summary_totals() {
        let summary = PipelineSummary {
            market_code: "058643".to_string(),
            reports: vec![
                ReportOutcome {
                    report_type: ReportType::LegacyFut,
                    fetched: 3,
                    normalized: 3,
                    kept: 3,
                    appended: 3,
                    batch: BatchOutcome::Inserted { rows: 3 },
                },
                ReportOutcome {
                    report_type: ReportType::LegacyFutopt,
                    fetched: 2,
                    normalized: 2,
                    kept: 2,
                    appended: 2,
                    batch: BatchOutcome::Failed {
                        insert_error: "a".to_string(),
                        update_error: "b".to_string(),
                    },
                },
            ],
        };

        assert_eq!(summary.total_appended(), 5);
        assert_eq!(summary.total_stored(), 3);
        assert_eq!(summary.failed_reports(), vec![ReportType::LegacyFutopt]);
    }
}
