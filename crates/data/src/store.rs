//! Report storage abstraction and the insert-then-update upsert path.
//!
//! A batch is first inserted in a single transaction. If that fails (usually
//! a primary-key collision when a run overlaps earlier dates) the transaction
//! is rolled back and the whole batch is applied as an update instead. If the
//! update fails too, the failure is logged and reported, never raised.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use cot_etl_core::{ReportFamily, ReportType};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use crate::error::StoreError;
use crate::models::{CotRecord, QueryFilter};

/// Persistent storage for COT records, one table per report family.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Inserts every record or none of them.
    async fn insert_batch(&self, family: ReportFamily, records: &[CotRecord]) -> Result<u64>;

    /// Updates existing rows by identity, all-or-nothing. Returns the rows matched.
    async fn update_batch(&self, family: ReportFamily, records: &[CotRecord]) -> Result<u64>;

    /// Records of a family matching `filter`, oldest first.
    async fn query(&self, family: ReportFamily, filter: &QueryFilter) -> Result<Vec<CotRecord>>;

    /// Most recent record of a family matching `filter`.
    async fn latest(&self, family: ReportFamily, filter: &QueryFilter) -> Result<Option<CotRecord>> {
        let records = self.query(family, filter).await?;
        Ok(records.into_iter().max_by_key(|r| r.date))
    }
}

/// Result of persisting one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Nothing to persist
    Empty,
    /// Bulk insert succeeded
    Inserted { rows: u64 },
    /// Insert failed and the update fallback succeeded
    Updated {
        rows: u64,
        attempted: u64,
        insert_error: String,
    },
    /// Both insert and update failed; the store is unchanged
    Failed {
        insert_error: String,
        update_error: String,
    },
}

impl BatchOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, BatchOutcome::Failed { .. })
    }

    /// Rows written by the successful path.
    #[must_use]
    pub fn rows_written(&self) -> u64 {
        match self {
            BatchOutcome::Inserted { rows } | BatchOutcome::Updated { rows, .. } => *rows,
            BatchOutcome::Empty | BatchOutcome::Failed { .. } => 0,
        }
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchOutcome::Empty => write!(f, "nothing to store"),
            BatchOutcome::Inserted { rows } => write!(f, "inserted {rows} rows"),
            BatchOutcome::Updated {
                rows, attempted, ..
            } => write!(f, "updated {rows} of {attempted} rows after insert conflict"),
            BatchOutcome::Failed { update_error, .. } => {
                write!(f, "insert and update failed: {update_error}")
            }
        }
    }
}

/// Inserts a batch, falling back to an update when the insert fails.
pub async fn upsert_batch<S>(store: &S, family: ReportFamily, records: &[CotRecord]) -> BatchOutcome
where
    S: ReportStore + ?Sized,
{
    if records.is_empty() {
        return BatchOutcome::Empty;
    }

    let insert_error = match store.insert_batch(family, records).await {
        Ok(rows) => {
            tracing::info!("Records added to {}: {}", family.table(), rows);
            return BatchOutcome::Inserted { rows };
        }
        Err(e) => e,
    };
    tracing::info!(
        "Insert into {} rolled back ({}), updating existing rows instead",
        family.table(),
        insert_error
    );

    let attempted = records.len() as u64;
    match store.update_batch(family, records).await {
        Ok(rows) => {
            if rows < attempted {
                tracing::warn!(
                    "Update of {} matched {} of {} rows; unmatched rows were not stored",
                    family.table(),
                    rows,
                    attempted
                );
            } else {
                tracing::info!("Records updated in {}: {}", family.table(), rows);
            }
            BatchOutcome::Updated {
                rows,
                attempted,
                insert_error: format!("{insert_error:#}"),
            }
        }
        Err(update_error) => {
            tracing::error!(
                "Error adding or updating data in {}: {:#}",
                family.table(),
                update_error
            );
            BatchOutcome::Failed {
                insert_error: format!("{insert_error:#}"),
                update_error: format!("{update_error:#}"),
            }
        }
    }
}

/// Ensures every record belongs to `family`.
///
/// # Errors
/// Returns [`StoreError::FamilyMismatch`] for the first foreign record.
pub fn check_family(family: ReportFamily, records: &[CotRecord]) -> Result<(), StoreError> {
    match records.iter().find(|r| r.family() != family) {
        Some(r) => Err(StoreError::FamilyMismatch {
            expected: family,
            report_type: r.report_type.as_str().to_string(),
        }),
        None => Ok(()),
    }
}

type RecordKey = (NaiveDate, String, ReportType);

/// Store kept in process memory, used for dry runs.
///
/// Mirrors the primary-key semantics of the database tables: inserting an
/// existing identity fails the whole batch, updates ignore unknown identities.
#[derive(Debug, Default)]
pub struct MemoryReportStore {
    tables: Mutex<BTreeMap<ReportFamily, BTreeMap<RecordKey, CotRecord>>>,
}

impl MemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows held for a family.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn count(&self, family: ReportFamily) -> Result<usize> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(tables.get(&family).map_or(0, BTreeMap::len))
    }

    fn key(record: &CotRecord) -> RecordKey {
        (record.date, record.market_code.clone(), record.report_type)
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn insert_batch(&self, family: ReportFamily, records: &[CotRecord]) -> Result<u64> {
        check_family(family, records)?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        let table = tables.entry(family).or_default();

        let mut staged = BTreeMap::new();
        for record in records {
            let key = Self::key(record);
            if table.contains_key(&key) || staged.contains_key(&key) {
                anyhow::bail!(
                    "duplicate key ({}, {}, {}) in {}",
                    record.date,
                    record.market_code,
                    record.report_type,
                    family.table()
                );
            }
            staged.insert(key, record.clone());
        }

        let rows = staged.len() as u64;
        table.extend(staged);
        Ok(rows)
    }

    async fn update_batch(&self, family: ReportFamily, records: &[CotRecord]) -> Result<u64> {
        check_family(family, records)?;
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        let table = tables.entry(family).or_default();

        let mut rows = 0;
        for record in records {
            if let Some(existing) = table.get_mut(&Self::key(record)) {
                *existing = record.clone();
                rows += 1;
            }
        }
        Ok(rows)
    }

    async fn query(&self, family: ReportFamily, filter: &QueryFilter) -> Result<Vec<CotRecord>> {
        filter.check()?;
        let tables = self
            .tables
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;

        let mut records: Vec<CotRecord> = tables
            .get(&family)
            .map(|t| t.values().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.date);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryField;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn record(d: u32, oi: rust_decimal::Decimal) -> CotRecord {
        CotRecord::new(day(d), "058643", ReportType::DisaggregatedFutopt)
            .with_value("open_interest_all", oi)
    }

    /// Store whose every operation fails.
    struct BrokenStore;

    #[async_trait]
    impl ReportStore for BrokenStore {
        async fn insert_batch(&self, _: ReportFamily, _: &[CotRecord]) -> Result<u64> {
            anyhow::bail!("connection reset")
        }

        async fn update_batch(&self, _: ReportFamily, _: &[CotRecord]) -> Result<u64> {
            anyhow::bail!("connection reset")
        }

        async fn query(&self, _: ReportFamily, _: &QueryFilter) -> Result<Vec<CotRecord>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let store = MemoryReportStore::new();
        let outcome = upsert_batch(&store, ReportFamily::Disaggregated, &[]).await;
        assert_eq!(outcome, BatchOutcome::Empty);
    }

    #[tokio::test]
    async fn test_same_batch_twice_takes_update_path() {
        let store = MemoryReportStore::new();
        let batch = vec![record(2, dec!(100)), record(9, dec!(110))];

        let first = upsert_batch(&store, ReportFamily::Disaggregated, &batch).await;
        assert_eq!(first, BatchOutcome::Inserted { rows: 2 });

        let second = upsert_batch(&store, ReportFamily::Disaggregated, &batch).await;
        assert!(matches!(
            second,
            BatchOutcome::Updated {
                rows: 2,
                attempted: 2,
                ..
            }
        ));
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_path_overwrites_values() {
        let store = MemoryReportStore::new();
        upsert_batch(&store, ReportFamily::Disaggregated, &[record(2, dec!(100))]).await;
        upsert_batch(&store, ReportFamily::Disaggregated, &[record(2, dec!(150))]).await;

        let stored = store
            .query(ReportFamily::Disaggregated, &QueryFilter::All)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].get("open_interest_all"), Some(dec!(150)));
    }

    #[tokio::test]
    async fn test_mixed_batch_update_is_lossy() {
        let store = MemoryReportStore::new();
        upsert_batch(&store, ReportFamily::Disaggregated, &[record(2, dec!(100))]).await;

        let outcome = upsert_batch(
            &store,
            ReportFamily::Disaggregated,
            &[record(2, dec!(100)), record(16, dec!(120))],
        )
        .await;

        assert!(matches!(
            outcome,
            BatchOutcome::Updated {
                rows: 1,
                attempted: 2,
                ..
            }
        ));
        assert_eq!(store.count(ReportFamily::Disaggregated).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_double_failure_is_reported_not_raised() {
        let outcome =
            upsert_batch(&BrokenStore, ReportFamily::Legacy, &[record(2, dec!(1))]).await;

        assert!(outcome.is_failed());
        assert_eq!(outcome.rows_written(), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_foreign_family() {
        let store = MemoryReportStore::new();
        let result = store
            .insert_batch(ReportFamily::Legacy, &[record(2, dec!(1))])
            .await;
        assert!(result.is_err());
        assert_eq!(store.count(ReportFamily::Legacy).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_poisoned_lock_is_an_error() {
        let store = std::sync::Arc::new(MemoryReportStore::new());
        let holder = store.clone();
        let _ = std::thread::spawn(move || {
            let _tables = holder.tables.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        assert!(store.count(ReportFamily::Disaggregated).is_err());
        let outcome =
            upsert_batch(store.as_ref(), ReportFamily::Disaggregated, &[record(2, dec!(1))]).await;
        assert!(outcome.is_failed());
    }

    #[tokio::test]
    async fn test_latest_and_filters() {
        let store = MemoryReportStore::new();
        let other = CotRecord::new(day(23), "067651", ReportType::DisaggregatedFutopt);
        store
            .insert_batch(
                ReportFamily::Disaggregated,
                &[record(9, dec!(1)), record(2, dec!(2)), other],
            )
            .await
            .unwrap();

        let lumber = QueryFilter::Equals(QueryField::MarketCode, "058643".into());
        let latest = store
            .latest(ReportFamily::Disaggregated, &lumber)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.date, day(9));

        let all = store
            .query(ReportFamily::Disaggregated, &QueryFilter::All)
            .await
            .unwrap();
        assert_eq!(
            all.iter().map(|r| r.date).collect::<Vec<_>>(),
            vec![day(2), day(9), day(23)]
        );

        let none = store
            .latest(
                ReportFamily::Disaggregated,
                &QueryFilter::Equals(QueryField::MarketCode, "000000".into()),
            )
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            BatchOutcome::Inserted { rows: 3 }.to_string(),
            "inserted 3 rows"
        );
    }
}
