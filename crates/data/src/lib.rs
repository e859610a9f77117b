//! Storage for normalized COT reports.
//!
//! This crate provides:
//! - The `CotRecord` model and typed query filters
//! - Append-only CSV history files per report series
//! - `PostgreSQL` connection, migrations and the COT repository
//! - The insert-then-update upsert path over any `ReportStore`

pub mod csv_storage;
pub mod database;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

// Re-export commonly used types
pub use csv_storage::HistoryStore;
pub use database::DatabaseClient;
pub use error::StoreError;
pub use models::{CotRecord, QueryField, QueryFilter};
pub use repositories::CotReportRepository;
pub use store::{upsert_batch, BatchOutcome, MemoryReportStore, ReportStore};
