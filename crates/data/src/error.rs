//! Error types for COT storage.

use cot_etl_core::ReportFamily;
use thiserror::Error;

use crate::models::QueryField;

/// Errors raised by the database layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be reached or the URL is invalid.
    #[error("failed to connect to database: {0}")]
    Connection(#[source] sqlx::Error),

    /// Creating or dropping tables failed.
    #[error("schema migration failed: {0}")]
    Migration(#[source] sqlx::Error),

    /// Any other database failure.
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A record was routed to the table of another report family.
    #[error("cannot store {report_type} row in the {expected} table")]
    FamilyMismatch {
        /// Family of the target table.
        expected: ReportFamily,
        /// Report type tag of the offending row.
        report_type: String,
    },

    /// A filter value does not fit its field.
    #[error("invalid value '{value}' for query field {field}")]
    InvalidQueryValue {
        /// Field being filtered.
        field: QueryField,
        /// Rejected value.
        value: String,
    },

    /// Filter on a column that is not queryable.
    #[error("unknown query field '{0}'")]
    UnknownQueryField(String),
}
