//! CFTC Commitment of Traders source.
//!
//! This crate provides:
//! - REST client for the CFTC Public Reporting (Socrata) datasets
//! - Column cleaning and normalization of raw rows into `CotRecord`s

pub mod client;
pub mod error;
pub mod normalize;

// Re-export main types
pub use client::{dataset_id, CftcClient, CFTC_PUBLIC_REPORTING_URL};
pub use error::CftcError;
pub use normalize::{canonical_field, clean_column_name, normalize};
