//! CLI commands for the COT pipeline.

pub mod delayed;
pub mod migrate;
pub mod populate;
pub mod query;

pub use delayed::{run_delayed, DelayedArgs};
pub use migrate::{run_clean, run_migrate};
pub use populate::{run_populate, RunArgs};
pub use query::{run_query, QueryArgs};
