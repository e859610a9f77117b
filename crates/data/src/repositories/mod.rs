//! Database repositories for COT reports.
//!
//! Each report family has its own table; one repository serves all of them.

pub mod cot_repo;

pub use cot_repo::CotReportRepository;
