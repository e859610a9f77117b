//! Core report types, the report source trait and layered configuration.

pub mod config;
pub mod config_loader;
pub mod traits;
pub mod types;

pub use config::{AppConfig, DatabaseConfig, PipelineConfig, SourceConfig, LUMBER_MARKET_CODE};
pub use config_loader::{ConfigLoader, DEFAULT_CONFIG_PATH};
pub use traits::ReportSource;
pub use types::{ParseReportError, RawReportRow, ReportFamily, ReportType, SpeculativeFields};
