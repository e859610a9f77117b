//! `run` command: collect the configured reports into history files and the database.

use anyhow::Result;
use clap::Args;
use cot_etl_cftc::CftcClient;
use cot_etl_core::{AppConfig, ReportType};
use cot_etl_data::{DatabaseClient, MemoryReportStore, ReportStore};
use cot_etl_pipeline::{Pipeline, PipelineSummary};
use std::sync::Arc;

/// Arguments for the run command.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// CFTC contract market code (overrides `pipeline.market_code`)
    #[arg(long)]
    pub market_code: Option<String>,

    /// Report type to collect; repeat for several (overrides `pipeline.reports`)
    #[arg(long = "report")]
    pub reports: Vec<ReportType>,

    /// Resend rows whose date is already in the history file; the COT tables
    /// are rebuilt first so new dates are not lost to the update fallback
    #[arg(long)]
    pub include_seen: bool,

    /// Write history files but keep database rows in memory
    #[arg(long)]
    pub dry_run: bool,

    /// Drop and recreate the COT tables before collecting
    #[arg(long)]
    pub reset: bool,
}

/// Applies command-line overrides to the loaded configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &RunArgs) {
    if let Some(code) = &args.market_code {
        config.pipeline.market_code = code.trim().to_string();
    }
    if !args.reports.is_empty() {
        config.pipeline.reports = args.reports.clone();
    }
    if args.include_seen {
        config.pipeline.skip_seen = false;
    }
    if args.reset || !config.pipeline.skip_seen {
        config.database.reset_on_start = true;
    }
}

/// Logs every report whose database batch failed and returns their names.
///
/// Failed batches do not fail the run: the rows are already in the history
/// files and the summary records both errors.
pub fn report_failures(summary: &PipelineSummary) -> Vec<&'static str> {
    let names: Vec<&'static str> = summary
        .failed_reports()
        .iter()
        .map(|r| r.as_str())
        .collect();
    if !names.is_empty() {
        tracing::error!(
            "Database batches failed for {}; history files were still written",
            names.join(", ")
        );
    }
    names
}

/// Runs the run command.
///
/// # Errors
/// Returns an error if the database is unreachable, a report cannot be
/// fetched or history cannot be written.
pub async fn run_populate(mut config: AppConfig, args: RunArgs) -> Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    let source = Arc::new(CftcClient::from_config(&config.source)?);
    let store: Arc<dyn ReportStore> = if args.dry_run {
        tracing::info!("Dry run: database writes stay in memory");
        Arc::new(MemoryReportStore::new())
    } else {
        let db = DatabaseClient::connect(&config.database).await?;
        if config.database.reset_on_start {
            tracing::info!("Rebuilding COT tables before the run");
            db.clean().await?;
        }
        db.migrate().await?;
        Arc::new(db.repository())
    };

    let pipeline = Pipeline::new(config.pipeline, source, store)?;
    let summary = pipeline.run().await?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    report_failures(&summary);
    Ok(())
}
