//! `delayed` command: the release-lagged business-day series of one report.

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;
use cot_etl_cftc::CftcClient;
use cot_etl_core::{AppConfig, ReportType};
use cot_etl_data::{CotRecord, HistoryStore, MemoryReportStore};
use cot_etl_pipeline::{DelayedPoint, Pipeline, PointKind};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments for the delayed command.
#[derive(Args, Debug, Clone)]
pub struct DelayedArgs {
    /// Report type to build the series for
    #[arg(long)]
    pub report: ReportType,

    /// CFTC contract market code (overrides `pipeline.market_code`)
    #[arg(long)]
    pub market_code: Option<String>,

    /// Business days between as-of date and availability (overrides `pipeline.lag_business_days`)
    #[arg(long)]
    pub lag: Option<u32>,

    /// Trading calendar used past the last report (overrides `pipeline.calendar`)
    #[arg(long)]
    pub calendar: Option<String>,

    /// Fetch the report instead of reading the history file
    #[arg(long)]
    pub fresh: bool,

    /// Last day of the series, YYYY-MM-DD (default: yesterday)
    #[arg(long)]
    pub through: Option<NaiveDate>,

    /// Output CSV file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Runs the delayed command.
///
/// # Errors
/// Returns an error if the calendar is unknown, the series cannot be built,
/// or the output cannot be written.
pub async fn run_delayed(mut config: AppConfig, args: DelayedArgs) -> Result<()> {
    if let Some(code) = &args.market_code {
        config.pipeline.market_code = code.trim().to_string();
    }
    if let Some(lag) = args.lag {
        config.pipeline.lag_business_days = lag;
    }
    if let Some(calendar) = &args.calendar {
        config.pipeline.calendar.clone_from(calendar);
    }
    let through = args
        .through
        .unwrap_or_else(|| Local::now().date_naive() - Duration::days(1));

    // The delayed series never touches the database.
    let source = Arc::new(CftcClient::from_config(&config.source)?);
    let pipeline = Pipeline::new(config.pipeline, source, Arc::new(MemoryReportStore::new()))?;
    let points = pipeline.delayed(args.report, args.fresh, through).await?;

    if points.is_empty() {
        tracing::warn!(
            "No {} observations for {}; run the pipeline first or pass --fresh",
            args.report,
            pipeline.config().market_code
        );
    }

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    let rows = write_series(writer, args.report, &points)?;

    if let Some(path) = &args.output {
        tracing::info!("Wrote {} rows to {}", rows, path.display());
    }
    Ok(())
}

fn kind_label(kind: PointKind) -> &'static str {
    match kind {
        PointKind::Reported => "reported",
        PointKind::Filled => "filled",
        PointKind::Extended => "extended",
    }
}

/// Writes the series as CSV and returns the number of data rows.
pub fn write_series<W: Write>(
    writer: W,
    report: ReportType,
    points: &[DelayedPoint<CotRecord>],
) -> Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["date", "report_date", "kind"];
    header.extend(HistoryStore::header(report.family()).into_iter().skip(1));
    csv.write_record(&header)?;

    for point in points {
        let record = &point.value;
        let mut row = vec![
            point.date.format("%Y-%m-%d").to_string(),
            point.report_date.format("%Y-%m-%d").to_string(),
            kind_label(point.kind).to_string(),
            record.market_code.clone(),
            record.report_type.as_str().to_string(),
        ];
        row.extend(
            record
                .values
                .iter()
                .chain([&record.net_spec_length, &record.pct_of_oi_net_spec])
                .map(|v| v.map(|d| d.to_string()).unwrap_or_default()),
        );
        csv.write_record(&row)?;
    }

    csv.flush()?;
    Ok(points.len())
}
