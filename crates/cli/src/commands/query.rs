use anyhow::{bail, Result};
use clap::Args;
use cot_etl_core::{AppConfig, ReportFamily};
use cot_etl_data::{DatabaseClient, QueryField, QueryFilter, ReportStore};

/// Arguments for the query command.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Report family table: legacy, disaggregated or financial_futures
    #[arg(long)]
    pub family: ReportFamily,

    /// Column to filter on: date, market_code or report_type
    #[arg(long)]
    pub field: Option<QueryField>,

    /// Accepted value for --field; repeat for several
    #[arg(long = "value")]
    pub values: Vec<String>,

    /// Only print the most recent matching record
    #[arg(long)]
    pub latest: bool,
}

/// Builds the filter described by the arguments.
///
/// # Errors
/// Returns an error if only one of `--field` and `--value` is given, or a value is invalid.
pub fn build_filter(args: &QueryArgs) -> Result<QueryFilter> {
    let filter = match (args.field, args.values.is_empty()) {
        (None, true) => QueryFilter::All,
        (Some(field), false) => QueryFilter::from_values(field, args.values.clone()),
        (Some(field), true) => bail!("--field {field} needs at least one --value"),
        (None, false) => bail!("--value needs --field"),
    };
    filter.check()?;
    Ok(filter)
}

/// Runs the query command, printing matching records as JSON.
///
/// # Errors
/// Returns an error if the filter is invalid or the database query fails.
pub async fn run_query(config: &AppConfig, args: QueryArgs) -> Result<()> {
    let filter = build_filter(&args)?;
    let db = DatabaseClient::connect(&config.database).await?;
    let repo = db.repository();

    if args.latest {
        match repo.latest(args.family, &filter).await? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => tracing::info!("No {} records match", args.family),
        }
    } else {
        let records = repo.query(args.family, &filter).await?;
        tracing::info!("{} {} records match", records.len(), args.family);
        println!("{}", serde_json::to_string_pretty(&records)?);
    }
    Ok(())
}
