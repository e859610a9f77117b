use anyhow::Result;
use cot_etl_core::AppConfig;
use cot_etl_data::DatabaseClient;

/// Creates the schema and COT tables.
///
/// # Errors
/// Returns an error if the database is unreachable or a statement fails.
pub async fn run_migrate(config: &AppConfig) -> Result<()> {
    let db = DatabaseClient::connect(&config.database).await?;
    db.migrate().await?;
    Ok(())
}

/// Drops the COT tables.
///
/// # Errors
/// Returns an error if the database is unreachable or a statement fails.
pub async fn run_clean(config: &AppConfig) -> Result<()> {
    let db = DatabaseClient::connect(&config.database).await?;
    db.clean().await?;
    Ok(())
}
