use cot_etl_core::{DatabaseConfig, ReportFamily};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;

use crate::error::StoreError;
use crate::repositories::CotReportRepository;

pub struct DatabaseClient {
    pool: PgPool,
    schema: Option<String>,
}

impl DatabaseClient {
    /// Connects to the `PostgreSQL` database described by `config`.
    ///
    /// When a schema is configured it is placed on every connection's
    /// `search_path`, so tables are created and read there.
    ///
    /// # Errors
    /// Returns [`StoreError::Connection`] if the URL is invalid or the database
    /// cannot be reached.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        tracing::info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options(config)?)
            .await
            .map_err(StoreError::Connection)?;

        tracing::info!("Connection established");
        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    #[must_use]
    pub fn repository(&self) -> CotReportRepository {
        CotReportRepository::new(self.pool.clone())
    }

    /// Creates the schema (if configured) and every COT table that does not exist yet.
    ///
    /// # Errors
    /// Returns [`StoreError::Migration`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Migration)?;

        if let Some(schema) = &self.schema {
            sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema)))
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Migration)?;
        }

        for family in ReportFamily::ALL {
            for statement in create_table_sql(family) {
                sqlx::query(&statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::Migration)?;
            }
        }

        tx.commit().await.map_err(StoreError::Migration)?;
        tracing::info!("Migrations completed");
        Ok(())
    }

    /// Drops every COT table.
    ///
    /// # Errors
    /// Returns [`StoreError::Migration`] if any statement fails.
    pub async fn clean(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Migration)?;

        for family in ReportFamily::ALL {
            sqlx::query(&drop_table_sql(family))
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Migration)?;
        }

        tx.commit().await.map_err(StoreError::Migration)?;
        tracing::info!("Database cleaned");
        Ok(())
    }
}

/// DDL for one family: the table and its market/date index.
#[must_use]
pub fn create_table_sql(family: ReportFamily) -> Vec<String> {
    let numeric_columns = family
        .fields()
        .iter()
        .chain(["net_spec_length", "pct_of_oi_net_spec"].iter())
        .map(|field| format!("    {field} NUMERIC"))
        .collect::<Vec<_>>()
        .join(",\n");

    let table = family.table();
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
             date DATE NOT NULL,\n    \
             market_code TEXT NOT NULL,\n    \
             report_type TEXT NOT NULL,\n\
             {numeric_columns},\n    \
             PRIMARY KEY (date, market_code, report_type)\n)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_market_date ON {table} (market_code, date DESC)"
        ),
    ]
}

#[must_use]
pub fn drop_table_sql(family: ReportFamily) -> String {
    format!("DROP TABLE IF EXISTS {}", family.table())
}

/// Parses the URL and puts the quoted schema on `search_path`, matching
/// the name used by `CREATE SCHEMA` in [`DatabaseClient::migrate`].
fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, StoreError> {
    let options = PgConnectOptions::from_str(&config.url).map_err(StoreError::Connection)?;
    Ok(match &config.schema {
        Some(schema) => options.options([("search_path", quote_ident(schema))]),
        None => options,
    })
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
