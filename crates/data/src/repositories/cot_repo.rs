//! COT report repository.
//!
//! Provides all-or-nothing batch insert/update and filtered queries over the
//! per-family COT tables.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use cot_etl_core::{ReportFamily, ReportType};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::error::StoreError;
use crate::models::{CotRecord, QueryFilter};
use crate::store::{check_family, ReportStore};

/// Rows per multi-row INSERT statement; keeps bind counts well below the
/// Postgres limit of 65535 parameters.
const INSERT_CHUNK: usize = 500;

/// Repository for COT report tables.
#[derive(Debug, Clone)]
pub struct CotReportRepository {
    pool: PgPool,
}

impl CotReportRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Column list shared by every statement on a family table.
pub(crate) fn columns(family: ReportFamily) -> Vec<&'static str> {
    let mut columns = vec!["date", "market_code", "report_type"];
    columns.extend_from_slice(family.fields());
    columns.extend_from_slice(&["net_spec_length", "pct_of_oi_net_spec"]);
    columns
}

fn insert_prefix(family: ReportFamily) -> String {
    format!(
        "INSERT INTO {} ({}) ",
        family.table(),
        columns(family).join(", ")
    )
}

fn update_sql(family: ReportFamily) -> String {
    let fields = family
        .fields()
        .iter()
        .chain(["net_spec_length", "pct_of_oi_net_spec"].iter())
        .enumerate()
        .map(|(i, field)| format!("{} = ${}", field, i + 4))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {} SET {} WHERE date = $1 AND market_code = $2 AND report_type = $3",
        family.table(),
        fields
    )
}

fn select_sql(family: ReportFamily, filter: &QueryFilter, latest: bool) -> String {
    let predicate = match filter {
        QueryFilter::All => String::new(),
        QueryFilter::Equals(field, _) => {
            format!(" WHERE {} = $1::{}", field.column(), field.sql_type())
        }
        QueryFilter::AnyOf(field, _) => {
            format!(" WHERE {} = ANY($1::{}[])", field.column(), field.sql_type())
        }
    };
    let order = if latest {
        " ORDER BY date DESC LIMIT 1"
    } else {
        " ORDER BY date ASC"
    };

    format!(
        "SELECT {} FROM {}{}{}",
        columns(family).join(", "),
        family.table(),
        predicate,
        order
    )
}

fn record_from_row(family: ReportFamily, row: &PgRow) -> Result<CotRecord> {
    let date: NaiveDate = row.try_get("date")?;
    let market_code: String = row.try_get("market_code")?;
    let tag: String = row.try_get("report_type")?;
    let report_type: ReportType = tag
        .parse()
        .map_err(|e| anyhow!("row in {} has {}", family.table(), e))?;

    let mut record = CotRecord::new(date, market_code, report_type);
    for (idx, field) in family.fields().iter().enumerate() {
        record.values[idx] = row.try_get::<Option<Decimal>, _>(*field)?;
    }
    record.net_spec_length = row.try_get("net_spec_length")?;
    record.pct_of_oi_net_spec = row.try_get("pct_of_oi_net_spec")?;
    Ok(record)
}

impl CotReportRepository {
    async fn fetch(
        &self,
        family: ReportFamily,
        filter: &QueryFilter,
        latest: bool,
    ) -> Result<Vec<CotRecord>> {
        filter.check()?;
        let sql = select_sql(family, filter, latest);
        let query = match filter {
            QueryFilter::All => sqlx::query(&sql),
            QueryFilter::Equals(_, value) => sqlx::query(&sql).bind(value),
            QueryFilter::AnyOf(_, values) => sqlx::query(&sql).bind(values),
        };

        let rows = query.fetch_all(&self.pool).await.map_err(StoreError::Query)?;
        rows.iter().map(|row| record_from_row(family, row)).collect()
    }
}

#[async_trait]
impl ReportStore for CotReportRepository {
    async fn insert_batch(&self, family: ReportFamily, records: &[CotRecord]) -> Result<u64> {
        check_family(family, records)?;
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut rows = 0;

        for chunk in records.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(family));
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.date)
                    .push_bind(&record.market_code)
                    .push_bind(record.report_type.as_str());
                for value in &record.values {
                    b.push_bind(*value);
                }
                b.push_bind(record.net_spec_length)
                    .push_bind(record.pct_of_oi_net_spec);
            });

            rows += builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Query)?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn update_batch(&self, family: ReportFamily, records: &[CotRecord]) -> Result<u64> {
        check_family(family, records)?;
        if records.is_empty() {
            return Ok(0);
        }

        let sql = update_sql(family);
        let mut tx = self.pool.begin().await?;
        let mut rows = 0;

        for record in records {
            let mut query = sqlx::query(&sql)
                .bind(record.date)
                .bind(&record.market_code)
                .bind(record.report_type.as_str());
            for value in &record.values {
                query = query.bind(*value);
            }
            query = query
                .bind(record.net_spec_length)
                .bind(record.pct_of_oi_net_spec);

            rows += query
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Query)?
                .rows_affected();
        }

        tx.commit().await?;
        Ok(rows)
    }

    async fn query(&self, family: ReportFamily, filter: &QueryFilter) -> Result<Vec<CotRecord>> {
        self.fetch(family, filter, false).await
    }

    async fn latest(&self, family: ReportFamily, filter: &QueryFilter) -> Result<Option<CotRecord>> {
        Ok(self.fetch(family, filter, true).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryField;

    #[test]
    fn test_repository_new() {
        assert!(std::mem::size_of::<CotReportRepository>() > 0);
    }

    #[test]
    fn test_insert_prefix_lists_all_columns() {
        let sql = insert_prefix(ReportFamily::Disaggregated);
        assert!(sql.starts_with(
            "INSERT INTO cot_disaggregated (date, market_code, report_type, open_interest_all,"
        ));
        assert!(sql.contains("net_spec_length, pct_of_oi_net_spec)"));
    }

    #[test]
    fn test_update_sql_placeholders_follow_identity() {
        let sql = update_sql(ReportFamily::Legacy);
        let n_fields = ReportFamily::Legacy.fields().len();

        assert!(sql.starts_with("UPDATE cot_legacy SET open_interest_all = $4, "));
        assert!(sql.contains(&format!("pct_of_oi_net_spec = ${}", n_fields + 5)));
        assert!(sql.ends_with("WHERE date = $1 AND market_code = $2 AND report_type = $3"));
    }

    #[test]
    fn test_select_sql_for_each_filter() {
        let family = ReportFamily::FinancialFutures;

        let all = select_sql(family, &QueryFilter::All, false);
        assert!(all.ends_with("FROM cot_financial_futures ORDER BY date ASC"));

        let eq = select_sql(
            family,
            &QueryFilter::Equals(QueryField::Date, "2024-01-02".into()),
            true,
        );
        assert!(eq.ends_with("WHERE date = $1::date ORDER BY date DESC LIMIT 1"));

        let any = select_sql(
            family,
            &QueryFilter::AnyOf(QueryField::MarketCode, vec!["a".into(), "b".into()]),
            false,
        );
        assert!(any.contains("WHERE market_code = ANY($1::text[])"));
    }
}
