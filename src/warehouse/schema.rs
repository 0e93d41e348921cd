use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Staging lives in `sales`; the persistent table in the warehouse schema.
/// Column set matches the cleaned CSV plus the synthetic `unique_row_id`,
/// which becomes the primary key once rows reach the persistent table.
const DDL: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS sales",
    "CREATE SCHEMA IF NOT EXISTS dw_sales",
    r#"
    CREATE TABLE IF NOT EXISTS sales.transactions_staging (
        unique_row_id text,
        invoice_no    text,
        stock_code    text,
        description   text,
        quantity      bigint,
        invoice_date  timestamp,
        unit_price    double precision,
        customer_id   text,
        country       text
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS dw_sales.transactions (
        unique_row_id text PRIMARY KEY,
        invoice_no    text,
        stock_code    text,
        description   text,
        quantity      bigint,
        invoice_date  timestamp,
        unit_price    double precision,
        customer_id   text,
        country       text
    )"#,
];

/// Create both schemas and both tables when absent. Safe to run every time;
/// there is deliberately no migration or versioning machinery here.
pub async fn ensure(pool: &PgPool) -> Result<()> {
    for &stmt in DDL {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .with_context(|| format!("running DDL `{}`", stmt.split_whitespace().take(6).collect::<Vec<_>>().join(" ")))?;
    }
    info!("schemas and tables ready");
    Ok(())
}
