use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Upsert keyed on `unique_row_id`: matched rows get every mutable column
/// overwritten, unmatched rows are inserted whole. Nothing is ever deleted
/// from the persistent table. Staging must already be deduplicated, or the
/// insert would touch the same key twice.
const UPSERT: &str = r#"
    INSERT INTO dw_sales.transactions (
        unique_row_id, invoice_no, stock_code, description,
        quantity, invoice_date, unit_price, customer_id, country
    )
    SELECT unique_row_id, invoice_no, stock_code, description,
           quantity, invoice_date, unit_price, customer_id, country
    FROM sales.transactions_staging
    WHERE unique_row_id IS NOT NULL
    ON CONFLICT (unique_row_id) DO UPDATE SET
        invoice_no   = EXCLUDED.invoice_no,
        stock_code   = EXCLUDED.stock_code,
        description  = EXCLUDED.description,
        quantity     = EXCLUDED.quantity,
        invoice_date = EXCLUDED.invoice_date,
        unit_price   = EXCLUDED.unit_price,
        customer_id  = EXCLUDED.customer_id,
        country      = EXCLUDED.country"#;

pub async fn upsert(pool: &PgPool) -> Result<u64> {
    let rows = sqlx::query(UPSERT)
        .execute(pool)
        .await
        .context("merging staging into the persistent table")?
        .rows_affected();
    info!(rows, "staging merged into persistent table");
    Ok(rows)
}
