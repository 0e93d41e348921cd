use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// Key every staging row by an md5 over its normalized column values: text
/// columns trimmed and upper-cased, the date fixed to second precision, the
/// unit price to two decimals. Rows that differ only cosmetically hash to
/// the same key.
const ASSIGN_KEYS: &str = r#"
    UPDATE sales.transactions_staging
    SET unique_row_id = md5(concat_ws('||',
        upper(trim(coalesce(invoice_no, ''))),
        upper(trim(coalesce(stock_code, ''))),
        upper(trim(coalesce(description, ''))),
        quantity::text,
        to_char(invoice_date, 'YYYY-MM-DD"T"HH24:MI:SS'),
        to_char(round(unit_price::numeric, 2), 'FM999999990.00'),
        coalesce(customer_id, ''),
        upper(trim(coalesce(country, '')))
    ))"#;

/// Delete rows sharing a key, keeping the earliest-loaded copy per key.
/// COPY preserves input order, so lowest ctid means first occurrence.
const DROP_DUPLICATES: &str = r#"
    DELETE FROM sales.transactions_staging a
    USING sales.transactions_staging b
    WHERE a.unique_row_id = b.unique_row_id
      AND a.ctid > b.ctid"#;

pub async fn assign_row_keys(pool: &PgPool) -> Result<u64> {
    let keyed = sqlx::query(ASSIGN_KEYS)
        .execute(pool)
        .await
        .context("assigning staging row keys")?
        .rows_affected();
    info!(rows = keyed, "row keys assigned");
    Ok(keyed)
}

pub async fn drop_duplicates(pool: &PgPool) -> Result<u64> {
    let removed = sqlx::query(DROP_DUPLICATES)
        .execute(pool)
        .await
        .context("deleting duplicate staging rows")?
        .rows_affected();
    info!(rows = removed, "duplicate staging rows removed");
    Ok(removed)
}

/// Full pass: key assignment, then duplicate removal. Idempotent for a given
/// staging content; returns the number of duplicates removed.
pub async fn dedupe(pool: &PgPool) -> Result<u64> {
    assign_row_keys(pool).await?;
    drop_duplicates(pool).await
}
