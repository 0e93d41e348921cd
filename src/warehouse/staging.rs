use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Transaction};
use std::path::Path;
use tokio::fs;
use tracing::{error, info};

/// Cleaned CSVs carry a header row and use the empty string for NULL.
const COPY_STAGING: &str = "\
    COPY sales.transactions_staging (\
        invoice_no, stock_code, description, quantity, \
        invoice_date, unit_price, customer_id, country\
    ) FROM STDIN WITH (FORMAT csv, HEADER true, DELIMITER ',', NULL '')";

/// Empty the staging table so the run loads into a clean slate. Runs before
/// every load; staging always reflects exactly the current run's data.
pub async fn reset(pool: &PgPool) -> Result<()> {
    sqlx::query("TRUNCATE TABLE sales.transactions_staging")
        .execute(pool)
        .await
        .context("truncating staging")?;
    info!("staging truncated");
    Ok(())
}

/// Bulk-copy one cleaned CSV into staging inside a transaction: commit on
/// success, roll back on any error. Returns the number of rows copied.
pub async fn load_csv(pool: &PgPool, csv_path: &Path) -> Result<u64> {
    let mut tx = pool.begin().await.context("opening staging transaction")?;
    match copy_into_staging(&mut tx, csv_path).await {
        Ok(rows) => {
            tx.commit().await.context("committing staging load")?;
            info!(rows, path = %csv_path.display(), "staging load committed");
            Ok(rows)
        }
        Err(err) => {
            if let Err(rb) = tx.rollback().await {
                error!(error = %rb, "staging rollback failed");
            }
            Err(err).with_context(|| format!("loading `{}` into staging", csv_path.display()))
        }
    }
}

async fn copy_into_staging(
    tx: &mut Transaction<'_, Postgres>,
    csv_path: &Path,
) -> Result<u64> {
    let data = fs::read(csv_path)
        .await
        .with_context(|| format!("reading `{}`", csv_path.display()))?;
    let mut copy = tx.copy_in_raw(COPY_STAGING).await?;
    copy.send(data.as_slice()).await?;
    let rows = copy.finish().await?;
    Ok(rows)
}

/// Current staging row count, reported after loads for observability.
pub async fn count(pool: &PgPool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sales.transactions_staging")
        .fetch_one(pool)
        .await
        .context("counting staging rows")?;
    Ok(count)
}
