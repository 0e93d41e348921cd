use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub mod dedup;
pub mod merge;
pub mod schema;
pub mod staging;

/// Open a small connection pool against the warehouse. The pipeline runs its
/// tasks strictly in sequence, so a handful of connections is plenty.
pub async fn connect(database_url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(4)
        .connect(database_url)
        .await
        .context("connecting to the warehouse database")
}
