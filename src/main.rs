use anyhow::Result;
use reqwest::Client;
use retailetl::{clean, config::Config, extract, fetch, warehouse};
use std::{fs, path::PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();
    info!("startup");

    // ─── 2) configure ────────────────────────────────────────────────
    let cfg = Config::from_env();
    fs::create_dir_all(&cfg.data_dir)?;
    let client = Client::new();
    let pool = warehouse::connect(cfg.require_database_url()?).await?;

    // ─── 3) schema init and file preparation are independent branches ─
    let schema_branch = warehouse::schema::ensure(&pool);
    let files_branch = prepare_cleaned_csvs(&client, &cfg);
    let ((), cleaned) = tokio::try_join!(schema_branch, files_branch)?;

    if cleaned.is_empty() {
        info!("no cleaned files to load; exit");
        return Ok(());
    }

    // ─── 4) refresh staging: truncate, then bulk-load each cleaned CSV
    warehouse::staging::reset(&pool).await?;
    for path in &cleaned {
        // A failed load has already rolled back; it surfaces through the
        // logs only and the run proceeds with whatever staging holds.
        if let Err(err) = warehouse::staging::load_csv(&pool, path).await {
            error!(path = %path.display(), "staging load failed: {:#}", err);
        }
    }
    let staged = warehouse::staging::count(&pool).await?;
    info!(rows = staged, "staging ready");

    // ─── 5) dedupe staging, then upsert into the persistent table ────
    let removed = warehouse::dedup::dedupe(&pool).await?;
    let merged = warehouse::merge::upsert(&pool).await?;
    info!(
        duplicates_removed = removed,
        rows_merged = merged,
        "pipeline complete"
    );

    Ok(())
}

/// Fetch → extract → clean. Returns the cleaned CSV paths ready for loading.
async fn prepare_cleaned_csvs(client: &Client, cfg: &Config) -> Result<Vec<PathBuf>> {
    let archive = fetch::download_archive(client, &cfg.archive_url, &cfg.data_dir).await?;

    // spreadsheet conversion and cleaning are CPU/file-bound; keep them off
    // the async runtime
    let data_dir = cfg.data_dir.clone();
    let raw_csvs =
        tokio::task::spawn_blocking(move || extract::convert_archive(&archive, &data_dir))
            .await??;

    let cleaned = tokio::task::spawn_blocking(move || {
        raw_csvs
            .iter()
            .map(|path| clean::clean_csv(path))
            .collect::<Result<Vec<_>>>()
    })
    .await??;

    Ok(cleaned)
}
