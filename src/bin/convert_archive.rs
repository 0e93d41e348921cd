use anyhow::Result;
use reqwest::Client;
use retailetl::{clean, config::Config, extract, fetch};
use std::fs;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Fetch, extract, and clean without touching the warehouse. Useful for
/// inspecting the cleaned CSVs before a full pipeline run.
#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cfg = Config::from_env();
    fs::create_dir_all(&cfg.data_dir)?;

    let client = Client::new();
    let archive = fetch::download_archive(&client, &cfg.archive_url, &cfg.data_dir).await?;

    let data_dir = cfg.data_dir.clone();
    let raw_csvs =
        tokio::task::spawn_blocking(move || extract::convert_archive(&archive, &data_dir))
            .await??;

    for path in &raw_csvs {
        let cleaned = clean::clean_csv(path)?;
        info!(raw = %path.display(), cleaned = %cleaned.display(), "ready");
    }
    Ok(())
}
