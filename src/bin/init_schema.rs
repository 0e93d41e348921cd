use anyhow::Result;
use retailetl::{config::Config, warehouse};
use tracing_subscriber::{fmt, EnvFilter};

/// Run the warehouse DDL and nothing else.
#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let cfg = Config::from_env();
    let pool = warehouse::connect(cfg.require_database_url()?).await?;
    warehouse::schema::ensure(&pool).await
}
