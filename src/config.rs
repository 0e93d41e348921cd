use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_ARCHIVE_URL: &str =
    "https://archive.ics.uci.edu/static/public/352/online+retail.zip";

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the transactions archive is fetched from.
    pub archive_url: String,
    /// Directory holding the archive and every derived CSV.
    pub data_dir: PathBuf,
    /// Postgres connection string; only required by stages that touch the
    /// warehouse.
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let archive_url = env::var("RETAILETL_ARCHIVE_URL")
            .unwrap_or_else(|_| DEFAULT_ARCHIVE_URL.to_string());
        let data_dir = env::var("RETAILETL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        let database_url = env::var("DATABASE_URL").ok();
        Config {
            archive_url,
            data_dir,
            database_url,
        }
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres connection string")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_url_is_an_error_only_when_required() {
        let cfg = Config {
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            database_url: None,
        };
        assert!(cfg.require_database_url().is_err());

        let cfg = Config {
            database_url: Some("postgres://localhost/retail".to_string()),
            ..cfg
        };
        assert_eq!(
            cfg.require_database_url().unwrap(),
            "postgres://localhost/retail"
        );
    }
}
