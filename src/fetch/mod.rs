use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;
use url::Url;

/// Download the transactions archive into `dest_dir`, naming the file after
/// the last path segment of the URL. An archive that is already on disk is
/// never re-downloaded; its path is returned as-is.
///
/// A failed download propagates as an error so the invoking task aborts;
/// retry policy belongs to whatever schedules the run.
pub async fn download_archive(
    client: &Client,
    url_str: &str,
    dest_dir: impl AsRef<Path>,
) -> Result<PathBuf> {
    let dest_dir = dest_dir.as_ref();
    let url = Url::parse(url_str).with_context(|| format!("invalid archive url `{}`", url_str))?;
    let filename = url
        .path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .unwrap_or("download.zip");
    let dest_path = dest_dir.join(filename);

    if fs::try_exists(&dest_path).await? {
        info!(path = %dest_path.display(), "archive already downloaded");
        return Ok(dest_path);
    }

    fs::create_dir_all(dest_dir).await?;

    info!(url = %url, "downloading archive");
    let resp = client.get(url.as_str()).send().await?.error_for_status()?;
    let bytes = resp.bytes().await?;
    fs::write(&dest_path, &bytes)
        .await
        .with_context(|| format!("writing archive to `{}`", dest_path.display()))?;
    info!(path = %dest_path.display(), bytes = bytes.len(), "archive downloaded");

    Ok(dest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn existing_archive_is_not_redownloaded() -> Result<()> {
        let dir = tempdir()?;
        let existing = dir.path().join("online+retail.zip");
        fs::write(&existing, b"sentinel").await?;

        // The URL is unreachable on purpose; the existence check must win
        // before any request is made.
        let client = Client::new();
        let path = download_archive(
            &client,
            "http://127.0.0.1:1/static/public/352/online+retail.zip",
            dir.path(),
        )
        .await?;

        assert_eq!(path, existing);
        assert_eq!(fs::read(&path).await?, b"sentinel");
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_url_fails_the_task() {
        let dir = tempdir().unwrap();
        let client = Client::new();
        let result = download_archive(
            &client,
            "http://127.0.0.1:1/static/public/352/online+retail.zip",
            dir.path(),
        )
        .await;
        assert!(result.is_err());
    }
}
