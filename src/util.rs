use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};

/// Builds the shared HTTP client used for every upstream request
///
/// # Errors
/// Errors when the TLS backend cannot be initialised
pub fn init_http_client() -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "User-Agent",
        HeaderValue::from_static(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION"),
            " (+",
            env!("CARGO_PKG_REPOSITORY"),
            ")"
        )),
    );

    reqwest::Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Building HTTP client")
}

/// Replaces the file at `path` with `contents`
///
/// The data is written to a sibling temporary file first and then renamed over the
/// target, so readers observe either the old or the new file, never a partial one.
///
/// # Errors
/// Errors when the temporary file cannot be written or renamed
pub async fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    let file_name = path
        .file_name()
        .context("Target path has no file name")?
        .to_string_lossy();
    let temp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    tokio::fs::write(&temp_path, contents)
        .await
        .with_context(|| format!("Writing {}", temp_path.display()))?;

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        tokio::fs::remove_file(&temp_path).await.ok();
        return Err(e).with_context(|| format!("Replacing {}", path.display()));
    }

    Ok(())
}
