//! Source file download with bounded retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::config::FetchSettings;

/// Retry schedule for failed downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each later one.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

impl From<&FetchSettings> for RetryPolicy {
    fn from(settings: &FetchSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_delay: settings.initial_retry_delay(),
            max_delay: settings.max_retry_delay(),
        }
    }
}

/// Downloads source files to a local directory.
pub struct Fetcher {
    client: Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            retry: RetryPolicy::from(settings),
        })
    }

    /// Download `url` into `dest_dir`, returning the written path.
    #[instrument(skip(self, dest_dir), fields(url = %url))]
    pub async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dest_dir).await?;
        let target = dest_dir.join(file_name_from_url(url)?);
        let partial = partial_path(&target);

        let mut retry = 0;
        loop {
            match self.fetch_once(url, &partial).await {
                Ok(bytes) => {
                    fs::rename(&partial, &target).await?;
                    info!(path = %target.display(), bytes, "Download completed");
                    return Ok(target);
                }
                Err(e) => {
                    retry += 1;
                    if retry > self.retry.max_retries {
                        fs::remove_file(&partial).await.ok();
                        return Err(anyhow!(
                            "Download of {url} failed after {} retries: {e}",
                            self.retry.max_retries
                        ));
                    }
                    let delay = self.retry.delay(retry);
                    warn!(
                        error = %e,
                        retry,
                        max_retries = self.retry.max_retries,
                        delay_secs = delay.as_secs(),
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn fetch_once(&self, url: &str, path: &Path) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?
            .error_for_status()?;

        let mut file = fs::File::create(path)
            .await
            .context("Failed to open output file")?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Error reading response chunk")?;
            file.write_all(&chunk).await.context("Error writing to file")?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }
}

/// In-progress download path: `data.tif` downloads to `data.tif.partial`.
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    target.with_file_name(name)
}

/// Last path segment of `url`, without query or fragment.
pub fn file_name_from_url(url: &str) -> Result<String> {
    let path = url.split(|c: char| c == '?' || c == '#').next().unwrap_or(url);
    let name = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty() && !n.contains(':'))
        .ok_or_else(|| anyhow!("Cannot derive a file name from {url}"))?;
    Ok(name.to_string())
}
