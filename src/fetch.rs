use std::error::Error as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use futures_util::StreamExt as _;
use reqwest::StatusCode;
use thiserror::Error;
use tokio::io::AsyncWriteExt as _;
use url::Url;

use crate::archive::{self, Snapshot};

// The archive rate-limits unfamiliar clients aggressively; identify as a
// desktop browser.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

const PAGE_TIMEOUT: Duration = Duration::from_secs(20);
const RESOURCE_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 4;
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(2);
const REFUSED_BACKOFF: Duration = Duration::from_secs(5);
const BACKOFF_CEILING: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    fn is_connection_refused(&self) -> bool {
        let Self::Transport(err) = self else {
            return false;
        };
        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                if io_err.kind() == std::io::ErrorKind::ConnectionRefused {
                    return true;
                }
            }
            source = cause.source();
        }
        false
    }
}

/// Outcome of a single fetch attempt, consumed by the retry loop as data.
enum Attempt {
    Success,
    NotFound,
    Transient(FetchError),
}

/// One archive URL to try for a resource, with the snapshot timestamp it was
/// derived from (`None` for references that were already archive paths).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub archive_url: String,
    pub timestamp: Option<String>,
}

pub fn client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")
}

/// Fetches the HTML of one page, trying each snapshot in the order supplied
/// until one serves HTTP 200 with a non-empty body. No retries here; a miss
/// simply advances to the next snapshot.
pub async fn resolve_page(
    client: &reqwest::Client,
    url: &Url,
    snapshots: &[Snapshot],
) -> Option<(String, String)> {
    for snapshot in snapshots {
        let archive_url = archive::page_url(&snapshot.timestamp, url);
        let response = match client.get(&archive_url).timeout(PAGE_TIMEOUT).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(url = %archive_url, %err, "page fetch failed; trying next snapshot");
                continue;
            }
        };
        if response.status() != StatusCode::OK {
            tracing::debug!(
                url = %archive_url,
                status = %response.status(),
                "snapshot miss; trying next"
            );
            continue;
        }
        match response.text().await {
            Ok(body) if !body.trim().is_empty() => {
                return Some((body, snapshot.timestamp.clone()));
            }
            Ok(_) => continue,
            Err(err) => {
                tracing::debug!(url = %archive_url, %err, "page body read failed; trying next");
                continue;
            }
        }
    }
    None
}

/// Tries each candidate in order, streaming the first full success to
/// `destination`. A 404 abandons the candidate immediately; other failures
/// retry with exponential backoff (connection-refused starts higher) before
/// moving on. Returns `false` once every candidate is exhausted; never
/// fatal to the caller.
pub async fn download(
    client: &reqwest::Client,
    candidates: &[Candidate],
    destination: &Path,
) -> bool {
    for candidate in candidates {
        if candidate.archive_url.starts_with("data:")
            || archive::is_skip_listed(&candidate.archive_url)
        {
            tracing::debug!(url = %candidate.archive_url, "skip-listed resource");
            return false;
        }

        let mut transient_delay = TRANSIENT_BACKOFF;
        let mut refused_delay = REFUSED_BACKOFF;

        for attempt in 1..=MAX_ATTEMPTS {
            match fetch_to_file(client, &candidate.archive_url, destination).await {
                Attempt::Success => return true,
                Attempt::NotFound => {
                    // Permanently absent in this snapshot; no point retrying.
                    tracing::debug!(
                        url = %candidate.archive_url,
                        timestamp = candidate.timestamp.as_deref().unwrap_or("direct"),
                        "resource not in snapshot"
                    );
                    break;
                }
                Attempt::Transient(err) => {
                    let delay = if err.is_connection_refused() {
                        let delay = refused_delay;
                        refused_delay = (refused_delay * 2).min(BACKOFF_CEILING);
                        delay
                    } else {
                        let delay = transient_delay;
                        transient_delay = (transient_delay * 2).min(BACKOFF_CEILING);
                        delay
                    };
                    tracing::warn!(
                        url = %candidate.archive_url,
                        attempt,
                        max_attempts = MAX_ATTEMPTS,
                        %err,
                        "fetch failed; backing off {}s",
                        delay.as_secs()
                    );
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
    false
}

async fn fetch_to_file(client: &reqwest::Client, url: &str, destination: &Path) -> Attempt {
    let response = match client.get(url).timeout(RESOURCE_TIMEOUT).send().await {
        Ok(response) => response,
        Err(err) => return Attempt::Transient(FetchError::Transport(err)),
    };

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Attempt::NotFound;
    }
    if !status.is_success() {
        return Attempt::Transient(FetchError::Status(status));
    }

    match stream_body(response, destination).await {
        Ok(()) => Attempt::Success,
        Err(err) => {
            // Drop any partial file so a later run cannot mistake it for a
            // completed download.
            let _ = std::fs::remove_file(destination);
            Attempt::Transient(err)
        }
    }
}

async fn stream_body(response: reqwest::Response, destination: &Path) -> Result<(), FetchError> {
    let write_err = |source: std::io::Error| FetchError::Write {
        path: destination.to_path_buf(),
        source,
    };

    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(write_err)?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Transport)?;
        file.write_all(&chunk).await.map_err(write_err)?;
    }
    file.flush().await.map_err(write_err)?;

    Ok(())
}
