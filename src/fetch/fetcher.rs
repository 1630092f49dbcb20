//! Resource fetcher with retry and scoped temporary storage
//!
//! Local files are validated in place. Remote resources are streamed into a
//! fresh temporary file per attempt; the file of a failed or cancelled attempt
//! is deleted when it goes out of scope, so only a successful result survives.

use super::locator::Locator;
use crate::config::FetchConfig;
use crate::import::CancellationFlag;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

/// Errors that can occur while fetching a bundle asset
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("File not readable: {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource is empty: {0}")]
    Empty(String),

    #[error("Content too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("Checksum mismatch for {locator}: expected {expected}, got {actual}")]
    Checksum {
        locator: String,
        expected: String,
        actual: String,
    },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gave up on {locator} after {attempts} attempts: {last}")]
    RetriesExhausted {
        locator: String,
        attempts: u32,
        last: Box<FetchError>,
    },

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            _ => false,
        }
    }
}

/// Where the fetched bytes live
#[derive(Debug)]
pub enum FetchedContent {
    /// The caller's own file, validated in place
    Local(PathBuf),
    /// Downloaded copy, deleted when dropped
    Temporary(TempPath),
}

/// A fetched asset plus provenance
#[derive(Debug)]
pub struct FetchResult {
    content: FetchedContent,
    pub source: Locator,
    pub retrieved_at: DateTime<Utc>,
    pub byte_size: u64,
    /// Lowercase hex SHA-256 of the content
    pub sha256: String,
}

impl FetchResult {
    pub fn path(&self) -> &Path {
        match &self.content {
            FetchedContent::Local(path) => path,
            FetchedContent::Temporary(path) => path,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.content, FetchedContent::Temporary(_))
    }

    pub fn read_to_string(&self) -> std::io::Result<String> {
        std::fs::read_to_string(self.path())
    }
}

/// Fetches local and remote bundle assets
pub struct ResourceFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl ResourceFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true);
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch one asset
    pub async fn fetch(&self, locator: &Locator, cancel: &CancellationFlag) -> Result<FetchResult, FetchError> {
        self.fetch_verified(locator, None, cancel).await
    }

    /// Fetch one asset and check it against an expected SHA-256
    pub async fn fetch_verified(
        &self,
        locator: &Locator,
        expected_sha256: Option<&str>,
        cancel: &CancellationFlag,
    ) -> Result<FetchResult, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let result = match locator {
            Locator::Local(path) => self.fetch_local(path, locator)?,
            Locator::Remote(url) => self.fetch_remote(url, locator, cancel).await?,
        };

        if let Some(expected) = expected_sha256 {
            if !expected.eq_ignore_ascii_case(&result.sha256) {
                return Err(FetchError::Checksum {
                    locator: locator.to_string(),
                    expected: expected.to_ascii_lowercase(),
                    actual: result.sha256.clone(),
                });
            }
        }
        Ok(result)
    }

    /// Fetch independent assets concurrently
    ///
    /// Results come back in completion order, each paired with its locator.
    pub async fn fetch_all(
        &self,
        locators: Vec<Locator>,
        cancel: &CancellationFlag,
    ) -> Vec<(Locator, Result<FetchResult, FetchError>)> {
        stream::iter(locators)
            .map(|locator| async move {
                let result = self.fetch(&locator, cancel).await;
                (locator, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    fn fetch_local(&self, path: &Path, locator: &Locator) -> Result<FetchResult, FetchError> {
        if !path.is_file() {
            return Err(FetchError::NotFound(path.to_path_buf()));
        }
        let mut file = File::open(path).map_err(|source| FetchError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let mut hasher = Sha256::new();
        let byte_size = std::io::copy(&mut file, &mut hasher).map_err(|source| FetchError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        if byte_size == 0 {
            return Err(FetchError::Empty(locator.to_string()));
        }
        if byte_size > self.config.max_content_size {
            return Err(FetchError::TooLarge {
                size: byte_size,
                limit: self.config.max_content_size,
            });
        }

        debug!("Validated local asset {} ({} bytes)", path.display(), byte_size);
        Ok(FetchResult {
            content: FetchedContent::Local(path.to_path_buf()),
            source: locator.clone(),
            retrieved_at: Utc::now(),
            byte_size,
            sha256: format!("{:x}", hasher.finalize()),
        })
    }

    async fn fetch_remote(
        &self,
        url: &Url,
        locator: &Locator,
        cancel: &CancellationFlag,
    ) -> Result<FetchResult, FetchError> {
        let max_attempts = self.config.max_retries + 1;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            attempt += 1;

            match self.download(url, cancel).await {
                Ok((file, byte_size, sha256)) => {
                    info!("Fetched {} ({} bytes, attempt {})", url, byte_size, attempt);
                    return Ok(FetchResult {
                        content: FetchedContent::Temporary(file.into_temp_path()),
                        source: locator.clone(),
                        retrieved_at: Utc::now(),
                        byte_size,
                        sha256,
                    });
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt - 1);
                    warn!(
                        "Transient failure fetching {} (attempt {}/{}): {}; retrying in {:?}",
                        url, attempt, max_attempts, e, delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                    }
                }
                Err(e) if e.is_transient() => {
                    return Err(FetchError::RetriesExhausted {
                        locator: locator.to_string(),
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt; the temporary file is removed if anything fails,
    /// cancellation included
    async fn download(
        &self,
        url: &Url,
        cancel: &CancellationFlag,
    ) -> Result<(NamedTempFile, u64, String), FetchError> {
        let mut response = tokio::select! {
            response = self.client.get(url.clone()).send() => response?,
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
        };
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let limit = self.config.max_content_size;
        if let Some(len) = response.content_length() {
            if len > limit {
                return Err(FetchError::TooLarge { size: len, limit });
            }
        }

        let mut file = NamedTempFile::new()?;
        let mut hasher = Sha256::new();
        let mut byte_size = 0u64;
        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk?,
                _ = cancel.cancelled() => {
                    debug!("Cancelled while reading {} after {} bytes", url, byte_size);
                    return Err(FetchError::Cancelled);
                }
            };
            let Some(chunk) = chunk else { break };
            byte_size += chunk.len() as u64;
            if byte_size > limit {
                return Err(FetchError::TooLarge { size: byte_size, limit });
            }
            hasher.update(&chunk);
            file.write_all(&chunk)?;
        }
        file.flush()?;

        if byte_size == 0 {
            return Err(FetchError::Empty(url.to_string()));
        }
        Ok((file, byte_size, format!("{:x}", hasher.finalize())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn test_config() -> FetchConfig {
        FetchConfig {
            max_retries: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            use_system_proxy: false,
            ..FetchConfig::default()
        }
    }

    /// Serve one canned response per connection, in order
    async fn serve(responses: Vec<(u16, &'static str)>) -> (Url, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} Status\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (Url::parse(&format!("http://{}/content.xml", addr)).unwrap(), hits)
    }

    #[tokio::test]
    async fn test_local_file_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let fetcher = ResourceFetcher::new(test_config()).unwrap();
        let locator = Locator::Local(file.path().to_path_buf());

        let result = fetcher.fetch(&locator, &CancellationFlag::new()).await.unwrap();
        assert_eq!(result.byte_size, 3);
        assert!(!result.is_temporary());
        assert_eq!(
            result.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_local_missing_and_empty() {
        let fetcher = ResourceFetcher::new(test_config()).unwrap();
        let cancel = CancellationFlag::new();

        let missing = Locator::Local(PathBuf::from("/definitely/not/here.xml"));
        assert!(matches!(
            fetcher.fetch(&missing, &cancel).await,
            Err(FetchError::NotFound(_))
        ));

        let empty = tempfile::NamedTempFile::new().unwrap();
        let locator = Locator::Local(empty.path().to_path_buf());
        let err = fetcher.fetch(&locator, &cancel).await.unwrap_err();
        assert!(matches!(err, FetchError::Empty(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_permanent() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let fetcher = ResourceFetcher::new(test_config()).unwrap();
        let locator = Locator::Local(file.path().to_path_buf());

        let err = fetcher
            .fetch_verified(&locator, Some("00ff"), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Checksum { .. }));
    }

    #[tokio::test]
    async fn test_remote_retries_transient_then_succeeds() {
        let (url, hits) = serve(vec![(503, "busy"), (500, "oops"), (200, "<rss/>")]).await;
        let fetcher = ResourceFetcher::new(test_config()).unwrap();

        let result = fetcher
            .fetch(&Locator::Remote(url), &CancellationFlag::new())
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert!(result.is_temporary());
        assert_eq!(result.read_to_string().unwrap(), "<rss/>");

        let path = result.path().to_path_buf();
        drop(result);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_remote_client_error_is_not_retried() {
        let (url, hits) = serve(vec![(404, "missing"), (200, "late")]).await;
        let fetcher = ResourceFetcher::new(test_config()).unwrap();

        let err = fetcher
            .fetch(&Locator::Remote(url), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remote_gives_up_after_max_retries() {
        let (url, hits) = serve(vec![(503, "a"), (503, "b"), (503, "c"), (200, "d")]).await;
        let fetcher = ResourceFetcher::new(test_config()).unwrap();

        let err = fetcher
            .fetch(&Locator::Remote(url), &CancellationFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fetcher = ResourceFetcher::new(test_config()).unwrap();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let locator: Locator = "https://example.invalid/x.xml".parse().unwrap();
        assert!(matches!(
            fetcher.fetch(&locator, &cancel).await,
            Err(FetchError::Cancelled)
        ));
    }

    /// Serve headers and part of the body, then stall with the socket open
    async fn serve_stalled_body() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100000\r\n\r\n<rss><channel>")
                .await;
            let _ = socket.flush().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        Url::parse(&format!("http://{}/content.xml", addr)).unwrap()
    }

    fn cancel_after(cancel: &CancellationFlag, delay: Duration) {
        let flag = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            flag.cancel();
        });
    }

    #[tokio::test]
    async fn test_cancel_interrupts_body() {
        let url = serve_stalled_body().await;
        let fetcher = ResourceFetcher::new(test_config()).unwrap();
        let cancel = CancellationFlag::new();
        cancel_after(&cancel, Duration::from_millis(150));

        let result = tokio::time::timeout(Duration::from_secs(10), fetcher.fetch(&Locator::Remote(url), &cancel))
            .await
            .expect("cancellation should end the read");
        assert!(matches!(result, Err(FetchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let (url, hits) = serve(vec![(503, "busy"), (200, "late")]).await;
        let config = FetchConfig {
            backoff_base_ms: 60_000,
            backoff_max_ms: 60_000,
            ..test_config()
        };
        let fetcher = ResourceFetcher::new(config).unwrap();
        let cancel = CancellationFlag::new();
        cancel_after(&cancel, Duration::from_millis(150));

        let result = tokio::time::timeout(Duration::from_secs(10), fetcher.fetch(&Locator::Remote(url), &cancel))
            .await
            .expect("cancellation should end the backoff");
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_returns_every_locator() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        std::fs::write(&a, "{}").unwrap();
        std::fs::write(&b, "[]").unwrap();
        let fetcher = ResourceFetcher::new(test_config()).unwrap();

        let results = fetcher
            .fetch_all(
                vec![
                    Locator::Local(a),
                    Locator::Local(b),
                    Locator::Local(dir.path().join("missing.json")),
                ],
                &CancellationFlag::new(),
            )
            .await;
        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|(_, r)| r.is_ok()).count(), 2);
    }
}
