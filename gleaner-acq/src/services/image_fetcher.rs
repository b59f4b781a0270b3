//! Image downloads with explicit timeouts and bounded retries

use crate::utils::{retry_with_timeout, Retryable};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("gleaner/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    /// URL not worth requesting (data URI, empty, placeholder)
    #[error("skipped URL: {0}")]
    Skipped(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: String, after_ms: u64 },
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Skipped(_) => false,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Request(_) | FetchError::Timeout { .. } => true,
        }
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        FetchError::Timeout {
            operation: operation.to_string(),
            after_ms: after.as_millis() as u64,
        }
    }
}

/// URLs that never point at a real image
pub fn should_skip(url: &str) -> bool {
    let url = url.trim();
    url.is_empty() || url.starts_with("data:") || url.to_ascii_lowercase().contains("placeholder")
}

pub struct ImageFetcher {
    client: reqwest::Client,
    timeout: Duration,
    retries: u32,
}

impl ImageFetcher {
    pub fn new(timeout: Duration, retries: u32) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            retries,
        })
    }

    /// Download `url`, retrying transient failures
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if should_skip(url) {
            return Err(FetchError::Skipped(url.chars().take(64).collect()));
        }

        let bytes = retry_with_timeout("image download", self.retries, self.timeout, || {
            self.fetch_once(url)
        })
        .await?;

        debug!(url, bytes = bytes.len(), "Image downloaded");
        Ok(bytes)
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One-shot HTTP server answering every connection with `status` and `body`
    async fn serve(status: &'static str, body: &'static [u8]) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/image.jpg", addr), hits)
    }

    #[test]
    fn test_should_skip() {
        assert!(should_skip(""));
        assert!(should_skip("data:image/png;base64,AAAA"));
        assert!(should_skip("https://cdn.example.com/Placeholder.png"));
        assert!(!should_skip("https://cdn.example.com/a.jpg"));
    }

    #[tokio::test]
    async fn test_skipped_url_not_requested() {
        let fetcher = ImageFetcher::new(Duration::from_secs(1), 2).unwrap();
        assert!(matches!(
            fetcher.fetch("data:image/gif;base64,R0lGOD").await,
            Err(FetchError::Skipped(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let (url, hits) = serve("200 OK", b"jpegbytes").await;
        let fetcher = ImageFetcher::new(Duration::from_secs(5), 2).unwrap();

        let bytes = fetcher.fetch(&url).await.unwrap();
        assert_eq!(bytes, b"jpegbytes");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let (url, hits) = serve("404 Not Found", b"").await;
        let fetcher = ImageFetcher::new(Duration::from_secs(5), 3).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_server_error_retried_until_bound() {
        let (url, hits) = serve("503 Service Unavailable", b"").await;
        let fetcher = ImageFetcher::new(Duration::from_secs(5), 2).unwrap();

        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
