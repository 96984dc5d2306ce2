use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

use crate::settings::HttpSettings;

/// Longest single wait between attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
}

/// Source of rendered pages for the image pass.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Polite HTTP client: waits before each request, retries transient
/// failures with exponential backoff.
pub struct HttpFetcher {
    client: reqwest::Client,
    delay: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(HttpFetcher {
            client,
            delay: Duration::from_millis(settings.delay_ms),
            max_retries: settings.max_retries,
            backoff: Duration::from_millis(settings.backoff_ms),
        })
    }

    async fn wait_before_retry(&self, url: &str, attempt: u32, cause: String) {
        let wait = backoff_delay(self.backoff, attempt);
        warn!(
            "{} on {} (attempt {}/{}), backing off {:.1}s",
            cause,
            url,
            attempt + 1,
            self.max_retries,
            wait.as_secs_f64()
        );
        tokio::time::sleep(wait).await;
    }
}

/// `base * 2^attempt`, capped at `MAX_BACKOFF`.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return base;
    }
    2u32.checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |wait| wait.min(MAX_BACKOFF))
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        tokio::time::sleep(self.delay).await;

        let mut attempt = 0;
        loop {
            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    return Ok(response.text().await?);
                }
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable(status) || attempt >= self.max_retries {
                        return Err(FetchError::Status(status));
                    }
                    self.wait_before_retry(url, attempt, status.to_string()).await;
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    self.wait_before_retry(url, attempt, e.to_string()).await;
                }
                Err(e) => return Err(e.into()),
            }
            attempt += 1;
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Answers the n-th connection with `statuses[n]` (the last one repeats)
    /// and counts connections.
    async fn spawn_scripted_http(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses.get(n).or(statuses.last()).copied().unwrap_or(500);

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(k) => request.extend_from_slice(&buf[..k]),
                    }
                }

                let body = if status == 200 { "<html>ok</html>" } else { "" };
                let response = format!(
                    "HTTP/1.1 {} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (format!("http://{addr}/blog/post"), hits)
    }

    /// No delay, no backoff, and no proxy between the client and the local listener.
    fn fast_fetcher() -> HttpFetcher {
        HttpFetcher {
            client: reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            delay: Duration::ZERO,
            max_retries: 3,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let (url, hits) = spawn_scripted_http(vec![503, 503, 200]).await;
        let html = fast_fetcher().fetch(&url).await.unwrap();
        assert_eq!(html, "<html>ok</html>");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persistent_transient_error_gives_up_after_max_retries() {
        let (url, hits) = spawn_scripted_http(vec![503]).await;
        let err = fast_fetcher().fetch(&url).await.unwrap_err();
        assert!(
            matches!(err, FetchError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE),
            "{err}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_error_is_not_retried() {
        let (url, hits) = spawn_scripted_http(vec![404, 200]).await;
        let err = fast_fetcher().fetch(&url).await.unwrap_err();
        assert!(
            matches!(err, FetchError::Status(s) if s == StatusCode::NOT_FOUND),
            "{err}"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_is_retried() {
        let (url, hits) = spawn_scripted_http(vec![429, 200]).await;
        assert!(fast_fetcher().fetch(&url).await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 10), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::ZERO, 40), Duration::ZERO);
    }

    #[test]
    fn retries_only_transient_statuses() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_retryable(StatusCode::from_u16(code).unwrap()), "{code}");
        }
        for code in [400, 401, 403, 404, 501] {
            assert!(!is_retryable(StatusCode::from_u16(code).unwrap()), "{code}");
        }
    }

    #[test]
    fn status_error_names_the_code() {
        let err = FetchError::Status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "HTTP 503 Service Unavailable");
    }

    #[test]
    fn client_builds_from_default_settings() {
        assert!(HttpFetcher::new(&HttpSettings::default()).is_ok());
    }
}
