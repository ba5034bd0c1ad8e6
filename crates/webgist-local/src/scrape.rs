use crate::extract;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use webgist_core::{Error, FetchBackend, FetchRequest};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Prefix of the inline content used when a page could not be retrieved.
pub const SCRAPE_ERROR_PREFIX: &str = "Error scraping website: ";

/// Why a page fetch produced no markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The server answered with a non-2xx status.
    Status { status: u16, url: String },
    /// DNS, connect, TLS, timeout, body read, or an unusable URL.
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, url } => {
                let reason = reqwest::StatusCode::from_u16(*status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("Unknown Status");
                write!(f, "HTTP {status} {reason} for url: {url}")
            }
            Self::Transport(msg) => f.write_str(msg),
        }
    }
}

impl FetchFailure {
    /// Inline text handed downstream in place of page content.
    pub fn to_content(&self) -> String {
        format!("{SCRAPE_ERROR_PREFIX}{self}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched {
        markup: String,
        status: u16,
        final_url: String,
        truncated: bool,
    },
    Failed(FetchFailure),
}

impl FetchOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Fetched { .. })
    }

    /// Cleaned page text, or the error line when the fetch failed.
    pub fn into_content(self) -> String {
        match self {
            Self::Fetched { markup, .. } => extract::paragraph_text(&markup),
            Self::Failed(failure) => failure.to_content(),
        }
    }
}

/// Single GET, no retries. Every failure is returned as data.
pub async fn fetch_page(backend: &dyn FetchBackend, url: &str, timeout: Duration) -> FetchOutcome {
    let mut req = FetchRequest::new(url);
    req.timeout_ms = Some(timeout.as_millis() as u64);

    let resp = match backend.fetch(&req).await {
        Ok(r) => r,
        Err(e) => {
            let msg = match e {
                Error::Fetch(m) | Error::InvalidUrl(m) => m,
                other => other.to_string(),
            };
            debug!(%url, error = %msg, "page fetch failed");
            return FetchOutcome::Failed(FetchFailure::Transport(msg));
        }
    };

    if !resp.is_success() {
        debug!(%url, status = resp.status, "page fetch returned non-success status");
        return FetchOutcome::Failed(FetchFailure::Status {
            status: resp.status,
            url: resp.final_url,
        });
    }

    debug!(
        %url,
        status = resp.status,
        bytes = resp.bytes.len(),
        truncated = resp.truncated,
        elapsed_ms = resp.elapsed_ms as u64,
        "page fetched"
    );
    FetchOutcome::Fetched {
        markup: resp.text_lossy(),
        status: resp.status,
        final_url: resp.final_url,
        truncated: resp.truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LocalFetcher;
    use axum::{http::header, http::StatusCode, routing::get, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fetched_page_is_reduced_to_paragraph_text() {
        let app = Router::new().route(
            "/doc",
            get(|| async {
                (
                    [(header::CONTENT_TYPE, "text/html")],
                    "<html><body><nav><p>menu</p></nav><p>Hello</p><p>world</p></body></html>",
                )
            }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();

        let out = fetch_page(&fetcher, &format!("http://{addr}/doc"), DEFAULT_FETCH_TIMEOUT).await;
        assert!(out.is_ok());
        assert_eq!(out.into_content(), "Hello world");
    }

    #[tokio::test]
    async fn not_found_becomes_inline_error_text() {
        let app = Router::new().route("/missing", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();

        let url = format!("http://{addr}/missing");
        let out = fetch_page(&fetcher, &url, DEFAULT_FETCH_TIMEOUT).await;
        match &out {
            FetchOutcome::Failed(FetchFailure::Status { status, .. }) => assert_eq!(*status, 404),
            other => panic!("expected status failure, got {other:?}"),
        }
        let content = out.into_content();
        assert!(content.starts_with("Error scraping website:"), "{content}");
        assert!(content.contains("404 Not Found"), "{content}");
        assert!(content.contains(&url), "{content}");
    }

    #[tokio::test]
    async fn slow_server_times_out_as_transport_failure() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = serve(app).await;
        let fetcher = LocalFetcher::new().unwrap();

        let out = fetch_page(
            &fetcher,
            &format!("http://{addr}/slow"),
            Duration::from_millis(200),
        )
        .await;
        assert!(matches!(out, FetchOutcome::Failed(FetchFailure::Transport(_))));
        assert!(out.into_content().starts_with(SCRAPE_ERROR_PREFIX));
    }

    #[tokio::test]
    async fn refused_connection_is_a_transport_failure() {
        // Bind then drop to get a port with no listener.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = LocalFetcher::new().unwrap();
        let out = fetch_page(&fetcher, &format!("http://{addr}/"), DEFAULT_FETCH_TIMEOUT).await;
        assert!(matches!(out, FetchOutcome::Failed(FetchFailure::Transport(_))));
    }

    #[test]
    fn status_failure_display_names_the_reason() {
        let f = FetchFailure::Status {
            status: 503,
            url: "https://example.com/".to_string(),
        };
        assert_eq!(
            f.to_content(),
            "Error scraping website: HTTP 503 Service Unavailable for url: https://example.com/"
        );
    }
}
