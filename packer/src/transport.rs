//! HTTP transport for release feeds and asset downloads.
//!
//! The pipeline talks to the network only through the [`Transport`] trait so
//! tests can serve release documents and asset payloads from memory. The
//! production implementation, [`UreqTransport`], uses a shared `ureq` agent
//! with a global timeout and recognises the feed's rate-limit responses.

use crate::error::{BundleError, Result};
use log::{debug, trace};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Network timeout applied to every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Media type requested from the release feed.
const FEED_ACCEPT: &str = "application/vnd.github.v3+json";

/// User agent sent with every request; the feed rejects anonymous clients.
const USER_AGENT: &str = concat!("atmo-packer/", env!("CARGO_PKG_VERSION"));

/// Trait for fetching release documents and asset payloads.
///
/// Abstractions allow tests to mock HTTP behaviour without network access.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Fetch a release-feed document and return its body.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::RateLimited`] if the feed throttles the
    /// request, or [`BundleError::Transport`] for any other failure.
    fn fetch_json(&self, url: &str) -> Result<String>;

    /// Stream the body of `url` into a new file at `dest`.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::Transport`] if the request or the stream fails,
    /// or [`BundleError::Io`] if `dest` cannot be created.
    fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// HTTP transport backed by `ureq`.
pub struct UreqTransport {
    agent: ureq::Agent,
    token: Option<String>,
}

impl UreqTransport {
    /// Create a transport, optionally authenticating feed requests with a
    /// bearer token.
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }
}

impl Transport for UreqTransport {
    fn fetch_json(&self, url: &str) -> Result<String> {
        debug!("querying release feed {url}");
        let mut request = self.agent.get(url).header("Accept", FEED_ACCEPT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", &format!("Bearer {token}"));
        }
        let mut response = request.call().map_err(|e| transport_error(url, &e))?;
        let status = response.status().as_u16();
        let remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| transport_error(url, &e))?;
        trace!("feed {url} answered {status} ({} bytes)", body.len());
        match classify_status(url, status, remaining.as_deref(), &body) {
            Some(err) => Err(err),
            None => Ok(body),
        }
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        debug!("downloading {url} to {}", dest.display());
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| transport_error(url, &e))?;
        let status = response.status().as_u16();
        if let Some(err) = classify_status(url, status, None, "") {
            return Err(err);
        }
        let mut reader = response.into_body().into_reader();
        write_stream(url, &mut reader, dest)
    }
}

/// Copy a response stream into a new file.
///
/// A failure while reading is a transport failure; a failure to create or
/// write the file is a local I/O failure.
fn write_stream(url: &str, reader: &mut dyn Read, dest: &Path) -> Result<u64> {
    let mut file = std::fs::File::create(dest)
        .map_err(|e| BundleError::io(format!("failed to create {}", dest.display()), e))?;
    let mut buffer = [0u8; 8192];
    let mut written = 0u64;
    loop {
        let read = reader.read(&mut buffer).map_err(|e| BundleError::Transport {
            url: url.to_owned(),
            reason: format!("stream interrupted after {written} bytes: {e}"),
        })?;
        let Some(chunk) = buffer.get(..read) else {
            break;
        };
        if chunk.is_empty() {
            break;
        }
        std::io::Write::write_all(&mut file, chunk)
            .map_err(|e| BundleError::io(format!("failed to write {}", dest.display()), e))?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

/// Map a non-success HTTP status to a [`BundleError`].
///
/// Returns `None` for 2xx responses. A 429, or a 403 that either reports an
/// exhausted rate-limit budget or says so in its body, is
/// [`BundleError::RateLimited`]; anything else is [`BundleError::Transport`].
#[must_use]
pub fn classify_status(
    url: &str,
    status: u16,
    rate_limit_remaining: Option<&str>,
    body: &str,
) -> Option<BundleError> {
    if (200..300).contains(&status) {
        return None;
    }
    let exhausted = rate_limit_remaining.is_some_and(|remaining| remaining.trim() == "0");
    let mentions_limit = body.to_ascii_lowercase().contains("rate limit");
    if status == 429 || (status == 403 && (exhausted || mentions_limit)) {
        return Some(BundleError::RateLimited {
            url: url.to_owned(),
        });
    }
    Some(BundleError::Transport {
        url: url.to_owned(),
        reason: format!("HTTP status {status}"),
    })
}

/// Map a `ureq` error to a [`BundleError::Transport`].
fn transport_error(url: &str, err: &ureq::Error) -> BundleError {
    BundleError::Transport {
        url: url.to_owned(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use rstest::rstest;

    const URL: &str = "https://api.example.test/repos/a/b/releases/latest";

    #[rstest]
    #[case::ok(200)]
    #[case::no_content(204)]
    fn success_statuses_are_not_errors(#[case] status: u16) {
        assert!(classify_status(URL, status, None, "").is_none());
    }

    #[rstest]
    #[case::too_many_requests(429, None, "")]
    #[case::exhausted_budget(403, Some("0"), "")]
    #[case::body_mentions_limit(403, None, "API rate limit exceeded for 1.2.3.4")]
    fn throttling_is_rate_limited(
        #[case] status: u16,
        #[case] remaining: Option<&str>,
        #[case] body: &str,
    ) {
        let err = classify_status(URL, status, remaining, body).expect("error status");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[rstest]
    #[case::forbidden_with_budget(403, Some("42"), "Resource not accessible")]
    #[case::missing(404, None, "Not Found")]
    #[case::server_error(502, None, "")]
    fn other_failures_are_transport_errors(
        #[case] status: u16,
        #[case] remaining: Option<&str>,
        #[case] body: &str,
    ) {
        let err = classify_status(URL, status, remaining, body).expect("error status");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains(&status.to_string()));
    }

    #[test]
    fn write_stream_copies_all_bytes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("asset.bin");
        let payload = vec![7u8; 20_000];

        let written = write_stream(URL, &mut payload.as_slice(), &dest).expect("stream copy");

        assert_eq!(written, 20_000);
        assert_eq!(std::fs::read(&dest).expect("read back"), payload);
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
        }
    }

    #[test]
    fn interrupted_stream_is_a_transport_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = dir.path().join("asset.bin");

        let err = write_stream(URL, &mut FailingReader, &dest).expect_err("stream fails");

        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[test]
    fn blank_token_is_ignored() {
        let transport = UreqTransport::new(Some("  ".to_owned()));
        assert!(transport.token.is_none());
    }
}
