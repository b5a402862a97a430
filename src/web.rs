use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect;
use thiserror::Error;
use tracing::{debug, debug_span};

/// User-Agent sent when the caller does not supply one.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

static DEFAULT_HEADERS: Lazy<Headers> = Lazy::new(|| {
    let mut headers = Headers::new();
    headers.insert("User-Agent", DEFAULT_USER_AGENT);
    headers
});

#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure: DNS, connection, timeout, interrupted body.
    /// An HTTP error status is NOT a fetch error; see [`HttpClient::head`].
    #[error("request to {url} failed: {source}")]
    Network { url: String, source: reqwest::Error },
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Response headers with case-insensitive lookup. Keys are folded to
/// lower-case on insert.
#[derive(Debug, Clone, Default)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_ascii_lowercase(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(&key.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str(), value);
            }
        }
        headers
    }
}

/// Outcome of one request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// Final URL after any redirects.
    pub url: String,
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Lossy UTF-8 decode of the body.
    pub text: String,
}

impl FetchResult {
    pub fn new(url: String, status: u16, headers: Headers, body: Vec<u8>) -> Self {
        let text = String::from_utf8_lossy(&body).into_owned();
        Self {
            url,
            status,
            headers,
            body,
            text,
        }
    }

    /// Advertised body size; 0 when the header is missing or unparsable.
    pub fn content_length(&self) -> u64 {
        self.headers
            .get("Content-Length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Blocking HTTP client for the page fetch and resource probes. Holds one
/// redirect-following client and one that reports redirects as-is, since
/// reqwest fixes the redirect policy per client.
pub struct HttpClient {
    redirecting: Client,
    direct: Client,
    headers: HeaderMap,
}

impl HttpClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_headers(DEFAULT_HEADERS.clone())
    }

    /// A default User-Agent is merged in when `headers` carries none.
    pub fn with_headers(mut headers: Headers) -> Result<Self, FetchError> {
        if !headers.contains("User-Agent") {
            headers.insert("User-Agent", DEFAULT_USER_AGENT);
        }
        let redirecting = Client::builder().build().map_err(FetchError::Client)?;
        let direct = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            redirecting,
            direct,
            headers: to_header_map(&headers),
        })
    }

    /// GET with a per-call timeout. Fails only on transport errors; a 4xx/5xx
    /// response comes back as a normal [`FetchResult`] carrying the status.
    pub fn get(&self, url: &str, timeout: Duration) -> Result<FetchResult, FetchError> {
        let span = debug_span!("fetch", method = "GET", url);
        let _enter = span.enter();
        let response = self
            .redirecting
            .get(url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .send()
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;
        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?
            .to_vec();
        debug!(status, bytes = body.len(), "response received");
        Ok(FetchResult::new(final_url, status, headers, body))
    }

    /// HEAD probe, used to learn a resource's size without its body. Same
    /// error asymmetry as [`HttpClient::get`]: an HTTP error response is
    /// returned with whatever headers the server sent, so callers can treat
    /// it as a zero-length resource instead of aborting.
    pub fn head(
        &self,
        url: &str,
        follow_redirects: bool,
        timeout: Duration,
    ) -> Result<FetchResult, FetchError> {
        let client = if follow_redirects {
            &self.redirecting
        } else {
            &self.direct
        };
        let span = debug_span!("fetch", method = "HEAD", url);
        let _enter = span.enter();
        let response = client
            .head(url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .send()
            .map_err(|source| FetchError::Network {
                url: url.to_string(),
                source,
            })?;
        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        debug!(status, "head response");
        Ok(FetchResult::new(url.to_string(), status, headers, Vec::new()))
    }
}

fn to_header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in headers.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.insert(name, value);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("Cache-Control", "max-age=3600");
        assert_eq!(headers.get("cache-control"), Some("max-age=3600"));
        assert_eq!(headers.get("CACHE-CONTROL"), Some("max-age=3600"));
        assert!(!headers.contains("ETag"));
    }

    #[test]
    fn content_length_defaults_to_zero() {
        let mut headers = Headers::new();
        headers.insert("Content-Length", "1024");
        let probe = FetchResult::new("http://x/".into(), 200, headers, Vec::new());
        assert_eq!(probe.content_length(), 1024);

        let missing = FetchResult::new("http://x/".into(), 404, Headers::new(), Vec::new());
        assert_eq!(missing.content_length(), 0);

        let mut junk = Headers::new();
        junk.insert("Content-Length", "not a number");
        let junk = FetchResult::new("http://x/".into(), 200, junk, Vec::new());
        assert_eq!(junk.content_length(), 0);
    }

    #[test]
    fn default_user_agent_is_merged() {
        let client = HttpClient::with_headers(Headers::new()).unwrap();
        assert!(client.headers.contains_key("user-agent"));

        let mut custom = Headers::new();
        custom.insert("User-Agent", "pageaudit-test");
        let client = HttpClient::with_headers(custom).unwrap();
        assert_eq!(
            client.headers.get("user-agent").unwrap().to_str().unwrap(),
            "pageaudit-test"
        );
    }
}
