//! Blocking HTTP client shared by the App Store and Stripe sources.
//!
//! Handles error classification for both, and retry with backoff for
//! callers that opt in. Status mapping:
//!
//! | Status        | Behavior                                   |
//! |---------------|--------------------------------------------|
//! | 2xx           | success                                     |
//! | 401, 403, 400 | fail immediately                            |
//! | other 4xx     | fail immediately                            |
//! | 429, 5xx      | retry (if `max_retries > 0`), then fail     |
//! | network error | retry (if `max_retries > 0`), then fail     |
//!
//! Every failure is an [`IngestError::Upstream`] carrying the status, so
//! callers can tell auth problems from rate limiting.

use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::error::IngestError;

pub(crate) const USER_AGENT: &str = concat!("revledger/", env!("CARGO_PKG_VERSION"));

/// Longest body excerpt kept in error messages and logs.
const BODY_EXCERPT: usize = 200;

pub(crate) struct FetchClient {
    http: Client,
    source_name: &'static str,
    error_extractor: fn(&serde_json::Value, u16) -> String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl FetchClient {
    pub(crate) fn new(
        source_name: &'static str,
        error_extractor: fn(&serde_json::Value, u16) -> String,
        timeout: Duration,
    ) -> Result<Self, IngestError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            source_name,
            error_extractor,
            max_retries: 0,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Retry 429 / 5xx / network failures up to `n` extra times.
    pub(crate) fn with_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// GET and parse the body as JSON.
    pub(crate) fn get_json(
        &self,
        build_request: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<serde_json::Value, IngestError> {
        let resp = self.send(build_request)?;
        let text = resp.text().map_err(|e| {
            IngestError::upstream(None, format!("failed to read {} response body: {e}", self.source_name))
        })?;
        let trimmed = text.trim_start_matches('\u{feff}');
        serde_json::from_str(trimmed).map_err(|e| {
            IngestError::upstream(
                None,
                format!(
                    "failed to parse {} JSON response: {e} (body: {})",
                    self.source_name,
                    excerpt(trimmed),
                ),
            )
        })
    }

    /// GET and return the raw body.
    pub(crate) fn get_bytes(
        &self,
        build_request: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<Vec<u8>, IngestError> {
        let resp = self.send(build_request)?;
        resp.bytes().map(|b| b.to_vec()).map_err(|e| {
            IngestError::upstream(None, format!("failed to read {} response body: {e}", self.source_name))
        })
    }

    /// Send until a 2xx arrives or the error is final.
    ///
    /// `build_request` is called once per attempt and must return a fully
    /// configured request (URL, auth, headers, query).
    fn send(&self, build_request: impl Fn(&Client) -> RequestBuilder) -> Result<Response, IngestError> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0u32;

        loop {
            let err = match build_request(&self.http).send() {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let retryable = status == 429 || status >= 500;

                    if retryable && attempt < self.max_retries {
                        let wait = if status == 429 {
                            retry_after(&resp).unwrap_or(backoff)
                        } else {
                            backoff
                        };
                        log::warn!(
                            "{} retry {}/{} in {:?} (HTTP {})",
                            self.source_name,
                            attempt + 1,
                            self.max_retries,
                            wait,
                            status,
                        );
                        thread::sleep(wait);
                        backoff *= 2;
                        attempt += 1;
                        continue;
                    }

                    self.classify(resp, status, attempt)
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        log::warn!(
                            "{} retry {}/{} in {:?} ({})",
                            self.source_name,
                            attempt + 1,
                            self.max_retries,
                            backoff,
                            e,
                        );
                        thread::sleep(backoff);
                        backoff *= 2;
                        attempt += 1;
                        continue;
                    }
                    let message = if attempt > 0 {
                        format!("{} request failed after {} attempts: {e}", self.source_name, attempt + 1)
                    } else {
                        format!("{} request failed: {e}", self.source_name)
                    };
                    IngestError::upstream(None, message)
                }
            };
            return Err(err);
        }
    }

    fn classify(&self, resp: Response, status: u16, attempt: u32) -> IngestError {
        let text = resp.text().unwrap_or_default();
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or(serde_json::Value::Null);
        let detail = if body.is_null() && !text.trim().is_empty() {
            excerpt(text.trim()).to_string()
        } else {
            (self.error_extractor)(&body, status)
        };

        let what = match status {
            401 | 403 => "auth failed",
            400 => "request rejected",
            429 => "rate limited",
            s if s >= 500 => "upstream error",
            _ => "error",
        };
        let message = if attempt > 0 {
            format!("{} {} after {} attempts ({}): {}", self.source_name, what, attempt + 1, status, detail)
        } else {
            format!("{} {} ({}): {}", self.source_name, what, status, detail)
        };
        IngestError::upstream(Some(status), message)
    }
}

fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn excerpt(s: &str) -> &str {
    match s.char_indices().nth(BODY_EXCERPT) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
