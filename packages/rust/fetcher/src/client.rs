//! HTTP client for product detail pages.
//!
//! One [`PageClient`] per device profile: the desktop profile fetches full
//! `/dp/{asin}` pages (used for related-item discovery), the mobile profile
//! fetches the lighter `/gp/aw/d/{asin}` pages (used for snapshots).

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderValue};
use tracing::{debug, instrument, warn};
use url::Url;

use asinscout_shared::{Asin, FetchConfig, FetchErrorKind, Marketplace, Result, ScoutError};

/// Maximum redirects to follow for a product page.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we accept (10 MB), enforced while streaming.
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Upper bound on the backoff exponent.
const MAX_BACKOFF_SHIFT: u32 = 6;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0 Safari/537.36";

const MOBILE_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 11) AppleWebKit/537.36 (KHTML, like Gecko) Mobile Safari/537.36";

// ---------------------------------------------------------------------------
// DeviceProfile
// ---------------------------------------------------------------------------

/// Request signature presented to the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceProfile {
    /// Desktop browser, full detail page.
    Desktop,
    /// Mobile browser, simplified detail page.
    Mobile,
}

impl DeviceProfile {
    pub fn user_agent(self) -> &'static str {
        match self {
            Self::Desktop => DESKTOP_USER_AGENT,
            Self::Mobile => MOBILE_USER_AGENT,
        }
    }

    /// Path of the detail page for `asin` under this profile.
    pub fn product_path(self, asin: &Asin) -> String {
        match self {
            Self::Desktop => format!("/dp/{asin}"),
            Self::Mobile => format!("/gp/aw/d/{asin}"),
        }
    }
}

// ---------------------------------------------------------------------------
// PageClient
// ---------------------------------------------------------------------------

/// Fetches product pages with a fixed device profile, per-request timeout
/// and bounded retry of transient failures.
#[derive(Debug, Clone)]
pub struct PageClient {
    client: Client,
    profile: DeviceProfile,
    max_attempts: u32,
    backoff_ms: u64,
    /// Replaces the marketplace host (for integration tests with mock servers).
    base_url: Option<Url>,
}

impl PageClient {
    /// Build a client for `profile` using the timeout and retry policy in `config`.
    pub fn new(profile: DeviceProfile, config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(profile.user_agent())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScoutError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            profile,
            max_attempts: config.max_attempts.max(1),
            backoff_ms: config.backoff_ms,
            base_url: None,
        })
    }

    /// Send requests to `base` instead of the marketplace host.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// URL of the detail page for `asin` on `marketplace` (or the override base).
    pub fn product_page_url(&self, asin: &Asin, marketplace: Marketplace) -> Result<Url> {
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| marketplace.base_url());
        base.join(&self.profile.product_path(asin))
            .map_err(|e| ScoutError::validation(format!("bad product URL for {asin}: {e}")))
    }

    /// Fetch the detail page body for `asin`, retrying transient failures.
    #[instrument(skip_all, fields(asin = %asin, profile = ?self.profile))]
    pub async fn fetch_product_page(&self, asin: &Asin, marketplace: Marketplace) -> Result<String> {
        let url = self.product_page_url(asin, marketplace)?;
        let mut attempt = 1;

        loop {
            match self.fetch_once(&url, marketplace).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < self.max_attempts && e.is_transient() => {
                    let delay = backoff_delay(self.backoff_ms, attempt);
                    warn!(%url, attempt, delay_ms = delay.as_millis(), error = %e, "transient fetch failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One GET with no retry.
    async fn fetch_once(&self, url: &Url, marketplace: Marketplace) -> Result<String> {
        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .header(ACCEPT_LANGUAGE, HeaderValue::from_static(marketplace.accept_language()))
            .header(
                ACCEPT,
                HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.8"),
            )
            .send()
            .await
            .map_err(|e| ScoutError::fetch(url.as_str(), classify(&e), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoutError::fetch(
                url.as_str(),
                FetchErrorKind::Status(status.as_u16()),
                format!("HTTP {status}"),
            ));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(too_large(url, len));
            }
        }

        read_capped(response, url, MAX_RESPONSE_SIZE).await
    }
}

/// Read the body chunk by chunk, failing once it exceeds `limit` bytes.
/// Covers chunked responses that carry no `Content-Length`.
async fn read_capped(mut response: reqwest::Response, url: &Url, limit: u64) -> Result<String> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = response.chunk().await.map_err(|e| {
        let kind = if e.is_timeout() {
            FetchErrorKind::Timeout
        } else {
            FetchErrorKind::Body
        };
        ScoutError::fetch(url.as_str(), kind, format!("body read failed: {e}"))
    })? {
        body.extend_from_slice(&chunk);
        if body.len() as u64 > limit {
            return Err(too_large(url, body.len() as u64));
        }
    }

    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn too_large(url: &Url, len: u64) -> ScoutError {
    ScoutError::fetch(
        url.as_str(),
        FetchErrorKind::Body,
        format!("response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"),
    )
}

/// Map a reqwest send error onto the fetch taxonomy.
fn classify(err: &reqwest::Error) -> FetchErrorKind {
    if err.is_timeout() {
        FetchErrorKind::Timeout
    } else {
        FetchErrorKind::Transport
    }
}

/// `base_ms * 2^(attempt-1)`, with the exponent capped.
pub(crate) fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT);
    Duration::from_millis(base_ms.saturating_mul(1u64 << shift))
}
