//! Outbound HTTP fetches with platform semantics.
//!
//! The platform fetch does not validate TLS certificates unless asked to.
//! [`apply_patches`] installs process-wide keyword defaults so that the
//! [`fetch`] and [`make_fetch_call`] entry points validate certificates
//! unless a caller explicitly opts out.

use crate::overrides::DefaultOverrides;
use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use validator::{Validate, ValidationErrors};

pub const MAX_RESPONSE_SIZE: usize = 32 * 1024 * 1024;
pub const DEFAULT_DEADLINE_SECS: f64 = 5.0;
pub const MAX_REDIRECTS: usize = 5;

static PATCHES: OnceLock<DefaultOverrides> = OnceLock::new();

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid fetch options: {0}")]
    InvalidOptions(#[from] ValidationErrors),
    #[error("Invalid deadline: {0}")]
    InvalidDeadline(f64),
    #[error("Could not resolve fetch options: {0}")]
    Options(#[from] serde_json::Error),
    #[error("Deadline exceeded while fetching {0}")]
    DeadlineExceeded(String),
    #[error("Response from {url} exceeded {limit} bytes")]
    ResponseTooLarge { url: String, limit: usize },
    #[error("Fetch failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("Fetch call aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatchError {
    #[error("apply_patches already called")]
    AlreadyApplied,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMethod {
    #[default]
    Get,
    Post,
    Head,
    Put,
    Delete,
    Patch,
}

impl From<FetchMethod> for reqwest::Method {
    fn from(method: FetchMethod) -> Self {
        match method {
            FetchMethod::Get => reqwest::Method::GET,
            FetchMethod::Post => reqwest::Method::POST,
            FetchMethod::Head => reqwest::Method::HEAD,
            FetchMethod::Put => reqwest::Method::PUT,
            FetchMethod::Delete => reqwest::Method::DELETE,
            FetchMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Keyword arguments of a fetch. `None` means "not supplied by the caller".
///
/// The payload is not a keyword default and never passes through the
/// override map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct FetchOptions {
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<FetchMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_truncated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_redirects: Option<bool>,
    /// Seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 0.0))]
    pub deadline: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validate_certificate: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status_code: u16,
    pub content: Vec<u8>,
    pub headers: BTreeMap<String, String>,
    pub final_url: String,
    pub content_was_truncated: bool,
}

/// The override [`apply_patches`] installs.
pub fn certificate_overrides() -> DefaultOverrides {
    DefaultOverrides::new().with("validate_certificate", true)
}

/// Installs [`certificate_overrides`] for the process-wide entry points.
///
/// Only the first call has an effect; later calls return
/// [`PatchError::AlreadyApplied`].
pub fn apply_patches() -> Result<(), PatchError> {
    if PATCHES.set(certificate_overrides()).is_err() {
        info!("apply_patches already called.  Ignoring.");
        return Err(PatchError::AlreadyApplied);
    }
    info!("urlfetch entry points now default to validate_certificate=true");
    Ok(())
}

pub fn patches_applied() -> bool {
    PATCHES.get().is_some()
}

/// A fetch client carrying its own keyword defaults.
#[derive(Debug, Clone, Default)]
pub struct UrlFetch {
    defaults: DefaultOverrides,
}

impl UrlFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: DefaultOverrides) -> Self {
        Self { defaults }
    }

    /// The client behind [`fetch`] and [`make_fetch_call`].
    pub fn patched() -> Self {
        Self::with_defaults(PATCHES.get().cloned().unwrap_or_default())
    }

    pub fn resolve(&self, mut options: FetchOptions) -> Result<FetchOptions, FetchError> {
        // JSON has no NaN or infinity; they would come back as `None`.
        if let Some(seconds) = options.deadline.filter(|d| !d.is_finite()) {
            return Err(FetchError::InvalidDeadline(seconds));
        }
        let payload = options.payload.take();
        let mut resolved = self.defaults.apply(&options)?;
        resolved.validate()?;
        resolved.payload = payload;
        Ok(resolved)
    }

    fn build_client(options: &FetchOptions, deadline: Duration) -> Result<reqwest::Client, FetchError> {
        let redirects = if options.follow_redirects.unwrap_or(true) {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!options.validate_certificate.unwrap_or(false))
            .redirect(redirects)
            .timeout(deadline)
            .build()?;
        Ok(client)
    }

    pub async fn fetch(&self, url: &str, options: FetchOptions) -> Result<FetchResponse, FetchError> {
        let options = self.resolve(options)?;
        let parsed = reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let seconds = options.deadline.unwrap_or(DEFAULT_DEADLINE_SECS);
        let deadline =
            Duration::try_from_secs_f64(seconds).map_err(|_| FetchError::InvalidDeadline(seconds))?;
        let client = Self::build_client(&options, deadline)?;

        let method = options.method.unwrap_or_default();
        debug!(
            url = %parsed,
            method = ?method,
            validate_certificate = options.validate_certificate.unwrap_or(false),
            "Fetching"
        );

        let mut request = client.request(method.into(), parsed);
        for (name, value) in options.headers.iter().flatten() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = options.payload {
            request = request.body(payload);
        }

        let timed_out = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::DeadlineExceeded(url.to_string())
            } else {
                FetchError::Download(e)
            }
        };

        let mut response = request.send().await.map_err(timed_out)?;
        let status_code = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let mut content = Vec::new();
        let mut content_was_truncated = false;
        while let Some(chunk) = response.chunk().await.map_err(timed_out)? {
            let room = MAX_RESPONSE_SIZE - content.len();
            if chunk.len() > room {
                if !options.allow_truncated.unwrap_or(false) {
                    return Err(FetchError::ResponseTooLarge {
                        url: url.to_string(),
                        limit: MAX_RESPONSE_SIZE,
                    });
                }
                content.extend_from_slice(&chunk[..room]);
                content_was_truncated = true;
                break;
            }
            content.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            status_code,
            content,
            headers,
            final_url,
            content_was_truncated,
        })
    }

    /// Starts the fetch on the current tokio runtime.
    pub fn make_fetch_call(&self, url: &str, options: FetchOptions) -> FetchCall {
        let client = self.clone();
        let url = url.to_string();
        FetchCall {
            handle: tokio::spawn(async move { client.fetch(&url, options).await }),
        }
    }
}

/// An in-flight fetch started by [`make_fetch_call`].
pub struct FetchCall {
    handle: JoinHandle<Result<FetchResponse, FetchError>>,
}

impl FetchCall {
    pub async fn get_result(self) -> Result<FetchResponse, FetchError> {
        self.handle
            .await
            .map_err(|e| FetchError::Aborted(e.to_string()))?
    }
}

pub async fn fetch(url: &str, options: FetchOptions) -> Result<FetchResponse, FetchError> {
    UrlFetch::patched().fetch(url, options).await
}

pub fn make_fetch_call(url: &str, options: FetchOptions) -> FetchCall {
    UrlFetch::patched().make_fetch_call(url, options)
}
