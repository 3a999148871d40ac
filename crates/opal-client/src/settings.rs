//! Client connection settings.

use crate::error::{ApiError, Result};
use std::env;
use std::time::Duration;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Immutable connection settings for an [`OpenProjectClient`].
///
/// Owned by the calling context; the client reads them once at
/// construction and never mutates them.
///
/// [`OpenProjectClient`]: crate::OpenProjectClient
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the OpenProject instance, without trailing slash.
    pub base_url: String,

    /// API key used for Basic authentication (`apikey:<key>`).
    pub api_key: String,

    /// Optional Host header override, for instances behind a proxy that
    /// routes on the Host name.
    pub host_header: Option<String>,

    /// Request timeout.
    pub timeout: Duration,
}

impl Settings {
    /// Create settings from a base URL and API key.
    ///
    /// # Errors
    /// Returns `ApiError::Validation` if the URL does not use an http(s)
    /// scheme or the key is implausibly short.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ApiError::Validation(
                "base URL must start with http:// or https://".to_string(),
            ));
        }
        if api_key.len() < 20 {
            return Err(ApiError::Validation(
                "API key appears to be too short".to_string(),
            ));
        }

        Ok(Self {
            base_url,
            api_key,
            host_header: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Load settings from the environment.
    ///
    /// Reads `OPENPROJECT_URL` and `OPENPROJECT_API_KEY` (required),
    /// `OPENPROJECT_HOST_HEADER` and `OPAL_TIMEOUT_SECS` (optional).
    ///
    /// # Errors
    /// Returns `ApiError::Validation` if a required variable is missing
    /// or a value fails validation.
    pub fn from_env() -> Result<Self> {
        let base_url = required_env("OPENPROJECT_URL")?;
        let api_key = required_env("OPENPROJECT_API_KEY")?;
        let mut settings = Self::new(base_url, api_key)?;

        if let Ok(host) = env::var("OPENPROJECT_HOST_HEADER") {
            if !host.is_empty() {
                settings.host_header = Some(host);
            }
        }
        if let Ok(secs) = env::var("OPAL_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| {
                ApiError::Validation("OPAL_TIMEOUT_SECS must be a positive integer".to_string())
            })?;
            settings.timeout = Duration::from_secs(secs);
        }
        Ok(settings)
    }

    /// Override the Host header.
    #[must_use]
    pub fn with_host_header(mut self, host: impl Into<String>) -> Self {
        self.host_header = Some(host.into());
        self
    }

    /// Override the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn required_env(key: &str) -> Result<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ApiError::Validation(format!(
            "required environment variable {key} is not set"
        ))),
    }
}
