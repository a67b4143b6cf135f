//! Runtime configuration for the sync core.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration required to reach the Nosh API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl CoreConfig {
    /// Build a configuration from an API base URL.
    ///
    /// The URL is trimmed and must carry an http(s) scheme; a trailing slash
    /// is dropped so endpoint paths can be appended directly.
    pub fn new(api_base_url: impl Into<String>) -> Result<Self> {
        let api_base_url = normalize_text_option(Some(api_base_url.into()))
            .ok_or_else(|| Error::InvalidInput("API base URL must not be empty".to_string()))?;
        if !is_http_url(&api_base_url) {
            return Err(Error::InvalidInput(
                "API base URL must include http:// or https://".to_string(),
            ));
        }

        Ok(Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
