//! Request executor error taxonomy.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::credentials::VaultError;
use crate::util::compact_text;

/// Errors surfaced by the request executor.
///
/// Callers are expected to map `AuthExpired` to a sign-out/re-provision flow,
/// `Transport`/`Server` to a retry affordance, and `Client`/`Decode` to a
/// non-retryable message using the carried detail when present.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be constructed; fatal to this call only.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No response was received; generally retryable at a higher level.
    #[error("Network request failed: {0}")]
    Transport(String),

    /// HTTP 401 after the one re-authentication attempt was spent.
    #[error("Authentication expired; device must re-provision")]
    AuthExpired,

    /// HTTP 429, with the server's requested backoff when provided.
    #[error("Rate limited by the server")]
    RateLimited { retry_after: Option<Duration> },

    /// Other 4xx; generally non-retryable.
    #[error("API rejected the request ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Client { status: u16, detail: Option<String> },

    /// 5xx; retryable at a higher level.
    #[error("API server error ({status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },

    /// Response did not match the expected shape; a contract mismatch, not a
    /// network problem.
    #[error("Failed to decode response payload: {0}")]
    Decode(String),

    /// Secure storage failed while handling credentials.
    #[error(transparent)]
    Vault(#[from] VaultError),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

/// Extract the server's structured error detail from a non-2xx body.
pub(crate) fn parse_error_detail(body: &[u8]) -> Option<String> {
    if let Ok(payload) = serde_json::from_slice::<ApiErrorBody>(body) {
        if let Some(detail) = payload.detail.or(payload.message) {
            let detail = detail.trim();
            if !detail.is_empty() {
                return Some(detail.to_string());
            }
        }
    }

    let raw = String::from_utf8_lossy(body);
    let compacted = compact_text(&raw);
    if compacted.is_empty() {
        None
    } else {
        Some(compacted)
    }
}
