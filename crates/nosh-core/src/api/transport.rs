//! HTTP transport seam.
//!
//! The executor talks to the network through this trait so tests can drive
//! the full classify/reauth/retry machinery against scripted responses.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::endpoint::Method;

/// Body attached to an outgoing request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(UploadPart),
}

/// A binary payload for multipart uploads.
#[derive(Debug, Clone)]
pub struct UploadPart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A fully built request, ready for the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: RequestBody,
}

/// The raw outcome of a request that did reach a server.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be constructed or encoded.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// No response was received (connectivity loss, timeout).
    #[error("{0}")]
    Network(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::InvalidRequest(error.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &request.url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(payload) => builder.json(&payload),
            RequestBody::Multipart(part) => {
                let part = reqwest::multipart::Part::bytes(part.bytes)
                    .file_name(part.file_name)
                    .mime_str(&part.content_type)
                    .map_err(|error| TransportError::InvalidRequest(error.to_string()))?;
                builder.multipart(reqwest::multipart::Form::new().part("file", part))
            }
        };

        let response = builder.send().await.map_err(|error| {
            if error.is_builder() {
                TransportError::InvalidRequest(error.to_string())
            } else {
                TransportError::Network(error.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response
            .bytes()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?
            .to_vec();

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}
