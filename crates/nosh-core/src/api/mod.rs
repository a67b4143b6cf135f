//! Remote API layer: endpoint catalogue, transport, and request executor.

mod client;
mod endpoint;
mod error;
mod payloads;
mod transport;

pub use client::ApiClient;
pub use endpoint::{CachePolicy, Endpoint, Method, Topic};
pub use error::{ApiError, ApiResult};
pub use payloads::{
    MealPayload, MonthlySummaryPayload, ProfilePayload, TokenPairPayload, WaterLogPayload,
    WeeklySummaryPayload,
};
pub use transport::{
    ReqwestTransport, RequestBody, Transport, TransportError, TransportRequest, TransportResponse,
    UploadPart,
};
