//! Request executor: builds requests, injects credentials, classifies
//! responses, and performs the single re-authentication-and-retry cycle.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::cache::ResponseCache;
use crate::config::CoreConfig;
use crate::credentials::{claims, CredentialVault, SecretStore, TokenPair};

use super::endpoint::{CachePolicy, Endpoint};
use super::error::{parse_error_detail, ApiError, ApiResult};
use super::payloads::TokenPairPayload;
use super::transport::{
    RequestBody, Transport, TransportError, TransportRequest, TransportResponse, UploadPart,
};

/// Executor for all remote calls.
///
/// Reads consult the response cache before the network; mutations invalidate
/// the topics they affect. A 401 on an authenticated endpoint triggers the
/// device-exchange re-authentication exactly once per logical call, and
/// concurrent re-authentications collapse into a single in-flight exchange.
pub struct ApiClient<S: SecretStore, T: Transport> {
    base_url: String,
    transport: T,
    vault: Arc<CredentialVault<S>>,
    cache: Arc<ResponseCache>,
    refresh_guard: Mutex<()>,
}

impl<S: SecretStore, T: Transport> ApiClient<S, T> {
    pub fn new(
        config: &CoreConfig,
        transport: T,
        vault: Arc<CredentialVault<S>>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            transport,
            vault,
            cache,
            refresh_guard: Mutex::new(()),
        }
    }

    /// Execute a read and decode its payload into `P`.
    pub async fn fetch<P: DeserializeOwned>(&self, endpoint: Endpoint) -> ApiResult<P> {
        let payload = self.execute(&endpoint, None).await?;
        decode(&payload)
    }

    /// Execute a read with an explicit body override.
    ///
    /// A body override makes the call ineligible for the response cache even
    /// on otherwise cache-eligible endpoints.
    pub async fn fetch_with_body<P: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        body: serde_json::Value,
    ) -> ApiResult<P> {
        let payload = self.execute(&endpoint, Some(RequestBody::Json(body))).await?;
        decode(&payload)
    }

    /// Execute a call whose response body is not decoded.
    pub async fn send(&self, endpoint: Endpoint, body: Option<serde_json::Value>) -> ApiResult<()> {
        self.execute(&endpoint, body.map(RequestBody::Json)).await?;
        Ok(())
    }

    /// Execute a multipart binary upload. Same error semantics as `send`.
    pub async fn upload(&self, endpoint: Endpoint, part: UploadPart) -> ApiResult<()> {
        self.execute(&endpoint, Some(RequestBody::Multipart(part)))
            .await?;
        Ok(())
    }

    async fn execute(
        &self,
        endpoint: &Endpoint,
        body: Option<RequestBody>,
    ) -> ApiResult<Vec<u8>> {
        let cache_key = endpoint.cache_key();
        let cacheable =
            body.is_none() && matches!(endpoint.cache_policy(), CachePolicy::Ttl(_));
        if cacheable {
            if let Some(payload) = self.cache.get(&cache_key).await {
                tracing::debug!(path = %cache_key, "Serving response from cache");
                return Ok(payload);
            }
        }

        let body = body.unwrap_or(RequestBody::Empty);
        let mut reauth_spent = false;
        let mut bearer = None;
        if endpoint.requires_auth() {
            bearer = self.valid_access_token().await?;
            if bearer.is_none() {
                // No usable credential: provision once before the first send
                // rather than knowingly sending an expired token.
                reauth_spent = true;
                if self.reauthenticate(None).await? {
                    bearer = self.stored_access_token().await?;
                }
            }
        }

        let mut response = self.dispatch(endpoint, bearer.clone(), body.clone()).await?;

        if response.status == 401 && endpoint.requires_auth() && !reauth_spent {
            if self.reauthenticate(bearer.as_deref()).await? {
                let bearer = self.stored_access_token().await?;
                response = self.dispatch(endpoint, bearer, body).await?;
            }
        }

        self.classify(endpoint, cacheable, &cache_key, response).await
    }

    async fn dispatch(
        &self,
        endpoint: &Endpoint,
        bearer: Option<String>,
        body: RequestBody,
    ) -> ApiResult<TransportResponse> {
        let path = endpoint.path();
        let request = TransportRequest {
            method: endpoint.method(),
            url: format!("{}{path}", self.base_url),
            bearer,
            body,
        };

        let started = std::time::Instant::now();
        let result = self.transport.send(request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(response) => {
                tracing::debug!(path = %path, status = response.status, elapsed_ms, "API call");
                Ok(response)
            }
            Err(TransportError::InvalidRequest(message)) => {
                Err(ApiError::InvalidRequest(message))
            }
            Err(TransportError::Network(message)) => {
                tracing::debug!(path = %path, elapsed_ms, "API transport failure");
                Err(ApiError::Transport(message))
            }
        }
    }

    async fn classify(
        &self,
        endpoint: &Endpoint,
        cacheable: bool,
        cache_key: &str,
        response: TransportResponse,
    ) -> ApiResult<Vec<u8>> {
        match response.status {
            200..=299 => {
                if cacheable {
                    if let CachePolicy::Ttl(ttl) = endpoint.cache_policy() {
                        self.cache.set(cache_key, response.body.clone(), ttl).await;
                    }
                }
                for topic in endpoint.invalidates() {
                    self.cache.invalidate_prefix(topic.key_prefix()).await;
                }
                Ok(response.body)
            }
            401 => Err(ApiError::AuthExpired),
            429 => Err(ApiError::RateLimited {
                retry_after: response.retry_after,
            }),
            500..=599 => Err(ApiError::Server {
                status: response.status,
                detail: parse_error_detail(&response.body),
            }),
            status => Err(ApiError::Client {
                status,
                detail: parse_error_detail(&response.body),
            }),
        }
    }

    async fn valid_access_token(&self) -> ApiResult<Option<String>> {
        Ok(self.vault.tokens().await?.and_then(|pair| {
            claims::is_valid(&pair.access_token).then_some(pair.access_token)
        }))
    }

    async fn stored_access_token(&self) -> ApiResult<Option<String>> {
        Ok(self.vault.tokens().await?.map(|pair| pair.access_token))
    }

    /// Exchange the device identity for a fresh credential pair.
    ///
    /// Serialized through `refresh_guard`: a caller that waited on an
    /// in-flight exchange reuses its result instead of issuing a duplicate.
    /// Returns `false` on any failure so the caller surfaces the original
    /// error; this flow never retries itself.
    async fn reauthenticate(&self, stale: Option<&str>) -> ApiResult<bool> {
        let _guard = self.refresh_guard.lock().await;

        if let Some(pair) = self.vault.tokens().await? {
            if claims::is_valid(&pair.access_token) && stale != Some(pair.access_token.as_str()) {
                tracing::debug!("Reusing credential pair from concurrent re-authentication");
                return Ok(true);
            }
        }

        let device_id = self.vault.device_id().await?;
        let exchange = Endpoint::DeviceExchange;
        let request = TransportRequest {
            method: exchange.method(),
            url: format!("{}{}", self.base_url, exchange.path()),
            bearer: None,
            body: RequestBody::Json(serde_json::json!({ "device_id": device_id })),
        };

        let response = match self.transport.send(request).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!("Device exchange transport failure: {error}");
                return Ok(false);
            }
        };
        if response.status != 200 {
            tracing::warn!(status = response.status, "Device exchange rejected");
            return Ok(false);
        }
        let payload: TokenPairPayload = match serde_json::from_slice(&response.body) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::warn!("Device exchange payload did not decode: {error}");
                return Ok(false);
            }
        };

        self.vault
            .store_tokens(&TokenPair {
                access_token: payload.access_token,
                refresh_token: payload.refresh_token,
            })
            .await?;
        tracing::info!("Re-authenticated via device exchange");
        Ok(true)
    }
}

fn decode<P: DeserializeOwned>(payload: &[u8]) -> ApiResult<P> {
    serde_json::from_slice(payload).map_err(|error| ApiError::Decode(error.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use pretty_assertions::assert_eq;

    use crate::credentials::MemorySecretStore;

    use super::*;

    type Handler =
        Box<dyn Fn(&TransportRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

    struct FakeTransport {
        handler: Handler,
        requests: StdMutex<Vec<TransportRequest>>,
    }

    impl FakeTransport {
        fn new(
            handler: impl Fn(&TransportRequest) -> Result<TransportResponse, TransportError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl<'a> Transport for &'a FakeTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            let response = (self.handler)(&request);
            self.requests.lock().unwrap().push(request);
            response
        }
    }

    #[async_trait::async_trait]
    impl Transport for Arc<FakeTransport> {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            let response = (self.handler)(&request);
            self.requests.lock().unwrap().push(request);
            response
        }
    }

    fn ok(body: &[u8]) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status: 200,
            retry_after: None,
            body: body.to_vec(),
        })
    }

    fn status(status: u16, body: &[u8]) -> Result<TransportResponse, TransportError> {
        Ok(TransportResponse {
            status,
            retry_after: None,
            body: body.to_vec(),
        })
    }

    fn bearer_token(expires_in: i64, marker: &str) -> String {
        let claims = serde_json::json!({
            "sub": marker,
            "exp": crate::util::unix_timestamp_now() + expires_in,
        });
        let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("header.{encoded}.sig")
    }

    fn exchange_body(access_token: &str) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "access_token": access_token,
            "refresh_token": "refresh-token",
        }))
        .unwrap()
    }

    async fn vault_with_token(token: &str) -> Arc<CredentialVault<MemorySecretStore>> {
        let vault = Arc::new(CredentialVault::new(MemorySecretStore::new()));
        vault
            .store_tokens(&TokenPair {
                access_token: token.to_string(),
                refresh_token: "refresh-token".to_string(),
            })
            .await
            .unwrap();
        vault
    }

    fn client<'a>(
        transport: &'a FakeTransport,
        vault: Arc<CredentialVault<MemorySecretStore>>,
    ) -> ApiClient<MemorySecretStore, &'a FakeTransport> {
        let config = CoreConfig::new("https://api.nosh.test").unwrap();
        ApiClient::new(&config, transport, vault, Arc::new(ResponseCache::new()))
    }

    fn meals_endpoint() -> Endpoint {
        Endpoint::Meals {
            date: "2026-02-09".parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn second_read_within_ttl_is_served_from_cache() {
        let transport = FakeTransport::new(|_| ok(b"[]"));
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let first: Vec<serde_json::Value> = client.fetch(meals_endpoint()).await.unwrap();
        let second: Vec<serde_json::Value> = client.fetch(meals_endpoint()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn body_override_bypasses_the_cache() {
        let transport = FakeTransport::new(|_| ok(b"[]"));
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let _: Vec<serde_json::Value> = client.fetch(meals_endpoint()).await.unwrap();
        let _: Vec<serde_json::Value> = client
            .fetch_with_body(meals_endpoint(), serde_json::json!({ "include_hidden": true }))
            .await
            .unwrap();

        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn successful_mutation_invalidates_affected_topics() {
        let transport = FakeTransport::new(|_| ok(b"[]"));
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let _: Vec<serde_json::Value> = client.fetch(meals_endpoint()).await.unwrap();
        assert_eq!(transport.request_count(), 1);

        client
            .send(Endpoint::CreateMeal, Some(serde_json::json!({ "name": "Soup" })))
            .await
            .unwrap();

        // The listing must hit the network again even though its TTL is live.
        let _: Vec<serde_json::Value> = client.fetch(meals_endpoint()).await.unwrap();
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn reauth_retry_completes_the_original_call() {
        let stale = bearer_token(3600, "stale");
        let fresh = bearer_token(3600, "fresh");
        let exchanges = Arc::new(AtomicUsize::new(0));

        let transport = {
            let stale = stale.clone();
            let fresh = fresh.clone();
            let exchanges = exchanges.clone();
            FakeTransport::new(move |request| {
                if request.url.ends_with("/v1/auth/device") {
                    exchanges.fetch_add(1, Ordering::SeqCst);
                    return ok(&exchange_body(&fresh));
                }
                if request.bearer.as_deref() == Some(stale.as_str()) {
                    return status(401, b"");
                }
                ok(br#"[{"id":"018f0d9a-0000-7000-8000-000000000001","name":"Toast","calories":180,"eaten_on":"2026-02-09","logged_at":1}]"#)
            })
        };
        let vault = vault_with_token(&stale).await;
        let client = client(&transport, vault.clone());

        let meals: Vec<crate::api::MealPayload> = client.fetch(meals_endpoint()).await.unwrap();

        assert_eq!(meals.len(), 1);
        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
        // original request, one exchange, one retry
        assert_eq!(transport.request_count(), 3);
        assert_eq!(
            vault.tokens().await.unwrap().unwrap().access_token,
            fresh
        );
    }

    #[tokio::test]
    async fn failed_reauth_surfaces_the_original_authentication_error() {
        let stale = bearer_token(3600, "stale");
        let transport = FakeTransport::new(move |request| {
            if request.url.ends_with("/v1/auth/device") {
                return status(503, b"");
            }
            status(401, b"")
        });
        let vault = vault_with_token(&stale).await;
        let client = client(&transport, vault);

        let error = client
            .fetch::<Vec<serde_json::Value>>(meals_endpoint())
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::AuthExpired));
        // original request + one failed exchange, no retry
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn missing_credential_triggers_device_exchange_before_first_send() {
        let fresh = bearer_token(3600, "fresh");
        let transport = {
            let fresh = fresh.clone();
            FakeTransport::new(move |request| {
                if request.url.ends_with("/v1/auth/device") {
                    return match &request.body {
                        RequestBody::Json(value) if value.get("device_id").is_some() => {
                            ok(&exchange_body(&fresh))
                        }
                        _ => status(400, b""),
                    };
                }
                if request.bearer.is_some() {
                    ok(b"{\"id\":\"u1\",\"display_name\":\"Sam\",\"daily_calorie_target\":2000,\"daily_water_target_ml\":2500}")
                } else {
                    status(401, b"")
                }
            })
        };
        let vault = Arc::new(CredentialVault::new(MemorySecretStore::new()));
        let client = client(&transport, vault.clone());

        let profile: crate::api::ProfilePayload = client.fetch(Endpoint::Profile).await.unwrap();

        assert_eq!(profile.display_name, "Sam");
        assert!(vault.tokens().await.unwrap().is_some());
        // one exchange + one authenticated request
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_401s_share_one_device_exchange() {
        let stale = bearer_token(3600, "stale");
        let fresh = bearer_token(3600, "fresh");
        let exchanges = Arc::new(AtomicUsize::new(0));

        let transport = {
            let stale = stale.clone();
            let fresh = fresh.clone();
            let exchanges = exchanges.clone();
            Arc::new(FakeTransport::new(move |request| {
                if request.url.ends_with("/v1/auth/device") {
                    exchanges.fetch_add(1, Ordering::SeqCst);
                    return ok(&exchange_body(&fresh));
                }
                if request.bearer.as_deref() == Some(stale.as_str()) {
                    return status(401, b"");
                }
                ok(b"[]")
            }))
        };
        let vault = vault_with_token(&stale).await;
        let config = CoreConfig::new("https://api.nosh.test").unwrap();
        let client = Arc::new(ApiClient::new(
            &config,
            transport.clone(),
            vault,
            Arc::new(ResponseCache::new()),
        ));

        let mut tasks = Vec::new();
        for date in ["2026-02-09", "2026-02-10", "2026-02-11"] {
            let client = client.clone();
            let endpoint = Endpoint::Meals {
                date: date.parse().unwrap(),
            };
            tasks.push(tokio::spawn(async move {
                client.fetch::<Vec<serde_json::Value>>(endpoint).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limited_response_carries_retry_after() {
        let transport = FakeTransport::new(|_| {
            Ok(TransportResponse {
                status: 429,
                retry_after: Some(Duration::from_secs(30)),
                body: Vec::new(),
            })
        });
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let error = client
            .fetch::<Vec<serde_json::Value>>(meals_endpoint())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ApiError::RateLimited {
                retry_after: Some(duration)
            } if duration == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn client_and_server_errors_carry_server_detail() {
        let transport =
            FakeTransport::new(|_| status(422, br#"{"detail": "calories out of range"}"#));
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let error = client
            .send(Endpoint::CreateMeal, Some(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ApiError::Client { status: 422, detail: Some(detail) } if detail == "calories out of range"
        ));
    }

    #[tokio::test]
    async fn transport_failure_is_distinct_from_server_errors() {
        let transport =
            FakeTransport::new(|_| Err(TransportError::Network("connection reset".to_string())));
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let error = client
            .fetch::<Vec<serde_json::Value>>(meals_endpoint())
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::Transport(_)));
    }

    #[tokio::test]
    async fn mismatched_payload_is_a_decode_error() {
        let transport = FakeTransport::new(|_| ok(b"{\"not\": \"a list\"}"));
        let vault = vault_with_token(&bearer_token(3600, "t1")).await;
        let client = client(&transport, vault);

        let error = client
            .fetch::<Vec<crate::api::MealPayload>>(meals_endpoint())
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::Decode(_)));
    }
}
