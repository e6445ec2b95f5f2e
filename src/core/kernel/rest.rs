use crate::core::config::ConfigError;
use crate::core::errors::ExchangeError;
use crate::core::kernel::clock::{local_now_ms, ServerClock};
use crate::core::kernel::signer::QuerySigner;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{instrument, trace, warn};

/// Unauthenticated endpoint used for server-clock calibration.
pub const TIME_ENDPOINT: &str = "/api/v3/time";

/// Provider error code for a timestamp outside the `recvWindow`.
pub const CLOCK_SKEW_CODE: i64 = -1021;

const BAD_REQUEST_STATUS: u16 = 400;
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Authentication requirements of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Public endpoint, no credentials attached.
    None,
    /// API key header only.
    ApiKey,
    /// API key header plus a signed query string carrying a timestamp.
    Signed,
}

/// REST client trait for making HTTP requests.
///
/// Query parameters are ordered; the serialized query string preserves the
/// given order, and for signed requests the signature covers exactly the
/// string that is transmitted.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Execute a request and return the parsed response body.
    ///
    /// Bodies that are not valid JSON are returned as a JSON string
    /// containing the raw text.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError>;

    /// Execute a request and deserialize the response body.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<T, ExchangeError> {
        let value = self.request(method, endpoint, params, auth).await?;
        serde_json::from_value(value).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to deserialize JSON: {}", e))
        })
    }

    /// Make a GET request
    async fn get(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::GET, endpoint, params, auth).await
    }

    /// Make a POST request
    async fn post(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::POST, endpoint, params, auth).await
    }

    /// Make a PUT request
    async fn put(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::PUT, endpoint, params, auth).await
    }

    /// Make a DELETE request
    async fn delete(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::DELETE, endpoint, params, auth).await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// Tolerance window (ms) appended to signed requests as `recvWindow`
    pub recv_window_ms: Option<u64>,
    /// Recalibrate the server clock and retry once when a signed request is
    /// rejected for clock skew
    pub time_sync: bool,
}

impl RestClientConfig {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            timeout_seconds: 30,
            user_agent: "mbx/0.1".to_string(),
            recv_window_ms: None,
            time_sync: true,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Set the `recvWindow` tolerance for signed requests
    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = Some(recv_window_ms);
        self
    }

    /// Enable or disable the clock-skew recovery retry
    pub fn with_time_sync(mut self, time_sync: bool) -> Self {
        self.time_sync = time_sync;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn QuerySigner>>,
    clock: Option<Arc<ServerClock>>,
}

impl RestClientBuilder {
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
            clock: None,
        }
    }

    /// Set the signer for authenticated requests
    pub fn with_signer(mut self, signer: Arc<dyn QuerySigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Share an existing server clock instead of creating a fresh one
    pub fn with_clock(mut self, clock: Arc<ServerClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the REST client
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ConfigError::InvalidConfiguration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
            clock: self.clock.unwrap_or_default(),
        })
    }
}

/// Implementation of `RestClient` using reqwest.
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn QuerySigner>>,
    clock: Arc<ServerClock>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .field("clock_offset_ms", &self.clock.offset_ms())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    /// Create a new `ReqwestRest` instance with default settings
    pub fn new(
        base_url: String,
        signer: Option<Arc<dyn QuerySigner>>,
    ) -> Result<Self, ExchangeError> {
        let mut builder = RestClientBuilder::new(RestClientConfig::new(base_url));
        if let Some(signer) = signer {
            builder = builder.with_signer(signer);
        }
        builder.build()
    }

    /// Server clock shared by every request issued through this client
    pub fn clock(&self) -> Arc<ServerClock> {
        Arc::clone(&self.clock)
    }

    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    /// Calibrate the server clock from one round trip.
    ///
    /// Records the local send and receive times around an unauthenticated
    /// server-time request and stores the resulting drift. Concurrent
    /// calibrations are not coalesced; callers needing single-flight
    /// semantics must serialize themselves.
    #[instrument(skip(self))]
    pub async fn sync_time(&self) -> Result<i64, ExchangeError> {
        let sent_at = local_now_ms();
        let payload = self
            .dispatch(Method::GET, TIME_ENDPOINT, &[], AuthMode::None)
            .await?;
        let received_at = local_now_ms();

        let server_time = payload
            .get("serverTime")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ExchangeError::DeserializationError(
                    "Missing serverTime in server time response".to_string(),
                )
            })?;

        self.clock.record_sample(server_time, sent_at, received_at);
        let offset = self.clock.offset_ms();
        trace!(offset_ms = offset, "server clock calibrated");
        Ok(offset)
    }

    fn build_query(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn signer(&self) -> Result<&Arc<dyn QuerySigner>, ExchangeError> {
        self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError("Authentication required but no signer provided".to_string())
        })
    }

    /// Serialize the final query string for one attempt.
    ///
    /// Signed requests gain `recvWindow` (when configured) and a
    /// drift-adjusted `timestamp` unless the caller pre-set them, then the
    /// signature over the serialized string is appended last. On a
    /// clock-skew retry the timestamp is regenerated against the refreshed
    /// drift.
    fn final_query(
        &self,
        params: &[(String, String)],
        auth: AuthMode,
        fresh_timestamp: bool,
    ) -> Result<String, ExchangeError> {
        if auth != AuthMode::Signed {
            return Ok(Self::build_query(params));
        }

        let mut params = params.to_vec();
        if fresh_timestamp {
            params.retain(|(k, _)| k != "timestamp");
        }
        if let Some(window) = self.config.recv_window_ms {
            if !params.iter().any(|(k, _)| k == "recvWindow") {
                params.push(("recvWindow".to_string(), window.to_string()));
            }
        }
        if !params.iter().any(|(k, _)| k == "timestamp") {
            params.push(("timestamp".to_string(), self.clock.timestamp_ms().to_string()));
        }

        let query = Self::build_query(&params);
        let signature = self.signer()?.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    #[instrument(skip(self, params), fields(method = %method, endpoint = %endpoint))]
    async fn dispatch(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError> {
        let base: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        let mut attempt = 0u32;
        loop {
            let query = self.final_query(&base, auth, attempt > 0)?;
            let url = if query.is_empty() {
                format!("{}{}", self.config.base_url, endpoint)
            } else {
                // The query string is appended verbatim so the transmitted
                // parameter order matches the signed order exactly.
                format!("{}{}?{}", self.config.base_url, endpoint, query)
            };

            let mut request = self.client.request(method.clone(), &url);
            if auth != AuthMode::None {
                request = request.header(API_KEY_HEADER, self.signer()?.api_key());
            }

            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await.map_err(|e| {
                ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
            })?;
            trace!(status = %status, "Response body: {}", text);

            let payload =
                serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text));

            if status.is_success() {
                return Ok(payload);
            }

            let code = payload.get("code").and_then(Value::as_i64);
            if status.as_u16() == BAD_REQUEST_STATUS
                && code == Some(CLOCK_SKEW_CODE)
                && attempt == 0
                && auth == AuthMode::Signed
                && self.config.time_sync
            {
                warn!(
                    endpoint = %endpoint,
                    "timestamp outside recvWindow, recalibrating server clock and retrying"
                );
                Box::pin(self.sync_time()).await?;
                attempt += 1;
                continue;
            }

            return Err(ExchangeError::ApiError {
                status: status.as_u16(),
                code,
                payload,
            });
        }
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, &str)],
        auth: AuthMode,
    ) -> Result<Value, ExchangeError> {
        self.dispatch(method, endpoint, params, auth).await
    }
}
