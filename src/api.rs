use crate::core::errors::ExchangeError;
use crate::core::kernel::rest::{AuthMode, RestClient};
use crate::streams::names::KlineInterval;
use serde_json::Value;

const USER_DATA_STREAM_ENDPOINT: &str = "/api/v3/userDataStream";

/// Thin typed wrapper around `RestClient` for the exchange's REST API.
///
/// Payloads are returned exactly as parsed; any field renaming is a
/// consumer concern.
pub struct BinanceRest<R: RestClient> {
    client: R,
}

impl<R: RestClient> BinanceRest<R> {
    pub fn new(client: R) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &R {
        &self.client
    }

    /// Test connectivity
    pub async fn ping(&self) -> Result<Value, ExchangeError> {
        self.client.get("/api/v3/ping", &[], AuthMode::None).await
    }

    /// Get the current server time
    pub async fn server_time(&self) -> Result<Value, ExchangeError> {
        self.client.get("/api/v3/time", &[], AuthMode::None).await
    }

    /// Get exchange trading rules and symbol information
    pub async fn exchange_info(&self, symbol: Option<&str>) -> Result<Value, ExchangeError> {
        let mut params = vec![];
        if let Some(symbol) = symbol {
            params.push(("symbol", symbol));
        }
        self.client
            .get("/api/v3/exchangeInfo", &params, AuthMode::None)
            .await
    }

    /// Get order book depth for a symbol
    pub async fn depth(&self, symbol: &str, limit: Option<u32>) -> Result<Value, ExchangeError> {
        let limit_str = limit.map(|l| l.to_string());
        let mut params = vec![("symbol", symbol)];
        if let Some(ref limit) = limit_str {
            params.push(("limit", limit.as_str()));
        }
        self.client.get("/api/v3/depth", &params, AuthMode::None).await
    }

    /// Get klines/candlestick data
    pub async fn klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        limit: Option<u32>,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Value, ExchangeError> {
        let mut params = vec![("symbol", symbol), ("interval", interval.as_str())];

        let limit_str;
        let start_time_str;
        let end_time_str;

        if let Some(limit) = limit {
            limit_str = limit.to_string();
            params.push(("limit", limit_str.as_str()));
        }
        if let Some(start_time) = start_time {
            start_time_str = start_time.to_string();
            params.push(("startTime", start_time_str.as_str()));
        }
        if let Some(end_time) = end_time {
            end_time_str = end_time.to_string();
            params.push(("endTime", end_time_str.as_str()));
        }

        self.client.get("/api/v3/klines", &params, AuthMode::None).await
    }

    /// Get account information
    pub async fn account(&self) -> Result<Value, ExchangeError> {
        self.client.get("/api/v3/account", &[], AuthMode::Signed).await
    }

    /// Place an order; `extra` carries the optional order parameters
    /// (quantity, price, timeInForce, ...)
    pub async fn new_order(
        &self,
        symbol: &str,
        side: &str,
        order_type: &str,
        extra: &[(&str, &str)],
    ) -> Result<Value, ExchangeError> {
        let mut params = vec![("symbol", symbol), ("side", side), ("type", order_type)];
        params.extend_from_slice(extra);
        self.client.post("/api/v3/order", &params, AuthMode::Signed).await
    }

    /// Cancel an order
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Option<u64>,
        orig_client_order_id: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        let mut params = vec![("symbol", symbol)];

        let order_id_str;
        if let Some(order_id) = order_id {
            order_id_str = order_id.to_string();
            params.push(("orderId", order_id_str.as_str()));
        }
        if let Some(orig_client_order_id) = orig_client_order_id {
            params.push(("origClientOrderId", orig_client_order_id));
        }

        self.client
            .delete("/api/v3/order", &params, AuthMode::Signed)
            .await
    }

    /// Start a user-data stream session and return its listen key
    pub async fn start_user_data_stream(&self) -> Result<String, ExchangeError> {
        let payload = self
            .client
            .post(USER_DATA_STREAM_ENDPOINT, &[], AuthMode::ApiKey)
            .await?;
        payload
            .get("listenKey")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                ExchangeError::DeserializationError(
                    "Missing listenKey in user data stream response".to_string(),
                )
            })
    }

    /// Renew a user-data stream session
    pub async fn keepalive_user_data_stream(
        &self,
        listen_key: &str,
    ) -> Result<Value, ExchangeError> {
        self.client
            .put(
                USER_DATA_STREAM_ENDPOINT,
                &[("listenKey", listen_key)],
                AuthMode::ApiKey,
            )
            .await
    }

    /// Close a user-data stream session
    pub async fn close_user_data_stream(&self, listen_key: &str) -> Result<Value, ExchangeError> {
        self.client
            .delete(
                USER_DATA_STREAM_ENDPOINT,
                &[("listenKey", listen_key)],
                AuthMode::ApiKey,
            )
            .await
    }
}
