pub mod names;
pub mod user;

use crate::api::BinanceRest;
use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::BinanceCodec;
use crate::core::kernel::rest::{ReqwestRest, RestClientBuilder, RestClientConfig};
use crate::core::kernel::signer::HmacSigner;
use crate::core::kernel::ws::{ConnectionTarget, EventReceiver, WsClient, WsConfig};
use self::user::ListenKeySession;
use std::sync::Arc;
use std::time::Duration;

/// Entry point for stream subscriptions.
///
/// Builds one connection manager per subscription; market streams connect
/// directly, user-data streams resolve a listen key session first.
pub struct Streams {
    config: ExchangeConfig,
    ws_config: WsConfig,
    keepalive_interval: Option<Duration>,
    rest: Arc<BinanceRest<ReqwestRest>>,
}

impl Streams {
    pub fn new(config: ExchangeConfig) -> Result<Self, ExchangeError> {
        let mut rest_config =
            RestClientConfig::new(config.rest_endpoint()).with_time_sync(config.time_sync);
        if let Some(window) = config.recv_window_ms {
            rest_config = rest_config.with_recv_window(window);
        }

        let mut builder = RestClientBuilder::new(rest_config);
        if config.has_credentials() {
            builder = builder.with_signer(Arc::new(HmacSigner::new(
                config.api_key().to_string(),
                config.secret_key().to_string(),
            )));
        }
        let rest = builder.build()?;

        Ok(Self {
            config,
            ws_config: WsConfig::default(),
            keepalive_interval: None,
            rest: Arc::new(BinanceRest::new(rest)),
        })
    }

    /// Override the connection configuration used for new subscriptions.
    #[must_use]
    pub fn with_ws_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = ws_config;
        self
    }

    /// Override the listen key renewal interval for user-data streams.
    #[must_use]
    pub fn with_keepalive_interval(mut self, keepalive_interval: Duration) -> Self {
        self.keepalive_interval = Some(keepalive_interval);
        self
    }

    /// REST surface sharing this client's credentials and server clock.
    pub fn rest(&self) -> &BinanceRest<ReqwestRest> {
        &self.rest
    }

    /// Subscribe to one or more market streams.
    ///
    /// A single name connects to the raw stream endpoint; multiple names
    /// share one combined connection whose frames are unwrapped from the
    /// `{stream, data}` envelope before delivery.
    pub fn market(
        &self,
        streams: &[impl AsRef<str>],
    ) -> Result<(WsClient, EventReceiver), ExchangeError> {
        let endpoint = self.config.ws_endpoint();
        match streams {
            [] => Err(ExchangeError::InvalidParameters(
                "at least one stream name is required".to_string(),
            )),
            [single] => Ok(WsClient::new(
                ConnectionTarget::Url(format!("{}/ws/{}", endpoint, single.as_ref())),
                BinanceCodec::single(),
                self.ws_config.clone(),
            )),
            many => Ok(WsClient::new(
                ConnectionTarget::Url(format!(
                    "{}/stream?streams={}",
                    endpoint,
                    names::combined(many)
                )),
                BinanceCodec::combined(),
                self.ws_config.clone(),
            )),
        }
    }

    /// Subscribe to the authenticated user-data stream.
    pub fn user_data(&self) -> Result<(WsClient, EventReceiver), ExchangeError> {
        if !self.config.has_credentials() {
            return Err(ExchangeError::AuthError(
                "User data streams require API credentials".to_string(),
            ));
        }

        let mut session =
            ListenKeySession::new(Arc::clone(&self.rest), self.config.ws_endpoint());
        if let Some(keepalive_interval) = self.keepalive_interval {
            session = session.with_keepalive_interval(keepalive_interval);
        }

        Ok(WsClient::new(
            ConnectionTarget::Session(Arc::new(session)),
            BinanceCodec::single(),
            self.ws_config.clone(),
        ))
    }
}
