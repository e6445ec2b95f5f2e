pub mod api;
pub mod core;
pub mod streams;

pub use crate::core::backoff::Backoff;
pub use crate::core::config::ExchangeConfig;
pub use crate::core::errors::ExchangeError;
pub use crate::core::kernel::{
    AuthMode, BinanceCodec, HmacSigner, ReqwestRest, RestClient, ServerClock, SocketState,
    StreamEvent, StreamMessage, WsClient, WsConfig,
};
pub use api::BinanceRest;
pub use streams::Streams;
