/// `mbx` kernel - transport layer for REST and WebSocket communication
///
/// The kernel contains only transport logic and generic interfaces; the
/// endpoint surface lives above it.
///
/// # Architecture
///
/// ## Transport Layer
/// - `RestClient`: unified HTTP client interface with ordered, signable
///   query parameters
/// - `WsClient`: stream connection manager (connect, heartbeat supervision,
///   reconnect with backoff)
///
/// ## Authentication
/// - `QuerySigner`: pluggable signing interface
/// - `HmacSigner`: HMAC-SHA256 over the canonical query string
/// - `ServerClock`: drift-adjusted timestamp generation
///
/// ## Message Handling
/// - `WsCodec`: frame decoding, combined-stream envelope unwrapping
pub mod clock;
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use clock::{drift_from_sample, local_now_ms, ServerClock};
pub use codec::{BinanceCodec, StreamMessage, WsCodec};
pub use rest::{
    AuthMode, ReqwestRest, RestClient, RestClientBuilder, RestClientConfig, CLOCK_SKEW_CODE,
    TIME_ENDPOINT,
};
pub use signer::{HmacSigner, QuerySigner};
pub use ws::{
    ConnectionTarget, EventReceiver, EventSender, SessionProvider, SocketState, StreamEvent,
    WsClient, WsConfig,
};
