use crate::core::errors::ExchangeError;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// One decoded frame delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Stream name from the combined-stream envelope, when subscribed via
    /// the combined endpoint.
    pub stream: Option<String>,
    /// Frame payload. Valid JSON is parsed; anything else is passed through
    /// as a JSON string containing the raw text.
    pub data: Value,
}

/// Codec for decoding raw WebSocket frames into typed messages.
///
/// Control frames (ping, pong, close) are handled at the transport level and
/// never reach the codec.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed messages.
    type Message: Send;

    /// Decode a raw WebSocket message.
    ///
    /// Returns `Ok(None)` when the codec chooses to ignore the frame.
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError>;
}

/// Decoder for Binance market and user-data frames.
pub struct BinanceCodec {
    combined: bool,
}

impl BinanceCodec {
    /// Codec for a single-stream connection (`/ws/<stream>`).
    #[must_use]
    pub const fn single() -> Self {
        Self { combined: false }
    }

    /// Codec for a combined connection (`/stream?streams=...`); frames carry
    /// a `{stream, data}` envelope that is unwrapped before delivery.
    #[must_use]
    pub const fn combined() -> Self {
        Self { combined: true }
    }
}

impl WsCodec for BinanceCodec {
    type Message = StreamMessage;

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => String::from_utf8(data).map_err(|e| {
                ExchangeError::DeserializationError(format!(
                    "Invalid UTF-8 in binary message: {}",
                    e
                ))
            })?,
            _ => return Ok(None), // Ignore other message types
        };

        let Ok(value) = serde_json::from_str::<Value>(&text) else {
            // Malformed frames degrade to raw-text passthrough.
            return Ok(Some(StreamMessage {
                stream: None,
                data: Value::String(text),
            }));
        };

        if self.combined {
            if let Some(stream) = value.get("stream").and_then(Value::as_str) {
                let data = value.get("data").cloned().ok_or_else(|| {
                    ExchangeError::DeserializationError(
                        "Missing data field in stream message".to_string(),
                    )
                })?;
                return Ok(Some(StreamMessage {
                    stream: Some(stream.to_string()),
                    data,
                }));
            }
        }

        Ok(Some(StreamMessage {
            stream: None,
            data: value,
        }))
    }
}
