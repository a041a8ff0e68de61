use serde::Serialize;

/// Partition every producer and consumer of this crate works with
pub const DEFAULT_PARTITION: i32 = 0;

/// Message to be published on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
        }
    }

    /// Build a message whose payload is the JSON encoding of `value`
    pub fn json<T: Serialize>(topic: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }

    pub fn with_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// Where the broker stored a published message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Record received by a consumer session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// Broker timestamp in milliseconds since the epoch, when known
    pub timestamp: Option<i64>,
}

impl InboundMessage {
    /// Payload as UTF-8, lossy
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn decode_json<'a, T: serde::Deserialize<'a>>(&'a self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

/// Offset a consumer session starts reading from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Only messages published after the session was opened
    Newest,
    /// Everything still retained by the broker
    Oldest,
}
