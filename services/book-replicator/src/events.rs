//! Wire and internal message definitions
//!
//! Inbound frames from the exchange are either control frames (`op`
//! acknowledgements, ping/pong) or depth frames tagged with a topic string.
//! Depth frames are decoded into `BookMessage`, the internal representation
//! consumed by the delta applier.

use serde::{Deserialize, Serialize};
use types::numeric::{Price, Size};
use types::topic::Topic;

/// Raw depth frame as published by the exchange.
///
/// ```json
/// {"topic":"orderbook.50.BTCUSDT","type":"snapshot","ts":1672304484978,
///  "data":{"s":"BTCUSDT","b":[["16493.50","0.006"]],"a":[["16611.00","0.029"]],
///          "u":18521288,"seq":7961638724}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct DepthFrame {
    pub topic: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// Exchange timestamp (Unix millis).
    pub ts: i64,
    pub data: DepthData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Snapshot,
    Delta,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthData {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "b", default)]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a", default)]
    pub asks: Vec<[String; 2]>,
    #[serde(rename = "u")]
    pub update_id: u64,
    #[serde(rename = "seq", default)]
    pub sequence: u64,
}

/// Control frame: operation acknowledgements and keepalives.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlFrame {
    pub op: String,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub ret_msg: Option<String>,
    #[serde(default)]
    pub conn_id: Option<String>,
}

/// Outbound request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutboundRequest {
    pub op: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl OutboundRequest {
    pub fn subscribe(topic: &Topic) -> Self {
        Self {
            op: "subscribe".to_string(),
            args: vec![topic.to_channel_string()],
        }
    }

    pub fn unsubscribe(topic: &Topic) -> Self {
        Self {
            op: "unsubscribe".to_string(),
            args: vec![topic.to_channel_string()],
        }
    }

    pub fn ping() -> Self {
        Self {
            op: "ping".to_string(),
            args: Vec::new(),
        }
    }

    pub fn pong() -> Self {
        Self {
            op: "pong".to_string(),
            args: Vec::new(),
        }
    }

    pub fn to_json(&self) -> String {
        // Only string fields: serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A validated price level change or snapshot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUpdate {
    pub price: Price,
    pub size: Size,
}

/// Payload shared by snapshots and deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpdate {
    pub topic: Topic,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
    pub update_id: u64,
    pub sequence: u64,
    /// Exchange timestamp (Unix millis).
    pub timestamp: i64,
}

/// Internal message consumed by the delta applier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookMessage {
    /// Full replacement of a topic's ladders.
    Snapshot(BookUpdate),
    /// Incremental insert/update/delete relative to the stored book.
    Delta(BookUpdate),
}

impl BookMessage {
    pub fn topic(&self) -> &Topic {
        match self {
            BookMessage::Snapshot(update) | BookMessage::Delta(update) => &update.topic,
        }
    }

    pub fn update(&self) -> &BookUpdate {
        match self {
            BookMessage::Snapshot(update) | BookMessage::Delta(update) => update,
        }
    }

    /// Get the message type as a string label for logging.
    pub fn kind_label(&self) -> &'static str {
        match self {
            BookMessage::Snapshot(_) => "snapshot",
            BookMessage::Delta(_) => "delta",
        }
    }
}
