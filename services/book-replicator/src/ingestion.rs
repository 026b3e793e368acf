//! Frame decoding layer
//!
//! Turns raw text frames from the transport into typed inbound messages.
//! Every price and size in a depth frame is parsed and validated here, so a
//! frame with a single bad level is rejected as a whole and never reaches a
//! book half-applied.

use serde_json::Value;
use types::errors::ProtocolError;
use types::numeric::parse_level;
use types::topic::Topic;

use crate::events::{
    BookMessage, BookUpdate, ControlFrame, DepthFrame, FrameKind, LevelUpdate,
};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Snapshot or delta for a topic.
    Book(BookMessage),
    /// Server-initiated keepalive that expects a pong.
    Ping,
    /// Reply to one of our pings.
    Pong,
    /// Acknowledgement of a subscribe/unsubscribe request.
    Ack {
        op: String,
        success: bool,
        message: Option<String>,
    },
}

/// Decode one text frame.
pub fn decode_frame(text: &str) -> Result<Inbound, ProtocolError> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("ping") {
        return Ok(Inbound::Ping);
    }
    if trimmed.eq_ignore_ascii_case("pong") {
        return Ok(Inbound::Pong);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    if value.get("topic").is_some() {
        let frame: DepthFrame =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        return decode_depth(frame).map(Inbound::Book);
    }

    if value.get("op").is_some() {
        let frame: ControlFrame =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        return Ok(decode_control(frame));
    }

    Err(ProtocolError::Malformed(format!(
        "frame has neither topic nor op: {}",
        truncate(trimmed, 120)
    )))
}

fn decode_control(frame: ControlFrame) -> Inbound {
    let is_pong_reply = frame
        .ret_msg
        .as_deref()
        .is_some_and(|msg| msg.eq_ignore_ascii_case("pong"));

    match frame.op.as_str() {
        "pong" => Inbound::Pong,
        "ping" if is_pong_reply => Inbound::Pong,
        "ping" => Inbound::Ping,
        _ => Inbound::Ack {
            op: frame.op,
            success: frame.success.unwrap_or(true),
            message: frame.ret_msg,
        },
    }
}

fn decode_depth(frame: DepthFrame) -> Result<BookMessage, ProtocolError> {
    let topic =
        Topic::parse(&frame.topic).map_err(|_| ProtocolError::UnknownTopic(frame.topic.clone()))?;

    if !frame.data.symbol.eq_ignore_ascii_case(topic.symbol.as_str()) {
        return Err(ProtocolError::Malformed(format!(
            "symbol {} does not match topic {}",
            frame.data.symbol, frame.topic
        )));
    }

    let update = BookUpdate {
        topic,
        bids: decode_levels(&frame.data.bids)?,
        asks: decode_levels(&frame.data.asks)?,
        update_id: frame.data.update_id,
        sequence: frame.data.sequence,
        timestamp: frame.ts,
    };

    Ok(match frame.kind {
        FrameKind::Snapshot => BookMessage::Snapshot(update),
        FrameKind::Delta => BookMessage::Delta(update),
    })
}

fn decode_levels(raw: &[[String; 2]]) -> Result<Vec<LevelUpdate>, ProtocolError> {
    raw.iter()
        .map(|[price, size]| parse_level(price, size).map(|(price, size)| LevelUpdate { price, size }))
        .collect()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::numeric::{Price, Size};
    use types::topic::Depth;

    const SNAPSHOT: &str = r#"{"topic":"orderbook.50.BTCUSDT","type":"snapshot","ts":1672304484978,
        "data":{"s":"BTCUSDT","b":[["100","1"],["99","2"]],"a":[["101","1"]],"u":1,"seq":10}}"#;

    #[test]
    fn test_decode_snapshot() {
        let inbound = decode_frame(SNAPSHOT).unwrap();
        let Inbound::Book(BookMessage::Snapshot(update)) = inbound else {
            panic!("Expected snapshot, got {:?}", inbound);
        };

        assert_eq!(update.topic.depth, Depth::L50);
        assert_eq!(update.bids.len(), 2);
        assert_eq!(update.bids[1].price, Price::from_u64(99));
        assert_eq!(update.asks[0].size, Size::from_str("1").unwrap());
        assert_eq!(update.update_id, 1);
        assert_eq!(update.sequence, 10);
        assert_eq!(update.timestamp, 1672304484978);
    }

    #[test]
    fn test_decode_delta_with_deletion() {
        let json = r#"{"topic":"orderbook.1.ETHUSDT","type":"delta","ts":5,
            "data":{"s":"ETHUSDT","b":[["2000.5","0"]],"u":7,"seq":70}}"#;
        let Inbound::Book(BookMessage::Delta(update)) = decode_frame(json).unwrap() else {
            panic!("Expected delta");
        };
        assert!(update.bids[0].size.is_zero());
        assert!(update.asks.is_empty());
    }

    #[test]
    fn test_negative_size_rejects_whole_frame() {
        let json = r#"{"topic":"orderbook.50.BTCUSDT","type":"delta","ts":5,
            "data":{"s":"BTCUSDT","b":[["100","1"],["99","-3"]],"a":[],"u":2,"seq":11}}"#;
        let err = decode_frame(json).unwrap_err();
        assert!(matches!(err, ProtocolError::NegativeSize { .. }));
    }

    #[test]
    fn test_unparsable_price_rejected() {
        let json = r#"{"topic":"orderbook.50.BTCUSDT","type":"delta","ts":5,
            "data":{"s":"BTCUSDT","b":[["1o0","1"]],"a":[],"u":2,"seq":11}}"#;
        assert_eq!(
            decode_frame(json).unwrap_err(),
            ProtocolError::InvalidPrice("1o0".to_string())
        );
    }

    #[test]
    fn test_unknown_topic() {
        let json = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":5,
            "data":{"s":"BTCUSDT","b":[],"a":[],"u":2}}"#;
        assert_eq!(
            decode_frame(json).unwrap_err(),
            ProtocolError::UnknownTopic("publicTrade.BTCUSDT".to_string())
        );
    }

    #[test]
    fn test_symbol_mismatch_is_malformed() {
        let json = r#"{"topic":"orderbook.50.BTCUSDT","type":"snapshot","ts":5,
            "data":{"s":"ETHUSDT","b":[],"a":[],"u":2}}"#;
        assert!(matches!(
            decode_frame(json).unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }

    #[test]
    fn test_decode_keepalives() {
        assert_eq!(decode_frame(r#"{"op":"ping"}"#).unwrap(), Inbound::Ping);
        assert_eq!(decode_frame(r#"{"op":"pong"}"#).unwrap(), Inbound::Pong);
        assert_eq!(
            decode_frame(r#"{"success":true,"ret_msg":"pong","conn_id":"x","op":"ping"}"#).unwrap(),
            Inbound::Pong
        );
        assert_eq!(decode_frame("PONG").unwrap(), Inbound::Pong);
    }

    #[test]
    fn test_decode_ack() {
        let json = r#"{"success":false,"ret_msg":"error:handler not found","op":"subscribe"}"#;
        assert_eq!(
            decode_frame(json).unwrap(),
            Inbound::Ack {
                op: "subscribe".to_string(),
                success: false,
                message: Some("error:handler not found".to_string()),
            }
        );
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            decode_frame("not json").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        assert!(matches!(
            decode_frame(r#"{"hello":"world"}"#).unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }
}
