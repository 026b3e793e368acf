//! Shared fixtures: an in-memory transport the tests can script, and
//! builders for exchange frames.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use book_replicator::transport::{Connection, Frame, Transport, TransportError};
use book_replicator::{BookReplicator, ReplicatorConfig};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Instant;

#[derive(Default)]
struct MockState {
    fail_next: u32,
    connect_attempts: Vec<Instant>,
    sent: Vec<Frame>,
    inbound: Option<mpsc::UnboundedSender<Frame>>,
}

/// Transport whose connections are fed by the test.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// Time of every connect attempt, failed or not.
    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state.lock().connect_attempts.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().inbound.is_some()
    }

    /// Deliver a text frame on the current connection.
    pub fn push(&self, text: impl Into<String>) {
        self.push_frame(Frame::Text(text.into()));
    }

    pub fn push_frame(&self, frame: Frame) {
        let state = self.state.lock();
        let sender = state.inbound.as_ref().expect("no live connection");
        sender.send(frame).expect("connection task went away");
    }

    /// Simulate the peer vanishing.
    pub fn drop_connection(&self) {
        self.state.lock().inbound = None;
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.state.lock().sent.clone()
    }

    pub fn sent_text(&self) -> Vec<String> {
        self.sent_frames()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Topic arguments of every sent frame with the given `op`, in order.
    pub fn sent_args(&self, op: &str) -> Vec<String> {
        self.sent_text()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["op"] == op)
            .flat_map(|value| {
                value["args"]
                    .as_array()
                    .map(|args| {
                        args.iter()
                            .filter_map(|arg| arg.as_str().map(str::to_string))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Topic-carrying frames (subscribe/unsubscribe) in send order as `op topic`.
    pub fn control_log(&self) -> Vec<String> {
        self.sent_text()
            .iter()
            .filter_map(|text| serde_json::from_str::<serde_json::Value>(text).ok())
            .filter(|value| value["op"] == "subscribe" || value["op"] == "unsubscribe")
            .map(|value| format!("{} {}", value["op"].as_str().unwrap_or(""), value["args"][0].as_str().unwrap_or("")))
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let mut state = self.state.lock();
        state.connect_attempts.push(Instant::now());
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.inbound = Some(tx);
        Ok(Box::new(MockConnection {
            inbound: rx,
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<Frame>,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.state.lock().sent.push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Config with heartbeats far enough apart not to interfere.
pub fn quiet_config() -> ReplicatorConfig {
    ReplicatorConfig {
        ping_interval_ms: 3_600_000,
        idle_timeout_ms: 7_200_000,
        liveness_window_ms: 3_600_000,
        ..ReplicatorConfig::default()
    }
}

pub fn engine_with(config: &ReplicatorConfig) -> (BookReplicator, MockTransport) {
    let transport = MockTransport::new();
    let engine = BookReplicator::new(config, Arc::new(transport.clone()));
    (engine, transport)
}

/// Let spawned tasks drain their queues.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn levels(raw: &[(&str, &str)]) -> serde_json::Value {
    json!(raw.iter().map(|(p, s)| [p.to_string(), s.to_string()]).collect::<Vec<_>>())
}

pub fn snapshot_frame(topic: &str, bids: &[(&str, &str)], asks: &[(&str, &str)], update_id: u64) -> String {
    depth_frame("snapshot", topic, bids, asks, update_id)
}

pub fn delta_frame(topic: &str, bids: &[(&str, &str)], asks: &[(&str, &str)], update_id: u64) -> String {
    depth_frame("delta", topic, bids, asks, update_id)
}

fn depth_frame(kind: &str, topic: &str, bids: &[(&str, &str)], asks: &[(&str, &str)], update_id: u64) -> String {
    let symbol = topic.rsplit('.').next().unwrap_or_default();
    json!({
        "topic": topic,
        "type": kind,
        "ts": 1_672_304_484_978i64 + update_id as i64,
        "data": {
            "s": symbol,
            "b": levels(bids),
            "a": levels(asks),
            "u": update_id,
            "seq": update_id * 100,
        }
    })
    .to_string()
}
