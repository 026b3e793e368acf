//! Service configuration
//!
//! Every field has a production default; `from_env` overrides individual
//! fields from `BOOK_*` environment variables and ignores unparsable values.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How delta continuity is checked against the stored update id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePolicy {
    /// Drop stale deltas and force a fresh snapshot on a gap.
    Strict,
    /// Apply every delta in arrival order without continuity checks.
    BestEffort,
}

impl SequencePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "best_effort" | "best-effort" => Some(Self::BestEffort),
            _ => None,
        }
    }
}

/// Configuration for the replication engine.
#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Public market-data WebSocket endpoint.
    pub ws_url: String,
    /// Interval between application-level pings sent to the exchange.
    pub ping_interval_ms: u64,
    /// A connection with no inbound frame for this long is treated as closed.
    pub idle_timeout_ms: u64,
    /// First reconnect delay.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for any reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Consecutive failed connects before giving up.
    pub max_reconnect_attempts: u32,
    /// A book with no message for this long is reported stale.
    pub liveness_window_ms: u64,
    /// Delta continuity policy.
    pub sequence_policy: SequencePolicy,
    /// Address for the HTTP surface.
    pub bind_addr: SocketAddr,
    /// Topics subscribed at startup as raw (symbol, depth) pairs.
    pub initial_topics: Vec<(String, u32)>,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            ws_url: "wss://stream.bybit.com/v5/public/spot".to_string(),
            ping_interval_ms: 20_000,
            idle_timeout_ms: 60_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 60_000,
            max_reconnect_attempts: 10,
            liveness_window_ms: 30_000,
            sequence_policy: SequencePolicy::Strict,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            initial_topics: Vec::new(),
        }
    }
}

impl ReplicatorConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("BOOK_WS_URL") {
            cfg.ws_url = v;
        }
        if let Some(ms) = lookup("BOOK_PING_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            cfg.ping_interval_ms = ms;
        }
        if let Some(ms) = lookup("BOOK_IDLE_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.idle_timeout_ms = ms;
        }
        if let Some(ms) = lookup("BOOK_RECONNECT_BASE_DELAY_MS").and_then(|v| v.parse().ok()) {
            cfg.reconnect_base_delay_ms = ms;
        }
        if let Some(ms) = lookup("BOOK_RECONNECT_MAX_DELAY_MS").and_then(|v| v.parse().ok()) {
            cfg.reconnect_max_delay_ms = ms;
        }
        if let Some(n) = lookup("BOOK_MAX_RECONNECT_ATTEMPTS").and_then(|v| v.parse().ok()) {
            cfg.max_reconnect_attempts = n;
        }
        if let Some(ms) = lookup("BOOK_LIVENESS_WINDOW_MS").and_then(|v| v.parse().ok()) {
            cfg.liveness_window_ms = ms;
        }
        if let Some(policy) = lookup("BOOK_SEQUENCE_POLICY").and_then(|v| SequencePolicy::parse(&v)) {
            cfg.sequence_policy = policy;
        }
        if let Some(addr) = lookup("BOOK_BIND_ADDR").and_then(|v| v.parse().ok()) {
            cfg.bind_addr = addr;
        }
        if let Some(v) = lookup("BOOK_TOPICS") {
            cfg.initial_topics = parse_topic_list(&v);
        }

        cfg
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms.max(1))
    }

    pub fn liveness_window(&self) -> Duration {
        Duration::from_millis(self.liveness_window_ms.max(1))
    }
}

/// Parse `SYMBOL:DEPTH` pairs separated by commas. Malformed entries are skipped;
/// symbol and depth validation happens at subscribe time.
fn parse_topic_list(raw: &str) -> Vec<(String, u32)> {
    raw.split(',')
        .filter_map(|entry| {
            let (symbol, depth) = entry.trim().split_once(':')?;
            let depth = depth.trim().parse().ok()?;
            Some((symbol.trim().to_string(), depth))
        })
        .collect()
}
