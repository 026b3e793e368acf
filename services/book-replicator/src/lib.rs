//! Order Book Replication Service
//!
//! Mirrors exchange depth feeds into queryable in-memory books:
//! - One streaming connection with heartbeat, idle detection and
//!   exponential-backoff reconnect
//! - Reference-counted topic subscriptions, resubscribed on every connect
//! - Snapshot/delta merge onto price-sorted ladders with update id checks
//! - Point-in-time book copies and top-of-book summaries
//!
//! # Architecture
//!
//! ```text
//!   consumers ──subscribe/unsubscribe──► Registry
//!                                           │ intents
//!   Exchange WS ◄──frames──► ConnectionManager
//!                                  │ decoded messages
//!                             ┌────▼─────┐
//!                             │ Applier  │  ← snapshot/delta merge
//!                             └────┬─────┘
//!                             ┌────▼─────┐
//!                             │  Store   │
//!                             └────┬─────┘
//!                             ┌────▼─────┐
//!   consumers ◄──copies───────│  Query   │
//!                             └──────────┘
//! ```

pub mod api;
pub mod backoff;
pub mod config;
pub mod connection;
pub mod delta;
pub mod events;
pub mod ingestion;
pub mod metrics;
pub mod order_book;
pub mod query;
pub mod registry;
pub mod replicator;
pub mod snapshot;
pub mod store;
pub mod transport;

pub use config::{ReplicatorConfig, SequencePolicy};
pub use replicator::{BookReplicator, Health};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
