//! Engine assembly
//!
//! `BookReplicator` wires the registry, store, applier and connection
//! manager together and exposes the consumer-facing entrypoints. One
//! instance is built at startup and shared by reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use types::errors::ValidationError;
use types::ids::{ConsumerId, Symbol};
use types::topic::Topic;

use crate::config::ReplicatorConfig;
use crate::connection::{ConnectionManager, ConnectionSettings, ConnectionState};
use crate::delta::DeltaApplier;
use crate::metrics::ReplicatorMetrics;
use crate::query::{BookSummary, QueryFacade};
use crate::registry::{SubscribeOutcome, SubscriptionRegistry, UnsubscribeOutcome};
use crate::snapshot::BookSnapshot;
use crate::store::BookStore;
use crate::transport::{Transport, WsTransport};

/// Health report for external checks.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub connection: ConnectionState,
    pub healthy: bool,
    pub topics: Vec<String>,
    pub books: usize,
    pub stale: Vec<String>,
    pub metrics: BTreeMap<String, u64>,
}

pub struct BookReplicator {
    registry: Arc<SubscriptionRegistry>,
    store: Arc<BookStore>,
    metrics: Arc<ReplicatorMetrics>,
    query: QueryFacade,
    connection: Arc<ConnectionManager>,
}

impl BookReplicator {
    pub fn new(config: &ReplicatorConfig, transport: Arc<dyn Transport>) -> Self {
        let (registry, intents) = SubscriptionRegistry::new();
        let registry = Arc::new(registry);
        let store = Arc::new(BookStore::new());
        let metrics = Arc::new(ReplicatorMetrics::new());
        let applier = Arc::new(DeltaApplier::new(
            store.clone(),
            metrics.clone(),
            config.sequence_policy,
        ));
        let connection = Arc::new(ConnectionManager::new(
            transport,
            registry.clone(),
            intents,
            applier,
            metrics.clone(),
            ConnectionSettings::from(config),
        ));

        Self {
            registry,
            query: QueryFacade::new(store.clone(), config.liveness_window()),
            store,
            metrics,
            connection,
        }
    }

    /// Build an engine streaming from `config.ws_url`.
    pub fn with_websocket(config: &ReplicatorConfig) -> Self {
        Self::new(config, Arc::new(WsTransport::new(config.ws_url.clone())))
    }

    pub fn start(&self) {
        self.connection.start();
    }

    pub async fn stop(&self) {
        self.connection.stop().await;
    }

    /// Register `consumer` for the topic. Validation happens here, before
    /// anything reaches the connection layer.
    pub fn subscribe(
        &self,
        symbol: &str,
        depth: u32,
        consumer: ConsumerId,
    ) -> Result<SubscribeOutcome, ValidationError> {
        let topic = Topic::validate(symbol, depth)?;
        Ok(self.subscribe_topic(topic, consumer))
    }

    pub fn subscribe_topic(&self, topic: Topic, consumer: ConsumerId) -> SubscribeOutcome {
        self.registry.subscribe(topic, consumer)
    }

    pub fn unsubscribe(
        &self,
        symbol: &str,
        depth: u32,
        consumer: &ConsumerId,
    ) -> Result<UnsubscribeOutcome, ValidationError> {
        let topic = Topic::validate(symbol, depth)?;
        Ok(self.unsubscribe_topic(&topic, consumer))
    }

    /// Drop `consumer` from the topic. The book itself goes away once the
    /// connection task has processed the deactivation.
    pub fn unsubscribe_topic(&self, topic: &Topic, consumer: &ConsumerId) -> UnsubscribeOutcome {
        let outcome = self.registry.unsubscribe(topic, consumer);
        if outcome == UnsubscribeOutcome::Deactivated {
            self.connection.reconcile_parked();
        }
        outcome
    }

    /// Copy of the deepest book tracked for `symbol`. Unknown or invalid
    /// symbols yield `None`.
    pub fn get_book(&self, symbol: &str) -> Option<BookSnapshot> {
        let symbol = Symbol::new(symbol).ok()?;
        self.query.get_book(&symbol)
    }

    pub fn get_summary(&self, symbol: &str) -> Option<BookSummary> {
        let symbol = Symbol::new(symbol).ok()?;
        self.query.get_summary(&symbol)
    }

    pub fn query(&self) -> &QueryFacade {
        &self.query
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &ReplicatorMetrics {
        &self.metrics
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn watch_connection(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.connection.watch_state()
    }

    pub fn health(&self) -> Health {
        let connection = self.connection.state();
        let topics = self.registry.topics();
        let stale = topics
            .iter()
            .filter(|topic| self.query.is_stale(topic))
            .map(Topic::to_channel_string)
            .collect();

        Health {
            connection,
            healthy: connection.is_connected(),
            topics: topics.iter().map(Topic::to_channel_string).collect(),
            books: self.store.len(),
            stale,
            metrics: self.metrics.export(),
        }
    }
}
