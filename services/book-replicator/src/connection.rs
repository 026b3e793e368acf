//! Connection manager
//!
//! Owns the single streaming connection to the market-data endpoint and
//! drives it through
//! `Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting -> ...`
//! until `stop()` or until the configured number of consecutive connect
//! failures is reached (`Failed`).
//!
//! While connected, one task processes inbound frames strictly in arrival
//! order, so book mutation needs no per-topic coordination beyond the store
//! lock. Subscription intents from the registry are folded into the same
//! loop; each connection tracks which topics it has already asked for so
//! every active topic is subscribed exactly once per connection.
//!
//! Books are only dropped by whoever holds the intent receiver: the running
//! task, or `reconcile_parked()` once the task has handed the queue back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use types::topic::Topic;

use crate::backoff::Backoff;
use crate::config::ReplicatorConfig;
use crate::delta::DeltaApplier;
use crate::events::OutboundRequest;
use crate::ingestion::{decode_frame, Inbound};
use crate::metrics::ReplicatorMetrics;
use crate::registry::{Intent, SubscriptionRegistry};
use crate::transport::{Connection, Frame, Transport, TransportError};

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out the backoff before connect attempt `attempt`.
    Reconnecting { attempt: u32 },
    /// Gave up after `attempts` consecutive connect failures.
    Failed { attempts: u32 },
    Stopped,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed { .. })
    }
}

/// Timing knobs for the connection loop.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
    pub liveness_window: Duration,
    pub backoff: Backoff,
    pub max_reconnect_attempts: u32,
}

impl From<&ReplicatorConfig> for ConnectionSettings {
    fn from(config: &ReplicatorConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            idle_timeout: config.idle_timeout(),
            liveness_window: config.liveness_window(),
            backoff: Backoff::from_millis(
                config.reconnect_base_delay_ms,
                config.reconnect_max_delay_ms,
            ),
            max_reconnect_attempts: config.max_reconnect_attempts.max(1),
        }
    }
}

/// Why a live session ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Disconnected(TransportError),
}

pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    registry: Arc<SubscriptionRegistry>,
    applier: Arc<DeltaApplier>,
    metrics: Arc<ReplicatorMetrics>,
    settings: ConnectionSettings,
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    intents: Mutex<Option<mpsc::UnboundedReceiver<Intent>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<SubscriptionRegistry>,
        intents: mpsc::UnboundedReceiver<Intent>,
        applier: Arc<DeltaApplier>,
        metrics: Arc<ReplicatorMetrics>,
        settings: ConnectionSettings,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        Self {
            transport,
            registry,
            applier,
            metrics,
            settings,
            state,
            shutdown,
            intents: Mutex::new(Some(intents)),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Begin connecting.
    ///
    /// A no-op while already running or after `stop()`. After a `Failed`
    /// state, calling `start()` again resumes with a fresh attempt budget.
    pub fn start(self: &Arc<Self>) {
        if *self.shutdown.borrow() {
            debug!("Connection manager stopped; start ignored");
            return;
        }
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Some(intents) = self.intents.lock().take() else {
            return;
        };
        let manager = Arc::clone(self);
        *task = Some(tokio::spawn(async move { manager.run(intents).await }));
    }

    /// Close the live connection, cancel any pending reconnect and wait for
    /// the connection task to finish processing its current frame.
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connection task ended abnormally");
            }
        }
        self.set_state(ConnectionState::Stopped);
        info!("Connection manager stopped");
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = ?previous, to = ?next, "Connection state changed");
        }
    }

    async fn run(self: Arc<Self>, mut intents: mpsc::UnboundedReceiver<Intent>) {
        self.drive(&mut intents).await;
        self.park(intents);
    }

    /// Connect, stream and reconnect until shutdown or until the attempt
    /// budget is spent.
    async fn drive(&self, intents: &mut mpsc::UnboundedReceiver<Intent>) {
        let mut shutdown = self.shutdown.subscribe();
        let mut failures: u32 = 0;

        loop {
            self.set_state(ConnectionState::Connecting);
            let connected = {
                let connect = self.transport.connect();
                tokio::pin!(connect);
                loop {
                    tokio::select! {
                        biased;
                        _ = stopped(&mut shutdown) => return,
                        result = &mut connect => break result,
                        Some(intent) = intents.recv() => self.apply_offline(intent),
                    }
                }
            };

            match connected {
                Ok(conn) => {
                    failures = 0;
                    self.metrics.record_connect();
                    self.set_state(ConnectionState::Connected);
                    info!(topics = self.registry.len(), "Connected to market data stream");

                    match self.run_session(conn, intents, &mut shutdown).await {
                        SessionEnd::Shutdown => return,
                        SessionEnd::Disconnected(reason) => {
                            self.set_state(ConnectionState::Disconnected);
                            warn!(reason = %reason, "Market data stream disconnected");
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.metrics.record_failed_connect();
                    warn!(attempt = failures, error = %e, "Connect failed");

                    if failures >= self.settings.max_reconnect_attempts {
                        self.set_state(ConnectionState::Failed { attempts: failures });
                        error!(
                            attempts = failures,
                            "Reconnect attempts exhausted, giving up until restarted"
                        );
                        return;
                    }
                }
            }

            let delay = self.settings.backoff.delay(failures);
            self.set_state(ConnectionState::Reconnecting {
                attempt: failures + 1,
            });
            info!(
                attempt = failures + 1,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );

            let backoff = sleep(delay);
            tokio::pin!(backoff);
            loop {
                tokio::select! {
                    biased;
                    _ = stopped(&mut shutdown) => return,
                    _ = &mut backoff => break,
                    Some(intent) = intents.recv() => self.apply_offline(intent),
                }
            }
        }
    }

    /// Hand the intent queue back so a later `start()` can resume, settling
    /// anything queued since the last poll.
    fn park(&self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        let mut parked = self.intents.lock();
        self.drain_offline(&mut intents);
        *parked = Some(intents);
    }

    /// Settle queued intents while no connection task owns the queue.
    pub fn reconcile_parked(&self) {
        if let Some(intents) = self.intents.lock().as_mut() {
            self.drain_offline(intents);
        }
    }

    fn drain_offline(&self, intents: &mut mpsc::UnboundedReceiver<Intent>) {
        while let Ok(intent) = intents.try_recv() {
            self.apply_offline(intent);
        }
    }

    /// Without a connection only removals matter; the next session
    /// subscribes every active topic anyway.
    fn apply_offline(&self, intent: Intent) {
        if let Intent::Unsubscribe(topic) = intent {
            if !self.registry.contains(&topic) && self.applier.store().remove(&topic) {
                debug!(topic = %topic, "Book dropped after unsubscribe");
            }
        }
    }

    async fn run_session(
        &self,
        mut conn: Box<dyn Connection>,
        intents: &mut mpsc::UnboundedReceiver<Intent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut subscribed: HashSet<Topic> = HashSet::new();

        for topic in self.registry.topics() {
            if let Err(e) = self.send(conn.as_mut(), OutboundRequest::subscribe(&topic)).await {
                return SessionEnd::Disconnected(e);
            }
            subscribed.insert(topic);
        }

        let now = Instant::now();
        let mut ping = interval_at(now + self.settings.ping_interval, self.settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = interval_at(
            now + self.settings.liveness_window,
            self.settings.liveness_window,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle = sleep(self.settings.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                _ = stopped(shutdown) => {
                    conn.close().await;
                    return SessionEnd::Shutdown;
                }
                frame = conn.recv() => {
                    idle.as_mut().reset(Instant::now() + self.settings.idle_timeout);
                    let result = match frame {
                        Some(Ok(frame)) => self.handle_frame(conn.as_mut(), frame, &subscribed).await,
                        Some(Err(e)) => Err(e),
                        None => Err(TransportError::Closed),
                    };
                    if let Err(e) = result {
                        return SessionEnd::Disconnected(e);
                    }
                }
                Some(intent) = intents.recv() => {
                    if let Err(e) = self.handle_intent(conn.as_mut(), intent, &mut subscribed).await {
                        return SessionEnd::Disconnected(e);
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = self.send(conn.as_mut(), OutboundRequest::ping()).await {
                        return SessionEnd::Disconnected(e);
                    }
                }
                _ = &mut idle => {
                    conn.close().await;
                    return SessionEnd::Disconnected(TransportError::IdleTimeout(
                        self.settings.idle_timeout.as_millis() as u64,
                    ));
                }
                _ = sweep.tick() => self.sweep_books(),
            }
        }
    }

    async fn handle_frame(
        &self,
        conn: &mut dyn Connection,
        frame: Frame,
        subscribed: &HashSet<Topic>,
    ) -> Result<(), TransportError> {
        self.metrics.record_frame();

        let text = match frame {
            Frame::Text(text) => text,
            Frame::Ping(payload) => return conn.send(Frame::Pong(payload)).await,
            Frame::Pong(_) => return Ok(()),
            Frame::Close => return Err(TransportError::Closed),
        };

        match decode_frame(&text) {
            Ok(Inbound::Book(message)) => {
                let topic = message.topic();
                if !self.registry.contains(topic) {
                    debug!(topic = %topic, kind = message.kind_label(), "Dropping message for inactive topic");
                    return Ok(());
                }
                if self.applier.apply(&message).needs_resync() && subscribed.contains(topic) {
                    info!(topic = %topic, "Resubscribing to force a fresh snapshot");
                    self.send(conn, OutboundRequest::unsubscribe(topic)).await?;
                    self.send(conn, OutboundRequest::subscribe(topic)).await?;
                }
            }
            Ok(Inbound::Ping) => {
                self.send(conn, OutboundRequest::pong()).await?;
            }
            Ok(Inbound::Pong) => debug!("Pong received"),
            Ok(Inbound::Ack { op, success, message }) => {
                if success {
                    debug!(op = %op, "Request acknowledged");
                } else {
                    warn!(op = %op, message = ?message, "Request rejected by exchange");
                }
            }
            Err(e) => {
                self.metrics.record_anomaly();
                warn!(error = %e, "Dropping undecodable frame");
            }
        }
        Ok(())
    }

    async fn handle_intent(
        &self,
        conn: &mut dyn Connection,
        intent: Intent,
        subscribed: &mut HashSet<Topic>,
    ) -> Result<(), TransportError> {
        match intent {
            Intent::Subscribe(topic) => {
                // The registry may have flipped again since the intent was queued.
                if self.registry.contains(&topic) && !subscribed.contains(&topic) {
                    self.send(conn, OutboundRequest::subscribe(&topic)).await?;
                    subscribed.insert(topic);
                }
            }
            Intent::Unsubscribe(topic) => {
                if !self.registry.contains(&topic) {
                    if subscribed.remove(&topic) {
                        self.send(conn, OutboundRequest::unsubscribe(&topic)).await?;
                    }
                    if self.applier.store().remove(&topic) {
                        debug!(topic = %topic, "Book dropped after unsubscribe");
                    }
                }
            }
        }
        Ok(())
    }

    async fn send(&self, conn: &mut dyn Connection, request: OutboundRequest) -> Result<(), TransportError> {
        conn.send(Frame::Text(request.to_json())).await?;
        match request.op.as_str() {
            "subscribe" => {
                self.metrics.record_subscribe_sent();
                info!(args = ?request.args, "Subscribe sent");
            }
            "unsubscribe" => {
                self.metrics.record_unsubscribe_sent();
                info!(args = ?request.args, "Unsubscribe sent");
            }
            _ => debug!(op = %request.op, "Control frame sent"),
        }
        Ok(())
    }

    /// Drop books whose topic is no longer active and flag silent ones.
    fn sweep_books(&self) {
        let active: HashSet<Topic> = self.registry.topics().into_iter().collect();
        let store = self.applier.store();
        for topic in store.retain(|topic| active.contains(topic)) {
            info!(topic = %topic, "Dropped orphaned book");
        }
        for topic in store.stale_topics(self.settings.liveness_window) {
            warn!(
                topic = %topic,
                window_ms = self.settings.liveness_window.as_millis() as u64,
                "No book update within liveness window"
            );
        }
    }
}

/// Resolves once shutdown has been requested.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            // Sender gone: nobody can request shutdown any more.
            std::future::pending::<()>().await;
        }
    }
}
