//! The connection manager: endpoint registry, selection policy, failover
//! hysteresis, change notification, and the polling modes that drive probes.

use std::{
    collections::BTreeMap,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    endpoint::{Endpoint, EndpointId},
    error::ClientError,
    history::ResponseHistory,
    scheduler::PollScheduler,
    transport::RpcTransport,
};

/// Default interval between poll ticks.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(20_000);

/// Default timeout applied to each probe issued by a poll tick.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Which endpoints each poll tick probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    /// Walk priority tiers from highest precedence to lowest, probing each
    /// tier until one yields an online endpoint.
    #[default]
    Prioritized,
    /// Probe only the current endpoint.
    Current,
    /// Probe every registered endpoint.
    All,
}

/// Configuration for the [`ConnectionManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Interval between poll ticks.
    pub poll_period: Duration,
    /// Timeout for each probe issued by a poll tick.
    pub poll_timeout: Duration,
    /// Whether the failover policy may change the current endpoint
    /// automatically based on probe results.
    pub auto_switch: bool,
    /// Which endpoints each tick probes.
    pub poll_mode: PollMode,
    /// Endpoints skipped by prioritized polling and by auto-switch.
    pub excluded: Vec<EndpointId>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_period: DEFAULT_POLL_PERIOD,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            auto_switch: true,
            poll_mode: PollMode::default(),
            excluded: Vec::new(),
        }
    }
}

struct ManagerState {
    registry: Vec<Arc<RpcTransport>>,
    current: Option<Arc<RpcTransport>>,
}

struct Inner {
    state: RwLock<ManagerState>,
    config: RwLock<ManagerConfig>,
    history: ResponseHistory,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<EndpointId>>>>,
    scheduler: Mutex<PollScheduler>,
}

/// Owns a registry of endpoints (via their transports), the current
/// connection, the failover policy, and the subscribers notified on every
/// effective change of the current connection.
///
/// Cheap to clone; clones share the same registry and scheduler. Registry
/// operations are in-memory and never suspend. The decision-and-notify step
/// is serialized by the manager's state lock, so subscribers observe changes
/// in the order they occurred.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ManagerConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ManagerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ManagerState { registry: Vec::new(), current: None }),
                config: RwLock::new(config),
                history: ResponseHistory::new(),
                subscribers: Mutex::new(Vec::new()),
                scheduler: Mutex::new(PollScheduler::new()),
            }),
        }
    }

    /// Returns a copy of the current configuration.
    #[must_use]
    pub fn config(&self) -> ManagerConfig {
        self.inner.config.read().clone()
    }

    /// Replaces the configuration. Takes effect for registry decisions
    /// immediately; an already-running poll loop keeps its period and mode
    /// until polling is restarted.
    pub fn set_config(&self, config: ManagerConfig) {
        *self.inner.config.write() = config;
    }

    /// Enables or disables automatic failover.
    pub fn set_auto_switch(&self, auto_switch: bool) {
        self.inner.config.write().auto_switch = auto_switch;
    }

    /// Subscribes to changes of the current connection.
    ///
    /// Each effective change delivers exactly one message - the identity of
    /// the new current endpoint, or `None` on disconnect - in the order the
    /// changes occurred. Re-selecting the same endpoint delivers nothing.
    #[must_use]
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Option<EndpointId>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Delivers a change to all live subscribers, dropping closed ones.
    /// Callers hold the state write lock, which is what keeps notifications
    /// ordered.
    fn notify(&self, change: Option<&EndpointId>) {
        match change {
            Some(id) => tracing::info!(uri = %id, "connection changed"),
            None => tracing::info!("connection cleared"),
        }
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|tx| tx.send(change.cloned()).is_ok());
    }

    /// Registers an endpoint. A no-op if an endpoint with the same identity
    /// is already registered.
    ///
    /// # Errors
    ///
    /// Returns an error if a transport cannot be built from the endpoint.
    pub fn add_endpoint(&self, endpoint: Endpoint) -> Result<(), ClientError> {
        let transport = Arc::new(RpcTransport::new(endpoint)?);
        let mut state = self.inner.state.write();
        if state.registry.iter().any(|t| t.id() == transport.id()) {
            return Ok(());
        }
        tracing::debug!(uri = %transport.uri(), priority = transport.priority(), "endpoint added");
        state.registry.push(transport);
        Ok(())
    }

    /// Removes an endpoint by identity. If it was the current connection,
    /// the current connection is cleared and subscribers are notified with
    /// `None`. Returns whether anything was removed.
    pub fn remove_endpoint(&self, id: &EndpointId) -> bool {
        let mut state = self.inner.state.write();
        let before = state.registry.len();
        state.registry.retain(|t| t.id() != *id);
        if state.registry.len() == before {
            return false;
        }

        self.inner.history.remove(id);
        if state.current.as_ref().is_some_and(|t| t.id() == *id) {
            state.current = None;
            self.notify(None);
        }
        tracing::debug!(uri = %id, "endpoint removed");
        true
    }

    /// Removes the first registered endpoint with the given URI.
    pub fn remove_endpoint_by_uri(&self, uri: &str) -> bool {
        let id = {
            let state = self.inner.state.read();
            state.registry.iter().find(|t| t.uri() == uri).map(|t| t.id())
        };
        id.is_some_and(|id| self.remove_endpoint(&id))
    }

    /// Sets the current connection.
    ///
    /// - `None` clears the current connection and notifies (if one was set).
    /// - An endpoint matching the current connection's identity is applied
    ///   silently: priority and timeout updates take effect, no notification.
    /// - Otherwise any same-identity registry entry is replaced by the new
    ///   endpoint, which becomes current, and subscribers are notified once.
    ///
    /// # Errors
    ///
    /// Returns an error if a transport cannot be built from the endpoint.
    pub fn set_connection(&self, endpoint: Option<Endpoint>) -> Result<(), ClientError> {
        let Some(endpoint) = endpoint else {
            let mut state = self.inner.state.write();
            if state.current.is_some() {
                state.current = None;
                self.notify(None);
            }
            return Ok(());
        };

        let id = endpoint.id();
        let was_current = {
            let state = self.inner.state.read();
            match &state.current {
                Some(current) if current.id() == id => {
                    let unchanged = current.endpoint().priority() == endpoint.priority()
                        && current.endpoint().timeout() == endpoint.timeout();
                    if unchanged {
                        return Ok(());
                    }
                    true
                }
                _ => false,
            }
        };

        let transport = Arc::new(RpcTransport::new(endpoint)?);
        let mut state = self.inner.state.write();
        state.registry.retain(|t| t.id() != id);
        state.registry.push(Arc::clone(&transport));
        state.current = Some(transport);
        if !was_current {
            self.notify(Some(&id));
        }
        Ok(())
    }

    /// Sets the current connection by URI: reuses a registered endpoint with
    /// that URI if one exists, otherwise registers a fresh endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an invalid URI.
    pub fn set_connection_uri(&self, uri: &str) -> Result<(), ClientError> {
        let existing = {
            let state = self.inner.state.read();
            state.registry.iter().find(|t| t.uri() == uri).cloned()
        };

        match existing {
            Some(transport) => {
                let id = transport.id();
                let mut state = self.inner.state.write();
                if state.current.as_ref().map(|t| t.id()) != Some(id.clone()) {
                    state.current = Some(transport);
                    self.notify(Some(&id));
                }
                Ok(())
            }
            None => self.set_connection(Some(Endpoint::new(uri)?)),
        }
    }

    /// Returns the current connection's transport, if any.
    #[must_use]
    pub fn get_connection(&self) -> Option<Arc<RpcTransport>> {
        self.inner.state.read().current.clone()
    }

    /// Whether the current connection exists and its last probe left it
    /// online and not unauthenticated. With no current connection the
    /// manager reports disconnected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner
            .state
            .read()
            .current
            .as_ref()
            .is_some_and(|t| t.is_connected())
    }

    /// Returns all registered transports in registration order.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Arc<RpcTransport>> {
        self.inner.state.read().registry.clone()
    }

    /// Returns all registered transports in precedence order: numbered
    /// priority tiers ascending, unprioritized (priority 0) last, ties
    /// within a tier ordered by URI.
    #[must_use]
    pub fn list_connections(&self) -> Vec<Arc<RpcTransport>> {
        let mut list = self.endpoints();
        list.sort_by(|a, b| {
            a.tier_rank()
                .cmp(&b.tier_rank())
                .then_with(|| a.uri().cmp(&b.uri()))
        });
        list
    }

    /// Evaluates the priority-tier and hysteresis policy once, without
    /// mutating the current connection.
    ///
    /// Tiers are tried in precedence order; within a tier only endpoints
    /// whose last probe reports online are candidates, and the lowest
    /// recorded response time wins. A winner in the same tier as an online
    /// current connection only displaces it after being strictly faster for
    /// [`crate::history::MIN_BETTER_SAMPLES`] consecutive rounds; an offline
    /// or lower-tier current connection is displaced immediately.
    #[must_use]
    pub fn get_best_available_connection(
        &self,
        excluding: &[EndpointId],
    ) -> Option<Arc<RpcTransport>> {
        let (tiers, current) = {
            let state = self.inner.state.read();
            let mut tiers: BTreeMap<u32, Vec<Arc<RpcTransport>>> = BTreeMap::new();
            for transport in &state.registry {
                if excluding.contains(&transport.id()) {
                    continue;
                }
                tiers.entry(transport.tier_rank()).or_default().push(Arc::clone(transport));
            }
            (tiers, state.current.clone())
        };

        for (tier_rank, members) in tiers {
            let winner = members
                .iter()
                .filter(|t| t.health().online.is_true())
                .min_by_key(|t| t.health().response_time.unwrap_or(Duration::MAX))
                .cloned();
            let Some(winner) = winner else { continue };

            if let Some(current) = &current {
                let same_tier_online_incumbent = current.health().online.is_true()
                    && current.tier_rank() == tier_rank
                    && current.id() != winner.id()
                    && !excluding.contains(&current.id());

                if same_tier_online_incumbent
                    && !self.inner.history.consistently_faster(&winner.id(), &current.id())
                {
                    return Some(Arc::clone(current));
                }
            }

            return Some(winner);
        }

        None
    }

    /// Re-evaluates the policy and switches the current connection to the
    /// winner. A no-op unless auto-switch is enabled; never clears an
    /// existing current connection when no endpoint is available.
    ///
    /// Returns the current connection after evaluation.
    pub fn update_best_connection_in_priority(&self) -> Option<Arc<RpcTransport>> {
        let config = self.config();
        if !config.auto_switch {
            return self.get_connection();
        }

        if let Some(best) = self.get_best_available_connection(&config.excluded) {
            self.switch_to(best);
        }
        self.get_connection()
    }

    /// Makes `best` the current connection, notifying once if it differs
    /// from the existing current connection.
    fn switch_to(&self, best: Arc<RpcTransport>) {
        let mut state = self.inner.state.write();
        let best_id = best.id();
        if state.current.as_ref().map(|t| t.id()) == Some(best_id.clone()) {
            return;
        }
        state.current = Some(best);
        self.notify(Some(&best_id));
    }

    /// Manually probes the current endpoint once. If it is (or becomes)
    /// disconnected and auto-switch is enabled, immediately evaluates the
    /// policy excluding the failed endpoint and switches to a replacement if
    /// one is available. Probe failures are logged, never raised.
    ///
    /// Returns [`is_connected`](Self::is_connected) after the check.
    pub async fn check_connection(&self) -> bool {
        let current = self.get_connection();
        let Some(current) = current else {
            return false;
        };
        let (timeout, auto_switch) = {
            let config = self.inner.config.read();
            (config.poll_timeout, config.auto_switch)
        };

        current.probe(timeout).await;
        let health = current.health();
        self.inner
            .history
            .record_round(&[(current.id(), health.response_time)]);

        if !health.is_connected() && auto_switch {
            if let Some(best) = self.get_best_available_connection(&[current.id()]) {
                self.switch_to(best);
            }
        }

        self.is_connected()
    }

    /// Manually probes every registered endpoint concurrently, records the
    /// round, and applies the failover policy if auto-switch is enabled.
    ///
    /// Returns [`is_connected`](Self::is_connected) after the check.
    pub async fn check_connections(&self) -> bool {
        let transports = self.endpoints();
        let timeout = self.inner.config.read().poll_timeout;

        join_all(transports.iter().map(|t| t.probe(timeout))).await;

        let round: Vec<_> = transports
            .iter()
            .map(|t| (t.id(), t.health().response_time))
            .collect();
        self.inner.history.record_round(&round);

        self.update_best_connection_in_priority();
        self.is_connected()
    }

    /// One prioritized tick: probe tiers in precedence order until one
    /// yields an online endpoint, then apply the policy.
    async fn tick_prioritized(&self) {
        let config = self.config();
        let tiers = {
            let state = self.inner.state.read();
            let mut tiers: BTreeMap<u32, Vec<Arc<RpcTransport>>> = BTreeMap::new();
            for transport in &state.registry {
                if config.excluded.contains(&transport.id()) {
                    continue;
                }
                tiers.entry(transport.tier_rank()).or_default().push(Arc::clone(transport));
            }
            tiers
        };

        // One tick is one round: probes from every tier walked feed a single
        // history record, so endpoints in a tier reached only after offline
        // tiers still build unbroken sample windows.
        let mut round: Vec<(EndpointId, Option<Duration>)> = Vec::new();
        let mut found_online = false;
        for members in tiers.into_values() {
            join_all(members.iter().map(|t| t.probe(config.poll_timeout))).await;
            round.extend(members.iter().map(|t| (t.id(), t.health().response_time)));

            if members.iter().any(|t| t.health().online.is_true()) {
                found_online = true;
                break;
            }
        }

        if !round.is_empty() {
            self.inner.history.record_round(&round);
        }
        if found_online {
            self.update_best_connection_in_priority();
        }
    }

    async fn poll_tick(&self, mode: PollMode) {
        match mode {
            PollMode::Prioritized => self.tick_prioritized().await,
            PollMode::Current => {
                self.check_connection().await;
            }
            PollMode::All => {
                self.check_connections().await;
            }
        }
    }

    /// Starts background polling with the configured mode and period,
    /// stopping any scheduler already running. Ticks run on a background
    /// task; the first tick starts immediately.
    ///
    /// Convergence: when the current endpoint fails, auto-switch selects a
    /// live replacement within at most two ticks - the tick that observes
    /// the failure already re-evaluates the policy, and the next tick covers
    /// replacements that had no fresh probe data yet.
    pub fn start_polling(&self) {
        let config = self.config();
        let mode = config.poll_mode;
        tracing::info!(
            mode = ?mode,
            period_ms = config.poll_period.as_millis() as u64,
            "starting endpoint polling"
        );

        let mut scheduler = self.inner.scheduler.lock();
        scheduler.stop();

        // The tick holds only a weak handle so a dropped manager stops its
        // own loop instead of keeping itself alive through the scheduler.
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        scheduler.start(
            move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        ConnectionManager { inner }.poll_tick(mode).await;
                    }
                    Ok(())
                }
            },
            config.poll_period,
        );
    }

    /// Switches the configured polling mode and (re)starts polling with it.
    pub fn start_polling_mode(&self, mode: PollMode) {
        self.inner.config.write().poll_mode = mode;
        self.start_polling();
    }

    /// Stops background polling. The pending delay is cancelled; an
    /// in-flight tick finishes on its own.
    pub fn stop_polling(&self) {
        self.inner.scheduler.lock().stop();
    }

    /// Whether background polling is active.
    #[must_use]
    pub fn is_polling(&self) -> bool {
        self.inner.scheduler.lock().is_running()
    }

    #[cfg(test)]
    pub(crate) fn record_round_for_test(&self, round: &[(EndpointId, Option<Duration>)]) {
        self.inner.history.record_round(round);
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
