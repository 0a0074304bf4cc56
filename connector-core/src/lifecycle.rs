// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Connector lifecycle: Initialize, Connect, Disconnect, Reconnect and
//! Housekeeping composed over one [`ProtocolAdapter`].
//!
//! Operations run as spawned tasks. At most one task per operation kind is
//! in flight; asking again while one runs returns the existing handle.
//! Failures never escape to callers and surface only as connector status.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

use crate::adapter::{AdapterCapabilities, AdapterContext, AdapterEvent, ProtocolAdapter};
use crate::config::{
    ConnectorConfiguration, ConnectorIdentity, ConnectorSpecification, LifecycleSettings,
};
use crate::dispatch::MessageDispatchGateway;
use crate::error::ConnectorError;
use crate::housekeeping::{self, Housekeeping};
use crate::mapping::{adjust_qos, Direction, MappingRecord, Qos};
use crate::platform::{
    ConfigurationSource, EventEmitter, MappingCatalog, PlatformEvents, SubscriptionAction,
};
use crate::reconciler::{ReconcileReport, SubscriptionPort, SubscriptionReconciler};
use crate::state::ConnectionStateManager;
use crate::status::{ConnectorStatus, ConnectorStatusEvent};

const WILDCARD_INBOUND_PROPERTY: &str = "supportsWildcardInTopicInbound";
const WILDCARD_OUTBOUND_PROPERTY: &str = "supportsWildcardInTopicOutbound";

/// Collaborators and settings shared by the connectors of a deployment.
#[derive(Clone)]
pub struct ConnectorContext {
    pub configuration: Arc<dyn ConfigurationSource>,
    pub mappings: Arc<dyn MappingCatalog>,
    pub platform: Arc<dyn PlatformEvents>,
    pub dispatcher: Arc<dyn MessageDispatchGateway>,
    pub settings: LifecycleSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Initialize,
    Connect,
    Disconnect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Handle to a spawned lifecycle operation.
#[derive(Clone)]
pub struct OperationHandle {
    kind: OperationKind,
    rx: watch::Receiver<Option<OperationOutcome>>,
}

impl OperationHandle {
    fn spawn<F>(kind: OperationKind, operation: F) -> (Self, AbortHandle)
    where
        F: Future<Output = OperationOutcome> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(async move {
            let outcome = operation.await;
            tx.send_replace(Some(outcome));
        });
        (Self { kind, rx }, task.abort_handle())
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.rx.borrow().is_some() || self.rx.has_changed().is_err()
    }

    /// Waits for the operation. An aborted task yields `Cancelled`.
    pub async fn wait(mut self) -> OperationOutcome {
        loop {
            if let Some(outcome) = self.rx.borrow_and_update().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return self
                    .rx
                    .borrow()
                    .clone()
                    .unwrap_or(OperationOutcome::Cancelled);
            }
        }
    }
}

#[derive(Default)]
struct InFlight {
    initialize: Option<OperationHandle>,
    connect: Option<(OperationHandle, AbortHandle)>,
    disconnect: Option<OperationHandle>,
}

struct ConnectorInner {
    identity: ConnectorIdentity,
    label: String,
    adapter: Arc<dyn ProtocolAdapter>,
    specification: ConnectorSpecification,
    capabilities: AdapterCapabilities,
    context: ConnectorContext,
    state: ConnectionStateManager,
    reconciler: SubscriptionReconciler,
    emitter: Arc<EventEmitter>,
    config: RwLock<Option<ConnectorConfiguration>>,
    operations: Mutex<InFlight>,
    intentional_disconnect: AtomicBool,
    reconnect_pending: AtomicBool,
    reconnect_cycles: AtomicU32,
    events_tx: mpsc::UnboundedSender<AdapterEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<AdapterEvent>>>,
    housekeeping: Mutex<Option<JoinHandle<()>>>,
}

/// A connector instance: one lifecycle state machine over one adapter.
///
/// Cheap to clone; clones share the same instance.
#[derive(Clone)]
pub struct Connector {
    inner: Arc<ConnectorInner>,
}

/// Subscription port that goes through the adapter and emits audit events.
struct AuditedPort<'a> {
    inner: &'a ConnectorInner,
}

#[async_trait]
impl<'a> SubscriptionPort for AuditedPort<'a> {
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        let qos = adjust_qos(qos, &self.inner.capabilities.supported_qos);
        self.inner.adapter.subscribe(topic, qos).await?;
        self.inner
            .emitter
            .emit_subscription(SubscriptionAction::Subscribe, topic);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        self.inner.adapter.unsubscribe(topic).await?;
        self.inner
            .emitter
            .emit_subscription(SubscriptionAction::Unsubscribe, topic);
        Ok(())
    }
}

impl Connector {
    pub fn new(
        identity: ConnectorIdentity,
        adapter: Arc<dyn ProtocolAdapter>,
        context: ConnectorContext,
    ) -> Self {
        let specification = adapter.specification();
        let capabilities = adapter.capabilities();
        let label = identity.to_string();
        let emitter = Arc::new(EventEmitter::new(&identity, context.platform.clone()));
        let state = ConnectionStateManager::new(identity.name.clone(), identity.identifier.clone());
        let status_emitter = emitter.clone();
        state.set_callback(Arc::new(move |event| status_emitter.emit_status(event)));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(ConnectorInner {
                reconciler: SubscriptionReconciler::new(label.clone()),
                identity,
                label,
                adapter,
                specification,
                capabilities,
                context,
                state,
                emitter,
                config: RwLock::new(None),
                operations: Mutex::new(InFlight::default()),
                intentional_disconnect: AtomicBool::new(false),
                reconnect_pending: AtomicBool::new(false),
                reconnect_cycles: AtomicU32::new(0),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
                housekeeping: Mutex::new(None),
            }),
        }
    }

    pub fn identity(&self) -> &ConnectorIdentity {
        &self.inner.identity
    }

    pub fn specification(&self) -> &ConnectorSpecification {
        &self.inner.specification
    }

    pub fn status(&self) -> ConnectorStatusEvent {
        self.inner.state.snapshot()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.is_connected()
    }

    pub fn refcount(&self, topic: &str) -> u32 {
        self.inner.reconciler.refcount(topic)
    }

    pub fn tracked_topics(&self) -> Vec<String> {
        self.inner.reconciler.snapshot().topics()
    }

    pub fn is_mapping_inbound_effective(&self, identifier: &str) -> bool {
        self.inner.reconciler.snapshot().inbound(identifier).is_some()
    }

    pub fn is_mapping_outbound_effective(&self, identifier: &str) -> bool {
        self.inner.reconciler.snapshot().outbound(identifier).is_some()
    }

    pub fn effective_outbound_mappings(&self) -> Vec<MappingRecord> {
        self.inner
            .reconciler
            .snapshot()
            .outbound_mappings()
            .cloned()
            .collect()
    }

    /// Loads the configuration and prepares the adapter.
    pub fn initialize(&self) -> OperationHandle {
        let mut operations = self.inner.operations.lock();
        if let Some(handle) = &operations.initialize {
            if !handle.is_finished() {
                debug!("[{}] Initialize already in flight", self.inner.label);
                return handle.clone();
            }
        }
        let inner = self.inner.clone();
        let (handle, _) = OperationHandle::spawn(OperationKind::Initialize, async move {
            inner.run_initialize().await
        });
        operations.initialize = Some(handle.clone());
        handle
    }

    pub fn connect(&self) -> OperationHandle {
        self.inner.reconnect_cycles.store(0, Ordering::SeqCst);
        self.start_connect()
    }

    fn start_connect(&self) -> OperationHandle {
        self.start_event_listener();
        let mut operations = self.inner.operations.lock();
        if let Some((handle, _)) = &operations.connect {
            if !handle.is_finished() {
                debug!("[{}] Connect already in flight", self.inner.label);
                return handle.clone();
            }
        }
        let inner = self.inner.clone();
        let (handle, abort) = OperationHandle::spawn(OperationKind::Connect, async move {
            inner.run_connect().await
        });
        operations.connect = Some((handle.clone(), abort));
        handle
    }

    /// Cancels any in-flight Connect and tears the connection down.
    pub fn disconnect(&self) -> OperationHandle {
        let mut operations = self.inner.operations.lock();
        if let Some(handle) = &operations.disconnect {
            if !handle.is_finished() {
                debug!("[{}] Disconnect already in flight", self.inner.label);
                return handle.clone();
            }
        }
        self.inner
            .intentional_disconnect
            .store(true, Ordering::SeqCst);
        if let Some((connect, abort)) = operations.connect.take() {
            if !connect.is_finished() {
                info!("[{}] Cancelling in-flight connect", self.inner.label);
                abort.abort();
            }
        }
        let inner = self.inner.clone();
        let (handle, _) = OperationHandle::spawn(OperationKind::Disconnect, async move {
            inner.run_disconnect().await
        });
        operations.disconnect = Some(handle.clone());
        handle
    }

    /// Disconnect, then Initialize, both awaited, then starts Connect.
    /// Returns `None` when an earlier step did not complete.
    pub async fn reconnect(&self) -> Option<OperationHandle> {
        self.inner.reconnect_cycles.store(0, Ordering::SeqCst);
        self.reconnect_steps().await
    }

    async fn reconnect_steps(&self) -> Option<OperationHandle> {
        let outcome = self.disconnect().wait().await;
        if outcome != OperationOutcome::Completed {
            warn!(
                "[{}] Reconnect aborted, disconnect ended with {outcome:?}",
                self.inner.label
            );
            return None;
        }
        let outcome = self.initialize().wait().await;
        if outcome != OperationOutcome::Completed {
            warn!(
                "[{}] Reconnect aborted, initialize ended with {outcome:?}",
                self.inner.label
            );
            return None;
        }
        Some(self.start_connect())
    }

    /// Reloads mappings and resyncs both directions against the topics
    /// already subscribed.
    pub async fn resync_mappings(&self) -> ReconcileReport {
        match self.inner.current_config() {
            Some(config) => self.inner.resync(&config, false).await,
            None => ReconcileReport::default(),
        }
    }

    /// Applies a single inbound mapping change without a full resync.
    ///
    /// Returns `false` when the mapping was rejected by the capability check
    /// or its subscription failed.
    pub async fn update_inbound_mapping(
        &self,
        mapping: &MappingRecord,
        activation_changed: bool,
    ) -> bool {
        let inner = &self.inner;
        if !inner.state.is_connected() {
            return true;
        }
        let Some(config) = inner.current_config() else {
            return true;
        };
        let deactivation = activation_changed && !mapping.active;
        let compatible = match inner.capability_check(mapping, &config) {
            Ok(()) => true,
            Err(e) => {
                if !deactivation {
                    warn!("[{}] {e}", inner.label);
                }
                false
            }
        };
        let wanted = mapping.active && compatible && inner.is_deployed(mapping);
        let previous = inner
            .reconciler
            .snapshot()
            .inbound(&mapping.identifier)
            .cloned();
        let port = inner.port();

        let result = match (previous, wanted) {
            (None, true) => inner.reconciler.add(mapping, mapping.qos, &port).await,
            (Some(previous), true) if previous.topic == mapping.topic => {
                inner.reconciler.refresh_inbound(mapping).await;
                Ok(())
            }
            (Some(previous), true) => {
                if let Err(e) = inner.reconciler.remove(&previous, &port).await {
                    warn!("[{}] {e}", inner.label);
                }
                inner.reconciler.add(mapping, mapping.qos, &port).await
            }
            (Some(previous), false) => inner.reconciler.remove(&previous, &port).await,
            (None, false) => Ok(()),
        };

        match result {
            Ok(()) => compatible || deactivation || !mapping.active,
            Err(e) => {
                warn!(
                    "[{}] Could not apply mapping {}: {e}",
                    inner.label, mapping.name
                );
                false
            }
        }
    }

    pub async fn update_outbound_mapping(&self, mapping: &MappingRecord) -> bool {
        let inner = &self.inner;
        let compatible = match inner.current_config() {
            Some(config) => match inner.capability_check(mapping, &config) {
                Ok(()) => true,
                Err(e) => {
                    warn!("[{}] {e}", inner.label);
                    false
                }
            },
            None => true,
        };
        if mapping.active && compatible && inner.is_deployed(mapping) {
            inner.reconciler.add_outbound(mapping).await;
        } else {
            inner.reconciler.remove_outbound(&mapping.identifier).await;
        }
        compatible || !mapping.active
    }

    /// Removes a deleted mapping from the effective sets.
    pub async fn delete_mapping(&self, mapping: &MappingRecord) -> bool {
        let inner = &self.inner;
        match mapping.direction {
            Direction::Inbound => {
                let previous = inner
                    .reconciler
                    .snapshot()
                    .inbound(&mapping.identifier)
                    .cloned();
                let Some(previous) = previous else {
                    return true;
                };
                match inner.reconciler.remove(&previous, &inner.port()).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("[{}] {e}", inner.label);
                        false
                    }
                }
            }
            Direction::Outbound => {
                inner.reconciler.remove_outbound(&mapping.identifier).await;
                true
            }
        }
    }

    /// Publishes an outbound message resolved by the processing pipeline.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ConnectorError> {
        let inner = &self.inner;
        if !inner.state.is_connected() || !inner.adapter.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        let qos = adjust_qos(qos, &inner.capabilities.supported_qos);
        if inner.emitter.service().log_payload {
            debug!(
                "[{}] Publishing to [{topic}] with QoS {qos}: {}",
                inner.label,
                String::from_utf8_lossy(&payload)
            );
        }
        inner.adapter.publish(topic, payload, qos, retain).await
    }

    pub fn start_housekeeping(&self) {
        let mut guard = self.inner.housekeeping.lock();
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let period = self.inner.context.settings.housekeeping_interval;
        info!(
            "[{}] Starting housekeeping every {period:?}",
            self.inner.label
        );
        *guard = Some(housekeeping::spawn(Arc::downgrade(&self.inner), period));
    }

    pub fn stop_housekeeping(&self) {
        if let Some(handle) = self.inner.housekeeping.lock().take() {
            handle.abort();
        }
    }

    /// Stops housekeeping and waits for a full disconnect.
    pub async fn close(&self) -> OperationOutcome {
        self.stop_housekeeping();
        self.disconnect().wait().await
    }

    fn start_event_listener(&self) {
        let Some(mut events) = self.inner.events_rx.lock().take() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match event {
                    AdapterEvent::ConnectionLost { reason } => {
                        Connector { inner }.on_connection_lost(&reason);
                    }
                }
            }
        });
    }

    fn on_connection_lost(&self, reason: &str) {
        let inner = &self.inner;
        let was_connected = inner.state.is_connected();
        inner.state.set_connected(false);

        if inner.intentional_disconnect.load(Ordering::SeqCst) {
            debug!("[{}] Connection closed deliberately", inner.label);
            return;
        }
        warn!("[{}] Connection lost: {reason}", inner.label);

        let enabled = inner.current_config().is_some_and(|c| c.enabled);
        if !enabled || !was_connected {
            return;
        }
        if inner.connect_in_flight() || inner.reconnect_pending.swap(true, Ordering::SeqCst) {
            debug!("[{}] Reconnect already under way", inner.label);
            return;
        }
        if let Some(max) = inner.context.settings.max_reconnect_cycles {
            let cycles = inner.reconnect_cycles.fetch_add(1, Ordering::SeqCst) + 1;
            if cycles > max {
                inner.reconnect_pending.store(false, Ordering::SeqCst);
                let err = ConnectorError::connection(format!(
                    "giving up after {max} reconnect attempts following connection loss"
                ));
                error!("[{}] {err}", inner.label);
                inner.state.update_status_with_error(&err);
                return;
            }
        }

        let connector = self.clone();
        let delay = inner.context.settings.reconnect_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            connector
                .inner
                .reconnect_pending
                .store(false, Ordering::SeqCst);
            if connector.inner.intentional_disconnect.load(Ordering::SeqCst) {
                return;
            }
            info!(
                "[{}] Reconnecting after unexpected disconnect",
                connector.inner.label
            );
            connector.reconnect_steps().await;
        });
    }
}

impl ConnectorInner {
    fn port(&self) -> AuditedPort<'_> {
        AuditedPort { inner: self }
    }

    fn current_config(&self) -> Option<ConnectorConfiguration> {
        self.config.read().clone()
    }

    fn connect_in_flight(&self) -> bool {
        self.operations
            .lock()
            .connect
            .as_ref()
            .is_some_and(|(handle, _)| !handle.is_finished())
    }

    async fn load_configuration(&self) -> Result<ConnectorConfiguration, ConnectorError> {
        let source = &self.context.configuration;
        let mut config = source
            .connector_configuration(&self.identity.tenant, &self.identity.identifier)
            .await?;
        config.apply_defaults(&self.specification);
        match source.service_configuration(&self.identity.tenant).await {
            Ok(service) => self.emitter.set_service(service),
            Err(e) => warn!("[{}] Using previous service configuration: {e}", self.label),
        }
        *self.config.write() = Some(config.clone());
        Ok(config)
    }

    fn supports_wildcards(&self, direction: Direction, config: &ConnectorConfiguration) -> bool {
        let property = match direction {
            Direction::Inbound => WILDCARD_INBOUND_PROPERTY,
            Direction::Outbound => WILDCARD_OUTBOUND_PROPERTY,
        };
        config
            .bool(property)
            .unwrap_or_else(|| self.capabilities.supports_wildcards(direction))
    }

    fn capability_check(
        &self,
        mapping: &MappingRecord,
        config: &ConnectorConfiguration,
    ) -> Result<(), ConnectorError> {
        if !self.specification.supported_directions.contains(&mapping.direction) {
            return Err(ConnectorError::CapabilityMismatch {
                mapping: mapping.name.clone(),
                reason: format!("direction {:?} is not supported", mapping.direction),
            });
        }
        if mapping.has_wildcards() && !self.supports_wildcards(mapping.direction, config) {
            return Err(ConnectorError::CapabilityMismatch {
                mapping: mapping.name.clone(),
                reason: format!("wildcards in topic [{}] are not supported", mapping.topic),
            });
        }
        Ok(())
    }

    fn is_deployed(&self, mapping: &MappingRecord) -> bool {
        self.context
            .mappings
            .deployed_connectors(&self.identity.tenant, &mapping.identifier)
            .is_some_and(|connectors| connectors.contains(&self.identity.identifier))
    }

    async fn run_initialize(&self) -> OperationOutcome {
        let config = match self.load_configuration().await {
            Ok(config) => config,
            Err(e) => {
                error!("[{}] Could not load configuration: {e}", self.label);
                self.state.update_status_with_error(&e);
                return OperationOutcome::Failed(e.to_string());
            }
        };
        if let Err(e) = self.adapter.initialize(&config).await {
            error!("[{}] Initialization failed: {e}", self.label);
            self.state.update_status_with_error(&e);
            return OperationOutcome::Failed(e.to_string());
        }
        match self.specification.validate(&config) {
            Ok(()) if !self.state.is_connected() => {
                self.state
                    .update_status(ConnectorStatus::Configured, true, true);
            }
            Ok(()) => {}
            Err(e) => warn!("[{}] {e}", self.label),
        }
        info!("[{}] Initialized", self.label);
        OperationOutcome::Completed
    }

    async fn run_connect(&self) -> OperationOutcome {
        let config = match self.load_configuration().await {
            Ok(config) => config,
            Err(e) => {
                error!("[{}] Could not load configuration: {e}", self.label);
                self.state.update_status_with_error(&e);
                return OperationOutcome::Failed(e.to_string());
            }
        };
        if !config.enabled {
            info!("[{}] Connector is disabled, not connecting", self.label);
            self.state
                .update_status(ConnectorStatus::Configured, true, true);
            return OperationOutcome::Completed;
        }
        if let Err(e) = self.specification.validate(&config) {
            warn!("[{}] Not connecting: {e}", self.label);
            self.state
                .update_status(ConnectorStatus::Configured, true, true);
            return OperationOutcome::Completed;
        }
        if self.state.is_connected() && self.adapter.is_connected() {
            debug!("[{}] Already connected", self.label);
            return OperationOutcome::Completed;
        }

        self.intentional_disconnect.store(false, Ordering::SeqCst);
        self.state
            .update_status(ConnectorStatus::Connecting, true, true);

        let settings = &self.context.settings;
        let adapter_context = AdapterContext::new(
            self.identity.clone(),
            self.context.dispatcher.clone(),
            self.emitter.service(),
            self.events_tx.clone(),
        );
        let attempts = settings.connect_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(settings.connect_retry_delay).await;
            }
            info!(
                "[{}] Connecting to broker (attempt {attempt}/{attempts})",
                self.label
            );
            let connect = self.adapter.connect(&config, adapter_context.clone());
            match tokio::time::timeout(settings.connection_timeout, connect).await {
                Ok(Ok(())) => {
                    last_error = None;
                    break;
                }
                Ok(Err(e)) => {
                    warn!("[{}] Connect attempt {attempt} failed: {e}", self.label);
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!("[{}] Connect attempt {attempt} timed out", self.label);
                    last_error = Some(ConnectorError::connection(format!(
                        "connect timed out after {:?}",
                        settings.connection_timeout
                    )));
                }
            }
        }

        if let Some(e) = last_error {
            error!(
                "[{}] Failed to connect after {attempts} attempts: {e}",
                self.label
            );
            self.state.update_status_with_error(&e);
            return OperationOutcome::Failed(e.to_string());
        }

        self.state.set_connected(true);
        self.state
            .update_status(ConnectorStatus::Connected, true, true);
        info!("[{}] Connected", self.label);
        self.resync(&config, true).await;
        OperationOutcome::Completed
    }

    async fn run_disconnect(&self) -> OperationOutcome {
        self.state
            .update_status(ConnectorStatus::Disconnecting, true, true);

        if self.adapter.is_connected() {
            let port = self.port();
            for topic in self.reconciler.snapshot().topics() {
                if let Err(e) = port.unsubscribe(&topic).await {
                    warn!("[{}] Could not unsubscribe [{topic}]: {e}", self.label);
                }
            }
        }
        if let Err(e) = self.adapter.disconnect().await {
            warn!("[{}] Broker disconnect failed: {e}", self.label);
        }
        self.reconciler.clear().await;

        self.state.set_connected(false);
        self.state
            .update_status(ConnectorStatus::Disconnected, true, true);
        info!("[{}] Disconnected", self.label);
        OperationOutcome::Completed
    }

    /// `reset` discards the tracked topics first; only valid right after a
    /// fresh broker session.
    async fn resync(&self, config: &ConnectorConfiguration, reset: bool) -> ReconcileReport {
        if let Err(e) = self.context.mappings.rebuild(&self.identity).await {
            warn!("[{}] Mapping cache rebuild failed: {e}", self.label);
        }
        let tenant = &self.identity.tenant;
        let inbound = self.context.mappings.inbound_mappings(tenant);
        let outbound = self.context.mappings.outbound_mappings(tenant);

        let validator = |mapping: &MappingRecord| {
            if !self.is_deployed(mapping) {
                return false;
            }
            match self.capability_check(mapping, config) {
                Ok(()) => true,
                Err(e) => {
                    warn!("[{}] Skipping mapping: {e}", self.label);
                    false
                }
            }
        };

        let report = self
            .reconciler
            .reconcile_inbound(
                &inbound,
                &validator,
                self.state.is_connected(),
                reset,
                &self.port(),
            )
            .await;
        let outbound_count = self
            .reconciler
            .reconcile_outbound(&outbound, &validator)
            .await;
        info!(
            "[{}] Mappings resynced: {} inbound topics, {outbound_count} outbound mappings",
            self.label, report.active_topics
        );
        report
    }
}

#[async_trait]
impl Housekeeping for ConnectorInner {
    fn label(&self) -> &str {
        &self.label
    }

    async fn tick(&self) -> Result<(), ConnectorError> {
        let status = self.state.status();
        if matches!(status, ConnectorStatus::Unknown | ConnectorStatus::Disconnected)
            && !self.state.is_connected()
        {
            if let Some(config) = self.current_config() {
                if self.specification.validate(&config).is_ok() {
                    self.state
                        .update_status(ConnectorStatus::Configured, true, true);
                }
            }
        }

        let health = self.adapter.monitor_health().await;
        self.emitter.emit_status_if_changed(&self.state.snapshot());
        let flush = self
            .context
            .mappings
            .flush_dirty(&self.identity.tenant)
            .await;
        health?;
        flush
    }
}
