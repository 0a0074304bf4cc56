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

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use connector_core::memory::{
    InMemoryConfigurationSource, InMemoryMappingCatalog, RecordingPlatformEvents,
};
use connector_core::{
    AdapterCapabilities, AdapterContext, Connector, ConnectorConfiguration, ConnectorContext,
    ConnectorError, ConnectorIdentity, ConnectorMessage, ConnectorSpecification, ConnectorType,
    DispatchOutcome, LifecycleSettings, MappingRecord, MessageDispatchGateway, PropertyKind,
    PropertySpec, ProtocolAdapter, Qos,
};

pub const TENANT: &str = "t1";
pub const CONNECTOR: &str = "c1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Subscribe(String, Qos),
    Unsubscribe(String),
    Publish(String, Qos),
    Disconnect,
}

/// Adapter whose broker behaviour is driven by the test.
#[derive(Default)]
pub struct ScriptedAdapter {
    pub connected: AtomicBool,
    pub fail_connects: AtomicU32,
    pub connect_delay: Mutex<Duration>,
    pub connect_calls: AtomicU32,
    pub calls: Mutex<Vec<Call>>,
    pub health_calls: AtomicU32,
    pub fail_health: AtomicBool,
    pub fail_disconnect: AtomicBool,
    pub fail_initialize: AtomicBool,
    pub context: Mutex<Option<AdapterContext>>,
}

impl ScriptedAdapter {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn subscribes(&self) -> Vec<(String, Qos)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Subscribe(topic, qos) => Some((topic, qos)),
                _ => None,
            })
            .collect()
    }

    pub fn unsubscribes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Unsubscribe(topic) => Some(topic),
                _ => None,
            })
            .collect()
    }

    /// Simulates the broker closing the connection.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(context) = self.context.lock().clone() {
            context.connection_lost("broker closed the connection");
        }
    }
}

#[async_trait]
impl ProtocolAdapter for ScriptedAdapter {
    fn specification(&self) -> ConnectorSpecification {
        ConnectorSpecification::new("Scripted", "Adapter driven by tests", ConnectorType::Mqtt)
            .property("host", PropertySpec::required(PropertyKind::String, 1))
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_qos: Qos::ALL.to_vec(),
            wildcards_inbound: true,
            wildcards_outbound: false,
        }
    }

    async fn initialize(&self, _config: &ConnectorConfiguration) -> Result<(), ConnectorError> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(ConnectorError::initialization("certificate not found"));
        }
        Ok(())
    }

    async fn connect(
        &self,
        _config: &ConnectorConfiguration,
        context: AdapterContext,
    ) -> Result<(), ConnectorError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.fail_connects.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_connects.store(remaining - 1, Ordering::SeqCst);
            return Err(ConnectorError::connection("refused"));
        }
        *self.context.lock() = Some(context);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::SeqCst);
        self.calls.lock().push(Call::Disconnect);
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection("socket already closed"));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        self.calls.lock().push(Call::Subscribe(topic.into(), qos));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        self.calls.lock().push(Call::Unsubscribe(topic.into()));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        _payload: Bytes,
        qos: Qos,
        _retain: bool,
    ) -> Result<(), ConnectorError> {
        self.calls.lock().push(Call::Publish(topic.into(), qos));
        Ok(())
    }

    async fn monitor_health(&self) -> Result<(), ConnectorError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_health.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection("consumer is dead"));
        }
        Ok(())
    }
}

pub struct NullDispatcher;

impl MessageDispatchGateway for NullDispatcher {
    fn on_message(&self, _message: ConnectorMessage) -> DispatchOutcome {
        DispatchOutcome::unmatched()
    }
}

pub struct Harness {
    pub connector: Connector,
    pub adapter: Arc<ScriptedAdapter>,
    pub configs: Arc<InMemoryConfigurationSource>,
    pub catalog: Arc<InMemoryMappingCatalog>,
    pub events: Arc<RecordingPlatformEvents>,
    pub context: ConnectorContext,
}

pub fn settings() -> LifecycleSettings {
    LifecycleSettings::builder()
        .connect_retry_delay(Duration::from_secs(10))
        .reconnect_delay(Duration::from_secs(5))
        .housekeeping_interval(Duration::from_secs(30))
        .build()
}

pub fn harness() -> Harness {
    harness_with(settings())
}

pub fn harness_with(settings: LifecycleSettings) -> Harness {
    let configs = Arc::new(InMemoryConfigurationSource::new());
    configs.put_connector(
        TENANT,
        ConnectorConfiguration::new(CONNECTOR, "broker", ConnectorType::Mqtt)
            .with_property("host", "localhost"),
    );
    let catalog = Arc::new(InMemoryMappingCatalog::new());
    let events = Arc::new(RecordingPlatformEvents::default());
    let context = ConnectorContext {
        configuration: configs.clone(),
        mappings: catalog.clone(),
        platform: events.clone(),
        dispatcher: Arc::new(NullDispatcher),
        settings,
    };
    let adapter = Arc::new(ScriptedAdapter::default());
    let identity = ConnectorIdentity::new(TENANT, CONNECTOR, "broker", ConnectorType::Mqtt);
    let connector = Connector::new(identity, adapter.clone(), context.clone());
    Harness {
        connector,
        adapter,
        configs,
        catalog,
        events,
        context,
    }
}

impl Harness {
    /// Adds a mapping to the catalog and deploys it to the test connector.
    pub fn deploy(&self, mapping: MappingRecord) {
        self.catalog
            .deploy(TENANT, &mapping.identifier, vec![CONNECTOR.to_string()]);
        self.catalog.upsert(TENANT, mapping);
    }
}

/// Polls `condition` on virtual time until it holds or 20 s have passed.
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    condition()
}
