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

//! MQTT-over-Pulsar bridge adapter.
//!
//! All device traffic of a tenant flows through two fixed topics: devices
//! publish to `from-device`, the platform publishes to `to-device`. The MQTT
//! topic travels in the `topic` message property and as the message key, so
//! subscribe and unsubscribe only change which mappings the shared consumer
//! feeds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{
    AdapterCapabilities, AdapterContext, ConnectorConfiguration, ConnectorError,
    ConnectorSpecification, ProtocolAdapter, Qos,
};
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::backend::{
    connect_error, ConsumerSpec, OutboundMessage, PulsarBackend, PulsarConnect, PulsarConsumer,
    PulsarProducer,
};
use crate::config::{self, BridgeConfig, SubscriptionType};
use crate::handler::{DispatchHandler, PROPERTY_CHANNEL, PROPERTY_CLIENT_ID, PROPERTY_TOPIC};
use crate::topic::TopicSelector;

const SUPPORTED_QOS: [Qos; 2] = [Qos::AtMostOnce, Qos::AtLeastOnce];

struct BridgeSession {
    label: String,
    identifier: String,
    config: BridgeConfig,
    client: Arc<dyn PulsarBackend>,
    context: AdapterContext,
    consumer: Box<dyn PulsarConsumer>,
    producer: Arc<dyn PulsarProducer>,
}

async fn open_consumer(
    client: &Arc<dyn PulsarBackend>,
    config: &BridgeConfig,
    context: &AdapterContext,
) -> Result<Box<dyn PulsarConsumer>, ConnectorError> {
    let topic = config.inbound_topic();
    let spec = ConsumerSpec {
        selector: TopicSelector::Topic(topic.clone()),
        subscription_name: format!("mqtt-bridge-{}", context.identity.identifier),
        subscription_type: SubscriptionType::Shared,
        qos: Qos::AtLeastOnce,
    };
    let handler = Arc::new(DispatchHandler::new(
        context.clone(),
        Qos::AtLeastOnce,
        &[PROPERTY_TOPIC, PROPERTY_CHANNEL],
    ));
    client
        .subscribe(spec, handler)
        .await
        .map_err(|e| ConnectorError::subscribe_failed(topic, e))
}

async fn open_producer(
    client: &Arc<dyn PulsarBackend>,
    config: &BridgeConfig,
) -> Result<Arc<dyn PulsarProducer>, ConnectorError> {
    let topic = config.outbound_topic();
    client
        .create_producer(&topic)
        .await
        .map_err(|e| ConnectorError::connection_caused_by(format!("no producer for [{topic}]"), e))
}

impl BridgeSession {
    async fn close(self) {
        if let Err(e) = self.consumer.close().await {
            warn!("[{}] Closing platform consumer failed: {e}", self.label);
        }
        if let Err(e) = self.producer.close().await {
            warn!("[{}] Closing device producer failed: {e}", self.label);
        }
        if let Err(e) = self.client.close().await {
            warn!("[{}] Closing Pulsar client failed: {e}", self.label);
        }
    }
}

/// Adapter for the platform MQTT service reached through Pulsar.
pub struct PulsarBridgeAdapter {
    connector: Arc<dyn PulsarConnect>,
    connected: AtomicBool,
    session: RwLock<Option<BridgeSession>>,
}

impl PulsarBridgeAdapter {
    pub fn new(connector: Arc<dyn PulsarConnect>) -> Self {
        Self {
            connector,
            connected: AtomicBool::new(false),
            session: RwLock::new(None),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for PulsarBridgeAdapter {
    fn specification(&self) -> ConnectorSpecification {
        config::bridge_specification()
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_qos: SUPPORTED_QOS.to_vec(),
            wildcards_inbound: false,
            wildcards_outbound: false,
        }
    }

    async fn connect(
        &self,
        config: &ConnectorConfiguration,
        context: AdapterContext,
    ) -> Result<(), ConnectorError> {
        let config = BridgeConfig::from_configuration(config, &context.identity.tenant)?;
        let label = context.identity.to_string();

        if let Some(previous) = self.session.write().await.take() {
            previous.close().await;
        }

        info!(
            "[{label}] Connecting to MQTT service at {} (platform topic [{}], device topic [{}])",
            config.client.service_url,
            config.inbound_topic(),
            config.outbound_topic()
        );
        let client = self
            .connector
            .connect(&config.client)
            .await
            .map_err(|e| connect_error(&config.client, e))?;

        let consumer = match open_consumer(&client, &config, &context).await {
            Ok(consumer) => consumer,
            Err(e) => {
                let _ = client.close().await;
                return Err(e);
            }
        };
        let producer = match open_producer(&client, &config).await {
            Ok(producer) => producer,
            Err(e) => {
                let _ = consumer.close().await;
                let _ = client.close().await;
                return Err(e);
            }
        };

        let session = BridgeSession {
            label: label.clone(),
            identifier: context.identity.identifier.clone(),
            config,
            client,
            context,
            consumer,
            producer,
        };
        if !session.consumer.is_connected() || !session.producer.is_connected() {
            session.close().await;
            return Err(ConnectorError::connection(
                "platform consumer or device producer not connected",
            ));
        }

        *self.session.write().await = Some(session);
        self.connected.store(true, Ordering::SeqCst);
        info!("[{label}] Connected to MQTT service");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = self.session.write().await.take() {
            let label = session.label.clone();
            session.close().await;
            info!("[{label}] Disconnected from MQTT service");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        match self.session.read().await.as_ref() {
            Some(session) if self.is_connected() => {
                debug!(
                    "[{}] Routing [{topic}] with QoS {qos} through the shared platform consumer",
                    session.label
                );
                Ok(())
            }
            _ => Err(ConnectorError::NotConnected),
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        match self.session.read().await.as_ref() {
            Some(session) if self.is_connected() => {
                debug!("[{}] Stopped routing [{topic}]", session.label);
                Ok(())
            }
            _ => Err(ConnectorError::NotConnected),
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        _retain: bool,
    ) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        let message = OutboundMessage {
            payload,
            key: Some(topic.to_string()),
            properties: HashMap::from([
                (PROPERTY_TOPIC.to_string(), topic.to_string()),
                (PROPERTY_CLIENT_ID.to_string(), session.identifier.clone()),
            ]),
        };
        session
            .producer
            .send(message)
            .await
            .map_err(|e| ConnectorError::publish_failed(topic, e))?;
        debug!(
            "[{}] Published [{topic}] with QoS {qos} to [{}]",
            session.label,
            session.config.outbound_topic()
        );
        Ok(())
    }

    async fn monitor_health(&self) -> Result<(), ConnectorError> {
        let mut guard = self.session.write().await;
        let Some(session) = guard.as_mut().filter(|_| self.is_connected()) else {
            return Ok(());
        };

        if session.client.is_closed() {
            self.connected.store(false, Ordering::SeqCst);
            session.context.connection_lost("Pulsar client closed");
            return Ok(());
        }

        if !session.consumer.is_connected() {
            warn!("[{}] Platform consumer disconnected, recreating", session.label);
            let _ = session.consumer.close().await;
            session.consumer =
                open_consumer(&session.client, &session.config, &session.context).await?;
        }
        if !session.producer.is_connected() {
            warn!("[{}] Device producer disconnected, recreating", session.label);
            let _ = session.producer.close().await;
            session.producer = open_producer(&session.client, &session.config).await?;
        }
        Ok(())
    }
}
