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

//! Native Pulsar implementation of the [`ProtocolAdapter`] trait.
//!
//! One consumer per subscribed MQTT topic. Wildcard filters become regex
//! pattern consumers. Producers are created lazily per topic and cached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{
    AdapterCapabilities, AdapterContext, ConnectorConfiguration, ConnectorError,
    ConnectorSpecification, ProtocolAdapter, Qos,
};
use dashmap::DashMap;
use log::{debug, info, warn};
use tokio::sync::RwLock;

use crate::backend::{
    connect_error, ConsumerSpec, OutboundMessage, PulsarBackend, PulsarClientError, PulsarConnect,
    PulsarConsumer, PulsarProducer,
};
use crate::config::{self, PulsarConnectorConfig, SubscriptionType};
use crate::handler::{DispatchHandler, PROPERTY_TOPIC};
use crate::topic;

pub const PRODUCER_CREATE_ATTEMPTS: u32 = 3;
pub const PRODUCER_RETRY_DELAY: Duration = Duration::from_millis(1000);

struct ConsumerEntry {
    consumer: Box<dyn PulsarConsumer>,
    qos: Qos,
}

struct Session {
    label: String,
    config: PulsarConnectorConfig,
    client: Arc<dyn PulsarBackend>,
    context: AdapterContext,
    /// Keyed by MQTT topic.
    consumers: DashMap<String, ConsumerEntry>,
    /// Keyed by qualified Pulsar topic.
    producers: DashMap<String, Arc<dyn PulsarProducer>>,
}

impl Session {
    async fn open_consumer(
        &self,
        mqtt_topic: &str,
        qos: Qos,
    ) -> Result<Box<dyn PulsarConsumer>, ConnectorError> {
        let selector =
            topic::selector_for(mqtt_topic, &self.config.tenant, &self.config.namespace)?;
        let spec = ConsumerSpec {
            selector,
            subscription_name: topic::subscription_name(&self.config.subscription_name, mqtt_topic),
            subscription_type: SubscriptionType::for_qos(qos, self.config.subscription_type),
            qos,
        };
        let handler = Arc::new(DispatchHandler::new(self.context.clone(), qos, &[PROPERTY_TOPIC]));
        let pulsar_topic = spec.selector.as_str().to_string();
        let subscription_type = spec.subscription_type;
        let consumer = self
            .client
            .subscribe(spec, handler)
            .await
            .map_err(|e| ConnectorError::subscribe_failed(mqtt_topic, e))?;
        info!(
            "[{}] Subscribed [{pulsar_topic}] for [{mqtt_topic}] ({subscription_type}, QoS {qos})",
            self.label
        );
        Ok(consumer)
    }

    /// Cached producer for `pulsar_topic`, created with retry on a miss.
    async fn producer(
        &self,
        pulsar_topic: &str,
    ) -> Result<Arc<dyn PulsarProducer>, PulsarClientError> {
        if let Some(producer) = self.producers.get(pulsar_topic) {
            return Ok(producer.value().clone());
        }

        let mut delay = PRODUCER_RETRY_DELAY;
        let mut attempt = 1;
        let producer = loop {
            match self.client.create_producer(pulsar_topic).await {
                Ok(producer) => break producer,
                Err(e) if attempt >= PRODUCER_CREATE_ATTEMPTS => {
                    return Err(PulsarClientError::new(format!(
                        "failed to create producer after {attempt} attempts: {e}"
                    )))
                }
                Err(e) => {
                    warn!(
                        "[{}] Producer for [{pulsar_topic}] attempt {attempt} failed: {e}",
                        self.label
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
            }
        };
        debug!("[{}] Created producer for [{pulsar_topic}]", self.label);
        Ok(self
            .producers
            .entry(pulsar_topic.to_string())
            .or_insert(producer)
            .value()
            .clone())
    }

    async fn close(self) {
        let topics: Vec<String> = self.consumers.iter().map(|e| e.key().clone()).collect();
        for mqtt_topic in topics {
            if let Some((_, entry)) = self.consumers.remove(&mqtt_topic) {
                if let Err(e) = entry.consumer.close().await {
                    warn!("[{}] Closing consumer for [{mqtt_topic}] failed: {e}", self.label);
                }
            }
        }
        let producers: Vec<Arc<dyn PulsarProducer>> =
            self.producers.iter().map(|e| e.value().clone()).collect();
        self.producers.clear();
        for producer in producers {
            if let Err(e) = producer.close().await {
                warn!("[{}] Closing producer failed: {e}", self.label);
            }
        }
        if let Err(e) = self.client.close().await {
            warn!("[{}] Closing Pulsar client failed: {e}", self.label);
        }
    }
}

/// Adapter for a native Apache Pulsar cluster.
pub struct PulsarAdapter {
    connector: Arc<dyn PulsarConnect>,
    connected: AtomicBool,
    session: RwLock<Option<Session>>,
}

impl PulsarAdapter {
    pub fn new(connector: Arc<dyn PulsarConnect>) -> Self {
        Self {
            connector,
            connected: AtomicBool::new(false),
            session: RwLock::new(None),
        }
    }

    /// Number of cached producers.
    pub async fn producer_count(&self) -> usize {
        match self.session.read().await.as_ref() {
            Some(session) => session.producers.len(),
            None => 0,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for PulsarAdapter {
    fn specification(&self) -> ConnectorSpecification {
        config::specification()
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_qos: Qos::ALL.to_vec(),
            wildcards_inbound: true,
            wildcards_outbound: false,
        }
    }

    async fn initialize(&self, config: &ConnectorConfiguration) -> Result<(), ConnectorError> {
        PulsarConnectorConfig::from_configuration(config).map(|_| ())
    }

    async fn connect(
        &self,
        config: &ConnectorConfiguration,
        context: AdapterContext,
    ) -> Result<(), ConnectorError> {
        let config = PulsarConnectorConfig::from_configuration(config)?;
        let label = context.identity.to_string();

        if let Some(previous) = self.session.write().await.take() {
            previous.close().await;
        }

        info!("[{label}] Connecting to Pulsar at {}", config.client.service_url);
        let client = self
            .connector
            .connect(&config.client)
            .await
            .map_err(|e| connect_error(&config.client, e))?;

        *self.session.write().await = Some(Session {
            label,
            config,
            client,
            context,
            consumers: DashMap::new(),
            producers: DashMap::new(),
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = self.session.write().await.take() {
            let label = session.label.clone();
            session.close().await;
            info!("[{label}] Disconnected from Pulsar");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, mqtt_topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        let consumer = session.open_consumer(mqtt_topic, qos).await?;
        if let Some(previous) = session
            .consumers
            .insert(mqtt_topic.to_string(), ConsumerEntry { consumer, qos })
        {
            if let Err(e) = previous.consumer.close().await {
                warn!(
                    "[{}] Closing replaced consumer for [{mqtt_topic}] failed: {e}",
                    session.label
                );
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, mqtt_topic: &str) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        match session.consumers.remove(mqtt_topic) {
            Some((_, entry)) => {
                entry
                    .consumer
                    .close()
                    .await
                    .map_err(|e| ConnectorError::unsubscribe_failed(mqtt_topic, e))?;
                info!("[{}] Unsubscribed from [{mqtt_topic}]", session.label);
            }
            None => debug!("[{}] No consumer for [{mqtt_topic}]", session.label),
        }
        Ok(())
    }

    async fn publish(
        &self,
        mqtt_topic: &str,
        payload: Bytes,
        qos: Qos,
        _retain: bool,
    ) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        let pulsar_topic =
            topic::qualified_topic(mqtt_topic, &session.config.tenant, &session.config.namespace);
        let producer = session
            .producer(&pulsar_topic)
            .await
            .map_err(|e| ConnectorError::publish_failed(mqtt_topic, e))?;
        let message = OutboundMessage {
            payload,
            key: None,
            properties: HashMap::from([(PROPERTY_TOPIC.to_string(), mqtt_topic.to_string())]),
        };

        if qos == Qos::AtMostOnce {
            let label = session.label.clone();
            let mqtt_topic = mqtt_topic.to_string();
            tokio::spawn(async move {
                if let Err(e) = producer.send(message).await {
                    debug!("[{label}] QoS 0 send to [{mqtt_topic}] failed: {e}");
                }
            });
            return Ok(());
        }

        if let Err(e) = producer.send(message).await {
            session.producers.remove(&pulsar_topic);
            return Err(ConnectorError::publish_failed(mqtt_topic, e));
        }
        debug!("[{}] Published to [{pulsar_topic}] with QoS {qos}", session.label);
        Ok(())
    }

    async fn monitor_health(&self) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Ok(());
        };

        if session.client.is_closed() {
            self.connected.store(false, Ordering::SeqCst);
            session.context.connection_lost("Pulsar client closed");
            return Ok(());
        }

        let dead: Vec<(String, Qos)> = session
            .consumers
            .iter()
            .filter(|e| !e.value().consumer.is_connected())
            .map(|e| (e.key().clone(), e.value().qos))
            .collect();
        let mut first_error = None;
        for (mqtt_topic, qos) in dead {
            warn!("[{}] Consumer for [{mqtt_topic}] disconnected, recreating", session.label);
            if let Some((_, entry)) = session.consumers.remove(&mqtt_topic) {
                let _ = entry.consumer.close().await;
            }
            match session.open_consumer(&mqtt_topic, qos).await {
                Ok(consumer) => {
                    session
                        .consumers
                        .insert(mqtt_topic, ConsumerEntry { consumer, qos });
                }
                Err(e) => {
                    warn!("[{}] Recreating consumer for [{mqtt_topic}] failed: {e}", session.label);
                    first_error.get_or_insert(e);
                }
            }
        }

        let stale: Vec<String> = session
            .producers
            .iter()
            .filter(|e| !e.value().is_connected())
            .map(|e| e.key().clone())
            .collect();
        for pulsar_topic in stale {
            if let Some((_, producer)) = session.producers.remove(&pulsar_topic) {
                debug!("[{}] Evicting disconnected producer for [{pulsar_topic}]", session.label);
                let _ = producer.close().await;
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
