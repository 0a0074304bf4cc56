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

//! Kafka implementation of the [`ProtocolAdapter`] trait.
//!
//! One consumer per subscribed topic, all in the configured consumer group.
//! Topics are used verbatim; Kafka has no wildcard filters here.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
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
    connect_error, ConsumerSpec, KafkaBackend, KafkaConnect, KafkaConsumer, OutboundRecord,
};
use crate::config::{self, KafkaConnectorConfig};
use crate::handler::{DispatchHandler, MAX_PROCESSING_ERRORS};

pub const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

struct ConsumerEntry {
    consumer: Box<dyn KafkaConsumer>,
    processing_errors: Arc<AtomicU32>,
}

struct Session {
    label: String,
    config: KafkaConnectorConfig,
    client: Arc<dyn KafkaBackend>,
    context: AdapterContext,
    consumers: DashMap<String, ConsumerEntry>,
}

impl Session {
    async fn open_consumer(&self, topic: &str) -> Result<ConsumerEntry, ConnectorError> {
        let processing_errors = Arc::new(AtomicU32::new(0));
        let handler = Arc::new(DispatchHandler::new(
            self.context.clone(),
            processing_errors.clone(),
        ));
        let spec = ConsumerSpec {
            topic: topic.to_string(),
            properties: self.config.consumer_client_properties(),
        };
        let consumer = self
            .client
            .subscribe(spec, handler)
            .await
            .map_err(|e| ConnectorError::subscribe_failed(topic, e))?;
        info!(
            "[{}] Subscribed to [{topic}] in group {}",
            self.label, self.config.group_id
        );
        Ok(ConsumerEntry {
            consumer,
            processing_errors,
        })
    }

    /// Opens a fresh consumer for `topic` and closes the one it replaces.
    /// On failure the old entry stays so the next check retries.
    async fn restart_consumer(&self, topic: &str) -> Result<(), ConnectorError> {
        let entry = self.open_consumer(topic).await?;
        if let Some(previous) = self.consumers.insert(topic.to_string(), entry) {
            if let Err(e) = previous.consumer.close().await {
                warn!("[{}] Closing consumer for [{topic}] failed: {e}", self.label);
            }
        }
        Ok(())
    }

    async fn close(self) {
        let topics: Vec<String> = self.consumers.iter().map(|e| e.key().clone()).collect();
        for topic in topics {
            if let Some((_, entry)) = self.consumers.remove(&topic) {
                if let Err(e) = entry.consumer.close().await {
                    warn!("[{}] Closing consumer for [{topic}] failed: {e}", self.label);
                }
            }
        }
        if let Err(e) = self.client.close().await {
            warn!("[{}] Closing Kafka producer failed: {e}", self.label);
        }
    }
}

/// Adapter for an Apache Kafka cluster.
pub struct KafkaAdapter {
    connector: Arc<dyn KafkaConnect>,
    connected: AtomicBool,
    session: RwLock<Option<Session>>,
}

impl KafkaAdapter {
    pub fn new(connector: Arc<dyn KafkaConnect>) -> Self {
        Self {
            connector,
            connected: AtomicBool::new(false),
            session: RwLock::new(None),
        }
    }

    /// Topics with an open consumer.
    pub async fn consumer_topics(&self) -> Vec<String> {
        match self.session.read().await.as_ref() {
            Some(session) => {
                let mut topics: Vec<String> =
                    session.consumers.iter().map(|e| e.key().clone()).collect();
                topics.sort();
                topics
            }
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for KafkaAdapter {
    fn specification(&self) -> ConnectorSpecification {
        config::specification()
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            supported_qos: vec![Qos::AtMostOnce],
            wildcards_inbound: false,
            wildcards_outbound: false,
        }
    }

    async fn initialize(&self, config: &ConnectorConfiguration) -> Result<(), ConnectorError> {
        KafkaConnectorConfig::from_configuration(config).map(|_| ())
    }

    async fn connect(
        &self,
        config: &ConnectorConfiguration,
        context: AdapterContext,
    ) -> Result<(), ConnectorError> {
        let config = KafkaConnectorConfig::from_configuration(config)?;
        let label = context.identity.to_string();

        if let Some(previous) = self.session.write().await.take() {
            previous.close().await;
        }

        info!("[{label}] Connecting to Kafka at {}", config.bootstrap_servers);
        let client = self
            .connector
            .connect(&config)
            .await
            .map_err(|e| connect_error(&config, e))?;
        if let Err(e) = client.check_connectivity(CONNECTIVITY_TIMEOUT).await {
            let _ = client.close().await;
            return Err(connect_error(&config, e));
        }

        *self.session.write().await = Some(Session {
            label,
            config,
            client,
            context,
            consumers: DashMap::new(),
        });
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(session) = self.session.write().await.take() {
            let label = session.label.clone();
            session.close().await;
            info!("[{label}] Disconnected from Kafka");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, topic: &str, _qos: Qos) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        session.restart_consumer(topic).await
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        match session.consumers.remove(topic) {
            Some((_, entry)) => {
                entry
                    .consumer
                    .close()
                    .await
                    .map_err(|e| ConnectorError::unsubscribe_failed(topic, e))?;
                info!("[{}] Unsubscribed from [{topic}]", session.label);
            }
            None => debug!("[{}] No consumer for [{topic}]", session.label),
        }
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        _qos: Qos,
        _retain: bool,
    ) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Err(ConnectorError::NotConnected);
        };

        let record = OutboundRecord {
            topic: topic.to_string(),
            key: None,
            payload,
        };
        let delivery = session
            .client
            .send(record, session.config.publish_timeout)
            .await
            .map_err(|e| ConnectorError::publish_failed(topic, e))?;
        debug!(
            "[{}] Published to [{topic}] partition {} offset {}",
            session.label, delivery.partition, delivery.offset
        );
        Ok(())
    }

    async fn monitor_health(&self) -> Result<(), ConnectorError> {
        let guard = self.session.read().await;
        let Some(session) = guard.as_ref().filter(|_| self.is_connected()) else {
            return Ok(());
        };

        if let Err(e) = session.client.check_connectivity(CONNECTIVITY_TIMEOUT).await {
            warn!("[{}] Kafka connectivity check failed: {e}", session.label);
            self.connected.store(false, Ordering::SeqCst);
            session.context.connection_lost(format!("Kafka brokers unreachable: {e}"));
            return Ok(());
        }

        let failing: Vec<String> = session
            .consumers
            .iter()
            .filter(|e| {
                !e.value().consumer.is_connected()
                    || e.value().processing_errors.load(Ordering::SeqCst) > MAX_PROCESSING_ERRORS
            })
            .map(|e| e.key().clone())
            .collect();
        let mut first_error = None;
        for topic in failing {
            warn!("[{}] Restarting consumer for [{topic}]", session.label);
            if let Err(e) = session.restart_consumer(&topic).await {
                warn!("[{}] Restarting consumer for [{topic}] failed: {e}", session.label);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
