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

//! MQTT implementation of the [`ProtocolAdapter`] trait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{
    AdapterCapabilities, AdapterContext, ConnectorConfiguration, ConnectorError,
    ConnectorSpecification, ProtocolAdapter, Qos,
};
use log::{info, warn};
use tokio::sync::RwLock;

use crate::config::{self, MqttConnectorConfig, MqttVersion};
use crate::session::{LinkState, MqttSession};
use crate::{v311, v5};

/// MQTT connector adapter for brokers speaking 3.1.1 or 5.0.
///
/// The protocol version is read from the connector configuration on every
/// connect, so a configuration change takes effect on the next reconnect.
pub struct MqttAdapter {
    connected: Arc<AtomicBool>,
    /// Broker session (set on connect, cleared on disconnect).
    session: RwLock<Option<Box<dyn MqttSession>>>,
}

impl MqttAdapter {
    pub fn new() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(false)),
            session: RwLock::new(None),
        }
    }
}

impl Default for MqttAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolAdapter for MqttAdapter {
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
        let config = MqttConnectorConfig::from_configuration(config)?;
        config.validate_certificate()
    }

    async fn connect(
        &self,
        config: &ConnectorConfiguration,
        context: AdapterContext,
    ) -> Result<(), ConnectorError> {
        let config = MqttConnectorConfig::from_configuration(config)?;
        let label = context.identity.to_string();

        // Replace any stale session left behind by a dropped connection.
        if let Some(mut previous) = self.session.write().await.take() {
            if let Err(e) = previous.close().await {
                warn!("[{label}] Closing stale session failed: {e}");
            }
        }

        info!(
            "[{label}] Connecting MQTT {} client {} to {}{}:{}",
            config.version,
            config.client_id,
            config.protocol.scheme(),
            config.host,
            config.port
        );
        let link = LinkState::new(self.connected.clone(), context);
        let session: Box<dyn MqttSession> = match config.version {
            MqttVersion::V311 => Box::new(v311::connect(&config, link).await?),
            MqttVersion::V5 => Box::new(v5::connect(&config, link).await?),
        };
        *self.session.write().await = Some(session);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        let session = self.session.write().await.take();
        self.connected.store(false, Ordering::SeqCst);
        match session {
            Some(mut session) => session.close().await,
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        match self.session.read().await.as_ref() {
            Some(session) => session.subscribe(topic, qos).await,
            None => Err(ConnectorError::NotConnected),
        }
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        match self.session.read().await.as_ref() {
            Some(session) => session.unsubscribe(topic).await,
            None => Err(ConnectorError::NotConnected),
        }
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ConnectorError> {
        match self.session.read().await.as_ref() {
            Some(session) => session.publish(topic, payload, qos, retain).await,
            None => Err(ConnectorError::NotConnected),
        }
    }
}
