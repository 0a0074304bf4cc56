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

//! The contract every broker protocol implements to plug into the lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::config::{
    ConnectorConfiguration, ConnectorIdentity, ConnectorSpecification, ServiceConfiguration,
};
use crate::dispatch::MessageDispatchGateway;
use crate::error::ConnectorError;
use crate::mapping::{Direction, Qos};

/// Notifications an adapter sends back to its connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    /// The physical connection dropped without a deliberate disconnect.
    ConnectionLost { reason: String },
}

/// Everything an adapter needs from its connector while connected.
#[derive(Clone)]
pub struct AdapterContext {
    pub identity: ConnectorIdentity,
    pub dispatcher: Arc<dyn MessageDispatchGateway>,
    pub service: ServiceConfiguration,
    events: mpsc::UnboundedSender<AdapterEvent>,
}

impl AdapterContext {
    pub fn new(
        identity: ConnectorIdentity,
        dispatcher: Arc<dyn MessageDispatchGateway>,
        service: ServiceConfiguration,
        events: mpsc::UnboundedSender<AdapterEvent>,
    ) -> Self {
        Self {
            identity,
            dispatcher,
            service,
            events,
        }
    }

    pub fn connection_lost(&self, reason: impl Into<String>) {
        // The receiver is gone once the connector is dropped.
        let _ = self.events.send(AdapterEvent::ConnectionLost {
            reason: reason.into(),
        });
    }
}

/// Static capabilities reported by an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCapabilities {
    pub supported_qos: Vec<Qos>,
    pub wildcards_inbound: bool,
    pub wildcards_outbound: bool,
}

impl AdapterCapabilities {
    pub fn supports_wildcards(&self, direction: Direction) -> bool {
        match direction {
            Direction::Inbound => self.wildcards_inbound,
            Direction::Outbound => self.wildcards_outbound,
        }
    }
}

/// Physical broker operations.
///
/// Implementations own their client handle exclusively and must re-check
/// the connected state right before unsubscribe and publish, since a
/// concurrent disconnect may have torn the client down.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn specification(&self) -> ConnectorSpecification;

    fn capabilities(&self) -> AdapterCapabilities;

    /// Prepares client material such as certificates. Errors are fatal.
    async fn initialize(&self, _config: &ConnectorConfiguration) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn connect(
        &self,
        config: &ConnectorConfiguration,
        context: AdapterContext,
    ) -> Result<(), ConnectorError>;

    async fn disconnect(&self) -> Result<(), ConnectorError>;

    fn is_connected(&self) -> bool;

    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError>;

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ConnectorError>;

    /// Detects and repairs dead consumers or producers.
    async fn monitor_health(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}
