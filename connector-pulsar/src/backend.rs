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

//! Client seam between the adapters and a Pulsar client library.
//!
//! The adapters only talk to these traits. `binding` implements them on
//! pulsar-rs when the `pulsar-client` feature is enabled.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{AckDecision, ConnectorError, Qos};

use crate::config::{ClientOptions, SubscriptionType};
use crate::topic::TopicSelector;

/// Failure reported by the Pulsar client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PulsarClientError(pub String);

impl PulsarClientError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// A message received by a consumer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Physical topic the message was read from.
    pub topic: String,
    pub key: Option<String>,
    pub payload: Bytes,
    pub properties: HashMap<String, String>,
}

/// A message handed to a producer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundMessage {
    pub payload: Bytes,
    pub key: Option<String>,
    pub properties: HashMap<String, String>,
}

/// Consumer parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub selector: TopicSelector,
    pub subscription_name: String,
    pub subscription_type: SubscriptionType,
    pub qos: Qos,
}

/// Receives consumer messages and decides whether each one is acknowledged
/// or negatively acknowledged.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> AckDecision;
}

#[async_trait]
pub trait PulsarConsumer: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<(), PulsarClientError>;
}

#[async_trait]
pub trait PulsarProducer: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Sends and waits for the broker receipt.
    async fn send(&self, message: OutboundMessage) -> Result<(), PulsarClientError>;

    async fn close(&self) -> Result<(), PulsarClientError>;
}

/// A connected Pulsar client.
#[async_trait]
pub trait PulsarBackend: Send + Sync {
    async fn subscribe(
        &self,
        spec: ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn PulsarConsumer>, PulsarClientError>;

    async fn create_producer(
        &self,
        topic: &str,
    ) -> Result<Arc<dyn PulsarProducer>, PulsarClientError>;

    async fn close(&self) -> Result<(), PulsarClientError>;

    fn is_closed(&self) -> bool;
}

/// Creates clients. One call per Connect.
#[async_trait]
pub trait PulsarConnect: Send + Sync {
    async fn connect(
        &self,
        options: &ClientOptions,
    ) -> Result<Arc<dyn PulsarBackend>, PulsarClientError>;
}

pub(crate) fn connect_error(options: &ClientOptions, e: PulsarClientError) -> ConnectorError {
    ConnectorError::connection_caused_by(
        format!("could not create Pulsar client for {}", options.service_url),
        e,
    )
}
