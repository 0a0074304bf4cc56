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

//! Client seam between [`KafkaAdapter`](crate::KafkaAdapter) and a Kafka
//! client library.
//!
//! `binding` implements these traits on rdkafka when the `kafka-client`
//! feature is enabled.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{AckDecision, ConnectorError};

use crate::config::KafkaConnectorConfig;

/// Consecutive poll failures after which a consumer stops.
pub const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 5;
/// Pause after a failed poll.
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Failure reported by the Kafka client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct KafkaClientError(pub String);

impl KafkaClientError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// A record read by a consumer.
#[derive(Debug, Clone)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Bytes,
}

/// A record handed to the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Bytes,
}

/// Where a produced record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Consumer parameters. One consumer reads exactly one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub topic: String,
    /// Complete client properties, `group.id` included.
    pub properties: BTreeMap<String, String>,
}

impl ConsumerSpec {
    /// Offsets are committed by the consumer only when auto commit is off.
    pub fn manual_commit(&self) -> bool {
        self.properties
            .get("enable.auto.commit")
            .map_or(true, |value| !value.trim().eq_ignore_ascii_case("true"))
    }
}

/// Receives consumer records. [`AckDecision::Acknowledge`] commits the
/// record's offset; a withheld record stays uncommitted.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, record: InboundRecord) -> AckDecision;
}

#[async_trait]
pub trait KafkaConsumer: Send + Sync {
    /// `false` once the poll loop has stopped.
    fn is_connected(&self) -> bool;

    async fn close(&self) -> Result<(), KafkaClientError>;
}

/// A connected Kafka client: one producer plus consumers created on demand.
#[async_trait]
pub trait KafkaBackend: Send + Sync {
    async fn subscribe(
        &self,
        spec: ConsumerSpec,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<Box<dyn KafkaConsumer>, KafkaClientError>;

    /// Produces and waits for the delivery report up to `timeout`.
    async fn send(
        &self,
        record: OutboundRecord,
        timeout: Duration,
    ) -> Result<Delivery, KafkaClientError>;

    /// Fetches cluster metadata to prove the brokers are reachable.
    async fn check_connectivity(&self, timeout: Duration) -> Result<(), KafkaClientError>;

    async fn close(&self) -> Result<(), KafkaClientError>;
}

/// Creates clients. One call per Connect.
#[async_trait]
pub trait KafkaConnect: Send + Sync {
    async fn connect(
        &self,
        config: &KafkaConnectorConfig,
    ) -> Result<Arc<dyn KafkaBackend>, KafkaClientError>;
}

pub(crate) fn connect_error(config: &KafkaConnectorConfig, e: KafkaClientError) -> ConnectorError {
    ConnectorError::connection_caused_by(
        format!("could not connect to Kafka at {}", config.bootstrap_servers),
        e,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(auto_commit: Option<&str>) -> ConsumerSpec {
        let mut properties = BTreeMap::new();
        if let Some(value) = auto_commit {
            properties.insert("enable.auto.commit".to_string(), value.to_string());
        }
        ConsumerSpec {
            topic: "measurements".into(),
            properties,
        }
    }

    #[test]
    fn test_manual_commit_follows_auto_commit_property() {
        assert!(spec(None).manual_commit());
        assert!(spec(Some("false")).manual_commit());
        assert!(!spec(Some("true")).manual_commit());
        assert!(!spec(Some(" TRUE ")).manual_commit());
    }
}
