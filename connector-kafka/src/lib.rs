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

//! Apache Kafka adapter for the connector lifecycle engine.
//!
//! [`KafkaAdapter`] opens one consumer per subscribed topic inside a shared
//! consumer group and publishes through a single producer. Offsets are
//! committed per record once processing allows it.
//!
//! The adapter runs on the [`backend::KafkaConnect`] seam. The
//! `kafka-client` feature provides [`RdKafkaConnector`] on rdkafka.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use connector_core::{Connector, ConnectorIdentity, ConnectorType};
//! use connector_kafka::{KafkaAdapter, RdKafkaConnector};
//!
//! let identity = ConnectorIdentity::new("t1", "k1", "events", ConnectorType::Kafka);
//! let adapter = KafkaAdapter::new(Arc::new(RdKafkaConnector));
//! let connector = Connector::new(identity, Arc::new(adapter), context);
//! connector.connect().wait().await;
//! ```

pub mod adapter;
pub mod backend;
#[cfg(feature = "kafka-client")]
pub mod binding;
pub mod config;
mod handler;

pub use adapter::KafkaAdapter;
#[cfg(feature = "kafka-client")]
pub use binding::RdKafkaConnector;
pub use config::{KafkaConnectorConfig, SaslMechanism};
pub use handler::MAX_PROCESSING_ERRORS;
