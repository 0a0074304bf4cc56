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

//! Apache Pulsar adapters for the connector lifecycle engine.
//!
//! [`PulsarAdapter`] talks to a Pulsar cluster directly and maps MQTT topic
//! filters onto Pulsar topics and regex subscriptions. [`PulsarBridgeAdapter`]
//! reaches the platform MQTT service, which multiplexes all device traffic
//! through two fixed Pulsar topics.
//!
//! Both adapters run on the [`backend::PulsarConnect`] seam. The
//! `pulsar-client` feature provides [`PulsarRsConnector`] on pulsar-rs.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use connector_core::{Connector, ConnectorIdentity, ConnectorType};
//! use connector_pulsar::{PulsarAdapter, PulsarRsConnector};
//!
//! let identity = ConnectorIdentity::new("t1", "p1", "events", ConnectorType::Pulsar);
//! let adapter = PulsarAdapter::new(Arc::new(PulsarRsConnector));
//! let connector = Connector::new(identity, Arc::new(adapter), context);
//! connector.connect().wait().await;
//! ```

pub mod backend;
#[cfg(feature = "pulsar-client")]
pub mod binding;
pub mod bridge;
pub mod config;
mod handler;
pub mod native;
pub mod topic;

#[cfg(feature = "pulsar-client")]
pub use binding::PulsarRsConnector;
pub use bridge::PulsarBridgeAdapter;
pub use config::{BridgeConfig, ClientOptions, PulsarConnectorConfig, SubscriptionType};
pub use handler::{PROPERTY_CHANNEL, PROPERTY_CLIENT_ID, PROPERTY_TOPIC};
pub use native::PulsarAdapter;
