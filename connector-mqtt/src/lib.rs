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

//! MQTT 3.1.1 and 5.0 adapters for the connector lifecycle engine.
//!
//! Connects to an external broker with rumqttc, subscribes to the topics the
//! reconciler asks for, and hands inbound publishes to the dispatch gateway
//! with manual acknowledgment.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use connector_core::{Connector, ConnectorIdentity, ConnectorType};
//! use connector_mqtt::MqttAdapter;
//!
//! let identity = ConnectorIdentity::new("t1", "c1", "plant-broker", ConnectorType::Mqtt);
//! let connector = Connector::new(identity, Arc::new(MqttAdapter::new()), context);
//! connector.connect().wait().await;
//! ```

pub mod adapter;
pub mod config;
pub mod message;
mod session;
mod v311;
mod v5;

pub use adapter::MqttAdapter;
pub use config::{MqttConnectorConfig, MqttConnectorConfigBuilder, MqttProtocol, MqttVersion};
