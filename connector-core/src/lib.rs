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

//! Connector lifecycle and subscription reconciliation engine.
//!
//! A [`Connector`] drives one broker connection through Initialize, Connect,
//! Disconnect and Reconnect, keeps its topic subscriptions in line with the
//! current mapping set, and runs periodic housekeeping. Broker specifics live
//! behind the [`ProtocolAdapter`] trait.
//!
//! # Example
//!
//! ```ignore
//! use connector_core::{Connector, ConnectorContext, ConnectorIdentity, ConnectorType};
//!
//! let identity = ConnectorIdentity::new("t1", "c1", "plant-broker", ConnectorType::Mqtt);
//! let connector = Connector::new(identity, adapter, context);
//! connector.initialize().wait().await;
//! connector.connect();
//! connector.start_housekeeping();
//! ```

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod housekeeping;
pub mod lifecycle;
pub mod mapping;
pub mod memory;
pub mod platform;
pub mod reconciler;
pub mod registry;
pub mod state;
pub mod status;

pub use adapter::{AdapterCapabilities, AdapterContext, AdapterEvent, ProtocolAdapter};
pub use config::{
    is_config_valid, ConnectorConfiguration, ConnectorIdentity, ConnectorSpecification,
    ConnectorType, LifecycleSettings, LifecycleSettingsBuilder, PropertyKind, PropertySpec,
    ServiceConfiguration,
};
pub use dispatch::{
    settle, AckDecision, ConnectorMessage, DispatchOutcome, MessageDispatchGateway,
    ProcessingResult,
};
pub use error::{Cause, ConnectorError, TranslationError};
pub use lifecycle::{Connector, ConnectorContext, OperationHandle, OperationKind, OperationOutcome};
pub use mapping::{adjust_qos, Direction, MappingRecord, Qos};
pub use platform::{ConfigurationSource, MappingCatalog, PlatformEvents};
pub use reconciler::{ReconcileReport, SubscriptionReconciler};
pub use registry::ConnectorRegistry;
pub use state::ConnectionStateManager;
pub use status::{ConnectorStatus, ConnectorStatusEvent};
