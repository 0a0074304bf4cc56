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

//! Collaborators owned by the platform: configuration registry, mapping
//! cache and the event sink, plus the gated emitter in front of the sink.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{ConnectorConfiguration, ConnectorIdentity, ServiceConfiguration};
use crate::error::ConnectorError;
use crate::mapping::MappingRecord;
use crate::status::{ConnectorStatus, ConnectorStatusEvent};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    async fn connector_configuration(
        &self,
        tenant: &str,
        identifier: &str,
    ) -> Result<ConnectorConfiguration, ConnectorError>;

    async fn service_configuration(
        &self,
        tenant: &str,
    ) -> Result<ServiceConfiguration, ConnectorError>;
}

/// Mapping cache maintained by the external mapping service.
#[async_trait]
pub trait MappingCatalog: Send + Sync {
    /// Reloads the mapping caches before a resync.
    async fn rebuild(&self, connector: &ConnectorIdentity) -> Result<(), ConnectorError>;

    fn inbound_mappings(&self, tenant: &str) -> Vec<MappingRecord>;

    fn outbound_mappings(&self, tenant: &str) -> Vec<MappingRecord>;

    /// Connector identifiers a mapping is deployed to. `None` if unknown.
    fn deployed_connectors(&self, tenant: &str, mapping_identifier: &str) -> Option<Vec<String>>;

    /// Persists mapping changes that are still pending.
    async fn flush_dirty(&self, tenant: &str) -> Result<(), ConnectorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEventRecord {
    pub status: ConnectorStatus,
    pub message: String,
    pub connector_name: String,
    pub connector_identifier: String,
    pub date: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEventRecord {
    pub action: SubscriptionAction,
    pub topic: String,
    pub connector_name: String,
    pub date: String,
}

/// Receives lifecycle and subscription audit events.
pub trait PlatformEvents: Send + Sync {
    fn status_changed(&self, tenant: &str, event: &StatusEventRecord);

    fn subscription_changed(&self, tenant: &str, event: &SubscriptionEventRecord);
}

fn format_date(at: DateTime<Utc>) -> String {
    at.format(DATE_FORMAT).to_string()
}

/// Gates events by the service toggles and remembers the last emitted status.
pub struct EventEmitter {
    tenant: String,
    connector_name: String,
    sink: Arc<dyn PlatformEvents>,
    service: Mutex<ServiceConfiguration>,
    last_emitted: Mutex<Option<ConnectorStatus>>,
}

impl EventEmitter {
    pub fn new(identity: &ConnectorIdentity, sink: Arc<dyn PlatformEvents>) -> Self {
        Self {
            tenant: identity.tenant.clone(),
            connector_name: identity.name.clone(),
            sink,
            service: Mutex::new(ServiceConfiguration::default()),
            last_emitted: Mutex::new(None),
        }
    }

    pub fn set_service(&self, service: ServiceConfiguration) {
        *self.service.lock() = service;
    }

    pub fn service(&self) -> ServiceConfiguration {
        self.service.lock().clone()
    }

    /// Emits a status event unconditionally (subject to the toggle).
    pub fn emit_status(&self, event: &ConnectorStatusEvent) {
        *self.last_emitted.lock() = Some(event.status);
        if !self.service.lock().send_connector_lifecycle {
            return;
        }
        let record = StatusEventRecord {
            status: event.status,
            message: event.message.clone(),
            connector_name: event.connector_name.clone(),
            connector_identifier: event.connector_identifier.clone(),
            date: format_date(event.updated_at),
        };
        self.sink.status_changed(&self.tenant, &record);
    }

    /// Emits only if the status differs from the last emitted one.
    pub fn emit_status_if_changed(&self, event: &ConnectorStatusEvent) -> bool {
        if *self.last_emitted.lock() == Some(event.status) {
            return false;
        }
        self.emit_status(event);
        true
    }

    pub fn emit_subscription(&self, action: SubscriptionAction, topic: &str) {
        if !self.service.lock().send_subscription_events {
            debug!(
                "[{}] Subscription event {action:?} for [{topic}] suppressed",
                self.connector_name
            );
            return;
        }
        let record = SubscriptionEventRecord {
            action,
            topic: topic.to_string(),
            connector_name: self.connector_name.clone(),
            date: format_date(Utc::now()),
        };
        self.sink.subscription_changed(&self.tenant, &record);
    }
}
