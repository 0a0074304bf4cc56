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

//! In-process implementations of the platform collaborators, for embedding
//! the engine without a platform and for tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use log::info;
use parking_lot::Mutex;

use crate::config::{ConnectorConfiguration, ConnectorIdentity, ServiceConfiguration};
use crate::error::ConnectorError;
use crate::mapping::{Direction, MappingRecord};
use crate::platform::{
    ConfigurationSource, MappingCatalog, PlatformEvents, StatusEventRecord,
    SubscriptionEventRecord,
};

/// Configurations keyed by `(tenant, identifier)`.
#[derive(Default)]
pub struct InMemoryConfigurationSource {
    connectors: DashMap<(String, String), ConnectorConfiguration>,
    services: DashMap<String, ServiceConfiguration>,
}

impl InMemoryConfigurationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_connector(&self, tenant: &str, config: ConnectorConfiguration) {
        self.connectors
            .insert((tenant.to_string(), config.identifier.clone()), config);
    }

    pub fn put_service(&self, tenant: &str, service: ServiceConfiguration) {
        self.services.insert(tenant.to_string(), service);
    }

    /// Applies `f` to a stored configuration, e.g. to toggle `enabled`.
    pub fn update_connector<F>(&self, tenant: &str, identifier: &str, f: F) -> bool
    where
        F: FnOnce(&mut ConnectorConfiguration),
    {
        match self
            .connectors
            .get_mut(&(tenant.to_string(), identifier.to_string()))
        {
            Some(mut config) => {
                f(&mut config);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ConfigurationSource for InMemoryConfigurationSource {
    async fn connector_configuration(
        &self,
        tenant: &str,
        identifier: &str,
    ) -> Result<ConnectorConfiguration, ConnectorError> {
        self.connectors
            .get(&(tenant.to_string(), identifier.to_string()))
            .map(|c| c.clone())
            .ok_or_else(|| {
                ConnectorError::Configuration(format!(
                    "no configuration for connector {identifier} in tenant {tenant}"
                ))
            })
    }

    async fn service_configuration(
        &self,
        tenant: &str,
    ) -> Result<ServiceConfiguration, ConnectorError> {
        Ok(self
            .services
            .get(tenant)
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

/// Mapping cache with explicit deployments. A mapping is deployed only to
/// the connectors listed through [`InMemoryMappingCatalog::deploy`].
#[derive(Default)]
pub struct InMemoryMappingCatalog {
    mappings: DashMap<String, Vec<MappingRecord>>,
    deployments: DashMap<(String, String), Vec<String>>,
    dirty: DashMap<String, usize>,
    rebuilds: AtomicUsize,
    flushes: AtomicUsize,
}

impl InMemoryMappingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a mapping and marks the tenant dirty.
    pub fn upsert(&self, tenant: &str, mapping: MappingRecord) {
        let mut entry = self.mappings.entry(tenant.to_string()).or_default();
        entry.retain(|m| m.identifier != mapping.identifier);
        entry.push(mapping);
        drop(entry);
        *self.dirty.entry(tenant.to_string()).or_insert(0) += 1;
    }

    pub fn remove(&self, tenant: &str, identifier: &str) -> Option<MappingRecord> {
        let mut entry = self.mappings.get_mut(tenant)?;
        let index = entry.iter().position(|m| m.identifier == identifier)?;
        Some(entry.remove(index))
    }

    pub fn deploy(&self, tenant: &str, mapping_identifier: &str, connectors: Vec<String>) {
        self.deployments
            .insert((tenant.to_string(), mapping_identifier.to_string()), connectors);
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    fn by_direction(&self, tenant: &str, direction: Direction) -> Vec<MappingRecord> {
        self.mappings
            .get(tenant)
            .map(|m| {
                m.iter()
                    .filter(|m| m.direction == direction)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MappingCatalog for InMemoryMappingCatalog {
    async fn rebuild(&self, _connector: &ConnectorIdentity) -> Result<(), ConnectorError> {
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn inbound_mappings(&self, tenant: &str) -> Vec<MappingRecord> {
        self.by_direction(tenant, Direction::Inbound)
    }

    fn outbound_mappings(&self, tenant: &str) -> Vec<MappingRecord> {
        self.by_direction(tenant, Direction::Outbound)
    }

    fn deployed_connectors(&self, tenant: &str, mapping_identifier: &str) -> Option<Vec<String>> {
        self.deployments
            .get(&(tenant.to_string(), mapping_identifier.to_string()))
            .map(|d| d.clone())
    }

    async fn flush_dirty(&self, tenant: &str) -> Result<(), ConnectorError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        self.dirty.remove(tenant);
        Ok(())
    }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingPlatformEvents {
    statuses: Mutex<Vec<(String, StatusEventRecord)>>,
    subscriptions: Mutex<Vec<(String, SubscriptionEventRecord)>>,
}

impl RecordingPlatformEvents {
    pub fn statuses(&self) -> Vec<StatusEventRecord> {
        self.statuses.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionEventRecord> {
        self.subscriptions
            .lock()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }
}

impl PlatformEvents for RecordingPlatformEvents {
    fn status_changed(&self, tenant: &str, event: &StatusEventRecord) {
        self.statuses.lock().push((tenant.to_string(), event.clone()));
    }

    fn subscription_changed(&self, tenant: &str, event: &SubscriptionEventRecord) {
        self.subscriptions
            .lock()
            .push((tenant.to_string(), event.clone()));
    }
}

/// Writes events to the log.
#[derive(Default)]
pub struct LoggingPlatformEvents;

impl PlatformEvents for LoggingPlatformEvents {
    fn status_changed(&self, tenant: &str, event: &StatusEventRecord) {
        info!(
            "[{tenant}/{}] Connector status {}{}",
            event.connector_name, event.status, event.message
        );
    }

    fn subscription_changed(&self, tenant: &str, event: &SubscriptionEventRecord) {
        info!(
            "[{tenant}/{}] {:?} [{}]",
            event.connector_name, event.action, event.topic
        );
    }
}
