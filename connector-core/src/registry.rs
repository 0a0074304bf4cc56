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

//! Per-tenant connector registry.

use std::collections::HashMap;

use dashmap::DashMap;
use log::{info, warn};

use crate::config::{ConnectorSpecification, ConnectorType};
use crate::error::ConnectorError;
use crate::lifecycle::Connector;
use crate::status::ConnectorStatusEvent;

/// Owns the connectors of every tenant. Create one per process and share it.
#[derive(Default)]
pub struct ConnectorRegistry {
    connectors: DashMap<String, DashMap<String, Connector>>,
    /// Last status of connectors that were unregistered.
    retained: DashMap<String, DashMap<String, ConnectorStatusEvent>>,
    specifications: DashMap<ConnectorType, ConnectorSpecification>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_specification(&self, specification: ConnectorSpecification) {
        self.specifications
            .insert(specification.connector_type, specification);
    }

    pub fn specification(&self, connector_type: ConnectorType) -> Option<ConnectorSpecification> {
        self.specifications
            .get(&connector_type)
            .map(|s| s.clone())
    }

    /// Adds a connector. Singleton types allow one instance per tenant.
    pub fn register(&self, connector: Connector) -> Result<(), ConnectorError> {
        let identity = connector.identity().clone();
        let singleton = identity.singleton || connector.specification().singleton;
        let tenant = self.connectors.entry(identity.tenant.clone()).or_default();

        if tenant.contains_key(&identity.identifier) {
            return Err(ConnectorError::Registry(format!(
                "connector {} is already registered for tenant {}",
                identity.identifier, identity.tenant
            )));
        }
        if singleton
            && tenant
                .iter()
                .any(|c| c.identity().connector_type == identity.connector_type)
        {
            return Err(ConnectorError::Registry(format!(
                "only one {} connector is allowed for tenant {}",
                identity.connector_type, identity.tenant
            )));
        }

        tenant.insert(identity.identifier.clone(), connector);
        if let Some(retained) = self.retained.get(&identity.tenant) {
            retained.remove(&identity.identifier);
        }
        info!("[{identity}] Registered {} connector", identity.connector_type);
        Ok(())
    }

    pub fn get(&self, tenant: &str, identifier: &str) -> Option<Connector> {
        self.connectors
            .get(tenant)?
            .get(identifier)
            .map(|c| c.clone())
    }

    pub fn connectors(&self, tenant: &str) -> Vec<Connector> {
        self.connectors
            .get(tenant)
            .map(|t| t.iter().map(|c| c.clone()).collect())
            .unwrap_or_default()
    }

    /// Removes a connector, waits for it to disconnect and keeps its last
    /// status for [`status_map`](Self::status_map).
    pub async fn unregister(&self, tenant: &str, identifier: &str) -> Result<(), ConnectorError> {
        let removed = self
            .connectors
            .get(tenant)
            .and_then(|t| t.remove(identifier))
            .map(|(_, connector)| connector);
        let Some(connector) = removed else {
            return Err(ConnectorError::Registry(format!(
                "connector {identifier} is not registered for tenant {tenant}"
            )));
        };

        let outcome = connector.close().await;
        info!("[{}] Unregistered ({outcome:?})", connector.identity());
        self.retained
            .entry(tenant.to_string())
            .or_default()
            .insert(identifier.to_string(), connector.status());
        Ok(())
    }

    pub async fn unregister_all(&self, tenant: &str) {
        for connector in self.connectors(tenant) {
            let identifier = connector.identity().identifier.clone();
            if let Err(e) = self.unregister(tenant, &identifier).await {
                warn!("[{tenant}] {e}");
            }
        }
    }

    /// Status of every live connector plus the retained status of removed ones.
    pub fn status_map(&self, tenant: &str) -> HashMap<String, ConnectorStatusEvent> {
        let mut statuses: HashMap<String, ConnectorStatusEvent> = self
            .retained
            .get(tenant)
            .map(|r| r.iter().map(|e| (e.key().clone(), e.value().clone())).collect())
            .unwrap_or_default();
        for connector in self.connectors(tenant) {
            statuses.insert(connector.identity().identifier.clone(), connector.status());
        }
        statuses
    }
}
