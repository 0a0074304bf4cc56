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

//! Reference-counted topic subscriptions and full-resync diffing.
//!
//! Readers get an immutable [`SubscriptionSnapshot`]; every mutation builds a
//! new snapshot and swaps it in, so lookups never observe a half-applied
//! resync. Mutations are serialized by an async mutex that is held across the
//! physical subscribe/unsubscribe calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::ConnectorError;
use crate::mapping::{MappingRecord, Qos};

/// Physical subscription calls issued by the reconciler.
#[async_trait]
pub trait SubscriptionPort: Send + Sync {
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError>;
    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError>;
}

/// Predicate deciding whether an active mapping may become effective.
pub type MappingValidator<'a> = &'a (dyn Fn(&MappingRecord) -> bool + Send + Sync);

#[derive(Debug, Clone, Default)]
pub struct SubscriptionSnapshot {
    /// Topic to refcount. An entry exists iff its count is positive.
    counts: HashMap<String, u32>,
    inbound: HashMap<String, MappingRecord>,
    outbound: HashMap<String, MappingRecord>,
}

impl SubscriptionSnapshot {
    pub fn refcount(&self, topic: &str) -> u32 {
        self.counts.get(topic).copied().unwrap_or(0)
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.counts.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn inbound(&self, identifier: &str) -> Option<&MappingRecord> {
        self.inbound.get(identifier)
    }

    pub fn outbound(&self, identifier: &str) -> Option<&MappingRecord> {
        self.outbound.get(identifier)
    }

    pub fn inbound_mappings(&self) -> impl Iterator<Item = &MappingRecord> {
        self.inbound.values()
    }

    pub fn outbound_mappings(&self) -> impl Iterator<Item = &MappingRecord> {
        self.outbound.values()
    }
}

/// Outcome of a full inbound resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub subscribed: Vec<String>,
    pub unsubscribed: Vec<String>,
    pub failed: Vec<String>,
    pub active_topics: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.subscribed.is_empty() && self.unsubscribed.is_empty() && self.failed.is_empty()
    }
}

/// Highest QoS among the mappings listening on each topic.
pub fn consolidated_qos<'a, I>(mappings: I) -> BTreeMap<String, (Qos, u32)>
where
    I: IntoIterator<Item = &'a MappingRecord>,
{
    let mut target: BTreeMap<String, (Qos, u32)> = BTreeMap::new();
    for mapping in mappings {
        let entry = target
            .entry(mapping.topic.clone())
            .or_insert((mapping.qos, 0));
        entry.0 = entry.0.max(mapping.qos);
        entry.1 += 1;
    }
    target
}

pub struct SubscriptionReconciler {
    label: String,
    current: RwLock<Arc<SubscriptionSnapshot>>,
    write: Mutex<()>,
}

impl SubscriptionReconciler {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            current: RwLock::new(Arc::new(SubscriptionSnapshot::default())),
            write: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<SubscriptionSnapshot> {
        self.current.read().clone()
    }

    pub fn refcount(&self, topic: &str) -> u32 {
        self.snapshot().refcount(topic)
    }

    fn publish(&self, next: SubscriptionSnapshot) {
        *self.current.write() = Arc::new(next);
    }

    /// Counts one more mapping on its topic and records it as effective.
    /// Subscribes only on the 0→1 transition; a failed subscribe is
    /// returned but the record stays.
    pub async fn add(
        &self,
        mapping: &MappingRecord,
        qos: Qos,
        port: &dyn SubscriptionPort,
    ) -> Result<(), ConnectorError> {
        let _guard = self.write.lock().await;
        let mut next = (*self.snapshot()).clone();
        let count = next.counts.entry(mapping.topic.clone()).or_insert(0);
        *count += 1;
        let first = *count == 1;
        next.inbound
            .insert(mapping.identifier.clone(), mapping.clone());
        self.publish(next);

        if first {
            info!(
                "[{}] Subscribing to topic [{}] with QoS {qos} for mapping {}",
                self.label, mapping.topic, mapping.name
            );
            port.subscribe(&mapping.topic, qos).await?;
        }
        Ok(())
    }

    /// Releases one mapping from its topic. Unsubscribes when the count
    /// drops to zero. The mapping leaves the effective set regardless.
    pub async fn remove(
        &self,
        mapping: &MappingRecord,
        port: &dyn SubscriptionPort,
    ) -> Result<(), ConnectorError> {
        let _guard = self.write.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.inbound.remove(&mapping.identifier);

        let mut result = Ok(());
        match next.counts.get_mut(&mapping.topic) {
            None => {
                warn!(
                    "[{}] Topic [{}] of mapping {} is not tracked",
                    self.label, mapping.topic, mapping.name
                );
            }
            Some(count) => {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    next.counts.remove(&mapping.topic);
                    info!(
                        "[{}] Unsubscribing from topic [{}]",
                        self.label, mapping.topic
                    );
                    result = port.unsubscribe(&mapping.topic).await;
                }
            }
        }
        self.publish(next);
        result
    }

    /// Replaces the stored record of an already-effective mapping without
    /// touching the counts.
    pub async fn refresh_inbound(&self, mapping: &MappingRecord) {
        let _guard = self.write.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.inbound
            .insert(mapping.identifier.clone(), mapping.clone());
        self.publish(next);
    }

    /// Full inbound resync against `mappings`.
    ///
    /// Topics no longer wanted are unsubscribed and newly wanted ones are
    /// subscribed at the strongest QoS requested for them. Per-topic failures
    /// are logged and reported. The table is then replaced by the target.
    pub async fn reconcile_inbound(
        &self,
        mappings: &[MappingRecord],
        validator: MappingValidator<'_>,
        is_connected: bool,
        reset: bool,
        port: &dyn SubscriptionPort,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if !is_connected {
            debug!("[{}] Skipping resync while disconnected", self.label);
            return report;
        }

        let _guard = self.write.lock().await;
        let current = if reset {
            Arc::new(SubscriptionSnapshot::default())
        } else {
            self.snapshot()
        };

        let effective: Vec<&MappingRecord> = mappings
            .iter()
            .filter(|m| m.active && validator(m))
            .collect();
        let target = consolidated_qos(effective.iter().copied());

        for topic in current.counts.keys() {
            if target.contains_key(topic) {
                continue;
            }
            match port.unsubscribe(topic).await {
                Ok(()) => report.unsubscribed.push(topic.clone()),
                Err(e) => {
                    warn!("[{}] Resync could not unsubscribe [{topic}]: {e}", self.label);
                    report.failed.push(topic.clone());
                }
            }
        }

        let mut counts = HashMap::with_capacity(target.len());
        for (topic, (qos, count)) in &target {
            if !current.counts.contains_key(topic) {
                match port.subscribe(topic, *qos).await {
                    Ok(()) => report.subscribed.push(topic.clone()),
                    Err(e) => {
                        warn!("[{}] Resync could not subscribe [{topic}]: {e}", self.label);
                        report.failed.push(topic.clone());
                    }
                }
            }
            counts.insert(topic.clone(), *count);
        }

        let inbound = effective
            .into_iter()
            .map(|m| (m.identifier.clone(), m.clone()))
            .collect();

        report.active_topics = counts.len();
        self.publish(SubscriptionSnapshot {
            counts,
            inbound,
            outbound: current.outbound.clone(),
        });

        if !report.is_noop() {
            info!(
                "[{}] Resync finished: {} subscribed, {} unsubscribed, {} failed, {} active",
                self.label,
                report.subscribed.len(),
                report.unsubscribed.len(),
                report.failed.len(),
                report.active_topics
            );
        }
        report
    }

    /// Replaces the outbound effective set. No physical step is involved.
    pub async fn reconcile_outbound(
        &self,
        mappings: &[MappingRecord],
        validator: MappingValidator<'_>,
    ) -> usize {
        let _guard = self.write.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.outbound = mappings
            .iter()
            .filter(|m| m.active && validator(m))
            .map(|m| (m.identifier.clone(), m.clone()))
            .collect();
        let count = next.outbound.len();
        self.publish(next);
        count
    }

    pub async fn add_outbound(&self, mapping: &MappingRecord) {
        let _guard = self.write.lock().await;
        let mut next = (*self.snapshot()).clone();
        next.outbound
            .insert(mapping.identifier.clone(), mapping.clone());
        self.publish(next);
    }

    pub async fn remove_outbound(&self, identifier: &str) -> bool {
        let _guard = self.write.lock().await;
        let mut next = (*self.snapshot()).clone();
        let removed = next.outbound.remove(identifier).is_some();
        self.publish(next);
        removed
    }

    /// Drops all counts and effective mappings.
    pub async fn clear(&self) {
        let _guard = self.write.lock().await;
        self.publish(SubscriptionSnapshot::default());
    }
}
