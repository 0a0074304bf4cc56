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

use async_trait::async_trait;
use connector_core::{settle, AckDecision, AdapterContext, ConnectorMessage, Qos};
use log::{debug, warn};

use crate::backend::{InboundMessage, MessageHandler};

/// Message property carrying the MQTT topic.
pub const PROPERTY_TOPIC: &str = "topic";
/// Alternative topic property set by some bridge publishers.
pub const PROPERTY_CHANNEL: &str = "channel";
/// Message property carrying the publishing client.
pub const PROPERTY_CLIENT_ID: &str = "clientID";

/// Hands consumer messages to the dispatch gateway and turns the processing
/// outcome into an ack or a negative ack.
pub(crate) struct DispatchHandler {
    context: AdapterContext,
    qos: Qos,
    /// Properties consulted, in order, for the MQTT-facing topic.
    topic_properties: &'static [&'static str],
}

impl DispatchHandler {
    pub fn new(
        context: AdapterContext,
        qos: Qos,
        topic_properties: &'static [&'static str],
    ) -> Self {
        Self {
            context,
            qos,
            topic_properties,
        }
    }

    fn logical_topic(&self, message: &InboundMessage) -> String {
        self.topic_properties
            .iter()
            .find_map(|key| message.properties.get(*key))
            .filter(|topic| !topic.is_empty())
            .cloned()
            .unwrap_or_else(|| message.topic.clone())
    }
}

#[async_trait]
impl MessageHandler for DispatchHandler {
    async fn handle(&self, message: InboundMessage) -> AckDecision {
        let label = &self.context.identity;
        let topic = self.logical_topic(&message);
        if self.context.service.log_payload {
            debug!(
                "[{label}] Received on [{topic}] (Pulsar [{}]): {}",
                message.topic,
                String::from_utf8_lossy(&message.payload)
            );
        }

        let outcome = self.context.dispatcher.on_message(ConnectorMessage {
            tenant: label.tenant.clone(),
            connector_identifier: label.identifier.clone(),
            topic: topic.clone(),
            key: message.key,
            payload: message.payload,
            qos: self.qos,
            retained: false,
            properties: message.properties,
        });

        let decision = settle(self.qos, outcome).await;
        if let AckDecision::Withhold(reason) = &decision {
            warn!("[{label}] Negatively acknowledging message on [{topic}]: {reason:?}");
        }
        decision
    }
}
