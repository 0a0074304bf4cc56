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

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use connector_core::{settle, AckDecision, AdapterContext, ConnectorMessage, Qos};
use log::{debug, warn};

use crate::backend::{InboundRecord, RecordHandler};

/// Withheld records after which a consumer is restarted.
pub const MAX_PROCESSING_ERRORS: u32 = 10;

/// Hands records to the dispatch gateway. Records carry no QoS of their own,
/// so the consolidated QoS of the matching mappings decides whether the
/// offset is committed at once or only after processing succeeded.
pub(crate) struct DispatchHandler {
    context: AdapterContext,
    /// Withheld records since the consumer started. Shared with the adapter.
    processing_errors: Arc<AtomicU32>,
}

impl DispatchHandler {
    pub fn new(context: AdapterContext, processing_errors: Arc<AtomicU32>) -> Self {
        Self {
            context,
            processing_errors,
        }
    }
}

#[async_trait]
impl RecordHandler for DispatchHandler {
    async fn handle(&self, record: InboundRecord) -> AckDecision {
        let label = &self.context.identity;
        if self.context.service.log_payload {
            debug!(
                "[{label}] Received on [{}] partition {} offset {} key {:?}: {}",
                record.topic,
                record.partition,
                record.offset,
                record.key,
                String::from_utf8_lossy(&record.payload)
            );
        }

        let outcome = self.context.dispatcher.on_message(ConnectorMessage {
            tenant: label.tenant.clone(),
            connector_identifier: label.identifier.clone(),
            topic: record.topic.clone(),
            key: record.key,
            payload: record.payload,
            qos: Qos::AtMostOnce,
            retained: false,
            properties: HashMap::new(),
        });

        let decision = settle(Qos::ExactlyOnce, outcome).await;
        if let AckDecision::Withhold(reason) = &decision {
            let errors = self.processing_errors.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                "[{label}] Offset {} on [{}] partition {} left uncommitted ({errors} errors): \
                 {reason:?}",
                record.offset, record.topic, record.partition
            );
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use connector_core::{
        ConnectorIdentity, ConnectorType, DispatchOutcome, MessageDispatchGateway,
        ProcessingResult, ServiceConfiguration,
    };
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Recording {
        keys: Mutex<Vec<Option<String>>>,
        qos: Qos,
        status: Option<u16>,
    }

    impl MessageDispatchGateway for Recording {
        fn on_message(&self, message: ConnectorMessage) -> DispatchOutcome {
            self.keys.lock().unwrap().push(message.key);
            let results = match self.status {
                Some(status) => vec![ProcessingResult::failure("m1", "rejected", Some(status))],
                None => vec![ProcessingResult::success("m1")],
            };
            DispatchOutcome {
                consolidated_qos: self.qos,
                max_processing_time: Some(Duration::from_secs(1)),
                results: Box::pin(async move { Ok(results) }),
            }
        }
    }

    fn handler(qos: Qos, status: Option<u16>) -> (DispatchHandler, Arc<Recording>, Arc<AtomicU32>) {
        let gateway = Arc::new(Recording {
            keys: Mutex::new(Vec::new()),
            qos,
            status,
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let identity = ConnectorIdentity::new("t1", "k1", "events", ConnectorType::Kafka);
        let context =
            AdapterContext::new(identity, gateway.clone(), ServiceConfiguration::default(), tx);
        let errors = Arc::new(AtomicU32::new(0));
        (DispatchHandler::new(context, errors.clone()), gateway, errors)
    }

    fn record() -> InboundRecord {
        InboundRecord {
            topic: "measurements".into(),
            partition: 2,
            offset: 41,
            key: Some("device-7".into()),
            payload: Bytes::from_static(b"{\"t\":21.5}"),
        }
    }

    #[tokio::test]
    async fn test_record_key_reaches_gateway() {
        let (handler, gateway, _) = handler(Qos::AtLeastOnce, None);
        assert_eq!(handler.handle(record()).await, AckDecision::Acknowledge);
        assert_eq!(*gateway.keys.lock().unwrap(), vec![Some("device-7".to_string())]);
    }

    #[tokio::test]
    async fn test_server_error_withholds_commit_and_counts() {
        let (handler, _, errors) = handler(Qos::AtLeastOnce, Some(503));
        assert!(matches!(handler.handle(record()).await, AckDecision::Withhold(_)));
        assert!(matches!(handler.handle(record()).await, AckDecision::Withhold(_)));
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_qos0_mappings_commit_without_waiting() {
        let (handler, _, errors) = handler(Qos::AtMostOnce, Some(503));
        assert_eq!(handler.handle(record()).await, AckDecision::Acknowledge);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_client_error_is_committed() {
        let (handler, _, errors) = handler(Qos::AtLeastOnce, Some(400));
        assert_eq!(handler.handle(record()).await, AckDecision::Acknowledge);
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }
}
