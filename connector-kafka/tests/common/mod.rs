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

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use connector_core::{
    AckDecision, AdapterContext, AdapterEvent, ConnectorIdentity, ConnectorMessage, ConnectorType,
    DispatchOutcome, MessageDispatchGateway, ProcessingResult, Qos, ServiceConfiguration,
};
use connector_kafka::backend::{
    ConsumerSpec, Delivery, InboundRecord, KafkaBackend, KafkaClientError, KafkaConnect,
    KafkaConsumer, OutboundRecord, RecordHandler,
};
use connector_kafka::KafkaConnectorConfig;

pub const TENANT: &str = "t1";

/// Consumer created by the fake client. Tests push records through it and
/// read back the offsets it committed.
pub struct FakeConsumer {
    pub spec: ConsumerSpec,
    pub handler: Arc<dyn RecordHandler>,
    pub connected: AtomicBool,
    pub closed: AtomicBool,
    pub committed: Mutex<Vec<i64>>,
}

impl FakeConsumer {
    pub async fn deliver(
        &self,
        offset: i64,
        key: Option<&str>,
        payload: &'static [u8],
    ) -> AckDecision {
        let record = InboundRecord {
            topic: self.spec.topic.clone(),
            partition: 0,
            offset,
            key: key.map(str::to_string),
            payload: Bytes::from_static(payload),
        };
        let decision = self.handler.handle(record).await;
        if decision == AckDecision::Acknowledge && self.spec.manual_commit() {
            self.committed.lock().push(offset + 1);
        }
        decision
    }

    pub fn committed(&self) -> Vec<i64> {
        self.committed.lock().clone()
    }
}

struct ConsumerRef(Arc<FakeConsumer>);

#[async_trait]
impl KafkaConsumer for ConsumerRef {
    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), KafkaClientError> {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory Kafka client. One instance is handed out on every connect.
#[derive(Default)]
pub struct FakeBackend {
    pub consumers: Mutex<Vec<Arc<FakeConsumer>>>,
    pub sent: Mutex<Vec<OutboundRecord>>,
    pub next_offset: AtomicI64,
    pub fail_subscribe: AtomicBool,
    pub fail_sends: AtomicBool,
    pub unreachable: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeBackend {
    pub fn consumers(&self) -> Vec<Arc<FakeConsumer>> {
        self.consumers.lock().clone()
    }

    pub fn open_consumers(&self) -> Vec<Arc<FakeConsumer>> {
        self.consumers()
            .into_iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .collect()
    }

    pub fn sent(&self) -> Vec<OutboundRecord> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl KafkaBackend for FakeBackend {
    async fn subscribe(
        &self,
        spec: ConsumerSpec,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<Box<dyn KafkaConsumer>, KafkaClientError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(KafkaClientError::new("unknown topic or partition"));
        }
        let consumer = Arc::new(FakeConsumer {
            spec,
            handler,
            connected: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            committed: Mutex::new(Vec::new()),
        });
        self.consumers.lock().push(consumer.clone());
        Ok(Box::new(ConsumerRef(consumer)))
    }

    async fn send(
        &self,
        record: OutboundRecord,
        _timeout: Duration,
    ) -> Result<Delivery, KafkaClientError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(KafkaClientError::new("message timed out"));
        }
        self.sent.lock().push(record);
        Ok(Delivery {
            partition: 0,
            offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn check_connectivity(&self, _timeout: Duration) -> Result<(), KafkaClientError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(KafkaClientError::new("all brokers down"));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), KafkaClientError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeKafka {
    pub backend: Arc<FakeBackend>,
    pub fail_connect: AtomicBool,
    pub config: Mutex<Option<KafkaConnectorConfig>>,
}

#[async_trait]
impl KafkaConnect for FakeKafka {
    async fn connect(
        &self,
        config: &KafkaConnectorConfig,
    ) -> Result<Arc<dyn KafkaBackend>, KafkaClientError> {
        *self.config.lock() = Some(config.clone());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(KafkaClientError::new("invalid bootstrap.servers"));
        }
        self.backend.closed.store(false, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

/// Gateway that records every message and answers with a fixed result.
pub struct RecordingGateway {
    pub messages: Mutex<Vec<ConnectorMessage>>,
    pub http_status: Mutex<Option<u16>>,
    pub consolidated_qos: Mutex<Qos>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            http_status: Mutex::new(None),
            consolidated_qos: Mutex::new(Qos::AtLeastOnce),
        }
    }
}

impl MessageDispatchGateway for RecordingGateway {
    fn on_message(&self, message: ConnectorMessage) -> DispatchOutcome {
        self.messages.lock().push(message);
        let results = match *self.http_status.lock() {
            Some(status) => vec![ProcessingResult::failure("m1", "rejected", Some(status))],
            None => vec![ProcessingResult::success("m1")],
        };
        DispatchOutcome {
            consolidated_qos: *self.consolidated_qos.lock(),
            max_processing_time: Some(Duration::from_secs(5)),
            results: Box::pin(async move { Ok(results) }),
        }
    }
}

pub struct Fixture {
    pub kafka: Arc<FakeKafka>,
    pub gateway: Arc<RecordingGateway>,
    pub context: AdapterContext,
    pub events: mpsc::UnboundedReceiver<AdapterEvent>,
}

pub fn fixture(identifier: &str) -> Fixture {
    let gateway = Arc::new(RecordingGateway::default());
    let (tx, events) = mpsc::unbounded_channel();
    let identity = ConnectorIdentity::new(TENANT, identifier, "events", ConnectorType::Kafka);
    let context = AdapterContext::new(
        identity,
        gateway.clone(),
        ServiceConfiguration::default(),
        tx,
    );
    Fixture {
        kafka: Arc::new(FakeKafka::default()),
        gateway,
        context,
        events,
    }
}
