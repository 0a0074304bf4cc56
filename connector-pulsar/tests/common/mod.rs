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

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
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
use connector_pulsar::backend::{
    ConsumerSpec, InboundMessage, MessageHandler, OutboundMessage, PulsarBackend,
    PulsarClientError, PulsarConnect, PulsarConsumer, PulsarProducer,
};
use connector_pulsar::ClientOptions;

pub const TENANT: &str = "t1";

/// Consumer created by the fake client. Tests push messages through it.
pub struct FakeConsumer {
    pub spec: ConsumerSpec,
    pub handler: Arc<dyn MessageHandler>,
    pub connected: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeConsumer {
    pub async fn deliver(
        &self,
        properties: &[(&str, &str)],
        payload: &'static [u8],
    ) -> AckDecision {
        let message = InboundMessage {
            topic: self.spec.selector.as_str().to_string(),
            key: None,
            payload: Bytes::from_static(payload),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.handler.handle(message).await
    }
}

struct ConsumerRef(Arc<FakeConsumer>);

#[async_trait]
impl PulsarConsumer for ConsumerRef {
    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), PulsarClientError> {
        self.0.closed.store(true, Ordering::SeqCst);
        self.0.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeProducer {
    pub topic: String,
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub connected: AtomicBool,
    pub fail_sends: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeProducer {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }
}

struct ProducerRef(Arc<FakeProducer>);

#[async_trait]
impl PulsarProducer for ProducerRef {
    fn is_connected(&self) -> bool {
        self.0.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), PulsarClientError> {
        if self.0.fail_sends.load(Ordering::SeqCst) {
            return Err(PulsarClientError::new("producer is fenced"));
        }
        self.0.sent.lock().push(message);
        Ok(())
    }

    async fn close(&self) -> Result<(), PulsarClientError> {
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory Pulsar client. One instance is handed out on every connect.
#[derive(Default)]
pub struct FakeBackend {
    pub consumers: Mutex<Vec<Arc<FakeConsumer>>>,
    pub producers: Mutex<Vec<Arc<FakeProducer>>>,
    pub producer_attempts: AtomicU32,
    pub fail_producer_creates: AtomicU32,
    pub fail_subscribe: AtomicBool,
    /// New consumers start disconnected.
    pub dead_consumers: AtomicBool,
    pub closed: AtomicBool,
}

impl FakeBackend {
    pub fn consumers(&self) -> Vec<Arc<FakeConsumer>> {
        self.consumers.lock().clone()
    }

    pub fn producers(&self) -> Vec<Arc<FakeProducer>> {
        self.producers.lock().clone()
    }

    pub fn open_consumers(&self) -> Vec<Arc<FakeConsumer>> {
        self.consumers()
            .into_iter()
            .filter(|c| !c.closed.load(Ordering::SeqCst))
            .collect()
    }
}

#[async_trait]
impl PulsarBackend for FakeBackend {
    async fn subscribe(
        &self,
        spec: ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn PulsarConsumer>, PulsarClientError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(PulsarClientError::new("topic not found"));
        }
        let consumer = Arc::new(FakeConsumer {
            spec,
            handler,
            connected: AtomicBool::new(!self.dead_consumers.load(Ordering::SeqCst)),
            closed: AtomicBool::new(false),
        });
        self.consumers.lock().push(consumer.clone());
        Ok(Box::new(ConsumerRef(consumer)))
    }

    async fn create_producer(
        &self,
        topic: &str,
    ) -> Result<Arc<dyn PulsarProducer>, PulsarClientError> {
        self.producer_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_producer_creates.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_producer_creates.store(remaining - 1, Ordering::SeqCst);
            return Err(PulsarClientError::new("producer busy"));
        }
        let producer = Arc::new(FakeProducer {
            topic: topic.to_string(),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.producers.lock().push(producer.clone());
        Ok(Arc::new(ProducerRef(producer)))
    }

    async fn close(&self) -> Result<(), PulsarClientError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakePulsar {
    pub backend: Arc<FakeBackend>,
    pub fail_connect: AtomicBool,
    pub options: Mutex<Option<ClientOptions>>,
}

#[async_trait]
impl PulsarConnect for FakePulsar {
    async fn connect(
        &self,
        options: &ClientOptions,
    ) -> Result<Arc<dyn PulsarBackend>, PulsarClientError> {
        *self.options.lock() = Some(options.clone());
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(PulsarClientError::new("connection refused"));
        }
        self.backend.closed.store(false, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

/// Gateway that records every message and answers with a fixed result.
#[derive(Default)]
pub struct RecordingGateway {
    pub messages: Mutex<Vec<ConnectorMessage>>,
    pub http_status: Mutex<Option<u16>>,
}

impl RecordingGateway {
    pub fn topics(&self) -> Vec<String> {
        self.messages.lock().iter().map(|m| m.topic.clone()).collect()
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
            consolidated_qos: Qos::ExactlyOnce,
            max_processing_time: Some(Duration::from_secs(5)),
            results: Box::pin(async move { Ok(results) }),
        }
    }
}

pub struct Fixture {
    pub pulsar: Arc<FakePulsar>,
    pub gateway: Arc<RecordingGateway>,
    pub context: AdapterContext,
    pub events: mpsc::UnboundedReceiver<AdapterEvent>,
}

pub fn fixture(identifier: &str, connector_type: ConnectorType) -> Fixture {
    let gateway = Arc::new(RecordingGateway::default());
    let (tx, events) = mpsc::unbounded_channel();
    let identity = ConnectorIdentity::new(TENANT, identifier, "events", connector_type);
    let context = AdapterContext::new(
        identity,
        gateway.clone(),
        ServiceConfiguration::default(),
        tx,
    );
    Fixture {
        pulsar: Arc::new(FakePulsar::default()),
        gateway,
        context,
        events,
    }
}
