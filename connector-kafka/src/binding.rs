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

//! Backend implementation on rdkafka.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::AckDecision;
use log::{debug, info, warn};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{Message, Offset, TopicPartitionList};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::backend::{
    ConsumerSpec, Delivery, InboundRecord, KafkaBackend, KafkaClientError, KafkaConnect,
    KafkaConsumer, OutboundRecord, RecordHandler, MAX_CONSECUTIVE_POLL_FAILURES,
    POLL_RETRY_DELAY,
};
use crate::config::KafkaConnectorConfig;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Creates rdkafka clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct RdKafkaConnector;

fn client_config(properties: &BTreeMap<String, String>) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in properties {
        config.set(key.as_str(), value.as_str());
    }
    config
}

#[async_trait]
impl KafkaConnect for RdKafkaConnector {
    async fn connect(
        &self,
        config: &KafkaConnectorConfig,
    ) -> Result<Arc<dyn KafkaBackend>, KafkaClientError> {
        let producer: FutureProducer = client_config(&config.producer_client_properties())
            .create()
            .map_err(KafkaClientError::new)?;
        info!("Kafka producer created for {}", config.bootstrap_servers);
        Ok(Arc::new(RdKafkaBackend {
            producer,
            closed: AtomicBool::new(false),
        }))
    }
}

struct RdKafkaBackend {
    producer: FutureProducer,
    closed: AtomicBool,
}

#[async_trait]
impl KafkaBackend for RdKafkaBackend {
    async fn subscribe(
        &self,
        spec: ConsumerSpec,
        handler: Arc<dyn RecordHandler>,
    ) -> Result<Box<dyn KafkaConsumer>, KafkaClientError> {
        let consumer: StreamConsumer = client_config(&spec.properties)
            .create()
            .map_err(KafkaClientError::new)?;
        consumer
            .subscribe(&[spec.topic.as_str()])
            .map_err(KafkaClientError::new)?;

        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(consume(
            consumer,
            handler,
            spec.manual_commit(),
            spec.topic,
            alive.clone(),
            shutdown_rx,
        ));
        Ok(Box::new(ConsumerHandle {
            alive,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        }))
    }

    async fn send(
        &self,
        record: OutboundRecord,
        timeout: Duration,
    ) -> Result<Delivery, KafkaClientError> {
        let mut future_record =
            FutureRecord::<str, [u8]>::to(&record.topic).payload(record.payload.as_ref());
        if let Some(key) = &record.key {
            future_record = future_record.key(key.as_str());
        }
        match tokio::time::timeout(timeout, self.producer.send(future_record, timeout)).await {
            Ok(Ok((partition, offset))) => Ok(Delivery { partition, offset }),
            Ok(Err((e, _))) => Err(KafkaClientError::new(e)),
            Err(_) => Err(KafkaClientError::new(format!(
                "delivery not confirmed within {timeout:?}"
            ))),
        }
    }

    async fn check_connectivity(&self, timeout: Duration) -> Result<(), KafkaClientError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || {
            producer.client().fetch_metadata(None, timeout).map(|_| ())
        })
        .await
        .map_err(KafkaClientError::new)?
        .map_err(KafkaClientError::new)
    }

    async fn close(&self) -> Result<(), KafkaClientError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT))
            .await
            .map_err(KafkaClientError::new)?
            .map_err(KafkaClientError::new)
    }
}

fn inbound(message: &BorrowedMessage<'_>) -> InboundRecord {
    InboundRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned()),
        payload: Bytes::copy_from_slice(message.payload().unwrap_or_default()),
    }
}

/// Commits the offset after `record`.
fn commit(consumer: &StreamConsumer, record: &InboundRecord) -> Result<(), KafkaClientError> {
    let mut offsets = TopicPartitionList::new();
    offsets
        .add_partition_offset(&record.topic, record.partition, Offset::Offset(record.offset + 1))
        .map_err(KafkaClientError::new)?;
    consumer
        .commit(&offsets, CommitMode::Async)
        .map_err(KafkaClientError::new)
}

async fn consume(
    consumer: StreamConsumer,
    handler: Arc<dyn RecordHandler>,
    manual_commit: bool,
    topic: String,
    alive: Arc<AtomicBool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("Consumer for [{topic}] started");
    let mut failures = 0;
    loop {
        let next = tokio::select! {
            _ = &mut shutdown_rx => break,
            next = consumer.recv() => next.map(|message| inbound(&message)),
        };
        let record = match next {
            Ok(record) => {
                failures = 0;
                record
            }
            Err(e) => {
                failures += 1;
                warn!("Polling [{topic}] failed ({failures}/{MAX_CONSECUTIVE_POLL_FAILURES}): {e}");
                if failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                    break;
                }
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                }
            }
        };

        let decision = handler.handle(record.clone()).await;
        if manual_commit && decision == AckDecision::Acknowledge {
            if let Err(e) = commit(&consumer, &record) {
                warn!("Committing offset {} on [{topic}] failed: {e}", record.offset);
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("Consumer for [{topic}] stopped");
}

struct ConsumerHandle {
    alive: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl KafkaConsumer for ConsumerHandle {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), KafkaClientError> {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.lock().await.take() {
            task.await.map_err(KafkaClientError::new)?;
        }
        Ok(())
    }
}
