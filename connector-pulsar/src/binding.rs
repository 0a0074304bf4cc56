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

//! Backend implementation on the pulsar-rs client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::AckDecision;
use futures::TryStreamExt;
use log::{debug, info, warn};
use pulsar::consumer::Message;
use pulsar::{
    producer, Authentication, ConnectionRetryOptions, Consumer, OperationRetryOptions, Producer,
    Pulsar, SubType, TokioExecutor,
};
use regex::Regex;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::backend::{
    ConsumerSpec, InboundMessage, MessageHandler, OutboundMessage, PulsarBackend,
    PulsarClientError, PulsarConnect, PulsarConsumer, PulsarProducer,
};
use crate::config::{ClientOptions, SubscriptionType};
use crate::topic::TopicSelector;

/// Creates pulsar-rs clients.
#[derive(Debug, Default, Clone, Copy)]
pub struct PulsarRsConnector;

#[async_trait]
impl PulsarConnect for PulsarRsConnector {
    async fn connect(
        &self,
        options: &ClientOptions,
    ) -> Result<Arc<dyn PulsarBackend>, PulsarClientError> {
        let mut builder = Pulsar::builder(options.service_url.as_str(), TokioExecutor)
            .with_connection_retry_options(ConnectionRetryOptions {
                connection_timeout: options.connection_timeout,
                keep_alive: options.keep_alive,
                ..Default::default()
            })
            .with_operation_retry_options(OperationRetryOptions {
                operation_timeout: options.operation_timeout,
                ..Default::default()
            });
        if let Some(auth) = &options.auth {
            builder = builder.with_auth(Authentication {
                name: auth.method.clone(),
                data: auth.params.clone().into_bytes(),
            });
        }
        let pulsar = builder.build().await.map_err(PulsarClientError::new)?;
        info!("Pulsar client created for {}", options.service_url);
        Ok(Arc::new(PulsarRsBackend {
            pulsar,
            closed: AtomicBool::new(false),
        }))
    }
}

struct PulsarRsBackend {
    pulsar: Pulsar<TokioExecutor>,
    closed: AtomicBool,
}

fn sub_type(subscription_type: SubscriptionType) -> SubType {
    match subscription_type {
        SubscriptionType::Exclusive => SubType::Exclusive,
        SubscriptionType::Shared => SubType::Shared,
        SubscriptionType::Failover => SubType::Failover,
        SubscriptionType::KeyShared => SubType::KeyShared,
    }
}

/// `tenant/namespace` of a `persistent://tenant/namespace/...` pattern.
fn lookup_namespace(pattern: &str) -> Option<String> {
    let path = pattern.split_once("://").map_or(pattern, |(_, rest)| rest);
    let mut parts = path.splitn(3, '/');
    match (parts.next(), parts.next()) {
        (Some(tenant), Some(namespace)) => Some(format!("{tenant}/{namespace}")),
        _ => None,
    }
}

#[async_trait]
impl PulsarBackend for PulsarRsBackend {
    async fn subscribe(
        &self,
        spec: ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Box<dyn PulsarConsumer>, PulsarClientError> {
        let mut builder = self
            .pulsar
            .consumer()
            .with_subscription_type(sub_type(spec.subscription_type))
            .with_subscription(&spec.subscription_name);
        builder = match &spec.selector {
            TopicSelector::Topic(topic) => builder.with_topic(topic),
            TopicSelector::Pattern(pattern) => {
                let regex = Regex::new(pattern).map_err(PulsarClientError::new)?;
                let builder = builder.with_topic_regex(regex);
                match lookup_namespace(pattern) {
                    Some(namespace) => builder.with_lookup_namespace(namespace),
                    None => builder,
                }
            }
        };
        let consumer: Consumer<Vec<u8>, TokioExecutor> =
            builder.build().await.map_err(PulsarClientError::new)?;

        let alive = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(consume(
            consumer,
            handler,
            spec.selector.as_str().to_string(),
            alive.clone(),
            shutdown_rx,
        ));
        Ok(Box::new(ConsumerHandle {
            alive,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            task: Mutex::new(Some(task)),
        }))
    }

    async fn create_producer(
        &self,
        topic: &str,
    ) -> Result<Arc<dyn PulsarProducer>, PulsarClientError> {
        let producer = self
            .pulsar
            .producer()
            .with_topic(topic)
            .build()
            .await
            .map_err(PulsarClientError::new)?;
        Ok(Arc::new(ProducerHandle {
            producer: Mutex::new(producer),
            alive: AtomicBool::new(true),
        }))
    }

    async fn close(&self) -> Result<(), PulsarClientError> {
        // pulsar-rs closes its connections when the last client clone drops.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

fn inbound(message: &Message<Vec<u8>>) -> InboundMessage {
    InboundMessage {
        topic: message.topic.clone(),
        key: message.key(),
        payload: Bytes::from(message.payload.data.clone()),
        properties: message
            .metadata()
            .properties
            .iter()
            .map(|kv| (kv.key.clone(), kv.value.clone()))
            .collect(),
    }
}

async fn consume(
    mut consumer: Consumer<Vec<u8>, TokioExecutor>,
    handler: Arc<dyn MessageHandler>,
    topic: String,
    alive: Arc<AtomicBool>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("Consumer for [{topic}] started");
    loop {
        let next = tokio::select! {
            _ = &mut shutdown_rx => break,
            next = consumer.try_next() => next,
        };
        let message = match next {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!("Consumer stream for [{topic}] ended");
                break;
            }
            Err(e) => {
                warn!("Consumer for [{topic}] failed: {e}");
                break;
            }
        };
        let result = match handler.handle(inbound(&message)).await {
            AckDecision::Acknowledge => consumer.ack(&message).await,
            AckDecision::Withhold(_) => consumer.nack(&message).await,
        };
        if let Err(e) = result {
            warn!("Acknowledgment on [{topic}] failed: {e}");
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
impl PulsarConsumer for ConsumerHandle {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), PulsarClientError> {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.lock().await.take() {
            task.await.map_err(PulsarClientError::new)?;
        }
        Ok(())
    }
}

struct ProducerHandle {
    producer: Mutex<Producer<TokioExecutor>>,
    alive: AtomicBool,
}

impl ProducerHandle {
    fn failed(&self, e: impl std::fmt::Display) -> PulsarClientError {
        self.alive.store(false, Ordering::SeqCst);
        PulsarClientError::new(e)
    }
}

#[async_trait]
impl PulsarProducer for ProducerHandle {
    fn is_connected(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn send(&self, message: OutboundMessage) -> Result<(), PulsarClientError> {
        let message = producer::Message {
            payload: message.payload.to_vec(),
            properties: message.properties,
            partition_key: message.key,
            ..Default::default()
        };
        let receipt = self
            .producer
            .lock()
            .await
            .send_non_blocking(message)
            .await
            .map_err(|e| self.failed(e))?;
        receipt.await.map_err(|e| self.failed(e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PulsarClientError> {
        self.alive.store(false, Ordering::SeqCst);
        self.producer
            .lock()
            .await
            .close()
            .await
            .map_err(PulsarClientError::new)
    }
}
