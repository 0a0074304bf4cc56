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

mod common;

use std::sync::atomic::Ordering;

use bytes::Bytes;
use common::{fixture, Fixture};
use connector_core::{
    AckDecision, AdapterEvent, ConnectorConfiguration, ConnectorError, ConnectorType,
    ProtocolAdapter, Qos,
};
use connector_kafka::{KafkaAdapter, MAX_PROCESSING_ERRORS};

fn configuration() -> ConnectorConfiguration {
    ConnectorConfiguration::new("k1", "events", ConnectorType::Kafka)
        .with_property("bootstrapServers", "kafka:9092")
}

async fn connected(config: ConnectorConfiguration) -> (KafkaAdapter, Fixture) {
    let fx = fixture("k1");
    let adapter = KafkaAdapter::new(fx.kafka.clone());
    adapter.connect(&config, fx.context.clone()).await.unwrap();
    (adapter, fx)
}

#[tokio::test]
async fn test_connect_passes_configuration() {
    let (adapter, fx) = connected(configuration().with_property("groupId", "plant")).await;
    assert!(adapter.is_connected());
    let config = fx.kafka.config.lock().clone().unwrap();
    assert_eq!(config.bootstrap_servers, "kafka:9092");
    assert_eq!(config.group_id, "plant");
}

#[tokio::test]
async fn test_connect_failure_is_connection_error() {
    let fx = fixture("k1");
    fx.kafka.fail_connect.store(true, Ordering::SeqCst);
    let adapter = KafkaAdapter::new(fx.kafka.clone());
    let err = adapter.connect(&configuration(), fx.context.clone()).await.unwrap_err();
    assert_eq!(err.class_name(), "ConnectionError");
    assert!(err.status_message().contains("invalid bootstrap.servers"));
    assert!(!adapter.is_connected());
}

#[tokio::test]
async fn test_unreachable_brokers_fail_connect() {
    let fx = fixture("k1");
    fx.kafka.backend.unreachable.store(true, Ordering::SeqCst);
    let adapter = KafkaAdapter::new(fx.kafka.clone());
    let err = adapter.connect(&configuration(), fx.context.clone()).await.unwrap_err();
    assert_eq!(err.class_name(), "ConnectionError");
    assert!(fx.kafka.backend.closed.load(Ordering::SeqCst));
    assert!(!adapter.is_connected());
}

#[tokio::test]
async fn test_capabilities_exclude_wildcards() {
    let adapter = KafkaAdapter::new(fixture("k1").kafka);
    let capabilities = adapter.capabilities();
    assert_eq!(capabilities.supported_qos, vec![Qos::AtMostOnce]);
    assert!(!capabilities.wildcards_inbound);
    assert!(!capabilities.wildcards_outbound);
}

#[tokio::test]
async fn test_one_consumer_per_topic() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    adapter.subscribe("alarms", Qos::AtMostOnce).await.unwrap();

    let consumers = fx.kafka.backend.consumers();
    assert_eq!(consumers.len(), 2);
    assert_eq!(consumers[0].spec.topic, "measurements");
    assert_eq!(consumers[1].spec.topic, "alarms");
    assert_eq!(consumers[0].spec.properties["group.id"], "dynamic-mapper-k1");
    assert!(consumers[0].spec.manual_commit());
    assert_eq!(adapter.consumer_topics().await, vec!["alarms", "measurements"]);
}

#[tokio::test]
async fn test_subscribe_failure_is_reported() {
    let (adapter, fx) = connected(configuration()).await;
    fx.kafka.backend.fail_subscribe.store(true, Ordering::SeqCst);
    let err = adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap_err();
    assert_eq!(err.class_name(), "SubscriptionError");
    assert!(adapter.consumer_topics().await.is_empty());
}

#[tokio::test]
async fn test_unsubscribe_closes_consumer() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    adapter.unsubscribe("measurements").await.unwrap();
    assert!(fx.kafka.backend.open_consumers().is_empty());
    adapter.unsubscribe("measurements").await.unwrap();
}

#[tokio::test]
async fn test_operations_require_connection() {
    let adapter = KafkaAdapter::new(fixture("k1").kafka);
    assert!(matches!(
        adapter.subscribe("measurements", Qos::AtMostOnce).await,
        Err(ConnectorError::NotConnected)
    ));
    assert!(matches!(
        adapter.unsubscribe("measurements").await,
        Err(ConnectorError::NotConnected)
    ));
    assert!(matches!(
        adapter
            .publish("measurements", Bytes::from_static(b"{}"), Qos::AtMostOnce, false)
            .await,
        Err(ConnectorError::NotConnected)
    ));
}

#[tokio::test]
async fn test_processed_record_commits_offset() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    let consumer = fx.kafka.backend.consumers()[0].clone();

    let decision = consumer.deliver(7, Some("device-1"), b"{\"t\":20}").await;
    assert_eq!(decision, AckDecision::Acknowledge);
    assert_eq!(consumer.committed(), vec![8]);

    let messages = fx.gateway.messages.lock().clone();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].topic, "measurements");
    assert_eq!(messages[0].key.as_deref(), Some("device-1"));
    assert_eq!(messages[0].tenant, common::TENANT);
}

#[tokio::test]
async fn test_server_error_leaves_offset_uncommitted() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    *fx.gateway.http_status.lock() = Some(502);
    let consumer = fx.kafka.backend.consumers()[0].clone();

    assert!(matches!(
        consumer.deliver(3, None, b"{}").await,
        AckDecision::Withhold(_)
    ));
    assert!(consumer.committed().is_empty());
}

#[tokio::test]
async fn test_qos0_mapping_commits_despite_server_error() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    *fx.gateway.http_status.lock() = Some(502);
    *fx.gateway.consolidated_qos.lock() = Qos::AtMostOnce;
    let consumer = fx.kafka.backend.consumers()[0].clone();

    assert_eq!(consumer.deliver(3, None, b"{}").await, AckDecision::Acknowledge);
    assert_eq!(consumer.committed(), vec![4]);
}

#[tokio::test]
async fn test_auto_commit_skips_manual_commits() {
    let config = configuration().with_property(
        "defaultPropertiesConsumer",
        serde_json::json!({"enable.auto.commit": "true"}),
    );
    let (adapter, fx) = connected(config).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    let consumer = fx.kafka.backend.consumers()[0].clone();

    assert_eq!(consumer.deliver(1, None, b"{}").await, AckDecision::Acknowledge);
    assert!(consumer.committed().is_empty());
}

#[tokio::test]
async fn test_publish_waits_for_delivery() {
    let (adapter, fx) = connected(configuration()).await;
    adapter
        .publish("commands", Bytes::from_static(b"{\"on\":true}"), Qos::AtLeastOnce, false)
        .await
        .unwrap();
    let sent = fx.kafka.backend.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].topic, "commands");
    assert_eq!(sent[0].key, None);
    assert_eq!(sent[0].payload, Bytes::from_static(b"{\"on\":true}"));
}

#[tokio::test]
async fn test_publish_failure_is_publish_error() {
    let (adapter, fx) = connected(configuration()).await;
    fx.kafka.backend.fail_sends.store(true, Ordering::SeqCst);
    let err = adapter
        .publish("commands", Bytes::from_static(b"{}"), Qos::AtMostOnce, false)
        .await
        .unwrap_err();
    assert_eq!(err.class_name(), "PublishError");
}

#[tokio::test]
async fn test_health_restarts_stopped_consumer() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    let first = fx.kafka.backend.consumers()[0].clone();
    first.connected.store(false, Ordering::SeqCst);

    adapter.monitor_health().await.unwrap();
    assert!(first.closed.load(Ordering::SeqCst));
    let open = fx.kafka.backend.open_consumers();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].spec.topic, "measurements");
}

#[tokio::test]
async fn test_health_restarts_consumer_after_repeated_processing_errors() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    *fx.gateway.http_status.lock() = Some(500);
    let first = fx.kafka.backend.consumers()[0].clone();

    for offset in 0..i64::from(MAX_PROCESSING_ERRORS) {
        first.deliver(offset, None, b"{}").await;
    }
    adapter.monitor_health().await.unwrap();
    assert!(!first.closed.load(Ordering::SeqCst));

    first.deliver(99, None, b"{}").await;
    adapter.monitor_health().await.unwrap();
    assert!(first.closed.load(Ordering::SeqCst));
    assert_eq!(fx.kafka.backend.open_consumers().len(), 1);
}

#[tokio::test]
async fn test_failed_restart_is_retried() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    let first = fx.kafka.backend.consumers()[0].clone();
    first.connected.store(false, Ordering::SeqCst);
    fx.kafka.backend.fail_subscribe.store(true, Ordering::SeqCst);

    assert!(adapter.monitor_health().await.is_err());
    assert_eq!(adapter.consumer_topics().await, vec!["measurements"]);

    fx.kafka.backend.fail_subscribe.store(false, Ordering::SeqCst);
    adapter.monitor_health().await.unwrap();
    assert!(first.closed.load(Ordering::SeqCst));
    assert_eq!(fx.kafka.backend.open_consumers().len(), 1);
}

#[tokio::test]
async fn test_unreachable_brokers_report_connection_lost() {
    let (adapter, mut fx) = connected(configuration()).await;
    fx.kafka.backend.unreachable.store(true, Ordering::SeqCst);
    adapter.monitor_health().await.unwrap();
    assert!(!adapter.is_connected());
    assert!(matches!(
        fx.events.try_recv(),
        Ok(AdapterEvent::ConnectionLost { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_closes_consumers_and_producer() {
    let (adapter, fx) = connected(configuration()).await;
    adapter.subscribe("measurements", Qos::AtMostOnce).await.unwrap();
    adapter.subscribe("alarms", Qos::AtMostOnce).await.unwrap();
    adapter.disconnect().await.unwrap();
    assert!(!adapter.is_connected());
    assert!(fx.kafka.backend.open_consumers().is_empty());
    assert!(fx.kafka.backend.closed.load(Ordering::SeqCst));
    assert!(adapter.consumer_topics().await.is_empty());
}
