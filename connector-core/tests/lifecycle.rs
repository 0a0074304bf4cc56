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
use std::time::Duration;

use bytes::Bytes;
use connector_core::{
    ConnectorError, ConnectorStatus, LifecycleSettings, MappingRecord, OperationOutcome, Qos,
};

use common::{eventually, harness, harness_with, settings, Call, CONNECTOR, TENANT};

#[tokio::test(start_paused = true)]
async fn test_disabled_connector_stays_configured() {
    let h = harness();
    h.configs
        .update_connector(TENANT, CONNECTOR, |c| c.enabled = false);

    let outcome = h.connector.connect().wait().await;

    assert_eq!(outcome, OperationOutcome::Completed);
    assert_eq!(h.connector.status().status, ConnectorStatus::Configured);
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 0);
    assert!(h
        .events
        .statuses()
        .iter()
        .all(|e| e.status != ConnectorStatus::Connecting));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_configuration_stays_configured() {
    let h = harness();
    h.configs.update_connector(TENANT, CONNECTOR, |c| {
        c.properties.remove("host");
    });

    let outcome = h.connector.connect().wait().await;

    assert_eq!(outcome, OperationOutcome::Completed);
    assert_eq!(h.connector.status().status, ConnectorStatus::Configured);
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shared_topic_subscribes_once_at_strongest_qos() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m0", "t1", Qos::AtMostOnce));
    h.deploy(MappingRecord::inbound("m1", "t1", Qos::AtLeastOnce));
    h.deploy(MappingRecord::inbound("m2", "t1", Qos::ExactlyOnce));

    assert_eq!(h.connector.connect().wait().await, OperationOutcome::Completed);

    assert_eq!(h.connector.status().status, ConnectorStatus::Connected);
    assert_eq!(
        h.adapter.subscribes(),
        vec![("t1".to_string(), Qos::ExactlyOnce)]
    );
    assert_eq!(h.connector.refcount("t1"), 3);

    let deactivated = MappingRecord::inbound("m2", "t1", Qos::ExactlyOnce).with_active(false);
    assert!(h.connector.update_inbound_mapping(&deactivated, true).await);

    assert_eq!(h.connector.refcount("t1"), 2);
    assert!(h.adapter.unsubscribes().is_empty());
    assert!(!h.connector.is_mapping_inbound_effective("m2"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_then_fails_with_error_chain() {
    let h = harness();
    h.adapter.fail_connects.store(10, Ordering::SeqCst);

    let outcome = h.connector.connect().wait().await;

    assert!(matches!(outcome, OperationOutcome::Failed(_)));
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 3);
    let status = h.connector.status();
    assert_eq!(status.status, ConnectorStatus::Failed);
    assert_eq!(status.message, " --- ConnectionError: refused");
}

#[tokio::test(start_paused = true)]
async fn test_connect_recovers_on_retry() {
    let h = harness();
    h.adapter.fail_connects.store(1, Ordering::SeqCst);

    let outcome = h.connector.connect().wait().await;

    assert_eq!(outcome, OperationOutcome::Completed);
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 2);
    assert!(h.connector.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connect_requests_share_one_operation() {
    let h = harness();
    *h.adapter.connect_delay.lock() = Duration::from_secs(5);

    let first = h.connector.connect();
    let second = h.connector.connect();

    assert_eq!(first.wait().await, OperationOutcome::Completed);
    assert_eq!(second.wait().await, OperationOutcome::Completed);
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_always_ends_disconnected() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "a/b", Qos::AtLeastOnce));
    h.deploy(MappingRecord::inbound("m2", "c/d", Qos::AtLeastOnce));
    h.connector.connect().wait().await;
    h.adapter.fail_disconnect.store(true, Ordering::SeqCst);

    let outcome = h.connector.disconnect().wait().await;

    assert_eq!(outcome, OperationOutcome::Completed);
    let mut unsubscribed = h.adapter.unsubscribes();
    unsubscribed.sort();
    assert_eq!(unsubscribed, vec!["a/b".to_string(), "c/d".to_string()]);
    assert!(h.adapter.calls().contains(&Call::Disconnect));
    assert_eq!(h.connector.status().status, ConnectorStatus::Disconnected);
    assert!(!h.connector.is_connected());
    assert!(h.connector.tracked_topics().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_inflight_connect() {
    let h = harness();
    *h.adapter.connect_delay.lock() = Duration::from_secs(60);

    let connect = h.connector.connect();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let disconnect = h.connector.disconnect();

    assert_eq!(disconnect.wait().await, OperationOutcome::Completed);
    assert_eq!(connect.wait().await, OperationOutcome::Cancelled);
    assert_eq!(h.connector.status().status, ConnectorStatus::Disconnected);
    assert!(!h.adapter.connected.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_drop_triggers_delayed_reconnect() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "a/b", Qos::AtLeastOnce));
    h.connector.connect().wait().await;

    h.adapter.drop_connection();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 1);

    let adapter = h.adapter.clone();
    assert!(eventually(|| adapter.connect_calls.load(Ordering::SeqCst) == 2).await);
    let connector = h.connector.clone();
    assert!(eventually(|| connector.status().status == ConnectorStatus::Connected).await);
    assert_eq!(h.connector.refcount("a/b"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deliberate_disconnect_does_not_reconnect() {
    let h = harness();
    h.connector.connect().wait().await;
    h.connector.disconnect().wait().await;

    h.adapter.drop_connection();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.connector.status().status, ConnectorStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_cycles_are_bounded() {
    let h = harness_with(
        LifecycleSettings::builder()
            .reconnect_delay(Duration::from_secs(5))
            .max_reconnect_cycles(Some(1))
            .build(),
    );
    h.connector.connect().wait().await;

    h.adapter.drop_connection();
    let adapter = h.adapter.clone();
    assert!(eventually(|| adapter.connect_calls.load(Ordering::SeqCst) == 2).await);
    let connector = h.connector.clone();
    assert!(eventually(|| connector.is_connected()).await);

    h.adapter.drop_connection();
    let connector = h.connector.clone();
    assert!(eventually(|| connector.status().status == ConnectorStatus::Failed).await);
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 2);
    assert!(h.connector.status().message.contains("giving up"));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_runs_disconnect_initialize_connect() {
    let h = harness();
    h.connector.connect().wait().await;

    let handle = h.connector.reconnect().await;

    let handle = handle.expect("connect should be started");
    assert_eq!(handle.wait().await, OperationOutcome::Completed);
    assert!(h.adapter.calls().contains(&Call::Disconnect));
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 2);
    assert!(h.connector.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_stops_when_initialize_fails() {
    let h = harness();
    h.connector.connect().wait().await;
    h.adapter.fail_initialize.store(true, Ordering::SeqCst);

    assert!(h.connector.reconnect().await.is_none());
    assert_eq!(h.adapter.connect_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.connector.status().status, ConnectorStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_failure_is_fatal() {
    let h = harness();
    h.adapter.fail_initialize.store(true, Ordering::SeqCst);

    let outcome = h.connector.initialize().wait().await;

    assert!(matches!(outcome, OperationOutcome::Failed(_)));
    let status = h.connector.status();
    assert_eq!(status.status, ConnectorStatus::Failed);
    assert!(status.message.starts_with(" --- InitializationError: certificate not found"));
}

#[tokio::test(start_paused = true)]
async fn test_initialize_marks_configured() {
    let h = harness();
    assert_eq!(h.connector.status().status, ConnectorStatus::Unknown);

    h.connector.initialize().wait().await;

    assert_eq!(h.connector.status().status, ConnectorStatus::Configured);
}

#[tokio::test(start_paused = true)]
async fn test_housekeeping_survives_failing_health_check() {
    let h = harness();
    h.adapter.fail_health.store(true, Ordering::SeqCst);
    h.connector.initialize().wait().await;
    h.connector.start_housekeeping();

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(h.adapter.health_calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.adapter.health_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.catalog.flush_count(), 2);
    h.connector.stop_housekeeping();
}

#[tokio::test(start_paused = true)]
async fn test_housekeeping_returns_disconnected_to_configured() {
    let h = harness_with(settings());
    h.connector.connect().wait().await;
    h.connector.disconnect().wait().await;
    h.connector.start_housekeeping();

    tokio::time::sleep(Duration::from_secs(31)).await;

    assert_eq!(h.connector.status().status, ConnectorStatus::Configured);
    h.connector.stop_housekeeping();
}

#[tokio::test(start_paused = true)]
async fn test_wildcard_mapping_skipped_when_unsupported() {
    let h = harness();
    h.configs.update_connector(TENANT, CONNECTOR, |c| {
        c.properties
            .insert("supportsWildcardInTopicInbound".into(), false.into());
    });
    h.deploy(MappingRecord::inbound("wild", "a/+", Qos::AtLeastOnce));
    h.deploy(MappingRecord::inbound("plain", "a/b", Qos::AtLeastOnce));

    h.connector.connect().wait().await;

    assert_eq!(h.adapter.subscribes(), vec![("a/b".to_string(), Qos::AtLeastOnce)]);
    assert!(!h.connector.is_mapping_inbound_effective("wild"));
    let wild = MappingRecord::inbound("wild", "a/+", Qos::AtLeastOnce);
    assert!(!h.connector.update_inbound_mapping(&wild, false).await);

    let deactivated = MappingRecord::inbound("wild", "a/+", Qos::AtLeastOnce).with_active(false);
    assert!(h.connector.update_inbound_mapping(&deactivated, true).await);
}

#[tokio::test(start_paused = true)]
async fn test_undeployed_mapping_is_not_subscribed() {
    let h = harness();
    h.catalog
        .upsert(TENANT, MappingRecord::inbound("elsewhere", "x/y", Qos::AtLeastOnce));

    h.connector.connect().wait().await;

    assert!(h.adapter.subscribes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_mapping_topic_change_moves_subscription() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "old/topic", Qos::AtLeastOnce));
    h.connector.connect().wait().await;

    let moved = MappingRecord::inbound("m1", "new/topic", Qos::AtLeastOnce);
    assert!(h.connector.update_inbound_mapping(&moved, false).await);

    assert_eq!(h.adapter.unsubscribes(), vec!["old/topic".to_string()]);
    assert_eq!(h.connector.refcount("new/topic"), 1);
    assert_eq!(h.connector.refcount("old/topic"), 0);

    assert!(h.connector.delete_mapping(&moved).await);
    assert_eq!(h.connector.refcount("new/topic"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_outbound_mappings_follow_resync() {
    let h = harness();
    h.deploy(MappingRecord::outbound("o1", "cmd/device", Qos::AtLeastOnce));
    h.deploy(MappingRecord::outbound("o2", "cmd/+", Qos::AtLeastOnce));

    h.connector.connect().wait().await;

    assert!(h.connector.is_mapping_outbound_effective("o1"));
    assert!(!h.connector.is_mapping_outbound_effective("o2"));
    assert_eq!(h.connector.effective_outbound_mappings().len(), 1);

    let inactive = MappingRecord::outbound("o1", "cmd/device", Qos::AtLeastOnce).with_active(false);
    assert!(h.connector.update_outbound_mapping(&inactive).await);
    assert!(!h.connector.is_mapping_outbound_effective("o1"));
}

#[tokio::test(start_paused = true)]
async fn test_resync_unsubscribes_removed_topics() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "old", Qos::AtLeastOnce));
    h.deploy(MappingRecord::inbound("m2", "kept", Qos::AtLeastOnce));
    h.connector.connect().wait().await;
    assert_eq!(h.adapter.subscribes().len(), 2);

    h.catalog.remove(TENANT, "m1");
    let report = h.connector.resync_mappings().await;

    assert_eq!(report.unsubscribed, vec!["old".to_string()]);
    assert!(report.subscribed.is_empty());
    assert_eq!(h.adapter.unsubscribes(), vec!["old".to_string()]);
    assert_eq!(h.adapter.subscribes().len(), 2);
    assert_eq!(h.connector.tracked_topics(), vec!["kept".to_string()]);

    // Disconnect still knows about the remaining subscription.
    h.connector.disconnect().wait().await;
    assert_eq!(
        h.adapter.unsubscribes(),
        vec!["old".to_string(), "kept".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_resync_with_unchanged_mappings_issues_no_calls() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "kept", Qos::AtLeastOnce));
    h.connector.connect().wait().await;
    let before = h.adapter.calls().len();

    let report = h.connector.resync_mappings().await;

    assert!(report.is_noop());
    assert_eq!(report.active_topics, 1);
    assert_eq!(h.adapter.calls().len(), before);
    assert_eq!(h.connector.refcount("kept"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_resubscribes_every_topic() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "a/b", Qos::AtLeastOnce));
    h.connector.connect().wait().await;

    h.connector.disconnect().wait().await;
    h.connector.connect().wait().await;

    assert_eq!(
        h.adapter.subscribes(),
        vec![
            ("a/b".to_string(), Qos::AtLeastOnce),
            ("a/b".to_string(), Qos::AtLeastOnce)
        ]
    );
    assert_eq!(h.connector.refcount("a/b"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_publish_requires_connection() {
    let h = harness();
    let err = h
        .connector
        .publish("cmd/1", Bytes::from_static(b"{}"), Qos::AtLeastOnce, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::NotConnected));

    h.connector.connect().wait().await;
    h.connector
        .publish("cmd/1", Bytes::from_static(b"{}"), Qos::ExactlyOnce, false)
        .await
        .unwrap();
    assert!(h
        .adapter
        .calls()
        .contains(&Call::Publish("cmd/1".into(), Qos::ExactlyOnce)));
}

#[tokio::test(start_paused = true)]
async fn test_subscription_audit_events_emitted() {
    let h = harness();
    h.deploy(MappingRecord::inbound("m1", "a/b", Qos::AtLeastOnce));
    h.connector.connect().wait().await;
    h.connector.disconnect().wait().await;

    let actions: Vec<String> = h
        .events
        .subscriptions()
        .iter()
        .map(|e| format!("{:?}:{}", e.action, e.topic))
        .collect();
    assert_eq!(actions, vec!["Subscribe:a/b", "Unsubscribe:a/b"]);
}

#[tokio::test(start_paused = true)]
async fn test_status_events_follow_transitions() {
    let h = harness();
    h.connector.connect().wait().await;

    let statuses: Vec<ConnectorStatus> = h.events.statuses().iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![ConnectorStatus::Connecting, ConnectorStatus::Connected]
    );
}
