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

//! Pieces shared by the MQTT 3.1.1 and MQTT 5 sessions.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::adapter::AdapterContext;
use connector_core::{settle, AckDecision, ConnectorError, DispatchOutcome, Qos};
use log::{debug, warn};
use rumqttc::Transport;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{MqttConnectorConfig, MqttProtocol};

/// Time a closing session gets to flush its DISCONNECT before the event
/// loop is stopped.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Request capacity of the rumqttc client channel.
pub(crate) const REQUEST_CAPACITY: usize = 100;

/// A connected broker session of either protocol version.
#[async_trait]
pub(crate) trait MqttSession: Send + Sync {
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError>;

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError>;

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ConnectorError>;

    /// Sends DISCONNECT and stops the event loop.
    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Connection flags shared between a session and its event loop.
#[derive(Clone)]
pub(crate) struct LinkState {
    pub label: String,
    pub connected: Arc<AtomicBool>,
    pub closing: Arc<AtomicBool>,
    pub context: AdapterContext,
}

impl LinkState {
    pub fn new(connected: Arc<AtomicBool>, context: AdapterContext) -> Self {
        Self {
            label: context.identity.to_string(),
            connected,
            closing: Arc::new(AtomicBool::new(false)),
            context,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Reports a dropped connection unless the session is being closed.
    pub fn lost(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        if self.is_closing() {
            return;
        }
        let reason = reason.into();
        warn!("[{}] MQTT connection lost: {reason}", self.label);
        self.context.connection_lost(reason);
    }
}

/// The spawned event loop and its shutdown channel.
pub(crate) struct LoopHandle {
    pub shutdown_tx: Option<oneshot::Sender<()>>,
    pub task: Option<JoinHandle<()>>,
}

impl LoopHandle {
    /// Waits for the loop to exit on its own, then forces it down.
    pub async fn stop(&mut self, label: &str) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_ok() {
            return;
        }
        debug!("[{label}] Event loop still running, sending shutdown");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
            task.abort();
        }
    }
}

/// Runs the acknowledgment decision for one inbound message off the event
/// loop, then acks through `ack` when allowed.
pub(crate) fn settle_in_background<A, Fut, E>(
    label: String,
    topic: String,
    qos: Qos,
    outcome: DispatchOutcome,
    ack: A,
) where
    A: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        match settle(qos, outcome).await {
            AckDecision::Acknowledge => {
                if qos == Qos::AtMostOnce {
                    return;
                }
                if let Err(e) = ack().await {
                    warn!("[{label}] Failed to acknowledge message on [{topic}]: {e}");
                }
            }
            AckDecision::Withhold(reason) => {
                warn!("[{label}] Leaving message on [{topic}] unacknowledged: {reason:?}");
            }
        }
    });
}

/// Transport for the configured protocol. `None` keeps plain TCP.
pub(crate) fn transport(config: &MqttConnectorConfig) -> Option<Transport> {
    let ca = config
        .certificate_pem
        .as_ref()
        .map(|pem| pem.as_bytes().to_vec());
    match (config.protocol, ca) {
        (MqttProtocol::Tcp, _) => None,
        (MqttProtocol::Tls, Some(ca)) => Some(Transport::tls(ca, None, None)),
        (MqttProtocol::Tls, None) => Some(Transport::tls_with_default_config()),
        (MqttProtocol::Ws, _) => Some(Transport::Ws),
        (MqttProtocol::Wss, Some(ca)) => Some(Transport::wss(ca, None, None)),
        (MqttProtocol::Wss, None) => Some(Transport::wss_with_default_config()),
    }
}

pub(crate) fn not_connected_error(label: &str, operation: &str, topic: &str) -> ConnectorError {
    debug!("[{label}] Skipping {operation} on [{topic}], not connected");
    ConnectorError::NotConnected
}
