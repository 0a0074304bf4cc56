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

//! MQTT 3.1.1 session on the rumqttc client.

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{ConnectorError, Qos};
use log::{debug, info, warn};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, Incoming, MqttOptions, Outgoing, Publish,
    SubscribeReasonCode,
};
use tokio::sync::oneshot;

use crate::config::MqttConnectorConfig;
use crate::message::{from_v4_qos, inbound_message, to_v4_qos};
use crate::session::{
    not_connected_error, settle_in_background, transport, LinkState, LoopHandle, MqttSession,
    REQUEST_CAPACITY,
};

pub(crate) struct Session3 {
    client: AsyncClient,
    link: LinkState,
    event_loop: LoopHandle,
}

fn options(config: &MqttConnectorConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, config.broker_address(), config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(config.clean_session);
    options.set_manual_acks(true);
    if let Some(user) = &config.username {
        options.set_credentials(user, config.password.as_deref().unwrap_or_default());
    }
    if let Some(transport) = transport(config) {
        options.set_transport(transport);
    }
    options
}

/// Connects and waits for CONNACK, then hands the event loop to a task.
pub(crate) async fn connect(
    config: &MqttConnectorConfig,
    link: LinkState,
) -> Result<Session3, ConnectorError> {
    let (client, mut eventloop) = AsyncClient::new(options(config), REQUEST_CAPACITY);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    return Err(ConnectorError::connection(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                debug!(
                    "[{}] CONNACK received (session present: {})",
                    link.label, ack.session_present
                );
                break;
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ConnectorError::connection_caused_by(
                    format!("could not connect to {}:{}", config.host, config.port),
                    e,
                ))
            }
        }
    }

    link.connected.store(true, Ordering::SeqCst);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(run_event_loop(eventloop, client.clone(), link.clone(), shutdown_rx));

    Ok(Session3 {
        client,
        link,
        event_loop: LoopHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        },
    })
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    link: LinkState,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let label = link.label.clone();
    info!("[{label}] MQTT 3.1.1 event loop started");
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("[{label}] Shutdown signal received");
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Incoming::Publish(publish))) => {
                        on_publish(&client, &link, publish);
                    }
                    Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                        if ack
                            .return_codes
                            .iter()
                            .any(|code| !matches!(code, SubscribeReasonCode::Success(_)))
                        {
                            warn!("[{label}] Broker rejected subscription {}", ack.pkid);
                        }
                    }
                    Ok(Event::Incoming(Incoming::Disconnect)) => {
                        link.lost("broker sent DISCONNECT");
                        break;
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("[{label}] DISCONNECT sent");
                        break;
                    }
                    Ok(_) => {} // PingResp, PubAck, etc.
                    Err(e) => {
                        link.lost(e.to_string());
                        break;
                    }
                }
            }
        }
    }
    link.connected.store(false, Ordering::SeqCst);
    info!("[{label}] MQTT 3.1.1 event loop stopped");
}

fn on_publish(client: &AsyncClient, link: &LinkState, publish: Publish) {
    let qos = from_v4_qos(publish.qos);
    let message = inbound_message(
        &link.context,
        publish.topic.clone(),
        publish.payload.clone(),
        qos,
        publish.retain,
        HashMap::new(),
    );
    let outcome = link.context.dispatcher.on_message(message);
    let client = client.clone();
    settle_in_background(
        link.label.clone(),
        publish.topic.clone(),
        qos,
        outcome,
        move || async move { client.ack(&publish).await },
    );
}

#[async_trait]
impl MqttSession for Session3 {
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        if !self.link.connected.load(Ordering::SeqCst) {
            return Err(not_connected_error(&self.link.label, "subscribe", topic));
        }
        self.client
            .subscribe(topic, to_v4_qos(qos))
            .await
            .map_err(|e| ConnectorError::subscribe_failed(topic, e))
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), ConnectorError> {
        if !self.link.connected.load(Ordering::SeqCst) {
            return Err(not_connected_error(&self.link.label, "unsubscribe", topic));
        }
        self.client
            .unsubscribe(topic)
            .await
            .map_err(|e| ConnectorError::unsubscribe_failed(topic, e))
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Bytes,
        qos: Qos,
        retain: bool,
    ) -> Result<(), ConnectorError> {
        if !self.link.connected.load(Ordering::SeqCst) {
            return Err(not_connected_error(&self.link.label, "publish", topic));
        }
        self.client
            .publish(topic, to_v4_qos(qos), retain, payload.to_vec())
            .await
            .map_err(|e| ConnectorError::publish_failed(topic, e))
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.link.closing.store(true, Ordering::SeqCst);
        let result = self
            .client
            .disconnect()
            .await
            .map_err(|e| ConnectorError::connection(format!("disconnect failed: {e}")));
        self.event_loop.stop(&self.link.label).await;
        self.link.connected.store(false, Ordering::SeqCst);
        result
    }
}
