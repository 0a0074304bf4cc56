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

//! MQTT 5 session on `rumqttc::v5`.

use std::sync::atomic::Ordering;

use async_trait::async_trait;
use bytes::Bytes;
use connector_core::{ConnectorError, Qos};
use log::{debug, info, warn};
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, Publish, SubscribeReasonCode};
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::Outgoing;
use tokio::sync::oneshot;

use crate::config::MqttConnectorConfig;
use crate::message::{from_v5_qos, inbound_message, to_v5_qos, v5_properties};
use crate::session::{
    not_connected_error, settle_in_background, transport, LinkState, LoopHandle, MqttSession,
    REQUEST_CAPACITY,
};

pub(crate) struct Session5 {
    client: AsyncClient,
    link: LinkState,
    event_loop: LoopHandle,
}

fn options(config: &MqttConnectorConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, config.broker_address(), config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_start(config.clean_session);
    options.set_manual_acks(true);
    if let Some(user) = &config.username {
        options.set_credentials(user, config.password.as_deref().unwrap_or_default());
    }
    if let Some(transport) = transport(config) {
        options.set_transport(transport);
    }
    options
}

pub(crate) async fn connect(
    config: &MqttConnectorConfig,
    link: LinkState,
) -> Result<Session5, ConnectorError> {
    let (client, mut eventloop) = AsyncClient::new(options(config), REQUEST_CAPACITY);

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
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

    Ok(Session5 {
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
    info!("[{label}] MQTT 5 event loop started");
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                info!("[{label}] Shutdown signal received");
                break;
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        on_publish(&client, &link, publish);
                    }
                    Ok(Event::Incoming(Packet::SubAck(ack))) => {
                        let rejected: Vec<_> = ack
                            .return_codes
                            .iter()
                            .filter(|code| !matches!(code, SubscribeReasonCode::Success(_)))
                            .collect();
                        if !rejected.is_empty() {
                            warn!(
                                "[{label}] Broker rejected subscription {}: {rejected:?}",
                                ack.pkid
                            );
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect(disconnect))) => {
                        link.lost(format!(
                            "broker sent DISCONNECT ({:?})",
                            disconnect.reason_code
                        ));
                        break;
                    }
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("[{label}] DISCONNECT sent");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        link.lost(e.to_string());
                        break;
                    }
                }
            }
        }
    }
    link.connected.store(false, Ordering::SeqCst);
    info!("[{label}] MQTT 5 event loop stopped");
}

fn on_publish(client: &AsyncClient, link: &LinkState, publish: Publish) {
    let qos = from_v5_qos(publish.qos);
    let topic = String::from_utf8_lossy(&publish.topic).into_owned();
    let message = inbound_message(
        &link.context,
        topic.clone(),
        publish.payload.clone(),
        qos,
        publish.retain,
        v5_properties(publish.properties.as_ref()),
    );
    let outcome = link.context.dispatcher.on_message(message);
    let client = client.clone();
    settle_in_background(link.label.clone(), topic, qos, outcome, move || async move {
        client.ack(&publish).await
    });
}

#[async_trait]
impl MqttSession for Session5 {
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), ConnectorError> {
        if !self.link.connected.load(Ordering::SeqCst) {
            return Err(not_connected_error(&self.link.label, "subscribe", topic));
        }
        self.client
            .subscribe(topic, to_v5_qos(qos))
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
            .publish(topic, to_v5_qos(qos), retain, payload)
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
