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

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use bytes::Bytes;
use connector_core::memory::{
    InMemoryConfigurationSource, InMemoryMappingCatalog, LoggingPlatformEvents,
};
use connector_core::{
    Connector, ConnectorConfiguration, ConnectorContext, ConnectorIdentity, ConnectorMessage,
    ConnectorRegistry, ConnectorType, DispatchOutcome, LifecycleSettings, MappingRecord,
    MessageDispatchGateway, OperationOutcome, ProcessingResult, ProtocolAdapter, Qos,
};
use connector_mqtt::MqttAdapter;
use log::info;
use uuid::Uuid;

const STATUS_TOPIC: &str = "gateway/status";

/// Logs every inbound message and reports it as processed.
struct LoggingDispatcher;

impl MessageDispatchGateway for LoggingDispatcher {
    fn on_message(&self, message: ConnectorMessage) -> DispatchOutcome {
        info!(
            "[{}/{}] {} bytes on [{}] (QoS {}): {}",
            message.tenant,
            message.connector_identifier,
            message.payload.len(),
            message.topic,
            message.qos,
            String::from_utf8_lossy(&message.payload)
        );
        DispatchOutcome {
            consolidated_qos: message.qos,
            max_processing_time: Some(Duration::from_secs(5)),
            results: Box::pin(async { Ok(vec![ProcessingResult::success("log")]) }),
        }
    }
}

fn var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn mqtt_configuration() -> Result<ConnectorConfiguration> {
    let port: u16 = var("MQTT_PORT", "1883").parse()?;
    let client_id = format!("bridge-gateway-{}", Uuid::new_v4().simple());
    Ok(
        ConnectorConfiguration::new("mqtt-1", "plant-broker", ConnectorType::Mqtt)
            .with_property("version", var("MQTT_VERSION", "3.1.1"))
            .with_property("protocol", var("MQTT_PROTOCOL", "mqtt://"))
            .with_property("mqttHost", var("MQTT_HOST", "localhost"))
            .with_property("mqttPort", port)
            .with_property("clientId", client_id),
    )
}

#[cfg(feature = "pulsar-client")]
fn pulsar_connector(
    tenant: &str,
    configs: &InMemoryConfigurationSource,
    context: &ConnectorContext,
) -> Option<(Connector, Arc<dyn ProtocolAdapter>)> {
    use connector_pulsar::{PulsarAdapter, PulsarRsConnector};

    let url = env::var("PULSAR_URL").ok()?;
    configs.put_connector(
        tenant,
        ConnectorConfiguration::new("pulsar-1", "events", ConnectorType::Pulsar)
            .with_property("serviceUrl", url),
    );
    let adapter: Arc<dyn ProtocolAdapter> =
        Arc::new(PulsarAdapter::new(Arc::new(PulsarRsConnector)));
    let identity = ConnectorIdentity::new(tenant, "pulsar-1", "events", ConnectorType::Pulsar);
    Some((
        Connector::new(identity, adapter.clone(), context.clone()),
        adapter,
    ))
}

#[cfg(not(feature = "pulsar-client"))]
fn pulsar_connector(
    _tenant: &str,
    _configs: &InMemoryConfigurationSource,
    _context: &ConnectorContext,
) -> Option<(Connector, Arc<dyn ProtocolAdapter>)> {
    if env::var("PULSAR_URL").is_ok() {
        log::warn!("PULSAR_URL is set but the pulsar-client feature is disabled");
    }
    None
}

#[cfg(feature = "kafka-client")]
fn kafka_connector(
    tenant: &str,
    configs: &InMemoryConfigurationSource,
    context: &ConnectorContext,
) -> Option<(Connector, Arc<dyn ProtocolAdapter>)> {
    use connector_kafka::{KafkaAdapter, RdKafkaConnector};

    let servers = env::var("KAFKA_BOOTSTRAP_SERVERS").ok()?;
    configs.put_connector(
        tenant,
        ConnectorConfiguration::new("kafka-1", "stream", ConnectorType::Kafka)
            .with_property("bootstrapServers", servers),
    );
    let adapter: Arc<dyn ProtocolAdapter> =
        Arc::new(KafkaAdapter::new(Arc::new(RdKafkaConnector)));
    let identity = ConnectorIdentity::new(tenant, "kafka-1", "stream", ConnectorType::Kafka);
    Some((
        Connector::new(identity, adapter.clone(), context.clone()),
        adapter,
    ))
}

#[cfg(not(feature = "kafka-client"))]
fn kafka_connector(
    _tenant: &str,
    _configs: &InMemoryConfigurationSource,
    _context: &ConnectorContext,
) -> Option<(Connector, Arc<dyn ProtocolAdapter>)> {
    if env::var("KAFKA_BOOTSTRAP_SERVERS").is_ok() {
        log::warn!("KAFKA_BOOTSTRAP_SERVERS is set but the kafka-client feature is disabled");
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let tenant = var("GATEWAY_TENANT", "t1");
    let topic = var("MQTT_TOPIC", "sensors/#");
    info!("Starting bridge gateway for tenant {tenant}");

    let configs = Arc::new(InMemoryConfigurationSource::new());
    configs.put_connector(&tenant, mqtt_configuration()?);

    let catalog = Arc::new(InMemoryMappingCatalog::new());
    let inbound = MappingRecord::inbound("m-sensors", topic.as_str(), Qos::AtLeastOnce);
    let outbound = MappingRecord::outbound("m-status", STATUS_TOPIC, Qos::AtLeastOnce);
    for mapping in [inbound, outbound] {
        catalog.deploy(
            &tenant,
            &mapping.identifier,
            vec!["mqtt-1".to_string(), "pulsar-1".to_string()],
        );
        catalog.upsert(&tenant, mapping);
    }
    let kafka_topic = var("KAFKA_TOPIC", "sensor-events");
    let kafka_inbound = MappingRecord::inbound("m-stream", kafka_topic.as_str(), Qos::AtMostOnce);
    catalog.deploy(&tenant, &kafka_inbound.identifier, vec!["kafka-1".to_string()]);
    catalog.upsert(&tenant, kafka_inbound);

    let context = ConnectorContext {
        configuration: configs.clone(),
        mappings: catalog,
        platform: Arc::new(LoggingPlatformEvents),
        dispatcher: Arc::new(LoggingDispatcher),
        settings: LifecycleSettings::builder()
            .housekeeping_interval(Duration::from_secs(30))
            .build(),
    };

    let registry = ConnectorRegistry::new();
    let mqtt_adapter: Arc<dyn ProtocolAdapter> = Arc::new(MqttAdapter::new());
    registry.register_specification(mqtt_adapter.specification());
    let identity = ConnectorIdentity::new(&tenant, "mqtt-1", "plant-broker", ConnectorType::Mqtt);
    let mut connectors = vec![Connector::new(identity, mqtt_adapter, context.clone())];
    if let Some((connector, adapter)) = pulsar_connector(&tenant, &configs, &context) {
        registry.register_specification(adapter.specification());
        connectors.push(connector);
    }
    if let Some((connector, adapter)) = kafka_connector(&tenant, &configs, &context) {
        registry.register_specification(adapter.specification());
        connectors.push(connector);
    }

    for connector in &connectors {
        registry.register(connector.clone())?;
        if let OperationOutcome::Failed(reason) = connector.initialize().wait().await {
            bail!("{} failed to initialize: {reason}", connector.identity());
        }
        let outcome = connector.connect().wait().await;
        info!("[{}] Connect finished: {outcome:?}", connector.identity());
        connector.start_housekeeping();
    }

    for connector in &connectors {
        if !connector.is_connected() {
            continue;
        }
        let published = connector
            .publish(STATUS_TOPIC, Bytes::from_static(b"online"), Qos::AtLeastOnce, false)
            .await;
        if let Err(e) = published {
            log::warn!("[{}] Status publish failed: {e}", connector.identity());
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    registry.unregister_all(&tenant).await;
    for (identifier, status) in registry.status_map(&tenant) {
        info!("[{tenant}/{identifier}] Final status {}", status.status);
    }
    Ok(())
}
