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

//! Conversion between rumqttc packets and [`ConnectorMessage`].

use std::collections::HashMap;

use bytes::Bytes;
use connector_core::adapter::AdapterContext;
use connector_core::{ConnectorMessage, Qos};
use log::debug;
use rumqttc::v5::mqttbytes::v5::PublishProperties;

pub fn to_v4_qos(qos: Qos) -> rumqttc::QoS {
    match qos {
        Qos::AtMostOnce => rumqttc::QoS::AtMostOnce,
        Qos::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        Qos::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

pub fn from_v4_qos(qos: rumqttc::QoS) -> Qos {
    match qos {
        rumqttc::QoS::AtMostOnce => Qos::AtMostOnce,
        rumqttc::QoS::AtLeastOnce => Qos::AtLeastOnce,
        rumqttc::QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}

pub fn to_v5_qos(qos: Qos) -> rumqttc::v5::mqttbytes::QoS {
    use rumqttc::v5::mqttbytes::QoS;
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
        Qos::ExactlyOnce => QoS::ExactlyOnce,
    }
}

pub fn from_v5_qos(qos: rumqttc::v5::mqttbytes::QoS) -> Qos {
    use rumqttc::v5::mqttbytes::QoS;
    match qos {
        QoS::AtMostOnce => Qos::AtMostOnce,
        QoS::AtLeastOnce => Qos::AtLeastOnce,
        QoS::ExactlyOnce => Qos::ExactlyOnce,
    }
}

/// Builds the message handed to the dispatch gateway.
pub fn inbound_message(
    context: &AdapterContext,
    topic: String,
    payload: Bytes,
    qos: Qos,
    retained: bool,
    properties: HashMap<String, String>,
) -> ConnectorMessage {
    if context.service.log_payload {
        debug!(
            "[{}] Received on [{topic}] with QoS {qos}: {}",
            context.identity,
            String::from_utf8_lossy(&payload)
        );
    }
    ConnectorMessage {
        tenant: context.identity.tenant.clone(),
        connector_identifier: context.identity.identifier.clone(),
        topic,
        key: None,
        payload,
        qos,
        retained,
        properties,
    }
}

/// MQTT 5 user properties plus content type and response topic.
pub fn v5_properties(properties: Option<&PublishProperties>) -> HashMap<String, String> {
    let Some(properties) = properties else {
        return HashMap::new();
    };
    let mut map: HashMap<String, String> = properties.user_properties.iter().cloned().collect();
    if let Some(content_type) = &properties.content_type {
        map.insert("contentType".to_string(), content_type.clone());
    }
    if let Some(response_topic) = &properties.response_topic {
        map.insert("responseTopic".to_string(), response_topic.clone());
    }
    map
}
