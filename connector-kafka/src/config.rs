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

//! Configuration of the Kafka connector.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use connector_core::{
    ConnectorConfiguration, ConnectorError, ConnectorSpecification, ConnectorType, PropertyKind,
    PropertySpec, Qos,
};

pub const DEFAULT_GROUP_ID_PREFIX: &str = "dynamic-mapper-";
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// SCRAM mechanism used for SASL authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaslMechanism {
    #[default]
    ScramSha256,
    ScramSha512,
}

impl SaslMechanism {
    pub fn parse(value: &str) -> Result<Self, ConnectorError> {
        match value.trim() {
            "SCRAM-SHA-256" => Ok(Self::ScramSha256),
            "SCRAM-SHA-512" => Ok(Self::ScramSha512),
            other => Err(ConnectorError::Configuration(format!(
                "unsupported SASL mechanism '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScramSha256 => f.write_str("SCRAM-SHA-256"),
            Self::ScramSha512 => f.write_str("SCRAM-SHA-512"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SaslCredentials {
    pub username: String,
    pub password: String,
    pub mechanism: SaslMechanism,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("mechanism", &self.mechanism)
            .finish()
    }
}

/// Configuration of the Kafka connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConnectorConfig {
    pub bootstrap_servers: String,
    pub sasl: Option<SaslCredentials>,
    pub group_id: String,
    /// Extra librdkafka properties, applied last.
    pub producer_properties: BTreeMap<String, String>,
    pub consumer_properties: BTreeMap<String, String>,
    pub publish_timeout: Duration,
}

impl KafkaConnectorConfig {
    pub fn builder(bootstrap_servers: impl Into<String>) -> KafkaConnectorConfigBuilder {
        KafkaConnectorConfigBuilder {
            bootstrap_servers: bootstrap_servers.into(),
            ..Default::default()
        }
    }

    pub fn from_configuration(config: &ConnectorConfiguration) -> Result<Self, ConnectorError> {
        let bootstrap_servers = config
            .string("bootstrapServers")
            .filter(|servers| !servers.trim().is_empty())
            .ok_or_else(|| {
                ConnectorError::Configuration("bootstrapServers is required".to_string())
            })?;

        let username = config.string("username").filter(|u| !u.trim().is_empty());
        let sasl = match username {
            None => None,
            Some(username) => {
                let password = config
                    .string("password")
                    .filter(|p| !p.trim().is_empty())
                    .ok_or_else(|| {
                        ConnectorError::Configuration(format!(
                            "password required for Kafka user '{username}'"
                        ))
                    })?;
                let mechanism = config
                    .string("saslMechanism")
                    .map(|value| SaslMechanism::parse(&value))
                    .transpose()?
                    .unwrap_or_default();
                Some(SaslCredentials {
                    username,
                    password,
                    mechanism,
                })
            }
        };

        Ok(Self {
            bootstrap_servers,
            sasl,
            group_id: config
                .string("groupId")
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| default_group_id(&config.identifier)),
            producer_properties: config.string_map("defaultPropertiesProducer"),
            consumer_properties: config.string_map("defaultPropertiesConsumer"),
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        })
    }

    fn common_properties(&self) -> BTreeMap<String, String> {
        let mut properties = BTreeMap::new();
        properties.insert("bootstrap.servers".to_string(), self.bootstrap_servers.clone());
        match &self.sasl {
            Some(sasl) => {
                properties.insert("security.protocol".to_string(), "SASL_SSL".to_string());
                properties.insert("sasl.mechanism".to_string(), sasl.mechanism.to_string());
                properties.insert("sasl.username".to_string(), sasl.username.clone());
                properties.insert("sasl.password".to_string(), sasl.password.clone());
            }
            None => {
                properties.insert("security.protocol".to_string(), "PLAINTEXT".to_string());
            }
        }
        properties
    }

    /// Client properties of every consumer. Offsets are committed manually
    /// unless the user properties turn auto commit back on.
    pub fn consumer_client_properties(&self) -> BTreeMap<String, String> {
        let mut properties = self.common_properties();
        properties.insert("group.id".to_string(), self.group_id.clone());
        properties.insert("enable.auto.commit".to_string(), "false".to_string());
        properties.extend(self.consumer_properties.clone());
        properties
    }

    pub fn producer_client_properties(&self) -> BTreeMap<String, String> {
        let mut properties = self.common_properties();
        properties.extend(self.producer_properties.clone());
        properties
    }
}

pub fn default_group_id(identifier: &str) -> String {
    format!("{DEFAULT_GROUP_ID_PREFIX}{identifier}")
}

#[derive(Debug, Default)]
pub struct KafkaConnectorConfigBuilder {
    bootstrap_servers: String,
    sasl: Option<SaslCredentials>,
    group_id: Option<String>,
    producer_properties: BTreeMap<String, String>,
    consumer_properties: BTreeMap<String, String>,
    publish_timeout: Option<Duration>,
}

impl KafkaConnectorConfigBuilder {
    pub fn sasl(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        mechanism: SaslMechanism,
    ) -> Self {
        self.sasl = Some(SaslCredentials {
            username: username.into(),
            password: password.into(),
            mechanism,
        });
        self
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn producer_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.producer_properties.insert(key.into(), value.into());
        self
    }

    pub fn consumer_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.consumer_properties.insert(key.into(), value.into());
        self
    }

    pub fn publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = Some(timeout);
        self
    }

    /// `identifier` names the default consumer group.
    pub fn build(self, identifier: &str) -> KafkaConnectorConfig {
        KafkaConnectorConfig {
            bootstrap_servers: self.bootstrap_servers,
            sasl: self.sasl,
            group_id: self.group_id.unwrap_or_else(|| default_group_id(identifier)),
            producer_properties: self.producer_properties,
            consumer_properties: self.consumer_properties,
            publish_timeout: self.publish_timeout.unwrap_or(DEFAULT_PUBLISH_TIMEOUT),
        }
    }
}

/// Schema of the Kafka connector. Wildcards are not available in either
/// direction and only QoS 0 subscriptions are offered.
pub fn specification() -> ConnectorSpecification {
    let with_user = ["*"];
    ConnectorSpecification::new(
        "Kafka",
        "Connector to receive and send messages to an external Kafka broker. The record key is \
         passed to inbound mappings. SASL_SSL is used when a username is configured.",
        ConnectorType::Kafka,
    )
    .supported_qos(&[Qos::AtMostOnce])
    .property(
        "bootstrapServers",
        PropertySpec::required(PropertyKind::String, 0),
    )
    .property("username", PropertySpec::optional(PropertyKind::String, 1))
    .property(
        "password",
        PropertySpec::required(PropertyKind::Sensitive, 2).visible_when("username", with_user),
    )
    .property(
        "saslMechanism",
        PropertySpec::optional(PropertyKind::Option, 3)
            .default_value("SCRAM-SHA-256")
            .options(["SCRAM-SHA-256", "SCRAM-SHA-512"])
            .visible_when("username", with_user),
    )
    .property("groupId", PropertySpec::optional(PropertyKind::String, 4))
    .property(
        "defaultPropertiesProducer",
        PropertySpec::optional(PropertyKind::Map, 5).default_value(serde_json::json!({})),
    )
    .property(
        "defaultPropertiesConsumer",
        PropertySpec::optional(PropertyKind::Map, 7).default_value(serde_json::json!({})),
    )
}
