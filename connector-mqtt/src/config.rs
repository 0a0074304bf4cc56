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

//! Configuration types for the MQTT connectors.

use std::fmt;
use std::time::Duration;

use connector_core::{
    ConnectorConfiguration, ConnectorError, ConnectorSpecification, ConnectorType, PropertyKind,
    PropertySpec,
};
use uuid::Uuid;

pub const VERSION_3_1_1: &str = "3.1.1";
pub const VERSION_5_0: &str = "5.0";

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MqttVersion {
    #[default]
    V311,
    V5,
}

impl MqttVersion {
    pub fn parse(value: &str) -> Result<Self, ConnectorError> {
        match value.trim() {
            VERSION_3_1_1 => Ok(Self::V311),
            VERSION_5_0 => Ok(Self::V5),
            other => Err(ConnectorError::Configuration(format!(
                "unsupported MQTT version '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MqttVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V311 => f.write_str(VERSION_3_1_1),
            Self::V5 => f.write_str(VERSION_5_0),
        }
    }
}

/// Transport scheme selected by the `protocol` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MqttProtocol {
    #[default]
    Tcp,
    Tls,
    Ws,
    Wss,
}

impl MqttProtocol {
    pub fn parse(value: &str) -> Result<Self, ConnectorError> {
        match value.trim() {
            "mqtt://" => Ok(Self::Tcp),
            "mqtts://" => Ok(Self::Tls),
            "ws://" => Ok(Self::Ws),
            "wss://" => Ok(Self::Wss),
            other => Err(ConnectorError::Configuration(format!(
                "unsupported MQTT protocol '{other}'"
            ))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp => "mqtt://",
            Self::Tls => "mqtts://",
            Self::Ws => "ws://",
            Self::Wss => "wss://",
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls | Self::Wss)
    }

    pub fn is_websocket(&self) -> bool {
        matches!(self, Self::Ws | Self::Wss)
    }
}

/// Configuration of one MQTT connector instance.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConnectorConfig {
    pub version: MqttVersion,
    pub protocol: MqttProtocol,
    /// Broker hostname or IP.
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub clean_session: bool,
    pub keep_alive: Duration,
    /// Trusted CA or self-signed certificate chain in PEM format.
    pub certificate_pem: Option<String>,
    /// Path appended to the websocket URL, e.g. `/mqtt`.
    pub server_path: Option<String>,
}

impl MqttConnectorConfig {
    /// Start building a new config with the required fields.
    pub fn builder(
        host: impl Into<String>,
        port: u16,
        client_id: impl Into<String>,
    ) -> MqttConnectorConfigBuilder {
        MqttConnectorConfigBuilder {
            version: MqttVersion::V311,
            protocol: MqttProtocol::Tcp,
            host: host.into(),
            port,
            client_id: client_id.into(),
            username: None,
            password: None,
            clean_session: true,
            keep_alive: Duration::from_secs(60),
            certificate_pem: None,
            server_path: None,
        }
    }

    /// Parses the connector's property map.
    ///
    /// The certificate is only read when `useSelfSignedCertificate` is set
    /// and the protocol uses TLS.
    pub fn from_configuration(config: &ConnectorConfiguration) -> Result<Self, ConnectorError> {
        let host = config
            .string("mqttHost")
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ConnectorError::Configuration("mqttHost is required".into()))?;
        let port = config
            .u16("mqttPort")
            .ok_or_else(|| ConnectorError::Configuration("mqttPort must be a valid port".into()))?;
        let client_id = config
            .string("clientId")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| format!("connector-{}", Uuid::new_v4().simple()));

        let mut builder = Self::builder(host.trim(), port, client_id)
            .version(MqttVersion::parse(&config.string_or("version", VERSION_3_1_1))?)
            .protocol(MqttProtocol::parse(&config.string_or("protocol", "mqtt://"))?)
            .clean_session(config.bool_or("cleanSession", true))
            .keep_alive(Duration::from_secs(config.u64_or("keepAlive", 60)));

        if let Some(user) = config.string("user").filter(|u| !u.is_empty()) {
            builder = builder.username(user);
        }
        if let Some(password) = config.string("password").filter(|p| !p.is_empty()) {
            builder = builder.password(password);
        }
        if let Some(path) = config.string("serverPath").filter(|p| !p.is_empty()) {
            builder = builder.server_path(path);
        }
        if builder.protocol.is_tls() && config.bool_or("useSelfSignedCertificate", false) {
            let pem = config
                .string("certificateChainInPemFormat")
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| {
                    ConnectorError::initialization(
                        "useSelfSignedCertificate is set but certificateChainInPemFormat is empty",
                    )
                })?;
            builder = builder.certificate_pem(pem);
        }
        Ok(builder.build())
    }

    /// Rejects certificate material that holds no PEM certificate block.
    pub fn validate_certificate(&self) -> Result<(), ConnectorError> {
        let Some(pem) = &self.certificate_pem else {
            return Ok(());
        };
        let blocks = pem.matches(PEM_BEGIN).count();
        if blocks == 0 || blocks != pem.matches(PEM_END).count() {
            return Err(ConnectorError::initialization(
                "no valid X.509 certificate found in PEM",
            ));
        }
        Ok(())
    }

    /// Broker address handed to rumqttc. Websocket transports take a full URL.
    pub fn broker_address(&self) -> String {
        if self.protocol.is_websocket() {
            let path = self.server_path.as_deref().unwrap_or("/mqtt");
            let path = path.strip_prefix('/').unwrap_or(path);
            format!("{}{}:{}/{}", self.protocol.scheme(), self.host, self.port, path)
        } else {
            self.host.clone()
        }
    }
}

/// Builder for [`MqttConnectorConfig`].
pub struct MqttConnectorConfigBuilder {
    version: MqttVersion,
    protocol: MqttProtocol,
    host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    clean_session: bool,
    keep_alive: Duration,
    certificate_pem: Option<String>,
    server_path: Option<String>,
}

impl MqttConnectorConfigBuilder {
    pub fn version(mut self, version: MqttVersion) -> Self {
        self.version = version;
        self
    }

    pub fn protocol(mut self, protocol: MqttProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn certificate_pem(mut self, pem: impl Into<String>) -> Self {
        self.certificate_pem = Some(pem.into());
        self
    }

    pub fn server_path(mut self, path: impl Into<String>) -> Self {
        self.server_path = Some(path.into());
        self
    }

    /// Build the config.
    pub fn build(self) -> MqttConnectorConfig {
        MqttConnectorConfig {
            version: self.version,
            protocol: self.protocol,
            host: self.host,
            port: self.port,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            clean_session: self.clean_session,
            keep_alive: self.keep_alive,
            certificate_pem: self.certificate_pem,
            server_path: self.server_path,
        }
    }
}

/// Property schema of the generic MQTT connector.
pub fn specification() -> ConnectorSpecification {
    let tls = ["mqtts://", "wss://"];
    let websocket = ["ws://", "wss://"];
    let self_signed = ["true"];

    ConnectorSpecification::new(
        "Generic MQTT",
        "Connector for connecting to external MQTT broker over tcp or websocket.",
        ConnectorType::Mqtt,
    )
    .property(
        "version",
        PropertySpec::required(PropertyKind::Option, 0)
            .default_value(VERSION_3_1_1)
            .options([VERSION_3_1_1, VERSION_5_0]),
    )
    .property(
        "protocol",
        PropertySpec::required(PropertyKind::Option, 1)
            .default_value("mqtt://")
            .options(["mqtt://", "mqtts://", "ws://", "wss://"]),
    )
    .property("mqttHost", PropertySpec::required(PropertyKind::String, 2))
    .property("mqttPort", PropertySpec::required(PropertyKind::Numeric, 3))
    .property("user", PropertySpec::optional(PropertyKind::String, 4))
    .property("password", PropertySpec::optional(PropertyKind::Sensitive, 5))
    .property("clientId", PropertySpec::required(PropertyKind::String, 6))
    .property(
        "useSelfSignedCertificate",
        PropertySpec::optional(PropertyKind::Boolean, 7)
            .default_value(false)
            .visible_when("protocol", tls),
    )
    .property(
        "certificateChainInPemFormat",
        PropertySpec::required(PropertyKind::StringLarge, 8)
            .visible_when("useSelfSignedCertificate", self_signed),
    )
    .property(
        "supportsWildcardInTopicInbound",
        PropertySpec::optional(PropertyKind::Boolean, 9).default_value(true),
    )
    .property(
        "supportsWildcardInTopicOutbound",
        PropertySpec::optional(PropertyKind::Boolean, 10).default_value(false),
    )
    .property(
        "serverPath",
        PropertySpec::optional(PropertyKind::String, 11).visible_when("protocol", websocket),
    )
    .property(
        "cleanSession",
        PropertySpec::optional(PropertyKind::Boolean, 12).default_value(true),
    )
    .property(
        "keepAlive",
        PropertySpec::optional(PropertyKind::Numeric, 13).default_value(60),
    )
}
