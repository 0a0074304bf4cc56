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

//! Configuration types for the Pulsar connectors.

use std::fmt;
use std::time::Duration;

use connector_core::{
    ConnectorConfiguration, ConnectorError, ConnectorSpecification, ConnectorType, PropertyKind,
    PropertySpec, Qos,
};

pub const DEFAULT_SERVICE_URL: &str = "pulsar://localhost:6650";
pub const DEFAULT_SUBSCRIPTION_NAME: &str = "dynamic-mapper-subscription";
pub const DEFAULT_TENANT: &str = "public";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const BRIDGE_NAMESPACE: &str = "mqtt";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

const PLAIN_SCHEME: &str = "pulsar://";
const TLS_SCHEME: &str = "pulsar+ssl://";

/// Pulsar subscription type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionType {
    Exclusive,
    Shared,
    Failover,
    KeyShared,
}

impl SubscriptionType {
    pub fn parse(value: &str) -> Result<Self, ConnectorError> {
        match value.trim() {
            "Exclusive" => Ok(Self::Exclusive),
            "Shared" => Ok(Self::Shared),
            "Failover" => Ok(Self::Failover),
            "Key_Shared" | "KeyShared" => Ok(Self::KeyShared),
            other => Err(ConnectorError::Configuration(format!(
                "unsupported subscription type '{other}'"
            ))),
        }
    }

    /// Subscription type for a requested QoS, unless `configured` overrides it.
    pub fn for_qos(qos: Qos, configured: Option<Self>) -> Self {
        match (configured, qos) {
            (Some(configured), _) => configured,
            (None, Qos::ExactlyOnce) => Self::Exclusive,
            (None, _) => Self::Shared,
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exclusive => f.write_str("Exclusive"),
            Self::Shared => f.write_str("Shared"),
            Self::Failover => f.write_str("Failover"),
            Self::KeyShared => f.write_str("Key_Shared"),
        }
    }
}

/// Client authentication as passed to the Pulsar client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulsarAuth {
    /// `token` or `basic`.
    pub method: String,
    pub params: String,
}

/// Connection settings shared by the native and bridge connectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Service URL with its scheme already matched to the TLS setting.
    pub service_url: String,
    pub auth: Option<PulsarAuth>,
    pub connection_timeout: Duration,
    pub operation_timeout: Duration,
    pub keep_alive: Duration,
}

impl ClientOptions {
    fn from_configuration(
        config: &ConnectorConfiguration,
        default_auth_method: &str,
    ) -> Result<Self, ConnectorError> {
        let service_url = config.string_or("serviceUrl", DEFAULT_SERVICE_URL);
        let enable_tls = config.bool_or("enableTls", false);
        let method = config.string_or("authenticationMethod", default_auth_method);
        let auth = match (method.as_str(), config.string("authenticationParams")) {
            ("none", _) => None,
            ("token" | "basic", Some(params)) if !params.trim().is_empty() => Some(PulsarAuth {
                method,
                params,
            }),
            ("token" | "basic", _) => {
                return Err(ConnectorError::Configuration(format!(
                    "authenticationParams required for authentication method '{method}'"
                )))
            }
            (other, _) => {
                return Err(ConnectorError::Configuration(format!(
                    "unsupported authentication method '{other}'"
                )))
            }
        };

        Ok(Self {
            service_url: adjust_service_url(&service_url, enable_tls),
            auth,
            connection_timeout: seconds(config, "connectionTimeoutSeconds"),
            operation_timeout: seconds(config, "operationTimeoutSeconds"),
            keep_alive: seconds(config, "keepAliveIntervalSeconds"),
        })
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            auth: None,
            connection_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            keep_alive: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

fn seconds(config: &ConnectorConfiguration, key: &str) -> Duration {
    Duration::from_secs(config.u64_or(key, DEFAULT_TIMEOUT_SECS))
}

/// Switches the scheme of `url` between `pulsar://` and `pulsar+ssl://`.
pub fn adjust_service_url(url: &str, enable_tls: bool) -> String {
    let url = url.trim();
    match (enable_tls, url.strip_prefix(PLAIN_SCHEME), url.strip_prefix(TLS_SCHEME)) {
        (true, Some(rest), _) => format!("{TLS_SCHEME}{rest}"),
        (false, _, Some(rest)) => format!("{PLAIN_SCHEME}{rest}"),
        _ => url.to_string(),
    }
}

/// Configuration of the native Pulsar connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulsarConnectorConfig {
    pub client: ClientOptions,
    /// Prefix of generated subscription names.
    pub subscription_name: String,
    /// Overrides the QoS-derived subscription type.
    pub subscription_type: Option<SubscriptionType>,
    pub tenant: String,
    pub namespace: String,
}

impl PulsarConnectorConfig {
    pub fn builder() -> PulsarConnectorConfigBuilder {
        PulsarConnectorConfigBuilder::default()
    }

    pub fn from_configuration(config: &ConnectorConfiguration) -> Result<Self, ConnectorError> {
        let subscription_type = config
            .string("subscriptionType")
            .map(|value| SubscriptionType::parse(&value))
            .transpose()?;
        Ok(Self {
            client: ClientOptions::from_configuration(config, "none")?,
            subscription_name: config
                .string("subscriptionName")
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_NAME.to_string()),
            subscription_type,
            tenant: config.string_or("pulsarTenant", DEFAULT_TENANT),
            namespace: config.string_or("pulsarNamespace", DEFAULT_NAMESPACE),
        })
    }
}

#[derive(Debug, Default)]
pub struct PulsarConnectorConfigBuilder {
    client: ClientOptions,
    subscription_name: Option<String>,
    subscription_type: Option<SubscriptionType>,
    tenant: Option<String>,
    namespace: Option<String>,
}

impl PulsarConnectorConfigBuilder {
    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.client.service_url = url.into();
        self
    }

    pub fn auth(mut self, method: impl Into<String>, params: impl Into<String>) -> Self {
        self.client.auth = Some(PulsarAuth {
            method: method.into(),
            params: params.into(),
        });
        self
    }

    pub fn subscription_name(mut self, name: impl Into<String>) -> Self {
        self.subscription_name = Some(name.into());
        self
    }

    pub fn subscription_type(mut self, subscription_type: SubscriptionType) -> Self {
        self.subscription_type = Some(subscription_type);
        self
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn build(self) -> PulsarConnectorConfig {
        PulsarConnectorConfig {
            client: self.client,
            subscription_name: self
                .subscription_name
                .unwrap_or_else(|| DEFAULT_SUBSCRIPTION_NAME.to_string()),
            subscription_type: self.subscription_type,
            tenant: self.tenant.unwrap_or_else(|| DEFAULT_TENANT.to_string()),
            namespace: self.namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        }
    }
}

/// Configuration of the MQTT-over-Pulsar bridge connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub client: ClientOptions,
    pub tenant: String,
    pub namespace: String,
}

impl BridgeConfig {
    /// `platform_tenant` is the Pulsar tenant unless `pulsarTenant` is set.
    pub fn from_configuration(
        config: &ConnectorConfiguration,
        platform_tenant: &str,
    ) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: ClientOptions::from_configuration(config, "basic")?,
            tenant: config.string_or("pulsarTenant", platform_tenant),
            namespace: config.string_or("pulsarNamespace", BRIDGE_NAMESPACE),
        })
    }

    /// Topic the platform consumes device traffic from.
    pub fn inbound_topic(&self) -> String {
        format!("persistent://{}/{}/from-device", self.tenant, self.namespace)
    }

    /// Topic the platform publishes device-bound traffic to.
    pub fn outbound_topic(&self) -> String {
        format!("persistent://{}/{}/to-device", self.tenant, self.namespace)
    }
}

fn client_properties(spec: ConnectorSpecification, auth_method: &str) -> ConnectorSpecification {
    let auth = ["token", "basic"];
    spec.property(
        "serviceUrl",
        PropertySpec::required(PropertyKind::String, 0).default_value(DEFAULT_SERVICE_URL),
    )
    .property(
        "enableTls",
        PropertySpec::optional(PropertyKind::Boolean, 1).default_value(false),
    )
    .property(
        "authenticationMethod",
        PropertySpec::optional(PropertyKind::Option, 5)
            .default_value(auth_method)
            .options(["none", "token", "basic"]),
    )
    .property(
        "authenticationParams",
        PropertySpec::optional(PropertyKind::Sensitive, 6)
            .visible_when("authenticationMethod", auth),
    )
    .property(
        "connectionTimeoutSeconds",
        PropertySpec::optional(PropertyKind::Numeric, 7).default_value(DEFAULT_TIMEOUT_SECS),
    )
    .property(
        "operationTimeoutSeconds",
        PropertySpec::optional(PropertyKind::Numeric, 8).default_value(DEFAULT_TIMEOUT_SECS),
    )
    .property(
        "keepAliveIntervalSeconds",
        PropertySpec::optional(PropertyKind::Numeric, 9).default_value(DEFAULT_TIMEOUT_SECS),
    )
}

/// Schema of the native Pulsar connector.
pub fn specification() -> ConnectorSpecification {
    client_properties(ConnectorSpecification::new(
        "Apache Pulsar",
        "Connector for connecting to Apache Pulsar message broker. Supports QoS levels, \
         wildcards, and MQTT-style topic format conversion.",
        ConnectorType::Pulsar,
    ), "none")
    .property(
        "subscriptionType",
        PropertySpec::optional(PropertyKind::Option, 10)
            .options(["Exclusive", "Shared", "Failover", "Key_Shared"]),
    )
    .property(
        "subscriptionName",
        PropertySpec::optional(PropertyKind::String, 11).default_value(DEFAULT_SUBSCRIPTION_NAME),
    )
    .property(
        "supportsWildcardInTopicInbound",
        PropertySpec::optional(PropertyKind::Boolean, 12).default_value(true),
    )
    .property(
        "supportsWildcardInTopicOutbound",
        PropertySpec::optional(PropertyKind::Boolean, 13).default_value(false),
    )
    .property(
        "pulsarTenant",
        PropertySpec::optional(PropertyKind::String, 14).default_value(DEFAULT_TENANT),
    )
    .property(
        "pulsarNamespace",
        PropertySpec::optional(PropertyKind::String, 15).default_value(DEFAULT_NAMESPACE),
    )
}

/// Schema of the bridge connector. Wildcards are not available in either
/// direction and exactly-once is reduced to at-least-once.
pub fn bridge_specification() -> ConnectorSpecification {
    client_properties(ConnectorSpecification::new(
        "MQTT Service - (Pulsar)",
        "Connector for the platform MQTT service over Pulsar. All device traffic flows through \
         one inbound and one outbound topic. Wildcards are not supported and QoS 2 is reduced \
         to QoS 1.",
        ConnectorType::PulsarBridge,
    ), "basic")
    .singleton(true)
    .supported_qos(&[Qos::AtMostOnce, Qos::AtLeastOnce])
    .property(
        "supportsWildcardInTopicInbound",
        PropertySpec::optional(PropertyKind::Boolean, 12).default_value(false),
    )
    .property(
        "supportsWildcardInTopicOutbound",
        PropertySpec::optional(PropertyKind::Boolean, 13).default_value(false),
    )
    .property("pulsarTenant", PropertySpec::optional(PropertyKind::String, 14))
    .property(
        "pulsarNamespace",
        PropertySpec::optional(PropertyKind::String, 15).default_value(BRIDGE_NAMESPACE),
    )
}
