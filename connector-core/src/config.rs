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

//! Connector identity, configuration, property schemas and engine settings.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConnectorError;
use crate::mapping::{Direction, Qos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorType {
    Mqtt,
    Pulsar,
    PulsarBridge,
    Kafka,
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorType::Mqtt => "MQTT",
            ConnectorType::Pulsar => "PULSAR",
            ConnectorType::PulsarBridge => "PULSAR_BRIDGE",
            ConnectorType::Kafka => "KAFKA",
        };
        f.write_str(name)
    }
}

/// Immutable identity of a connector instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectorIdentity {
    pub tenant: String,
    pub identifier: String,
    pub name: String,
    pub connector_type: ConnectorType,
    pub singleton: bool,
}

impl ConnectorIdentity {
    pub fn new(
        tenant: impl Into<String>,
        identifier: impl Into<String>,
        name: impl Into<String>,
        connector_type: ConnectorType,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            identifier: identifier.into(),
            name: name.into(),
            connector_type,
            singleton: false,
        }
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }
}

impl fmt::Display for ConnectorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.name)
    }
}

/// Configuration of one connector as stored in the external registry.
///
/// Properties keep their declaration order. Typed accessors accept values
/// encoded as strings, since configurations edited through forms often
/// store `"true"` or `"1883"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfiguration {
    pub identifier: String,
    pub name: String,
    pub connector_type: ConnectorType,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl ConnectorConfiguration {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        connector_type: ConnectorType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            connector_type,
            enabled: true,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }

    pub fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.string(key)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        self.bool(key).unwrap_or(default)
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.u64(key).unwrap_or(default)
    }

    pub fn u16(&self, key: &str) -> Option<u16> {
        self.u64(key).and_then(|v| u16::try_from(v).ok())
    }

    /// Reads an object property as string pairs. Non-string values are
    /// rendered as JSON; anything that is not an object yields an empty map.
    pub fn string_map(&self, key: &str) -> BTreeMap<String, String> {
        let Some(Value::Object(map)) = self.get(key) else {
            return BTreeMap::new();
        };
        map.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| match v {
                Value::String(s) => (k.clone(), s.clone()),
                other => (k.clone(), other.to_string()),
            })
            .collect()
    }

    /// Fills absent properties with the defaults declared in `spec`.
    pub fn apply_defaults(&mut self, spec: &ConnectorSpecification) {
        for (key, property) in &spec.properties {
            if self.get(key).is_none() {
                if let Some(default) = &property.default {
                    self.properties.insert(key.clone(), default.clone());
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKind {
    String,
    StringLarge,
    Numeric,
    Boolean,
    Option,
    Sensitive,
    Map,
}

/// Makes a property relevant only when another property has one of `any_of`.
/// `*` matches any non-empty value.
const ANY_VALUE: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyCondition {
    pub key: String,
    pub any_of: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpec {
    pub kind: PropertyKind,
    pub required: bool,
    pub order: u32,
    pub default: Option<Value>,
    pub condition: Option<PropertyCondition>,
    pub options: Vec<String>,
}

impl PropertySpec {
    pub fn required(kind: PropertyKind, order: u32) -> Self {
        Self {
            kind,
            required: true,
            order,
            default: None,
            condition: None,
            options: Vec::new(),
        }
    }

    pub fn optional(kind: PropertyKind, order: u32) -> Self {
        Self {
            required: false,
            ..Self::required(kind, order)
        }
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn visible_when<I, S>(mut self, key: impl Into<String>, any_of: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.condition = Some(PropertyCondition {
            key: key.into(),
            any_of: any_of.into_iter().map(Into::into).collect(),
        });
        self
    }

    fn applies_to(&self, config: &ConnectorConfiguration) -> bool {
        match &self.condition {
            None => true,
            Some(condition) => config
                .string(&condition.key)
                .filter(|value| !value.trim().is_empty())
                .map(|value| {
                    condition
                        .any_of
                        .iter()
                        .any(|v| v == ANY_VALUE || v.eq_ignore_ascii_case(&value))
                })
                .unwrap_or(false),
        }
    }
}

/// Schema and static capabilities of one connector type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSpecification {
    pub name: String,
    pub description: String,
    pub connector_type: ConnectorType,
    pub singleton: bool,
    pub supported_directions: Vec<Direction>,
    pub supported_qos: Vec<Qos>,
    /// Ordered property schema.
    pub properties: Vec<(String, PropertySpec)>,
}

impl ConnectorSpecification {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        connector_type: ConnectorType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            connector_type,
            singleton: false,
            supported_directions: vec![Direction::Inbound, Direction::Outbound],
            supported_qos: Qos::ALL.to_vec(),
            properties: Vec::new(),
        }
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn supported_qos(mut self, qos: &[Qos]) -> Self {
        self.supported_qos = qos.to_vec();
        self
    }

    pub fn property(mut self, key: impl Into<String>, spec: PropertySpec) -> Self {
        self.properties.push((key.into(), spec));
        self.properties.sort_by_key(|(_, p)| p.order);
        self
    }

    pub fn property_spec(&self, key: &str) -> Option<&PropertySpec> {
        self.properties
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, spec)| spec)
    }

    /// Checks every required property whose visibility condition holds.
    pub fn validate(&self, config: &ConnectorConfiguration) -> Result<(), ConnectorError> {
        let missing: Vec<&str> = self
            .properties
            .iter()
            .filter(|(_, spec)| spec.required && spec.applies_to(config))
            .filter(|(key, spec)| match config.get(key) {
                None => true,
                Some(Value::String(s)) => s.trim().is_empty() && spec.kind != PropertyKind::Boolean,
                Some(_) => false,
            })
            .map(|(key, _)| key.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(ConnectorError::Configuration(format!(
                "required properties missing for {}: {}",
                config.name,
                missing.join(", ")
            )));
        }

        for (key, spec) in &self.properties {
            if spec.kind != PropertyKind::Option || spec.options.is_empty() {
                continue;
            }
            if let Some(value) = config.string(key) {
                if !spec.options.iter().any(|o| o == &value) {
                    return Err(ConnectorError::Configuration(format!(
                        "property {key} has unsupported value '{value}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Returns `true` when `config` satisfies `spec`.
pub fn is_config_valid(spec: &ConnectorSpecification, config: &ConnectorConfiguration) -> bool {
    spec.validate(config).is_ok()
}

/// Service-level toggles owned by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfiguration {
    pub send_connector_lifecycle: bool,
    pub send_subscription_events: bool,
    pub log_payload: bool,
}

impl Default for ServiceConfiguration {
    fn default() -> Self {
        Self {
            send_connector_lifecycle: true,
            send_subscription_events: true,
            log_payload: false,
        }
    }
}

/// Timing and retry settings of the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Physical connect attempts per Connect operation.
    pub connect_attempts: u32,
    pub connect_retry_delay: Duration,
    pub housekeeping_interval: Duration,
    /// Wait before reconnecting after an unexpected drop.
    pub reconnect_delay: Duration,
    /// Consecutive unexpected-drop reconnect cycles before giving up.
    /// `None` retries forever.
    pub max_reconnect_cycles: Option<u32>,
    pub connection_timeout: Duration,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl LifecycleSettings {
    pub fn builder() -> LifecycleSettingsBuilder {
        LifecycleSettingsBuilder {
            connect_attempts: 3,
            connect_retry_delay: Duration::from_secs(10),
            housekeeping_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_cycles: Some(5),
            connection_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for [`LifecycleSettings`].
pub struct LifecycleSettingsBuilder {
    connect_attempts: u32,
    connect_retry_delay: Duration,
    housekeeping_interval: Duration,
    reconnect_delay: Duration,
    max_reconnect_cycles: Option<u32>,
    connection_timeout: Duration,
}

impl LifecycleSettingsBuilder {
    pub fn connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn connect_retry_delay(mut self, delay: Duration) -> Self {
        self.connect_retry_delay = delay;
        self
    }

    pub fn housekeeping_interval(mut self, interval: Duration) -> Self {
        self.housekeeping_interval = interval;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn max_reconnect_cycles(mut self, cycles: Option<u32>) -> Self {
        self.max_reconnect_cycles = cycles;
        self
    }

    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Build the settings.
    pub fn build(self) -> LifecycleSettings {
        LifecycleSettings {
            connect_attempts: self.connect_attempts,
            connect_retry_delay: self.connect_retry_delay,
            housekeeping_interval: self.housekeeping_interval,
            reconnect_delay: self.reconnect_delay,
            max_reconnect_cycles: self.max_reconnect_cycles,
            connection_timeout: self.connection_timeout,
        }
    }
}
