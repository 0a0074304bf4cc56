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

//! Mapping snapshots and the common three-level QoS model.

use serde::{Deserialize, Serialize};

/// Delivery guarantee shared by all brokers. Ordering follows strength.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Qos {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl Qos {
    pub const ALL: [Qos; 3] = [Qos::AtMostOnce, Qos::AtLeastOnce, Qos::ExactlyOnce];

    pub fn level(self) -> u8 {
        match self {
            Qos::AtMostOnce => 0,
            Qos::AtLeastOnce => 1,
            Qos::ExactlyOnce => 2,
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Qos::AtMostOnce),
            1 => Some(Qos::AtLeastOnce),
            2 => Some(Qos::ExactlyOnce),
            _ => None,
        }
    }
}

impl std::fmt::Display for Qos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Qos::AtMostOnce => "AT_MOST_ONCE",
            Qos::AtLeastOnce => "AT_LEAST_ONCE",
            Qos::ExactlyOnce => "EXACTLY_ONCE",
        };
        f.write_str(name)
    }
}

/// Steps a requested QoS down to what the broker supports.
///
/// Falls back to the highest supported level below the request, or to the
/// lowest supported level when nothing below it is available.
pub fn adjust_qos(requested: Qos, supported: &[Qos]) -> Qos {
    if supported.is_empty() || supported.contains(&requested) {
        return requested;
    }
    supported
        .iter()
        .copied()
        .filter(|q| *q < requested)
        .max()
        .or_else(|| supported.iter().copied().min())
        .unwrap_or(requested)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Read-only snapshot of a mapping owned by the external mapping service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRecord {
    pub identifier: String,
    pub name: String,
    /// Topic for inbound mappings, publish topic for outbound ones.
    pub topic: String,
    pub qos: Qos,
    pub active: bool,
    pub direction: Direction,
    #[serde(default)]
    pub debug: bool,
}

impl MappingRecord {
    pub fn inbound(identifier: impl Into<String>, topic: impl Into<String>, qos: Qos) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier,
            topic: topic.into(),
            qos,
            active: true,
            direction: Direction::Inbound,
            debug: false,
        }
    }

    pub fn outbound(identifier: impl Into<String>, topic: impl Into<String>, qos: Qos) -> Self {
        Self {
            direction: Direction::Outbound,
            ..Self::inbound(identifier, topic, qos)
        }
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn has_wildcards(&self) -> bool {
        topic_has_wildcards(&self.topic)
    }
}

pub fn topic_has_wildcards(topic: &str) -> bool {
    topic.contains('+') || topic.contains('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_ordering() {
        assert!(Qos::AtMostOnce < Qos::AtLeastOnce);
        assert!(Qos::AtLeastOnce < Qos::ExactlyOnce);
        assert_eq!(
            [Qos::AtMostOnce, Qos::ExactlyOnce, Qos::AtLeastOnce].iter().max(),
            Some(&Qos::ExactlyOnce)
        );
    }

    #[test]
    fn test_adjust_qos_steps_down() {
        let supported = [Qos::AtMostOnce, Qos::AtLeastOnce];
        assert_eq!(adjust_qos(Qos::ExactlyOnce, &supported), Qos::AtLeastOnce);
        assert_eq!(adjust_qos(Qos::AtMostOnce, &supported), Qos::AtMostOnce);
    }

    #[test]
    fn test_adjust_qos_falls_back_to_lowest() {
        assert_eq!(
            adjust_qos(Qos::AtMostOnce, &[Qos::AtLeastOnce, Qos::ExactlyOnce]),
            Qos::AtLeastOnce
        );
    }

    #[test]
    fn test_wildcard_detection() {
        assert!(MappingRecord::inbound("m1", "a/+/b", Qos::AtMostOnce).has_wildcards());
        assert!(MappingRecord::inbound("m2", "a/#", Qos::AtMostOnce).has_wildcards());
        assert!(!MappingRecord::inbound("m3", "a/b", Qos::AtMostOnce).has_wildcards());
    }

    #[test]
    fn test_mapping_deserializes_camel_case() {
        let json = r#"{"identifier":"m1","name":"temp","topic":"t/1","qos":"EXACTLY_ONCE","active":true,"direction":"INBOUND"}"#;
        let mapping: MappingRecord = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.qos, Qos::ExactlyOnce);
        assert!(!mapping.debug);
    }
}
