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

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorStatus {
    #[default]
    Unknown,
    Configured,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Failed,
}

impl fmt::Display for ConnectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorStatus::Unknown => "UNKNOWN",
            ConnectorStatus::Configured => "CONFIGURED",
            ConnectorStatus::Connecting => "CONNECTING",
            ConnectorStatus::Connected => "CONNECTED",
            ConnectorStatus::Disconnecting => "DISCONNECTING",
            ConnectorStatus::Disconnected => "DISCONNECTED",
            ConnectorStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Current status of a connector with the message of the last transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatusEvent {
    pub status: ConnectorStatus,
    pub message: String,
    pub connector_name: String,
    pub connector_identifier: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConnectorStatusEvent {
    pub fn unknown(
        connector_name: impl Into<String>,
        connector_identifier: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            status: ConnectorStatus::Unknown,
            message: String::new(),
            connector_name: connector_name.into(),
            connector_identifier: connector_identifier.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
