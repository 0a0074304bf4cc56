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

//! Error taxonomy shared by the lifecycle engine and every protocol adapter.

use std::fmt;
use std::time::Duration;

/// Boxed error used for underlying client/library failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Underlying failure together with the short type name of the error that
/// produced it, so status messages can print `Caused by <Class>: <message>`.
#[derive(Debug)]
pub struct Cause {
    class: String,
    error: BoxError,
}

impl Cause {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            class: short_type_name::<E>(),
            error: Box::new(error),
        }
    }

    /// Wraps a plain message under an explicit class name.
    pub fn message(class: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self {
            class: class.into(),
            error: message.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for Cause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

fn short_type_name<E>() -> String {
    let full = std::any::type_name::<E>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Invalid MQTT wildcard placement detected while translating a topic filter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid wildcard usage in topic '{topic}': {reason}")]
pub struct TranslationError {
    pub topic: String,
    pub reason: String,
}

impl TranslationError {
    pub fn new(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Missing or invalid required property. Steady state is CONFIGURED.
    #[error("{0}")]
    Configuration(String),

    /// Broker unreachable or authentication failure.
    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    /// Topic syntax of a mapping is not supported by the connector.
    #[error("mapping {mapping} is not supported by this connector: {reason}")]
    CapabilityMismatch { mapping: String, reason: String },

    /// A single subscribe/unsubscribe call failed.
    #[error("{action} failed for topic [{topic}]: {message}")]
    Subscription {
        action: &'static str,
        topic: String,
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    #[error("processing did not complete within {0:?}")]
    ProcessingTimeout(Duration),

    #[error(transparent)]
    ProtocolTranslation(#[from] TranslationError),

    /// Certificate or client setup failure. Fatal to Initialize.
    #[error("{message}")]
    Initialization {
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    #[error("connector is not connected")]
    NotConnected,

    #[error("publish to [{topic}] failed: {message}")]
    Publish {
        topic: String,
        message: String,
        #[source]
        cause: Option<Cause>,
    },

    #[error("{0}")]
    Registry(String),
}

impl ConnectorError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            cause: None,
        }
    }

    pub fn connection_caused_by<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: message.into(),
            cause: Some(Cause::new(cause)),
        }
    }

    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
            cause: None,
        }
    }

    pub fn subscribe_failed(topic: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Subscription {
            action: "subscribe",
            topic: topic.into(),
            message: cause.to_string(),
            cause: None,
        }
    }

    pub fn unsubscribe_failed(topic: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Subscription {
            action: "unsubscribe",
            topic: topic.into(),
            message: cause.to_string(),
            cause: None,
        }
    }

    pub fn publish_failed(topic: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: cause.to_string(),
            cause: None,
        }
    }

    /// Attaches an underlying cause to variants that carry one.
    pub fn with_cause(mut self, new_cause: Cause) -> Self {
        match &mut self {
            Self::Connection { cause, .. }
            | Self::Subscription { cause, .. }
            | Self::Initialization { cause, .. }
            | Self::Publish { cause, .. } => *cause = Some(new_cause),
            _ => {}
        }
        self
    }

    /// Stable class name reported in status messages.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Connection { .. } => "ConnectionError",
            Self::CapabilityMismatch { .. } => "CapabilityMismatchError",
            Self::Subscription { .. } => "SubscriptionError",
            Self::ProcessingTimeout(_) => "ProcessingTimeoutError",
            Self::ProtocolTranslation(_) => "ProtocolTranslationError",
            Self::Initialization { .. } => "InitializationError",
            Self::NotConnected => "NotConnectedError",
            Self::Publish { .. } => "PublishError",
            Self::Registry(_) => "RegistryError",
        }
    }

    pub fn cause(&self) -> Option<&Cause> {
        match self {
            Self::Connection { cause, .. }
            | Self::Subscription { cause, .. }
            | Self::Initialization { cause, .. }
            | Self::Publish { cause, .. } => cause.as_ref(),
            _ => None,
        }
    }

    /// Formats the error the way it is stored in the connector status:
    /// `" --- <Class>: <message>"`, followed by
    /// `" --- Caused by <CauseClass>: <message>"` when a cause exists.
    pub fn status_message(&self) -> String {
        let mut message = format!(" --- {}: {}", self.class_name(), self);
        if let Some(cause) = self.cause() {
            message.push_str(&format!(" --- Caused by {}: {}", cause.class(), cause));
        }
        message
    }
}
