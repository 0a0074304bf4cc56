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

//! Thread-safe holder of a connector's status with change-notification gating.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use log::{debug, error};
use parking_lot::Mutex;

use crate::error::ConnectorError;
use crate::status::{ConnectorStatus, ConnectorStatusEvent};

/// Invoked with a copy of the status after every notified transition.
pub type StatusCallback = Arc<dyn Fn(&ConnectorStatusEvent) + Send + Sync>;

struct StateInner {
    connected: bool,
    event: ConnectorStatusEvent,
    previous_status: ConnectorStatus,
}

pub struct ConnectionStateManager {
    label: String,
    inner: Mutex<StateInner>,
    callback: Mutex<Option<StatusCallback>>,
}

impl ConnectionStateManager {
    pub fn new(connector_name: impl Into<String>, connector_identifier: impl Into<String>) -> Self {
        let event = ConnectorStatusEvent::unknown(connector_name, connector_identifier);
        Self {
            label: event.connector_name.clone(),
            inner: Mutex::new(StateInner {
                connected: false,
                previous_status: event.status,
                event,
            }),
            callback: Mutex::new(None),
        }
    }

    pub fn set_callback(&self, callback: StatusCallback) {
        *self.callback.lock() = Some(callback);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    pub fn status(&self) -> ConnectorStatus {
        self.inner.lock().event.status
    }

    pub fn snapshot(&self) -> ConnectorStatusEvent {
        self.inner.lock().event.clone()
    }

    /// Flips the connected flag and moves to CONNECTED/DISCONNECTED.
    /// Redundant calls do nothing.
    pub fn set_connected(&self, connected: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.connected == connected {
                return;
            }
            inner.connected = connected;
        }
        let status = if connected {
            ConnectorStatus::Connected
        } else {
            ConnectorStatus::Disconnected
        };
        self.update_status(status, true, true);
    }

    /// Applies `status`, notifying only when it differs from the last
    /// notified status.
    pub fn update_status(&self, status: ConnectorStatus, clear_message: bool, notify: bool) {
        let notification = {
            let mut inner = self.inner.lock();
            inner.event.status = status;
            inner.event.updated_at = Utc::now();
            if clear_message {
                inner.event.message.clear();
            }
            if notify && status != inner.previous_status {
                inner.previous_status = status;
                Some(inner.event.clone())
            } else {
                None
            }
        };
        if let Some(event) = notification {
            self.notify(&event);
        }
    }

    /// Moves to FAILED with the formatted error chain. Always notifies.
    pub fn update_status_with_error(&self, err: &ConnectorError) {
        let event = {
            let mut inner = self.inner.lock();
            inner.event.status = ConnectorStatus::Failed;
            inner.event.message = err.status_message();
            inner.event.updated_at = Utc::now();
            inner.previous_status = ConnectorStatus::Failed;
            inner.event.clone()
        };
        self.notify(&event);
    }

    fn notify(&self, event: &ConnectorStatusEvent) {
        let callback = self.callback.lock().clone();
        let Some(callback) = callback else {
            return;
        };
        debug!("[{}] Status changed to {}", self.label, event.status);
        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
            error!(
                "[{}] Status callback panicked while handling {}",
                self.label, event.status
            );
        }
    }
}
