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

//! Fixed-rate periodic maintenance.

use std::panic::AssertUnwindSafe;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, warn};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::error::ConnectorError;

#[async_trait]
pub trait Housekeeping: Send + Sync + 'static {
    fn label(&self) -> &str;

    async fn tick(&self) -> Result<(), ConnectorError>;
}

/// Runs `target.tick()` every `period`, first tick one period from now.
///
/// Late ticks are caught up so the nominal schedule never drifts. Errors and
/// panics inside a tick are logged and the schedule continues. The loop ends
/// once the target is dropped.
pub fn spawn<T: Housekeeping>(target: Weak<T>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
        loop {
            ticker.tick().await;
            let Some(target) = target.upgrade() else {
                debug!("Housekeeping target dropped, stopping");
                break;
            };
            match AssertUnwindSafe(target.tick()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{}] Housekeeping tick failed: {e}", target.label()),
                Err(_) => error!("[{}] Housekeeping tick panicked", target.label()),
            }
        }
    })
}
