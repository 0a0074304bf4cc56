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

//! Hand-off of inbound broker messages to the processing pipeline and the
//! acknowledgment decision derived from its outcome.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use log::{debug, warn};

use crate::error::ConnectorError;
use crate::mapping::Qos;

/// A broker message as delivered by an adapter. The payload is opaque here.
#[derive(Debug, Clone)]
pub struct ConnectorMessage {
    pub tenant: String,
    pub connector_identifier: String,
    pub topic: String,
    pub key: Option<String>,
    pub payload: Bytes,
    /// QoS the broker delivered the message with.
    pub qos: Qos,
    pub retained: bool,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingFailure {
    pub message: String,
    pub http_status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessingResult {
    pub mapping: Option<String>,
    pub error: Option<ProcessingFailure>,
}

impl ProcessingResult {
    pub fn success(mapping: impl Into<String>) -> Self {
        Self {
            mapping: Some(mapping.into()),
            error: None,
        }
    }

    pub fn failure(
        mapping: impl Into<String>,
        message: impl Into<String>,
        http_status: Option<u16>,
    ) -> Self {
        Self {
            mapping: Some(mapping.into()),
            error: Some(ProcessingFailure {
                message: message.into(),
                http_status,
            }),
        }
    }
}

pub type ProcessingFuture = BoxFuture<'static, Result<Vec<ProcessingResult>, ConnectorError>>;

/// What the pipeline returns for one inbound message.
pub struct DispatchOutcome {
    /// Strongest QoS among the mappings that matched the message.
    pub consolidated_qos: Qos,
    /// Upper bound for `results`; `None` waits indefinitely.
    pub max_processing_time: Option<Duration>,
    pub results: ProcessingFuture,
}

impl DispatchOutcome {
    /// Outcome for a message that matched no mapping.
    pub fn unmatched() -> Self {
        Self {
            consolidated_qos: Qos::AtMostOnce,
            max_processing_time: None,
            results: Box::pin(async { Ok(Vec::new()) }),
        }
    }
}

/// Receives decoded broker messages. Implemented by the processing pipeline.
pub trait MessageDispatchGateway: Send + Sync {
    fn on_message(&self, message: ConnectorMessage) -> DispatchOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckDecision {
    Acknowledge,
    /// Leave the message unacknowledged so the broker redelivers it.
    Withhold(WithholdReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WithholdReason {
    Timeout(Duration),
    ServerError(u16),
    Failed(String),
}

pub fn effective_qos(message_qos: Qos, consolidated_qos: Qos) -> Qos {
    message_qos.min(consolidated_qos)
}

/// Decides whether an inbound message may be acknowledged.
///
/// Effective QoS 0 acknowledges at once and lets processing continue in the
/// background. Otherwise the results are awaited up to the bound: success and
/// client-side failures (status below 500) acknowledge; server-side failures,
/// pipeline errors and timeouts withhold. On timeout the processing future is
/// dropped.
pub async fn settle(message_qos: Qos, outcome: DispatchOutcome) -> AckDecision {
    let DispatchOutcome {
        consolidated_qos,
        max_processing_time,
        results,
    } = outcome;

    if effective_qos(message_qos, consolidated_qos) == Qos::AtMostOnce {
        tokio::spawn(async move {
            if let Err(e) = results.await {
                debug!("Processing of QoS 0 message failed: {e}");
            }
        });
        return AckDecision::Acknowledge;
    }

    let results = match max_processing_time {
        Some(bound) => match tokio::time::timeout(bound, results).await {
            Ok(results) => results,
            Err(_) => {
                let err = ConnectorError::ProcessingTimeout(bound);
                warn!("{err}, message left unacknowledged");
                return AckDecision::Withhold(WithholdReason::Timeout(bound));
            }
        },
        None => results.await,
    };

    match results {
        Ok(results) => decide(&results),
        Err(e) => {
            warn!("Processing failed, message left unacknowledged: {e}");
            AckDecision::Withhold(WithholdReason::Failed(e.to_string()))
        }
    }
}

fn decide(results: &[ProcessingResult]) -> AckDecision {
    let failures: Vec<&ProcessingFailure> =
        results.iter().filter_map(|r| r.error.as_ref()).collect();
    if failures.is_empty() {
        return AckDecision::Acknowledge;
    }
    let highest = failures
        .iter()
        .map(|f| f.http_status.unwrap_or(0))
        .max()
        .unwrap_or(0);
    if highest >= 500 {
        warn!(
            "Processing failed with server error {highest}: {}",
            failures[0].message
        );
        AckDecision::Withhold(WithholdReason::ServerError(highest))
    } else {
        debug!(
            "Processing failed with client error {highest}, acknowledging: {}",
            failures[0].message
        );
        AckDecision::Acknowledge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn outcome<F>(qos: Qos, bound: Option<Duration>, fut: F) -> DispatchOutcome
    where
        F: std::future::Future<Output = Result<Vec<ProcessingResult>, ConnectorError>>
            + Send
            + 'static,
    {
        DispatchOutcome {
            consolidated_qos: qos,
            max_processing_time: bound,
            results: Box::pin(fut),
        }
    }

    #[test]
    fn test_effective_qos_is_minimum() {
        assert_eq!(effective_qos(Qos::ExactlyOnce, Qos::AtLeastOnce), Qos::AtLeastOnce);
        assert_eq!(effective_qos(Qos::AtMostOnce, Qos::ExactlyOnce), Qos::AtMostOnce);
    }

    #[tokio::test(start_paused = true)]
    async fn test_qos0_acks_without_waiting() {
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();
        let decision = settle(
            Qos::AtMostOnce,
            outcome(Qos::ExactlyOnce, None, async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(vec![])
            }),
        )
        .await;
        assert_eq!(decision, AckDecision::Acknowledge);
        assert!(!done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_success_acks() {
        let decision = settle(
            Qos::AtLeastOnce,
            outcome(Qos::AtLeastOnce, Some(Duration::from_secs(1)), async {
                Ok(vec![ProcessingResult::success("m1")])
            }),
        )
        .await;
        assert_eq!(decision, AckDecision::Acknowledge);
    }

    #[tokio::test]
    async fn test_client_error_acks() {
        let decision = settle(
            Qos::AtLeastOnce,
            outcome(Qos::AtLeastOnce, None, async {
                Ok(vec![
                    ProcessingResult::success("m1"),
                    ProcessingResult::failure("m2", "bad request", Some(422)),
                ])
            }),
        )
        .await;
        assert_eq!(decision, AckDecision::Acknowledge);
    }

    #[tokio::test]
    async fn test_server_error_withholds() {
        let decision = settle(
            Qos::ExactlyOnce,
            outcome(Qos::ExactlyOnce, None, async {
                Ok(vec![
                    ProcessingResult::failure("m1", "bad request", Some(400)),
                    ProcessingResult::failure("m2", "unavailable", Some(503)),
                ])
            }),
        )
        .await;
        assert_eq!(decision, AckDecision::Withhold(WithholdReason::ServerError(503)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_withholds() {
        let bound = Duration::from_millis(500);
        let decision = settle(
            Qos::AtLeastOnce,
            outcome(Qos::AtLeastOnce, Some(bound), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(vec![ProcessingResult::success("m1")])
            }),
        )
        .await;
        assert_eq!(decision, AckDecision::Withhold(WithholdReason::Timeout(bound)));
    }

    #[tokio::test]
    async fn test_pipeline_error_withholds() {
        let decision = settle(
            Qos::AtLeastOnce,
            outcome(Qos::AtLeastOnce, None, async {
                Err(ConnectorError::Configuration("no mapping cache".into()))
            }),
        )
        .await;
        assert!(matches!(decision, AckDecision::Withhold(WithholdReason::Failed(_))));
    }

    #[tokio::test]
    async fn test_unmatched_message_acks() {
        let decision = settle(Qos::ExactlyOnce, DispatchOutcome::unmatched()).await;
        assert_eq!(decision, AckDecision::Acknowledge);
    }
}
