//! Completion polling for long-running Healthcare API operations.
//!
//! An operation moves `Requested -> Polling -> Succeeded | Failed`. Only the
//! "not done yet" observation is retried; a failed status fetch is terminal.
//! The loop is bounded by [`PollPolicy`] and aborted by a [`CancelToken`];
//! both also apply while a status fetch is in flight.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::deid::cancel::CancelToken;
use crate::healthcare::api::HealthcareApi;
use crate::healthcare::error::HealthcareError;
use crate::healthcare::models::Operation;

/// Bounds on how long an operation is polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: None,
            timeout: Some(Duration::from_secs(6 * 60 * 60)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Requested,
    Polling { attempt: u32 },
    Succeeded(Operation),
    Failed { code: i32, message: String },
}

impl PollState {
    /// Transition on one fetched operation status. Terminal states never move.
    pub fn advance(self, fetched: &Operation) -> PollState {
        let attempt = match &self {
            PollState::Requested => 1,
            PollState::Polling { attempt } => attempt + 1,
            _ => return self,
        };

        if !fetched.done {
            return PollState::Polling { attempt };
        }
        match &fetched.error {
            Some(error) => PollState::Failed {
                code: error.code,
                message: error.message.clone(),
            },
            None => PollState::Succeeded(fetched.clone()),
        }
    }

    fn attempts(&self) -> u32 {
        match self {
            PollState::Polling { attempt } => *attempt,
            _ => 0,
        }
    }
}

/// Drives one operation to a terminal state
#[derive(Clone)]
pub struct OperationPoller {
    api: Arc<dyn HealthcareApi>,
    policy: PollPolicy,
}

impl OperationPoller {
    pub fn new(api: Arc<dyn HealthcareApi>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Poll `operation` until it is done, returning the final operation on success.
    pub async fn wait(
        &self,
        operation: &Operation,
        cancel: &CancelToken,
    ) -> Result<Operation, HealthcareError> {
        let deadline = self.policy.timeout.map(|t| Instant::now() + t);
        let mut state = PollState::Requested;

        loop {
            if cancel.is_cancelled() {
                debug!("Stopped polling {} on cancellation", operation.name);
                return Err(HealthcareError::Cancelled);
            }

            let fetch = before_deadline(deadline, self.api.get_operation(&operation.name));
            let fetched = tokio::select! {
                fetched = fetch => match fetched {
                    Some(fetched) => fetched?,
                    None => {
                        warn!("Deadline passed while fetching {}", operation.name);
                        return Err(HealthcareError::PollTimeout {
                            name: operation.name.clone(),
                            attempts: state.attempts(),
                        });
                    }
                },
                _ = cancel.cancelled() => {
                    debug!("Stopped polling {} on cancellation", operation.name);
                    return Err(HealthcareError::Cancelled);
                }
            };
            state = state.advance(&fetched);

            match state {
                PollState::Succeeded(op) => {
                    debug!("Operation {} finished", op.name);
                    return Ok(op);
                }
                PollState::Failed { code, message } => {
                    warn!("Operation {} failed: {}", operation.name, message);
                    return Err(HealthcareError::OperationFailed {
                        name: operation.name.clone(),
                        code,
                        message,
                    });
                }
                PollState::Requested | PollState::Polling { .. } => {}
            }

            let attempts = state.attempts();
            if self.policy.max_attempts.is_some_and(|max| attempts >= max)
                || deadline.is_some_and(|d| Instant::now() + self.policy.interval > d)
            {
                return Err(HealthcareError::PollTimeout {
                    name: operation.name.clone(),
                    attempts,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.policy.interval) => {}
                _ = cancel.cancelled() => {
                    debug!("Stopped polling {} on cancellation", operation.name);
                    return Err(HealthcareError::Cancelled);
                }
            }
        }
    }
}

/// `None` when `deadline` passes before `fut` resolves
async fn before_deadline<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}
