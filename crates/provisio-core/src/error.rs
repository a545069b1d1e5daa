//! Workflow errors
//!
//! Every failure is terminal for the workflow that hit it. Only "not yet
//! satisfied" is retried (by the poller); errors never are.

use crate::task::TaskType;
use crate::wait::{WaitConfig, WaitError};
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the provisioner, either directly (before a workflow
/// starts) or inside a `LifecycleEvent::Error`.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The request failed its precondition checks; no provider call was made
    #[error("invalid request: {0}")]
    Validation(String),

    /// A provider call succeeded but did not describe exactly one instance
    #[error("unexpected response from {operation}: expected exactly one instance, got {count}")]
    UnexpectedResponse {
        operation: &'static str,
        count: usize,
    },

    /// A destroy-by-identifier call did not affect exactly one instance
    #[error("identifier '{instance_id}' did not match exactly one instance")]
    InvalidRequest { instance_id: String },

    /// A compute API call returned an error
    #[error("provider call failed: {0:#}")]
    Provider(#[source] anyhow::Error),

    /// The poller used up its attempt budget
    #[error("timed out waiting for {resource} after {attempts} attempts ({}s budget)", .budget.as_secs())]
    Timeout {
        resource: String,
        attempts: u32,
        budget: Duration,
    },

    /// The provisioner's cancellation token fired
    #[error("workflow cancelled")]
    Cancelled,

    /// No handler exists for the requested task type
    #[error("task '{0}' is not supported by this provisioner")]
    UnsupportedTask(TaskType),

    /// The event stream closed without a terminal event
    #[error("workflow ended without reporting an outcome")]
    Interrupted,
}

/// Copyable classification of a [`ProvisionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    UnexpectedResponse,
    InvalidRequest,
    Provider,
    Timeout,
    Cancelled,
    UnsupportedTask,
    Interrupted,
}

impl ProvisionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::Validation(_) => ErrorKind::Validation,
            ProvisionError::UnexpectedResponse { .. } => ErrorKind::UnexpectedResponse,
            ProvisionError::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            ProvisionError::Provider(_) => ErrorKind::Provider,
            ProvisionError::Timeout { .. } => ErrorKind::Timeout,
            ProvisionError::Cancelled => ErrorKind::Cancelled,
            ProvisionError::UnsupportedTask(_) => ErrorKind::UnsupportedTask,
            ProvisionError::Interrupted => ErrorKind::Interrupted,
        }
    }

    /// Convert a poller failure, keeping probe errors as they are.
    pub(crate) fn from_wait(
        err: WaitError<ProvisionError>,
        resource: String,
        config: WaitConfig,
    ) -> Self {
        match err {
            WaitError::Probe(e) => e,
            WaitError::Cancelled => ProvisionError::Cancelled,
            WaitError::Exhausted { attempts } => ProvisionError::Timeout {
                resource,
                attempts,
                budget: config.budget(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ProvisionError::UnexpectedResponse {
                operation: "RunInstances",
                count: 2
            }
            .to_string(),
            "unexpected response from RunInstances: expected exactly one instance, got 2"
        );
        assert_eq!(
            ProvisionError::InvalidRequest {
                instance_id: "i-404".to_string()
            }
            .to_string(),
            "identifier 'i-404' did not match exactly one instance"
        );
        assert_eq!(
            ProvisionError::UnsupportedTask(TaskType::UserData).to_string(),
            "task 'user-data' is not supported by this provisioner"
        );
    }

    #[test]
    fn provider_error_keeps_context_chain() {
        let err = ProvisionError::Provider(
            anyhow::anyhow!("connection reset").context("Failed to describe instance"),
        );
        assert_eq!(
            err.to_string(),
            "provider call failed: Failed to describe instance: connection reset"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn wait_errors_map_to_kinds() {
        let config = WaitConfig::instance_state();

        let err = ProvisionError::from_wait(
            WaitError::Exhausted { attempts: 30 },
            "instance i-1 running".to_string(),
            config,
        );
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(
            err.to_string(),
            "timed out waiting for instance i-1 running after 30 attempts (300s budget)"
        );

        let err = ProvisionError::from_wait(WaitError::Cancelled, String::new(), config);
        assert_eq!(err.kind(), ErrorKind::Cancelled);

        let err = ProvisionError::from_wait(
            WaitError::Probe(ProvisionError::UnexpectedResponse {
                operation: "DescribeInstances",
                count: 0,
            }),
            String::new(),
            config,
        );
        assert_eq!(err.kind(), ErrorKind::UnexpectedResponse);
    }
}
