//! Compute API capability consumed by the workflows
//!
//! The orchestration engine never talks to a cloud SDK directly; it drives an
//! implementation of [`ComputeApi`] supplied at construction time. This keeps
//! the workflows testable without hitting a real provider.

use crate::request::LaunchSpec;
use crate::tags::Tag;
use anyhow::Result;
use std::fmt;
use std::future::Future;

/// Lifecycle state of a compute instance as reported by the provider.
///
/// Only the states the workflows wait for are modelled; everything else
/// (`shutting-down`, `stopping`, ...) passes through as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Pending,
    Running,
    Terminated,
    Other(String),
}

impl InstanceState {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceState::Pending => "pending",
            InstanceState::Running => "running",
            InstanceState::Terminated => "terminated",
            InstanceState::Other(s) => s,
        }
    }
}

impl From<&str> for InstanceState {
    fn from(s: &str) -> Self {
        match s {
            "pending" => InstanceState::Pending,
            "running" => InstanceState::Running,
            "terminated" => InstanceState::Terminated,
            other => InstanceState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider-owned instance as observed by a read call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub instance_id: String,
    pub state: InstanceState,
}

impl Instance {
    pub fn new(instance_id: impl Into<String>, state: InstanceState) -> Self {
        Self {
            instance_id: instance_id.into(),
            state,
        }
    }
}

/// One instance transitioning as the result of a terminate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceStateChange {
    pub instance_id: String,
    pub previous_state: InstanceState,
    pub current_state: InstanceState,
}

/// Provider operations the workflows depend on.
///
/// Implementations return the raw result lists; the workflows enforce that
/// exactly one instance is created, described or terminated per call.
/// Implementations are shared between concurrent workflows and must be safe
/// for concurrent use.
pub trait ComputeApi: Send + Sync {
    /// Launch a single instance described by `spec`
    fn run_instance(&self, spec: &LaunchSpec) -> impl Future<Output = Result<Vec<Instance>>> + Send;

    /// Describe the instance with the given identifier
    fn describe_instance(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Vec<Instance>>> + Send;

    /// Request termination of the instance with the given identifier
    fn terminate_instance(
        &self,
        instance_id: &str,
    ) -> impl Future<Output = Result<Vec<InstanceStateChange>>> + Send;

    /// Apply tags to the instance, in the order given
    fn create_tags(&self, instance_id: &str, tags: &[Tag]) -> impl Future<Output = Result<()>> + Send;
}
