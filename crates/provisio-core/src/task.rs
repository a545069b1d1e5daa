//! Task types and their handlers
//!
//! A machine request lists the tasks it goes through. Dispatch is a closed
//! `match` over [`TaskType`]: adding a task type forces every provisioner to
//! decide how to handle it.

use crate::compute::ComputeApi;
use crate::error::ProvisionError;
use crate::events::LifecycleEvent;
use crate::provisioner::Provisioner;
use crate::request::CreateInstanceRequest;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// A step in provisioning a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Generate an SSH key pair for the machine
    SshKeyGen,
    /// Create the compute instance
    CreateInstance,
    /// Deliver user data to the machine
    UserData,
    /// Install the Docker engine
    InstallDockerEngine,
}

impl TaskType {
    /// Tasks a canonical machine request runs, in order
    pub const STANDARD_WORKFLOW: [TaskType; 4] = [
        TaskType::SshKeyGen,
        TaskType::CreateInstance,
        TaskType::UserData,
        TaskType::InstallDockerEngine,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::SshKeyGen => "ssh-key-gen",
            TaskType::CreateInstance => "create-instance",
            TaskType::UserData => "user-data",
            TaskType::InstallDockerEngine => "install-docker-engine",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<C: ComputeApi + 'static> Provisioner<C> {
    /// Whether this provisioner has a handler for `task`
    pub fn supports(&self, task: TaskType) -> bool {
        match task {
            TaskType::CreateInstance => true,
            TaskType::SshKeyGen | TaskType::UserData | TaskType::InstallDockerEngine => false,
        }
    }

    /// Run the handler for `task`, forwarding its events into `sink`.
    ///
    /// Returns once the task's own event stream has closed. Unsupported tasks
    /// return `ProvisionError::UnsupportedTask` without touching the provider.
    /// If `sink` is closed, the remaining events are drained and discarded so
    /// the workflow still runs to completion.
    pub async fn run_task(
        &self,
        task: TaskType,
        request: CreateInstanceRequest,
        sink: mpsc::Sender<LifecycleEvent>,
    ) -> Result<(), ProvisionError> {
        match task {
            TaskType::CreateInstance => {
                info!(task = %task, image_id = %request.image_id, "Running task");
                let mut events = self.create_instance(request)?;
                while let Some(event) = events.recv().await {
                    if sink.send(event).await.is_err() {
                        debug!(task = %task, "Task event sink closed, discarding event");
                    }
                }
                Ok(())
            }
            TaskType::SshKeyGen | TaskType::UserData | TaskType::InstallDockerEngine => {
                Err(ProvisionError::UnsupportedTask(task))
            }
        }
    }
}
