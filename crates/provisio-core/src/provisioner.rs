//! Instance lifecycle workflows
//!
//! `Provisioner` turns a creation request or an instance identifier into an
//! [`EventStream`]. Each call spawns one task that drives the compute API
//! through the required calls, waits for the instance to converge, and
//! reports progress on the stream. The stream is returned before any provider
//! call is made.

use crate::compute::{ComputeApi, InstanceState};
use crate::error::ProvisionError;
use crate::events::{Emitter, EventStream, Step, Workflow};
use crate::observer::{EventObserver, TracingObserver};
use crate::request::{CreateInstanceRequest, LaunchSpec};
use crate::tags::{Tag, sorted_tags};
use crate::wait::{Sleeper, TokioSleeper, WaitConfig, wait_until};
use garde::Validate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Orchestrates create/destroy workflows against a compute API.
///
/// Stateless between calls: concurrent workflows share only the compute API
/// handle, which must itself be safe for concurrent use.
pub struct Provisioner<C> {
    compute: Arc<C>,
    observer: Arc<dyn EventObserver>,
    sleeper: Arc<dyn Sleeper>,
    wait: WaitConfig,
    cancel: CancellationToken,
}

impl<C> Clone for Provisioner<C> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            observer: Arc::clone(&self.observer),
            sleeper: Arc::clone(&self.sleeper),
            wait: self.wait,
            cancel: self.cancel.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Provisioner<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("wait", &self.wait)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Provisioner`]
///
/// Defaults: `TracingObserver`, `TokioSleeper`, `WaitConfig::instance_state()`
/// and a fresh cancellation token.
pub struct ProvisionerBuilder<C> {
    compute: Arc<C>,
    observer: Arc<dyn EventObserver>,
    sleeper: Arc<dyn Sleeper>,
    wait: WaitConfig,
    cancel: CancellationToken,
}

impl<C> ProvisionerBuilder<C> {
    pub fn observer(mut self, observer: Arc<dyn EventObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    /// Token whose cancellation aborts every workflow started afterwards
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Provisioner<C> {
        Provisioner {
            compute: self.compute,
            observer: self.observer,
            sleeper: self.sleeper,
            wait: self.wait,
            cancel: self.cancel,
        }
    }
}

impl<C: ComputeApi + 'static> Provisioner<C> {
    /// Create a provisioner with default observer, sleeper and wait policy
    pub fn new(compute: Arc<C>) -> Self {
        Self::builder(compute).build()
    }

    pub fn builder(compute: Arc<C>) -> ProvisionerBuilder<C> {
        ProvisionerBuilder {
            compute,
            observer: Arc::new(TracingObserver),
            sleeper: Arc::new(TokioSleeper),
            wait: WaitConfig::instance_state(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn compute(&self) -> &Arc<C> {
        &self.compute
    }

    pub fn wait_config(&self) -> WaitConfig {
        self.wait
    }

    /// Cancel every in-flight workflow started by this provisioner.
    ///
    /// The provisioner-wide token stays cancelled: every later
    /// `create_instance`/`destroy_instance` call ends with a `Cancelled`
    /// error event. Build a new provisioner to start over.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Start the creation workflow.
    ///
    /// The request is validated first; a failing request returns
    /// `ProvisionError::Validation` without spawning a task or emitting any
    /// event. Must be called from within a tokio runtime.
    pub fn create_instance(
        &self,
        request: CreateInstanceRequest,
    ) -> Result<EventStream, ProvisionError> {
        request
            .validate()
            .map_err(|report| ProvisionError::Validation(report.to_string()))?;

        let (emitter, stream) = Emitter::channel(Workflow::Create, None, Arc::clone(&self.observer));
        let run = self.workflow_run();
        tokio::spawn(run.create(request, emitter));
        Ok(stream)
    }

    /// Start the destruction workflow for `instance_id`.
    ///
    /// An empty identifier is rejected with `ProvisionError::Validation`
    /// before any task is spawned. Must be called from within a tokio runtime.
    pub fn destroy_instance(
        &self,
        instance_id: impl Into<String>,
    ) -> Result<EventStream, ProvisionError> {
        let instance_id = instance_id.into();
        if instance_id.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "instance id cannot be empty".to_string(),
            ));
        }

        let (emitter, stream) = Emitter::channel(
            Workflow::Destroy,
            Some(instance_id.clone()),
            Arc::clone(&self.observer),
        );
        let run = self.workflow_run();
        tokio::spawn(run.destroy(instance_id, emitter));
        Ok(stream)
    }

    fn workflow_run(&self) -> WorkflowRun<C> {
        WorkflowRun {
            compute: Arc::clone(&self.compute),
            sleeper: Arc::clone(&self.sleeper),
            wait: self.wait,
            cancel: self.cancel.child_token(),
        }
    }
}

/// Failure of a workflow step, tagged with the step
type StepResult<T> = Result<T, (Step, ProvisionError)>;

trait AtStep<T> {
    fn at(self, step: Step) -> StepResult<T>;
}

impl<T> AtStep<T> for Result<T, ProvisionError> {
    fn at(self, step: Step) -> StepResult<T> {
        self.map_err(|e| (step, e))
    }
}

/// Everything a single spawned workflow owns
struct WorkflowRun<C> {
    compute: Arc<C>,
    sleeper: Arc<dyn Sleeper>,
    wait: WaitConfig,
    cancel: CancellationToken,
}

impl<C: ComputeApi> WorkflowRun<C> {
    async fn create(self, request: CreateInstanceRequest, mut events: Emitter) {
        events.started().await;
        match self.provision(&request, &mut events).await {
            Ok(instance_id) => events.completed(instance_id).await,
            Err((step, error)) => events.failed(step, error).await,
        }
    }

    async fn destroy(self, instance_id: String, events: Emitter) {
        events.started().await;
        match self.decommission(&instance_id).await {
            Ok(()) => events.completed(instance_id).await,
            Err((step, error)) => events.failed(step, error).await,
        }
    }

    /// Submit → wait for running → tag
    async fn provision(
        &self,
        request: &CreateInstanceRequest,
        events: &mut Emitter,
    ) -> StepResult<String> {
        let instance_id = self.submit(request).await.at(Step::Submit)?;
        events.attach_instance(&instance_id);

        self.await_state(&instance_id, InstanceState::Running)
            .await
            .at(Step::AwaitRunning)?;

        self.apply_tags(&instance_id, &request.tags)
            .await
            .at(Step::Tag)?;

        Ok(instance_id)
    }

    /// Terminate → wait for terminated
    async fn decommission(&self, instance_id: &str) -> StepResult<()> {
        self.terminate(instance_id).await.at(Step::Terminate)?;

        self.await_state(instance_id, InstanceState::Terminated)
            .await
            .at(Step::AwaitTerminated)
    }

    fn ensure_active(&self) -> Result<(), ProvisionError> {
        if self.cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        Ok(())
    }

    async fn submit(&self, request: &CreateInstanceRequest) -> Result<String, ProvisionError> {
        self.ensure_active()?;

        let spec = LaunchSpec::from(request);
        info!(
            image_id = %spec.image_id,
            instance_type = %spec.instance_type,
            "Launching instance"
        );

        let instances = self
            .compute
            .run_instance(&spec)
            .await
            .map_err(ProvisionError::Provider)?;
        let instance = exactly_one(instances, "RunInstances")?;

        info!(instance_id = %instance.instance_id, "Instance launched");
        Ok(instance.instance_id)
    }

    async fn terminate(&self, instance_id: &str) -> Result<(), ProvisionError> {
        self.ensure_active()?;

        info!(instance_id = %instance_id, "Terminating instance");
        let changes = self
            .compute
            .terminate_instance(instance_id)
            .await
            .map_err(ProvisionError::Provider)?;

        // Anything but exactly one transitioning instance means the id did
        // not name a single instance
        if changes.len() != 1 {
            warn!(instance_id = %instance_id, count = changes.len(), "Terminate did not affect exactly one instance");
            return Err(ProvisionError::InvalidRequest {
                instance_id: instance_id.to_string(),
            });
        }
        Ok(())
    }

    async fn await_state(
        &self,
        instance_id: &str,
        target: InstanceState,
    ) -> Result<(), ProvisionError> {
        let resource = format!("instance {instance_id} {target}");
        info!(
            instance_id = %instance_id,
            state = %target,
            budget_secs = self.wait.budget().as_secs(),
            "Waiting for instance state"
        );

        let compute = &self.compute;
        let target = &target;
        let attempts = wait_until(
            self.wait,
            self.sleeper.as_ref(),
            Some(&self.cancel),
            move || async move {
                let instances = compute
                    .describe_instance(instance_id)
                    .await
                    .map_err(ProvisionError::Provider)?;
                let instance = exactly_one(instances, "DescribeInstances")?;
                debug!(instance_id = %instance_id, state = %instance.state, "Observed instance state");
                Ok(instance.state == *target)
            },
            &resource,
        )
        .await
        .map_err(|e| ProvisionError::from_wait(e, resource.clone(), self.wait))?;

        info!(instance_id = %instance_id, state = %target, attempts, "Instance reached state");
        Ok(())
    }

    async fn apply_tags(
        &self,
        instance_id: &str,
        tags: &HashMap<String, String>,
    ) -> Result<(), ProvisionError> {
        self.ensure_active()?;

        let tags: Vec<Tag> = sorted_tags(tags);
        debug!(instance_id = %instance_id, count = tags.len(), "Tagging instance");
        self.compute
            .create_tags(instance_id, &tags)
            .await
            .map_err(ProvisionError::Provider)
    }
}

/// Enforce the one-resource-per-call invariant
fn exactly_one<T>(items: Vec<T>, operation: &'static str) -> Result<T, ProvisionError> {
    match <[T; 1]>::try_from(items) {
        Ok([item]) => Ok(item),
        Err(items) => Err(ProvisionError::UnexpectedResponse {
            operation,
            count: items.len(),
        }),
    }
}
