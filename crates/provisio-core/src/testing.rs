//! Test fakes for the compute API and the poller's sleeper.
//!
//! Available under `cfg(test)` and, for downstream test suites, behind the
//! `test-utils` feature.

use crate::compute::{ComputeApi, Instance, InstanceState, InstanceStateChange};
use crate::request::LaunchSpec;
use crate::tags::Tag;
use crate::wait::Sleeper;
use anyhow::{Result, anyhow};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Sleeper that returns immediately and records every requested delay
#[derive(Debug, Default)]
pub struct InstantSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for InstantSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleeps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Box::pin(std::future::ready(()))
    }
}

/// A call observed by [`FakeCompute`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RunInstance(LaunchSpec),
    DescribeInstance(String),
    TerminateInstance(String),
    CreateTags(String, Vec<Tag>),
}

#[derive(Debug)]
struct FakeInstance {
    state: InstanceState,
    /// State the instance moves to once it has been probed enough times
    target: Option<InstanceState>,
    probes: u32,
}

#[derive(Debug)]
struct FakeState {
    next_id: u32,
    instances: HashMap<String, FakeInstance>,
    calls: Vec<Call>,
    transition_on_probe: Option<u32>,
    launch_count: usize,
    describe_count: Option<usize>,
    terminate_affected: Option<usize>,
    fail_launch: Option<String>,
    fail_describe: Option<String>,
    fail_terminate: Option<String>,
    fail_tags: Option<String>,
}

/// In-memory compute provider.
///
/// Launched instances start `pending` and become `running` on the n-th
/// describe (see [`FakeCompute::transition_on_probe`]); terminated instances
/// go `shutting-down` and become `terminated` the same way. Ids are assigned
/// as `i-001`, `i-002`, ...
#[derive(Debug)]
pub struct FakeCompute {
    state: Mutex<FakeState>,
}

impl Default for FakeCompute {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCompute {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 0,
                instances: HashMap::new(),
                calls: Vec::new(),
                transition_on_probe: Some(1),
                launch_count: 1,
                describe_count: None,
                terminate_affected: None,
                fail_launch: None,
                fail_describe: None,
                fail_terminate: None,
                fail_tags: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn configure(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.lock());
        self
    }

    /// Pending transitions complete on the `n`-th describe call
    pub fn transition_on_probe(self, n: u32) -> Self {
        self.configure(|s| s.transition_on_probe = Some(n))
    }

    /// Instances never leave their current state
    pub fn never_transition(self) -> Self {
        self.configure(|s| s.transition_on_probe = None)
    }

    /// Seed an existing instance
    pub fn with_instance(self, instance_id: &str, state: InstanceState) -> Self {
        self.configure(|s| {
            s.instances.insert(
                instance_id.to_string(),
                FakeInstance {
                    state,
                    target: None,
                    probes: 0,
                },
            );
        })
    }

    /// Number of instances a launch reports
    pub fn launch_count(self, count: usize) -> Self {
        self.configure(|s| s.launch_count = count)
    }

    /// Number of copies a describe reports for a known instance
    pub fn describe_count(self, count: usize) -> Self {
        self.configure(|s| s.describe_count = Some(count))
    }

    /// Number of state changes a terminate reports, regardless of the id
    pub fn terminate_affected(self, count: usize) -> Self {
        self.configure(|s| s.terminate_affected = Some(count))
    }

    pub fn fail_launch(self, message: &str) -> Self {
        self.configure(|s| s.fail_launch = Some(message.to_string()))
    }

    pub fn fail_describe(self, message: &str) -> Self {
        self.configure(|s| s.fail_describe = Some(message.to_string()))
    }

    pub fn fail_terminate(self, message: &str) -> Self {
        self.configure(|s| s.fail_terminate = Some(message.to_string()))
    }

    pub fn fail_tags(self, message: &str) -> Self {
        self.configure(|s| s.fail_tags = Some(message.to_string()))
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of describe calls made so far
    pub fn describe_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::DescribeInstance(_)))
            .count()
    }

    /// Every tagging call made so far
    pub fn tag_calls(&self) -> Vec<(String, Vec<Tag>)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::CreateTags(id, tags) => Some((id.clone(), tags.clone())),
                _ => None,
            })
            .collect()
    }

    /// Current state of an instance, if known
    pub fn instance_state(&self, instance_id: &str) -> Option<InstanceState> {
        self.lock()
            .instances
            .get(instance_id)
            .map(|i| i.state.clone())
    }
}

impl ComputeApi for FakeCompute {
    async fn run_instance(&self, spec: &LaunchSpec) -> Result<Vec<Instance>> {
        let mut state = self.lock();
        state.calls.push(Call::RunInstance(spec.clone()));
        if let Some(message) = &state.fail_launch {
            return Err(anyhow!("{message}"));
        }

        let mut launched = Vec::with_capacity(state.launch_count);
        for _ in 0..state.launch_count {
            state.next_id += 1;
            let instance_id = format!("i-{:03}", state.next_id);
            state.instances.insert(
                instance_id.clone(),
                FakeInstance {
                    state: InstanceState::Pending,
                    target: Some(InstanceState::Running),
                    probes: 0,
                },
            );
            launched.push(Instance::new(instance_id, InstanceState::Pending));
        }
        Ok(launched)
    }

    async fn describe_instance(&self, instance_id: &str) -> Result<Vec<Instance>> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::DescribeInstance(instance_id.to_string()));
        if let Some(message) = &state.fail_describe {
            return Err(anyhow!("{message}"));
        }

        let transition_on_probe = state.transition_on_probe;
        let count = state.describe_count.unwrap_or(1);
        let Some(instance) = state.instances.get_mut(instance_id) else {
            return Ok(Vec::new());
        };

        instance.probes += 1;
        if let Some(n) = transition_on_probe {
            if instance.probes >= n {
                if let Some(target) = instance.target.take() {
                    instance.state = target;
                }
            }
        }

        Ok(vec![Instance::new(instance_id, instance.state.clone()); count])
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<Vec<InstanceStateChange>> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::TerminateInstance(instance_id.to_string()));
        if let Some(message) = &state.fail_terminate {
            return Err(anyhow!("{message}"));
        }

        let forced = state.terminate_affected;
        let change = state.instances.get_mut(instance_id).map(|instance| {
            let previous_state = std::mem::replace(
                &mut instance.state,
                InstanceState::Other("shutting-down".to_string()),
            );
            instance.target = Some(InstanceState::Terminated);
            instance.probes = 0;
            InstanceStateChange {
                instance_id: instance_id.to_string(),
                previous_state,
                current_state: instance.state.clone(),
            }
        });

        let affected = forced.unwrap_or(usize::from(change.is_some()));
        let change = change.unwrap_or_else(|| InstanceStateChange {
            instance_id: instance_id.to_string(),
            previous_state: InstanceState::Running,
            current_state: InstanceState::Other("shutting-down".to_string()),
        });
        Ok(vec![change; affected])
    }

    async fn create_tags(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        let mut state = self.lock();
        state
            .calls
            .push(Call::CreateTags(instance_id.to_string(), tags.to_vec()));
        if let Some(message) = &state.fail_tags {
            return Err(anyhow!("{message}"));
        }
        Ok(())
    }
}
