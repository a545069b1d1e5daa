//! provisio-core - Instance lifecycle orchestration
//!
//! This crate turns instance creation and destruction requests into
//! asynchronous event streams, driving a pluggable compute API and waiting
//! for instances to converge with a bounded poller. It has no cloud SDK
//! dependencies; providers implement [`ComputeApi`].
//!
//! ## Modules
//!
//! - [`compute`]: Compute API trait and instance types
//! - [`error`]: Workflow error taxonomy
//! - [`events`]: Lifecycle events and the consumer-side stream
//! - [`observer`]: Per-event hooks (tracing by default)
//! - [`provisioner`]: Creation and destruction workflows
//! - [`request`]: Creation requests and the launch call derived from them
//! - [`tags`]: Tag ordering
//! - [`task`]: Task types and dispatch
//! - [`wait`]: Bounded polling with an injectable sleeper

pub mod compute;
pub mod error;
pub mod events;
pub mod observer;
pub mod provisioner;
pub mod request;
pub mod tags;
pub mod task;
pub mod wait;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types
pub use compute::{ComputeApi, Instance, InstanceState, InstanceStateChange};
pub use error::{ErrorKind, ProvisionError};
pub use events::{EventStream, LifecycleEvent, Step, Workflow};
pub use observer::{EventContext, EventObserver, NoopObserver, TracingObserver};
pub use provisioner::{Provisioner, ProvisionerBuilder};
pub use request::{CreateInstanceRequest, LaunchSpec};
pub use tags::{Tag, sorted_tags};
pub use task::TaskType;
pub use wait::{Sleeper, TokioSleeper, WaitConfig, WaitError, wait_until};
