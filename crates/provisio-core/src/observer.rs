//! Event observers
//!
//! An observer is invoked for every lifecycle event just before it is sent to
//! the consumer. Logging goes through an injected observer rather than a
//! process-wide logger.

use crate::events::{LifecycleEvent, Workflow};
use tracing::{info, warn};

/// Which workflow (and instance, once known) an event belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventContext {
    pub workflow: Workflow,
    pub instance_id: Option<String>,
}

/// Hook invoked for every event a workflow emits.
///
/// Called from the workflow task; implementations must not block.
#[cfg_attr(test, mockall::automock)]
pub trait EventObserver: Send + Sync {
    fn on_event(&self, context: &EventContext, event: &LifecycleEvent);
}

/// Observer that logs events with `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, context: &EventContext, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Started => {
                info!(
                    workflow = %context.workflow,
                    instance_id = ?context.instance_id,
                    "Workflow started"
                );
            }
            LifecycleEvent::Completed { instance_id } => {
                info!(workflow = %context.workflow, instance_id = %instance_id, "Workflow completed");
            }
            LifecycleEvent::Error { step, error } => {
                warn!(
                    workflow = %context.workflow,
                    instance_id = ?context.instance_id,
                    step = %step,
                    kind = ?error.kind(),
                    error = %error,
                    "Workflow failed"
                );
            }
        }
    }
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl EventObserver for NoopObserver {
    fn on_event(&self, _context: &EventContext, _event: &LifecycleEvent) {}
}
