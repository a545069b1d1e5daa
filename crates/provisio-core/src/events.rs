//! Lifecycle events emitted by the workflows
//!
//! Each workflow reports progress on its own channel: exactly one `Started`,
//! then exactly one terminal event (`Completed` or `Error`), then the channel
//! closes. Consumers read them through an [`EventStream`].

use crate::error::ProvisionError;
use crate::observer::{EventContext, EventObserver};
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Channel capacity between a workflow task and its consumer.
///
/// A single slot means the workflow blocks on every send until the consumer
/// has taken the previous event: slow consumers throttle the workflow and no
/// event is ever dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Which workflow produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Workflow {
    Create,
    Destroy,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Workflow::Create => "create",
            Workflow::Destroy => "destroy",
        })
    }
}

/// Workflow step that was running when an error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Submitting the create call
    Submit,
    /// Polling until the instance is running
    AwaitRunning,
    /// Applying tags to the created instance
    Tag,
    /// Submitting the terminate call
    Terminate,
    /// Polling until the instance is terminated
    AwaitTerminated,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Submit => "submit",
            Step::AwaitRunning => "await-running",
            Step::Tag => "tag",
            Step::Terminate => "terminate",
            Step::AwaitTerminated => "await-terminated",
        })
    }
}

/// Event reported on a workflow's stream
#[derive(Debug)]
pub enum LifecycleEvent {
    /// The workflow task has started; always first
    Started,
    /// The workflow succeeded; carries the created (or destroyed) instance id
    Completed { instance_id: String },
    /// The workflow failed during `step`
    Error { step: Step, error: ProvisionError },
}

impl LifecycleEvent {
    /// `Completed` and `Error` end a workflow
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LifecycleEvent::Started)
    }
}

/// Consumer side of a workflow's event channel.
///
/// Yields events in send order and ends once the workflow task has emitted
/// its terminal event and dropped the sender.
#[derive(Debug)]
pub struct EventStream {
    inner: ReceiverStream<LifecycleEvent>,
}

impl EventStream {
    pub(crate) fn new(rx: mpsc::Receiver<LifecycleEvent>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Receive the next event, or `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.inner.next().await
    }

    /// Drain the stream and return the workflow outcome.
    ///
    /// `Ok(instance_id)` for `Completed`, the carried error for `Error`, and
    /// `Interrupted` if the channel closed without a terminal event.
    pub async fn join(mut self) -> Result<String, ProvisionError> {
        while let Some(event) = self.recv().await {
            match event {
                LifecycleEvent::Started => {}
                LifecycleEvent::Completed { instance_id } => return Ok(instance_id),
                LifecycleEvent::Error { error, .. } => return Err(error),
            }
        }
        Err(ProvisionError::Interrupted)
    }
}

impl Stream for EventStream {
    type Item = LifecycleEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Producer side of a workflow's event channel.
///
/// Terminal emitters take `self` by value, so nothing can be sent after
/// `Completed`/`Error`, and dropping the emitter (on any exit path) closes
/// the channel.
pub(crate) struct Emitter {
    tx: mpsc::Sender<LifecycleEvent>,
    observer: Arc<dyn EventObserver>,
    context: EventContext,
}

impl Emitter {
    /// Create a connected emitter/stream pair
    pub(crate) fn channel(
        workflow: Workflow,
        instance_id: Option<String>,
        observer: Arc<dyn EventObserver>,
    ) -> (Self, EventStream) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let emitter = Self {
            tx,
            observer,
            context: EventContext {
                workflow,
                instance_id,
            },
        };
        (emitter, EventStream::new(rx))
    }

    /// Record the instance the workflow is now operating on
    pub(crate) fn attach_instance(&mut self, instance_id: &str) {
        self.context.instance_id = Some(instance_id.to_string());
    }

    pub(crate) async fn started(&self) {
        self.send(LifecycleEvent::Started).await;
    }

    pub(crate) async fn completed(self, instance_id: String) {
        self.send(LifecycleEvent::Completed { instance_id }).await;
    }

    pub(crate) async fn failed(self, step: Step, error: ProvisionError) {
        self.send(LifecycleEvent::Error { step, error }).await;
    }

    async fn send(&self, event: LifecycleEvent) {
        self.observer.on_event(&self.context, &event);
        if self.tx.send(event).await.is_err() {
            debug!(
                workflow = %self.context.workflow,
                instance_id = ?self.context.instance_id,
                "Event stream dropped by consumer, continuing workflow"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;

    #[test]
    fn terminal_events() {
        assert!(!LifecycleEvent::Started.is_terminal());
        assert!(
            LifecycleEvent::Completed {
                instance_id: "i-1".to_string()
            }
            .is_terminal()
        );
        assert!(
            LifecycleEvent::Error {
                step: Step::Submit,
                error: ProvisionError::Cancelled
            }
            .is_terminal()
        );
    }

    #[tokio::test]
    async fn stream_ends_when_emitter_dropped() {
        let (emitter, mut stream) = Emitter::channel(Workflow::Create, None, Arc::new(NoopObserver));

        tokio::spawn(async move {
            emitter.started().await;
            emitter.completed("i-1".to_string()).await;
        });

        assert!(matches!(stream.recv().await, Some(LifecycleEvent::Started)));
        assert!(matches!(
            stream.recv().await,
            Some(LifecycleEvent::Completed { instance_id }) if instance_id == "i-1"
        ));
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn join_returns_error_outcome() {
        let (emitter, stream) = Emitter::channel(Workflow::Destroy, None, Arc::new(NoopObserver));

        tokio::spawn(async move {
            emitter.started().await;
            emitter.failed(Step::Terminate, ProvisionError::Cancelled).await;
        });

        let err = stream.join().await.unwrap_err();
        assert!(matches!(err, ProvisionError::Cancelled));
    }

    #[tokio::test]
    async fn join_reports_interrupted_without_terminal_event() {
        let (emitter, stream) = Emitter::channel(Workflow::Create, None, Arc::new(NoopObserver));

        tokio::spawn(async move {
            emitter.started().await;
        });

        assert!(matches!(stream.join().await, Err(ProvisionError::Interrupted)));
    }

    #[tokio::test]
    async fn send_to_dropped_stream_does_not_block() {
        let (emitter, stream) = Emitter::channel(Workflow::Create, None, Arc::new(NoopObserver));
        drop(stream);

        emitter.started().await;
        emitter.completed("i-1".to_string()).await;
    }
}
