//! Event rendering for the terminal

use anyhow::{Result, bail};
use provisio_core::{EventStream, LifecycleEvent, ProvisionError, Workflow};
use std::io::Write;

/// How events are written to stdout
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One human-readable line per event
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Render one event as a single line (without trailing newline)
pub fn render(format: OutputFormat, workflow: Workflow, event: &LifecycleEvent) -> String {
    match format {
        OutputFormat::Text => match event {
            LifecycleEvent::Started => format!("[{workflow}] started"),
            LifecycleEvent::Completed { instance_id } => {
                format!("[{workflow}] completed: {instance_id}")
            }
            LifecycleEvent::Error { step, error } => {
                format!("[{workflow}] failed during {step}: {error}")
            }
        },
        OutputFormat::Json => {
            let value = match event {
                LifecycleEvent::Started => serde_json::json!({
                    "workflow": workflow.to_string(),
                    "event": "started",
                }),
                LifecycleEvent::Completed { instance_id } => serde_json::json!({
                    "workflow": workflow.to_string(),
                    "event": "completed",
                    "instance_id": instance_id,
                }),
                LifecycleEvent::Error { step, error } => serde_json::json!({
                    "workflow": workflow.to_string(),
                    "event": "error",
                    "step": step.to_string(),
                    "kind": format!("{:?}", error.kind()),
                    "message": error.to_string(),
                }),
            };
            value.to_string()
        }
    }
}

/// Print every event of `stream` to `out` and return the workflow outcome.
///
/// `Ok(instance_id)` on `Completed`; an error describing the failed step on
/// `Error`, or if the stream ends without a terminal event.
pub async fn follow(
    mut stream: EventStream,
    workflow: Workflow,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<String> {
    let mut outcome = None;

    while let Some(event) = stream.recv().await {
        writeln!(out, "{}", render(format, workflow, &event))?;
        match event {
            LifecycleEvent::Started => {}
            LifecycleEvent::Completed { instance_id } => outcome = Some(Ok(instance_id)),
            LifecycleEvent::Error { step, error } => outcome = Some(Err((step, error))),
        }
    }

    match outcome {
        Some(Ok(instance_id)) => Ok(instance_id),
        Some(Err((step, error))) => bail!("{workflow} failed during {step}: {error}"),
        None => Err(ProvisionError::Interrupted.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_core::testing::{FakeCompute, InstantSleeper};
    use provisio_core::{CreateInstanceRequest, NoopObserver, Provisioner, Step};
    use std::sync::Arc;

    fn provisioner(fake: FakeCompute) -> Provisioner<FakeCompute> {
        Provisioner::builder(Arc::new(fake))
            .observer(Arc::new(NoopObserver))
            .sleeper(Arc::new(InstantSleeper::new()))
            .build()
    }

    #[test]
    fn text_rendering() {
        assert_eq!(
            render(OutputFormat::Text, Workflow::Create, &LifecycleEvent::Started),
            "[create] started"
        );
        assert_eq!(
            render(
                OutputFormat::Text,
                Workflow::Destroy,
                &LifecycleEvent::Completed {
                    instance_id: "i-1".to_string()
                }
            ),
            "[destroy] completed: i-1"
        );
    }

    #[test]
    fn json_rendering_of_errors() {
        let line = render(
            OutputFormat::Json,
            Workflow::Destroy,
            &LifecycleEvent::Error {
                step: Step::Terminate,
                error: ProvisionError::InvalidRequest {
                    instance_id: "i-9".to_string(),
                },
            },
        );
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["workflow"], "destroy");
        assert_eq!(value["event"], "error");
        assert_eq!(value["step"], "terminate");
        assert_eq!(value["kind"], "InvalidRequest");
    }

    #[tokio::test]
    async fn follow_prints_events_and_returns_instance_id() {
        let p = provisioner(FakeCompute::new());
        let stream = p
            .create_instance(CreateInstanceRequest::new("img-1", "t.small"))
            .unwrap();

        let mut out = Vec::new();
        let id = follow(stream, Workflow::Create, OutputFormat::Text, &mut out)
            .await
            .unwrap();

        assert_eq!(id, "i-001");
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed, "[create] started\n[create] completed: i-001\n");
    }

    #[tokio::test]
    async fn follow_reports_failed_step() {
        let p = provisioner(FakeCompute::new());
        let stream = p.destroy_instance("i-404").unwrap();

        let mut out = Vec::new();
        let err = follow(stream, Workflow::Destroy, OutputFormat::Json, &mut out)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("destroy failed during terminate"));
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.lines().count(), 2);
    }
}
