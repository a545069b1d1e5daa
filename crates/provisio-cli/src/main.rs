//! provisio: create and destroy EC2 instances from the command line
//!
//! Each command starts a workflow and prints its lifecycle events as they
//! arrive. Logs go to stderr; events go to stdout.

mod output;
mod request;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use output::{OutputFormat, follow, render};
use provisio_aws::config::DEFAULT_MAX_RETRIES;
use provisio_aws::{AwsConfig, Ec2Client};
use provisio_core::wait::{INSTANCE_STATE_INTERVAL, INSTANCE_STATE_MAX_ATTEMPTS};
use provisio_core::{ComputeApi, LifecycleEvent, Provisioner, WaitConfig, Workflow};
use request::RequestArgs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "provisio")]
#[command(about = "Provision and decommission EC2 instances")]
#[command(version)]
struct Args {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

/// Provider and polling settings shared by every command
#[derive(clap::Args, Debug)]
struct Settings {
    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-2", global = true)]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, global = true)]
    aws_profile: Option<String>,

    /// SDK retries per API call
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, global = true)]
    max_retries: u32,

    /// Maximum state checks while waiting for an instance
    #[arg(long, default_value_t = INSTANCE_STATE_MAX_ATTEMPTS, global = true)]
    wait_attempts: u32,

    /// Seconds between state checks
    #[arg(long, default_value_t = INSTANCE_STATE_INTERVAL.as_secs(), global = true)]
    wait_interval: u64,

    /// Event output format
    #[arg(long, value_enum, default_value_t, global = true)]
    format: OutputFormat,
}

impl Settings {
    fn aws_config(&self) -> AwsConfig {
        let config = AwsConfig::new(&self.region).with_max_retries(self.max_retries);
        match &self.aws_profile {
            Some(profile) => config.with_profile(profile),
            None => config,
        }
    }

    fn wait_config(&self) -> WaitConfig {
        WaitConfig::new(self.wait_attempts, Duration::from_secs(self.wait_interval))
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch an instance, wait for it to run, then tag it
    Create(RequestArgs),

    /// Terminate an instance and wait for it to be gone
    Destroy {
        /// Instance identifier
        instance_id: String,
    },

    /// Print a template machine request as JSON
    NewRequest,

    /// Run every task of the request's workflow this provisioner supports
    RunWorkflow(RequestArgs),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if let Command::NewRequest = args.command {
        println!(
            "{}",
            serde_json::to_string_pretty(&provisio_aws::new_machine_request())?
        );
        return Ok(());
    }

    if let Some(profile) = &args.settings.aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let ec2 = Ec2Client::new(&args.settings.aws_config()).await;
    let provisioner = Provisioner::builder(Arc::new(ec2))
        .wait_config(args.settings.wait_config())
        .build();
    cancel_on_ctrl_c(&provisioner);

    let format = args.settings.format;
    let mut stdout = std::io::stdout();

    match args.command {
        Command::Create(request_args) => {
            let stream = provisioner.create_instance(request_args.load()?)?;
            follow(stream, Workflow::Create, format, &mut stdout).await?;
        }
        Command::Destroy { instance_id } => {
            let stream = provisioner.destroy_instance(instance_id)?;
            follow(stream, Workflow::Destroy, format, &mut stdout).await?;
        }
        Command::RunWorkflow(request_args) => {
            run_workflow(&provisioner, request_args.load()?, format).await?;
        }
        Command::NewRequest => {}
    }

    Ok(())
}

/// Cancel in-flight workflows on the first Ctrl-C
fn cancel_on_ctrl_c<C: ComputeApi + 'static>(provisioner: &Provisioner<C>) {
    let provisioner = provisioner.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling workflows");
            provisioner.cancel();
        }
    });
}

/// Run the request's workflow tasks in order, skipping unsupported ones.
///
/// Stops at the first task that reports an error.
async fn run_workflow<C: ComputeApi + 'static>(
    provisioner: &Provisioner<C>,
    request: provisio_core::CreateInstanceRequest,
    format: OutputFormat,
) -> Result<()> {
    for task in request.workflow.clone() {
        if !provisioner.supports(task) {
            warn!(task = %task, "Task not handled by this provisioner, skipping");
            continue;
        }

        let (sink, mut events) = mpsc::channel(1);
        let printer = async {
            let mut failed = None;
            while let Some(event) = events.recv().await {
                println!("{}", render(format, Workflow::Create, &event));
                if let LifecycleEvent::Error { step, error } = event {
                    failed = Some(format!("{step}: {error}"));
                }
            }
            failed
        };

        let (result, failed) = tokio::join!(provisioner.run_task(task, request.clone(), sink), printer);
        result?;
        if let Some(reason) = failed {
            bail!("task {task} failed during {reason}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_core::testing::{FakeCompute, InstantSleeper};
    use provisio_core::{CreateInstanceRequest, NoopObserver};

    #[test]
    fn parses_create_with_overrides() {
        let args = Args::try_parse_from([
            "provisio",
            "--region",
            "eu-west-1",
            "create",
            "--image-id",
            "ami-1",
            "--instance-type",
            "t3.small",
            "--security-group",
            "sg-1,sg-2",
            "--tag",
            "env=dev",
        ])
        .unwrap();

        assert_eq!(args.settings.region, "eu-west-1");
        let Command::Create(request) = args.command else {
            panic!("expected create");
        };
        assert_eq!(request.security_group_ids, ["sg-1", "sg-2"]);
        assert_eq!(request.tags, [("env".to_string(), "dev".to_string())]);
    }

    #[test]
    fn global_settings_after_subcommand() {
        let args = Args::try_parse_from([
            "provisio",
            "destroy",
            "i-123",
            "--wait-attempts",
            "5",
            "--wait-interval",
            "2",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(args.settings.format, OutputFormat::Json);
        assert_eq!(
            args.settings.wait_config(),
            WaitConfig::new(5, Duration::from_secs(2))
        );
        assert!(matches!(args.command, Command::Destroy { ref instance_id } if instance_id == "i-123"));
    }

    #[test]
    fn defaults_follow_provider_policy() {
        let args = Args::try_parse_from(["provisio", "--region", "us-west-2", "new-request"]).unwrap();
        assert_eq!(args.settings.wait_config(), WaitConfig::instance_state());
        assert_eq!(args.settings.aws_config(), AwsConfig::new("us-west-2"));
    }

    #[test]
    fn destroy_requires_instance_id() {
        assert!(Args::try_parse_from(["provisio", "destroy"]).is_err());
    }

    #[tokio::test]
    async fn run_workflow_runs_only_supported_tasks() {
        let fake = Arc::new(FakeCompute::new());
        let provisioner = Provisioner::builder(Arc::clone(&fake))
            .observer(Arc::new(NoopObserver))
            .sleeper(Arc::new(InstantSleeper::new()))
            .build();

        let request = CreateInstanceRequest {
            workflow: provisio_core::TaskType::STANDARD_WORKFLOW.to_vec(),
            ..CreateInstanceRequest::new("img-1", "t.small")
        };

        run_workflow(&provisioner, request, OutputFormat::Text)
            .await
            .unwrap();
        assert_eq!(fake.instance_state("i-001"), Some(provisio_core::InstanceState::Running));
    }

    #[tokio::test]
    async fn run_workflow_surfaces_task_failure() {
        let fake = Arc::new(FakeCompute::new().fail_launch("capacity"));
        let provisioner = Provisioner::builder(fake)
            .observer(Arc::new(NoopObserver))
            .sleeper(Arc::new(InstantSleeper::new()))
            .build();

        let request = CreateInstanceRequest {
            workflow: vec![provisio_core::TaskType::CreateInstance],
            ..CreateInstanceRequest::new("img-1", "t.small")
        };

        let err = run_workflow(&provisioner, request, OutputFormat::Text)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("task create-instance failed during submit"));
    }
}
