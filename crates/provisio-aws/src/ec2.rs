//! EC2 implementation of the compute API

use crate::config::AwsConfig;
use crate::context::AwsContext;
use crate::error::{classify_anyhow_error, classify_sdk_error};
use anyhow::{Context, Result};
use aws_sdk_ec2::Client;
use aws_sdk_ec2::types as ec2;
use backon::{ConstantBuilder, ExponentialBuilder, Retryable};
use provisio_core::compute::{ComputeApi, Instance, InstanceState, InstanceStateChange};
use provisio_core::request::{LaunchSpec, NetworkInterfaceSpec, RootDeviceSpec};
use provisio_core::tags::Tag;
use std::time::Duration;
use tracing::{debug, info, warn};

/// State name reported when EC2 omits one
const UNKNOWN_STATE: &str = "unknown";

/// EC2 client used as the provisioner's compute API
#[derive(Debug, Clone)]
pub struct Ec2Client {
    client: Client,
}

impl Ec2Client {
    /// Create a client, loading SDK configuration from `config`
    pub async fn new(config: &AwsConfig) -> Self {
        let ctx = AwsContext::load(config).await;
        Self::from_context(&ctx)
    }

    pub fn from_context(ctx: &AwsContext) -> Self {
        Self::from_client(ctx.ec2_client())
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn do_run_instance(&self, spec: &LaunchSpec) -> Result<Vec<Instance>> {
        let mut request = self
            .client
            .run_instances()
            .image_id(&spec.image_id)
            .instance_type(ec2::InstanceType::from(spec.instance_type.as_str()))
            .min_count(spec.min_count)
            .max_count(spec.max_count)
            .set_key_name(spec.key_name.clone())
            .monitoring(
                ec2::RunInstancesMonitoringEnabled::builder()
                    .enabled(spec.monitoring)
                    .build(),
            )
            .ebs_optimized(spec.ebs_optimized)
            .network_interfaces(network_interface(&spec.network_interface));

        if let Some(zone) = &spec.availability_zone {
            request = request.placement(ec2::Placement::builder().availability_zone(zone).build());
        }

        if let Some(profile) = &spec.iam_instance_profile {
            request = request.iam_instance_profile(
                ec2::IamInstanceProfileSpecification::builder()
                    .name(profile)
                    .build(),
            );
        }

        if let Some(mapping) = root_block_device(&spec.root_device) {
            request = request.block_device_mappings(mapping);
        }

        let response = request.send().await.context("Failed to launch instance")?;

        response.instances().iter().map(instance_from_sdk).collect()
    }

    async fn do_describe_instance(&self, instance_id: &str) -> Result<Vec<Instance>> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("Failed to describe instance")?;

        response
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .map(instance_from_sdk)
            .collect()
    }
}

fn is_retryable_launch_error(e: &anyhow::Error) -> bool {
    classify_anyhow_error(e).is_retryable()
}

fn is_not_found_error(e: &anyhow::Error) -> bool {
    classify_anyhow_error(e).is_not_found()
}

/// Attach the classified hint, if any, to a failed call
fn with_suggestion(e: anyhow::Error) -> anyhow::Error {
    match classify_anyhow_error(&e).suggestion() {
        Some(hint) => e.context(hint),
        None => e,
    }
}

impl ComputeApi for Ec2Client {
    /// Launch one instance.
    ///
    /// Rejections caused by IAM propagation delay or throttling are retried
    /// with exponential backoff; everything else is returned as-is.
    async fn run_instance(&self, spec: &LaunchSpec) -> Result<Vec<Instance>> {
        info!(
            image_id = %spec.image_id,
            instance_type = %spec.instance_type,
            "Launching instance"
        );

        (|| async { self.do_run_instance(spec).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(2))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(5),
            )
            .when(is_retryable_launch_error)
            .notify(|e, dur| {
                warn!(delay = ?dur, error = %e, "Transient launch error, retrying...");
            })
            .await
            .map_err(with_suggestion)
    }

    /// Describe one instance.
    ///
    /// A freshly launched id can briefly be unknown to the describe API, so
    /// `InvalidInstanceID.NotFound` is retried a few times before surfacing.
    async fn describe_instance(&self, instance_id: &str) -> Result<Vec<Instance>> {
        (|| async { self.do_describe_instance(instance_id).await })
            .retry(
                ConstantBuilder::default()
                    .with_delay(Duration::from_secs(2))
                    .with_max_times(3),
            )
            .when(is_not_found_error)
            .notify(|_, dur| {
                debug!(instance_id, delay = ?dur, "Instance not visible yet, retrying describe");
            })
            .await
    }

    /// Request termination.
    ///
    /// Unknown or malformed ids yield an empty list instead of an error so
    /// the workflow reports them as invalid requests.
    async fn terminate_instance(&self, instance_id: &str) -> Result<Vec<InstanceStateChange>> {
        info!(instance_id, "Terminating instance");

        let response = match self
            .client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if classify_sdk_error(&e).is_unknown_instance() => {
                debug!(instance_id, "Instance unknown to EC2");
                return Ok(Vec::new());
            }
            Err(e) => {
                let e = anyhow::Error::from(e).context("Failed to terminate instance");
                return Err(with_suggestion(e));
            }
        };

        Ok(response
            .terminating_instances()
            .iter()
            .map(state_change_from_sdk)
            .collect())
    }

    async fn create_tags(&self, instance_id: &str, tags: &[Tag]) -> Result<()> {
        if tags.is_empty() {
            debug!(instance_id, "No tags to apply");
            return Ok(());
        }

        self.client
            .create_tags()
            .resources(instance_id)
            .set_tags(Some(sdk_tags(tags)))
            .send()
            .await
            .context("Failed to tag instance")?;

        debug!(instance_id, count = tags.len(), "Tagged instance");
        Ok(())
    }
}

fn network_interface(spec: &NetworkInterfaceSpec) -> ec2::InstanceNetworkInterfaceSpecification {
    let groups = (!spec.security_group_ids.is_empty()).then(|| spec.security_group_ids.clone());

    ec2::InstanceNetworkInterfaceSpecification::builder()
        .device_index(spec.device_index)
        .set_subnet_id(spec.subnet_id.clone())
        .set_groups(groups)
        .associate_public_ip_address(spec.associate_public_ip_address)
        .delete_on_termination(spec.delete_on_termination)
        .build()
}

/// Root volume mapping; EC2 needs a device name, so none is sent without one
fn root_block_device(spec: &RootDeviceSpec) -> Option<ec2::BlockDeviceMapping> {
    let device_name = spec.device_name.as_ref()?;

    let ebs = ec2::EbsBlockDevice::builder()
        .set_volume_size(spec.volume_size)
        .set_volume_type(spec.volume_type.as_deref().map(ec2::VolumeType::from))
        .delete_on_termination(spec.delete_on_termination)
        .build();

    Some(
        ec2::BlockDeviceMapping::builder()
            .device_name(device_name)
            .ebs(ebs)
            .build(),
    )
}

fn sdk_tags(tags: &[Tag]) -> Vec<ec2::Tag> {
    tags.iter()
        .map(|t| ec2::Tag::builder().key(&t.key).value(&t.value).build())
        .collect()
}

fn state_from_sdk(state: Option<&ec2::InstanceState>) -> InstanceState {
    state
        .and_then(|s| s.name())
        .map(|name| InstanceState::from(name.as_str()))
        .unwrap_or_else(|| InstanceState::Other(UNKNOWN_STATE.to_string()))
}

fn instance_from_sdk(instance: &ec2::Instance) -> Result<Instance> {
    let instance_id = instance
        .instance_id()
        .context("EC2 returned an instance without an id")?;
    Ok(Instance::new(instance_id, state_from_sdk(instance.state())))
}

fn state_change_from_sdk(change: &ec2::InstanceStateChange) -> InstanceStateChange {
    InstanceStateChange {
        instance_id: change.instance_id().unwrap_or_default().to_string(),
        previous_state: state_from_sdk(change.previous_state()),
        current_state: state_from_sdk(change.current_state()),
    }
}
