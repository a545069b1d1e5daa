//! Instance creation requests and the launch call derived from them
//!
//! A [`CreateInstanceRequest`] is built once by the caller, validated once,
//! and never mutated by the workflows. The creation workflow turns it into a
//! single-instance [`LaunchSpec`] for the compute API.

use crate::task::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Network device index of the primary interface (eth0)
pub const PRIMARY_DEVICE_INDEX: i32 = 0;

/// Description of the instance to create
///
/// Validation is done via `garde::Validate`. Only the image and instance type
/// are mandatory; every other field may be left at its default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, garde::Validate)]
#[serde(default, deny_unknown_fields)]
pub struct CreateInstanceRequest {
    /// Name of the provisioner this request is meant for
    #[garde(skip)]
    pub provisioner: String,

    /// Version of the provisioner request format
    #[garde(skip)]
    pub provisioner_version: String,

    /// Tasks a machine goes through when provisioned from this request
    #[garde(skip)]
    pub workflow: Vec<TaskType>,

    /// Machine image identifier
    #[garde(length(min = 1))]
    pub image_id: String,

    /// Availability zone to place the instance in
    #[garde(skip)]
    pub availability_zone: String,

    /// Key pair name for SSH access
    #[garde(skip)]
    pub key_name: String,

    /// Instance type/size (e.g., "t3.small")
    #[garde(length(min = 1))]
    pub instance_type: String,

    /// Subnet for the primary network interface
    #[garde(skip)]
    pub subnet_id: String,

    /// Security groups for the primary network interface
    #[garde(inner(length(min = 1)))]
    pub security_group_ids: Vec<String>,

    /// Associate a public IP address with the primary interface
    #[garde(skip)]
    pub associate_public_ip_address: bool,

    /// Delete the network interface and root volume when the instance terminates
    #[garde(skip)]
    pub delete_on_termination: bool,

    /// Enable detailed monitoring
    #[garde(skip)]
    pub monitoring: bool,

    /// IAM instance profile name
    #[garde(skip)]
    pub iam_instance_profile: String,

    /// Launch as EBS-optimized
    #[garde(skip)]
    pub ebs_optimized: bool,

    /// Root block device name (e.g., "/dev/xvda")
    #[garde(skip)]
    pub block_device_name: String,

    /// Root volume size in GiB
    #[garde(range(min = 0))]
    pub root_size: i32,

    /// Root volume type (e.g., "gp3")
    #[garde(skip)]
    pub volume_type: String,

    /// Tags applied once the instance is running
    #[garde(custom(non_empty_tag_keys))]
    pub tags: HashMap<String, String>,
}

fn non_empty_tag_keys(tags: &HashMap<String, String>, _ctx: &()) -> garde::Result {
    if tags.keys().any(|k| k.is_empty()) {
        return Err(garde::Error::new("tag keys cannot be empty"));
    }
    Ok(())
}

impl CreateInstanceRequest {
    /// Create a request with the mandatory fields
    pub fn new(image_id: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            image_id: image_id.into(),
            instance_type: instance_type.into(),
            ..Self::default()
        }
    }

    /// Canonical machine request for a provisioner: identity plus the
    /// standard task workflow.
    pub fn new_machine_request(provisioner: &str, version: &str) -> Self {
        Self {
            provisioner: provisioner.to_string(),
            provisioner_version: version.to_string(),
            workflow: TaskType::STANDARD_WORKFLOW.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_availability_zone(mut self, zone: impl Into<String>) -> Self {
        self.availability_zone = zone.into();
        self
    }

    pub fn with_key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = key_name.into();
        self
    }

    pub fn with_subnet(mut self, subnet_id: impl Into<String>) -> Self {
        self.subnet_id = subnet_id.into();
        self
    }

    pub fn with_security_group(mut self, security_group_id: impl Into<String>) -> Self {
        self.security_group_ids.push(security_group_id.into());
        self
    }

    pub fn with_iam_profile(mut self, profile_name: impl Into<String>) -> Self {
        self.iam_instance_profile = profile_name.into();
        self
    }

    /// Configure the root block device
    pub fn with_root_device(
        mut self,
        device_name: impl Into<String>,
        size_gib: i32,
        volume_type: impl Into<String>,
    ) -> Self {
        self.block_device_name = device_name.into();
        self.root_size = size_gib;
        self.volume_type = volume_type.into();
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Primary network interface of a launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterfaceSpec {
    pub device_index: i32,
    pub subnet_id: Option<String>,
    pub security_group_ids: Vec<String>,
    pub associate_public_ip_address: bool,
    pub delete_on_termination: bool,
}

/// Root EBS volume of a launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootDeviceSpec {
    pub device_name: Option<String>,
    pub volume_size: Option<i32>,
    pub volume_type: Option<String>,
    pub delete_on_termination: bool,
}

/// Single-instance creation call.
///
/// Empty request strings become `None` so providers can leave the
/// corresponding parameter unset instead of sending an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub image_id: String,
    pub instance_type: String,
    pub min_count: i32,
    pub max_count: i32,
    pub availability_zone: Option<String>,
    pub key_name: Option<String>,
    pub network_interface: NetworkInterfaceSpec,
    pub monitoring: bool,
    pub iam_instance_profile: Option<String>,
    pub ebs_optimized: bool,
    pub root_device: RootDeviceSpec,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl From<&CreateInstanceRequest> for LaunchSpec {
    fn from(request: &CreateInstanceRequest) -> Self {
        Self {
            image_id: request.image_id.clone(),
            instance_type: request.instance_type.clone(),
            min_count: 1,
            max_count: 1,
            availability_zone: non_empty(&request.availability_zone),
            key_name: non_empty(&request.key_name),
            network_interface: NetworkInterfaceSpec {
                device_index: PRIMARY_DEVICE_INDEX,
                subnet_id: non_empty(&request.subnet_id),
                security_group_ids: request.security_group_ids.clone(),
                associate_public_ip_address: request.associate_public_ip_address,
                delete_on_termination: request.delete_on_termination,
            },
            monitoring: request.monitoring,
            iam_instance_profile: non_empty(&request.iam_instance_profile),
            ebs_optimized: request.ebs_optimized,
            root_device: RootDeviceSpec {
                device_name: non_empty(&request.block_device_name),
                volume_size: (request.root_size > 0).then_some(request.root_size),
                volume_type: non_empty(&request.volume_type),
                delete_on_termination: request.delete_on_termination,
            },
        }
    }
}
