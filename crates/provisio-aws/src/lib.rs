//! provisio-aws - EC2 compute provider
//!
//! Implements [`provisio_core::ComputeApi`] on top of the AWS SDK and wires
//! it into a ready-to-use [`Provisioner`].
//!
//! ## Modules
//!
//! - [`config`]: Provider settings and parameter-map parsing
//! - [`context`]: SDK configuration loading
//! - [`ec2`]: The EC2 compute client
//! - [`error`]: EC2 error classification

pub mod config;
pub mod context;
pub mod ec2;
pub mod error;

pub use config::{AwsConfig, ConfigError, StaticCredentials};
pub use context::AwsContext;
pub use ec2::Ec2Client;
pub use error::{AwsError, classify_anyhow_error, classify_aws_error};

use provisio_core::{CreateInstanceRequest, Provisioner};
use std::sync::Arc;

/// Name stamped on requests built by this provider
pub const PROVISIONER_NAME: &str = "aws";

/// Version stamped on requests built by this provider
pub const PROVISIONER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A creation request pre-filled with this provider's identity and the
/// standard workflow
pub fn new_machine_request() -> CreateInstanceRequest {
    CreateInstanceRequest::new_machine_request(PROVISIONER_NAME, PROVISIONER_VERSION)
}

/// Build a provisioner backed by EC2 with default observer and wait policy
pub async fn provisioner(config: &AwsConfig) -> Provisioner<Ec2Client> {
    Provisioner::new(Arc::new(Ec2Client::new(config).await))
}
