//! EC2 integration tests - these launch and terminate real instances
//!
//! Marked `#[ignore]`; run with:
//! ```
//! AWS_PROFILE=your_profile PROVISIO_TEST_AMI=ami-... \
//!     cargo test -p provisio-aws --test ec2_integration -- --ignored
//! ```

use provisio_aws::{AwsConfig, Ec2Client};
use provisio_core::{
    ComputeApi, CreateInstanceRequest, LifecycleEvent, ProvisionError, Provisioner,
};
use std::sync::Arc;

/// Instance type used for integration tests
const TEST_INSTANCE_TYPE: &str = "t3.micro";

fn test_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .unwrap_or_else(|_| "us-east-2".to_string())
}

fn test_ami() -> String {
    std::env::var("PROVISIO_TEST_AMI").expect("PROVISIO_TEST_AMI must be set")
}

async fn client() -> Ec2Client {
    Ec2Client::new(&AwsConfig::new(test_region())).await
}

#[tokio::test]
#[ignore]
async fn terminate_unknown_instance_is_empty() {
    let client = client().await;
    let changes = client
        .terminate_instance("i-00000000000000000")
        .await
        .expect("unknown ids are not an error");
    assert!(changes.is_empty());
}

#[tokio::test]
#[ignore]
async fn destroy_unknown_instance_reports_invalid_request() {
    let provisioner = Provisioner::new(Arc::new(client().await));
    let stream = provisioner
        .destroy_instance("i-00000000000000000")
        .expect("stream");

    let err = stream.join().await.expect_err("destroy must fail");
    assert!(matches!(err, ProvisionError::InvalidRequest { .. }));
}

#[tokio::test]
#[ignore]
async fn create_then_destroy_instance() {
    let provisioner = Provisioner::new(Arc::new(client().await));

    let request = CreateInstanceRequest::new(test_ami(), TEST_INSTANCE_TYPE)
        .with_tag("Name", "provisio-integration")
        .with_tag("provisio:test", "true");

    let mut events = provisioner.create_instance(request).expect("valid request");
    assert!(matches!(events.recv().await, Some(LifecycleEvent::Started)));
    let instance_id = match events.recv().await {
        Some(LifecycleEvent::Completed { instance_id }) => instance_id,
        other => panic!("create failed: {other:?}"),
    };
    assert!(instance_id.starts_with("i-"));

    let destroyed = provisioner
        .destroy_instance(instance_id.clone())
        .expect("stream")
        .join()
        .await
        .expect("destroy succeeds");
    assert_eq!(destroyed, instance_id);
}
