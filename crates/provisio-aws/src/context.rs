//! Loaded AWS SDK configuration
//!
//! Provides `AwsContext` for loading the SDK configuration once and creating
//! EC2 clients from it.

use crate::config::AwsConfig;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ec2::config::Credentials;
use std::sync::Arc;

const STATIC_CREDENTIALS_PROVIDER: &str = "provisio-static";

/// Shared AWS SDK configuration.
///
/// Static credentials from [`AwsConfig`] take precedence; otherwise the SDK's
/// default chain (environment, shared files, named profile, instance role)
/// applies.
#[derive(Clone)]
pub struct AwsContext {
    config: Arc<SdkConfig>,
    region: String,
}

impl AwsContext {
    /// Load SDK configuration for the given provider settings
    pub async fn load(config: &AwsConfig) -> Self {
        // max_retries counts retries, the SDK counts attempts
        let retry = RetryConfig::standard().with_max_attempts(config.max_retries.saturating_add(1));

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .retry_config(retry);

        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }

        if let Some(creds) = &config.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key_id.clone(),
                creds.secret_access_key.clone(),
                creds.session_token.clone(),
                None,
                STATIC_CREDENTIALS_PROVIDER,
            ));
        }

        Self {
            config: Arc::new(loader.load().await),
            region: config.region.clone(),
        }
    }

    /// Load SDK configuration for a region with default settings
    pub async fn new(region: &str) -> Self {
        Self::load(&AwsConfig::new(region)).await
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create an EC2 client from this context
    pub fn ec2_client(&self) -> aws_sdk_ec2::Client {
        aws_sdk_ec2::Client::new(self.sdk_config())
    }
}

impl std::fmt::Debug for AwsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsContext")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticCredentials;

    #[tokio::test]
    async fn static_credentials_and_region_are_applied() {
        let config = AwsConfig::new("eu-central-1")
            .with_max_retries(2)
            .with_credentials(StaticCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            });

        let ctx = AwsContext::load(&config).await;

        assert_eq!(ctx.region(), "eu-central-1");
        assert_eq!(
            ctx.sdk_config().region().map(|r| r.as_ref()),
            Some("eu-central-1")
        );
        assert_eq!(
            ctx.sdk_config().retry_config().map(|r| r.max_attempts()),
            Some(3)
        );
        assert!(ctx.sdk_config().credentials_provider().is_some());
    }

    #[tokio::test]
    async fn debug_shows_region_only() {
        let ctx = AwsContext::load(
            &AwsConfig::new("us-east-2").with_credentials(StaticCredentials {
                access_key_id: "AKIDEXAMPLE".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: None,
            }),
        )
        .await;
        let debug = format!("{ctx:?}");
        assert!(debug.contains("us-east-2"));
        assert!(!debug.contains("secret"));
    }

    #[tokio::test]
    #[ignore = "requires AWS credentials"]
    async fn default_chain_creates_client() {
        let ctx = AwsContext::new("us-east-2").await;
        let _ec2 = ctx.ec2_client();
    }
}
