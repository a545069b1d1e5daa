//! AWS provider configuration
//!
//! Built either directly or from the flat string parameter map used by
//! orchestrators (`REGION`, `ACCESS_KEY`, ...).

use std::collections::HashMap;
use thiserror::Error;

/// Parameter key for the AWS region (required)
pub const PARAM_REGION: &str = "REGION";
/// Parameter key for a static access key id
pub const PARAM_ACCESS_KEY: &str = "ACCESS_KEY";
/// Parameter key for a static secret access key
pub const PARAM_SECRET_KEY: &str = "SECRET_KEY";
/// Parameter key for a static session token
pub const PARAM_SESSION_TOKEN: &str = "SESSION_TOKEN";
/// Parameter key for a named profile from the shared config files
pub const PARAM_PROFILE: &str = "PROFILE";
/// Parameter key for the SDK retry count
pub const PARAM_RETRIES: &str = "RETRIES";

/// Default number of SDK-level retries per API call
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// REGION parameter missing or empty
    #[error("REGION must be specified")]
    MissingRegion,

    /// RETRIES parameter is not a number
    #[error("RETRIES must be a non-negative integer, got: {0}")]
    InvalidRetries(String),

    /// Only one half of a static key pair was given
    #[error("ACCESS_KEY and SECRET_KEY must be given together")]
    IncompleteCredentials,
}

/// Static credentials that take precedence over the default credential chain
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// AWS provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    /// AWS region
    pub region: String,
    /// Named profile (overrides default credential resolution)
    pub profile: Option<String>,
    /// SDK retries per API call
    pub max_retries: u32,
    /// Static credentials (overrides the default credential chain)
    pub credentials: Option<StaticCredentials>,
}

impl AwsConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            profile: None,
            max_retries: DEFAULT_MAX_RETRIES,
            credentials: None,
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_credentials(mut self, credentials: StaticCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build from a flat parameter map.
    ///
    /// Empty values are treated as absent.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let region = get(PARAM_REGION).ok_or(ConfigError::MissingRegion)?;
        let mut config = Self::new(region);

        if let Some(profile) = get(PARAM_PROFILE) {
            config = config.with_profile(profile);
        }

        if let Some(retries) = get(PARAM_RETRIES) {
            let retries = retries
                .parse()
                .map_err(|_| ConfigError::InvalidRetries(retries.to_string()))?;
            config = config.with_max_retries(retries);
        }

        match (get(PARAM_ACCESS_KEY), get(PARAM_SECRET_KEY)) {
            (Some(access_key_id), Some(secret_access_key)) => {
                config = config.with_credentials(StaticCredentials {
                    access_key_id: access_key_id.to_string(),
                    secret_access_key: secret_access_key.to_string(),
                    session_token: get(PARAM_SESSION_TOKEN).map(str::to_string),
                });
            }
            (None, None) => {}
            _ => return Err(ConfigError::IncompleteCredentials),
        }

        Ok(config)
    }
}
