//! EC2 error classification
//!
//! Classifies SDK failures by their service error code rather than by
//! matching on Debug output, with a string fallback for errors that have
//! already been wrapped.

use aws_sdk_ec2::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::operation::create_tags::CreateTagsError;
use aws_sdk_ec2::operation::describe_instances::DescribeInstancesError;
use aws_sdk_ec2::operation::run_instances::RunInstancesError;
use aws_sdk_ec2::operation::terminate_instances::TerminateInstancesError;
use thiserror::Error;

/// EC2 error categories
#[derive(Debug, Error)]
pub enum AwsError {
    /// Instance id unknown to EC2 (or not yet visible after launch)
    #[error("Instance not found: {message}")]
    NotFound { message: String },

    /// Instance id is not syntactically valid
    #[error("Malformed instance id: {message}")]
    Malformed { message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    Throttled,

    /// IAM instance profile not yet visible to EC2
    #[error("IAM profile not yet visible to EC2 (eventual consistency)")]
    IamPropagationDelay,

    /// Any other SDK error
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Unknown or malformed instance id; terminate treats both as "no such instance"
    pub fn is_unknown_instance(&self) -> bool {
        matches!(self, AwsError::NotFound { .. } | AwsError::Malformed { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled | AwsError::IamPropagationDelay)
    }

    /// User-facing hint for resolving this error, if one is known
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            AwsError::Throttled => suggestion_for_code("RequestLimitExceeded"),
            AwsError::IamPropagationDelay => {
                Some("The IAM instance profile was created recently. Retry in a few seconds.")
            }
            _ => None,
        }
    }
}

const NOT_FOUND_CODES: &[&str] = &["InvalidInstanceID.NotFound"];

const MALFORMED_CODES: &[&str] = &["InvalidInstanceID.Malformed"];

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Classify an error from its service code and message.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if MALFORMED_CODES.contains(&c) => AwsError::Malformed { message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some("InvalidParameterValue") if message.contains("iamInstanceProfile") => {
            AwsError::IamPropagationDelay
        }
        Some(_) if message.contains("Invalid IAM Instance Profile") => {
            AwsError::IamPropagationDelay
        }
        _ => AwsError::Sdk {
            code: code.map(str::to_string),
            message,
        },
    }
}

/// Classify a typed SDK error
pub fn classify_sdk_error<E: ProvideErrorMetadata>(error: &E) -> AwsError {
    classify_aws_error(error.code(), error.message())
}

/// Classify an error that may wrap an EC2 SDK error somewhere in its chain.
///
/// Falls back to scanning the Debug representation for a known code when no
/// typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<SdkError<RunInstancesError>>() {
            return classify_sdk_error(e);
        }
        if let Some(e) = cause.downcast_ref::<SdkError<DescribeInstancesError>>() {
            return classify_sdk_error(e);
        }
        if let Some(e) = cause.downcast_ref::<SdkError<TerminateInstancesError>>() {
            return classify_sdk_error(e);
        }
        if let Some(e) = cause.downcast_ref::<SdkError<CreateTagsError>>() {
            return classify_sdk_error(e);
        }
    }

    let debug_str = format!("{error:?}");
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&debug_str));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// Codes recognised when scanning Debug output
const ALL_KNOWN_CODES: &[&str] = &[
    "InvalidInstanceID.NotFound",
    "InvalidInstanceID.Malformed",
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "InsufficientInstanceCapacity",
    "InstanceLimitExceeded",
    "VcpuLimitExceeded",
    "InvalidAMIID.NotFound",
    "InvalidAMIID.Malformed",
    "InvalidSubnetID.NotFound",
    "InvalidGroup.NotFound",
    "InvalidKeyPair.NotFound",
    "Unsupported",
    "UnauthorizedOperation",
];

fn extract_error_code(debug_str: &str) -> Option<String> {
    // Longest match first so "ThrottlingException" is not reported as "Throttling"
    let mut found: Option<&str> = None;
    for code in ALL_KNOWN_CODES {
        if debug_str.contains(code) && found.is_none_or(|f| code.len() > f.len()) {
            found = Some(code);
        }
    }
    if let Some(code) = found {
        return Some(code.to_string());
    }

    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}

const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "InsufficientInstanceCapacity",
        "Try a different availability zone or instance type.",
    ),
    (
        "InstanceLimitExceeded",
        "Request a service limit increase via AWS Service Quotas console.",
    ),
    (
        "VcpuLimitExceeded",
        "Request a service limit increase via AWS Service Quotas console.",
    ),
    (
        "InvalidAMIID.NotFound",
        "Check that the image exists in this region.",
    ),
    (
        "InvalidAMIID.Malformed",
        "Image ids look like ami-0123456789abcdef0.",
    ),
    (
        "InvalidSubnetID.NotFound",
        "Check that the subnet exists in this region.",
    ),
    (
        "InvalidGroup.NotFound",
        "Check that the security groups belong to the subnet's VPC.",
    ),
    (
        "InvalidKeyPair.NotFound",
        "Check that the key pair exists in this region.",
    ),
    (
        "Unsupported",
        "This instance type may not be available in this region/AZ.",
    ),
    (
        "UnauthorizedOperation",
        "The credentials in use lack the required EC2 permissions.",
    ),
    (
        "RequestLimitExceeded",
        "AWS API rate limit hit. Retry later or raise the retry count.",
    ),
];

fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, s)| *s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_instance_codes() {
        let err = classify_aws_error(Some("InvalidInstanceID.NotFound"), Some("i-1 missing"));
        assert!(err.is_not_found());
        assert!(err.is_unknown_instance());

        let err = classify_aws_error(Some("InvalidInstanceID.Malformed"), Some("bad"));
        assert!(!err.is_not_found());
        assert!(err.is_unknown_instance());
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(matches!(err, AwsError::Throttled), "code: {code}");
            assert!(err.is_retryable());
            assert!(err.suggestion().is_some());
        }
    }

    #[test]
    fn iam_propagation_delay() {
        let err = classify_aws_error(
            Some("InvalidParameterValue"),
            Some("Value for parameter iamInstanceProfile is invalid"),
        );
        assert!(matches!(err, AwsError::IamPropagationDelay));

        let err = classify_aws_error(Some("Other"), Some("Invalid IAM Instance Profile name"));
        assert!(matches!(err, AwsError::IamPropagationDelay));
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, AwsError::Sdk { code: Some(_), .. }));
        assert!(err.suggestion().is_none());

        let err = classify_aws_error(None, None);
        assert!(matches!(err, AwsError::Sdk { code: None, ref message } if message == "Unknown error"));
    }

    #[test]
    fn suggestions_for_launch_failures() {
        let err = classify_aws_error(Some("InsufficientInstanceCapacity"), Some("no capacity"));
        assert_eq!(
            err.suggestion(),
            Some("Try a different availability zone or instance type.")
        );
    }

    #[test]
    fn extract_prefers_longest_known_code() {
        let debug_str = r#"Error { code: Some("ThrottlingException"), message: "slow down" }"#;
        assert_eq!(
            extract_error_code(debug_str).as_deref(),
            Some("ThrottlingException")
        );
    }

    #[test]
    fn extract_falls_back_to_code_field() {
        let debug_str = r#"SdkError { code: Some("SomeRandomCode"), message: "fail" }"#;
        assert_eq!(
            extract_error_code(debug_str).as_deref(),
            Some("SomeRandomCode")
        );
        assert_eq!(extract_error_code("plain failure"), None);
    }

    #[test]
    fn classify_wrapped_error_via_debug_string() {
        let err = anyhow::anyhow!(r#"service error: code: Some("InvalidInstanceID.NotFound")"#)
            .context("Failed to describe instance");
        assert!(classify_anyhow_error(&err).is_not_found());

        let err = anyhow::anyhow!("connection reset");
        assert!(matches!(
            classify_anyhow_error(&err),
            AwsError::Sdk { code: None, .. }
        ));
    }
}
