//! Building a creation request from a JSON file and command-line overrides

use anyhow::{Context, Result};
use provisio_core::CreateInstanceRequest;
use std::path::{Path, PathBuf};

/// Request source and per-field overrides shared by `create` and `run-workflow`
#[derive(clap::Args, Debug, Default, Clone)]
pub struct RequestArgs {
    /// JSON request file (`-` reads stdin); defaults to a fresh machine request
    #[arg(short, long)]
    pub request: Option<PathBuf>,

    /// Machine image identifier
    #[arg(long)]
    pub image_id: Option<String>,

    /// Instance type (e.g., "t3.small")
    #[arg(long)]
    pub instance_type: Option<String>,

    /// Availability zone
    #[arg(long)]
    pub availability_zone: Option<String>,

    /// Key pair name
    #[arg(long)]
    pub key_name: Option<String>,

    /// Subnet for the primary network interface
    #[arg(long)]
    pub subnet_id: Option<String>,

    /// Security group ids (comma-separated, repeatable)
    #[arg(long = "security-group", value_delimiter = ',')]
    pub security_group_ids: Vec<String>,

    /// IAM instance profile name
    #[arg(long)]
    pub instance_profile: Option<String>,

    /// Tag to apply once running, as KEY=VALUE (repeatable)
    #[arg(long = "tag", value_parser = parse_tag)]
    pub tags: Vec<(String, String)>,
}

fn parse_tag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

fn read_request(path: &Path) -> Result<CreateInstanceRequest> {
    let json = if path == Path::new("-") {
        std::io::read_to_string(std::io::stdin()).context("Failed to read request from stdin")?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?
    };

    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse request {}", path.display()))
}

impl RequestArgs {
    /// Load the base request and apply overrides.
    ///
    /// Validation is left to the provisioner.
    pub fn load(&self) -> Result<CreateInstanceRequest> {
        let mut request = match &self.request {
            Some(path) => read_request(path)?,
            None => provisio_aws::new_machine_request(),
        };

        if let Some(image_id) = &self.image_id {
            request.image_id = image_id.clone();
        }
        if let Some(instance_type) = &self.instance_type {
            request.instance_type = instance_type.clone();
        }
        if let Some(zone) = &self.availability_zone {
            request.availability_zone = zone.clone();
        }
        if let Some(key_name) = &self.key_name {
            request.key_name = key_name.clone();
        }
        if let Some(subnet_id) = &self.subnet_id {
            request.subnet_id = subnet_id.clone();
        }
        if !self.security_group_ids.is_empty() {
            request.security_group_ids = self.security_group_ids.clone();
        }
        if let Some(profile) = &self.instance_profile {
            request.iam_instance_profile = profile.clone();
        }
        request.tags.extend(self.tags.iter().cloned());

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn tag_parsing() {
        assert_eq!(
            parse_tag("env=dev").unwrap(),
            ("env".to_string(), "dev".to_string())
        );
        assert_eq!(
            parse_tag("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_tag("novalue").is_err());
        assert!(parse_tag("=dev").is_err());
    }

    #[test]
    fn defaults_to_machine_request() {
        let request = RequestArgs::default().load().unwrap();
        assert_eq!(request.provisioner, provisio_aws::PROVISIONER_NAME);
        assert!(request.image_id.is_empty());
    }

    #[test]
    fn file_then_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"image_id": "ami-file", "instance_type": "t3.small", "tags": {{"env": "prod"}}}}"#
        )
        .unwrap();

        let args = RequestArgs {
            request: Some(file.path().to_path_buf()),
            instance_type: Some("t3.large".to_string()),
            security_group_ids: vec!["sg-1".to_string()],
            tags: vec![("env".to_string(), "dev".to_string())],
            ..RequestArgs::default()
        };
        let request = args.load().unwrap();

        assert_eq!(request.image_id, "ami-file");
        assert_eq!(request.instance_type, "t3.large");
        assert_eq!(request.security_group_ids, ["sg-1"]);
        assert_eq!(request.tags.get("env").map(String::as_str), Some("dev"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"image": "ami-1"}}"#).unwrap();

        let args = RequestArgs {
            request: Some(file.path().to_path_buf()),
            ..RequestArgs::default()
        };
        assert!(args.load().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let args = RequestArgs {
            request: Some(PathBuf::from("/nonexistent/request.json")),
            ..RequestArgs::default()
        };
        let err = args.load().unwrap_err();
        assert!(err.to_string().contains("Failed to read request file"));
    }
}
