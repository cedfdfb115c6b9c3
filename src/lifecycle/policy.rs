//! Admission policy for provisioning requests: allowed images, per-owner
//! quota, and container name rules.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::PlatformError;

/// Images that may be provisioned when no explicit list is configured.
pub const DEFAULT_ALLOWED_IMAGES: &[&str] = &[
    "ubuntu:22.04",
    "ubuntu:20.04",
    "ubuntu:18.04",
    "debian:11",
    "debian:10",
    "alpine:3.18",
    "alpine:3.17",
    "node:18",
    "node:16",
    "node:20",
    "python:3.11",
    "python:3.10",
    "python:3.9",
    "openjdk:17",
    "openjdk:11",
    "nginx:alpine",
    "nginx:latest",
    "rastasheep/ubuntu-sshd:18.04",
    "danielguerra/ubuntu-xrdp:18.04",
];

/// Maximum number of quota-counted containers per owner.
pub const DEFAULT_MAX_CONTAINERS_PER_OWNER: u64 = 5;

const NAME_MIN_LEN: usize = 3;
const NAME_MAX_LEN: usize = 50;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_-]*$").expect("container name pattern is valid")
    })
}

/// Admission rules applied before any engine call.
#[derive(Debug, Clone)]
pub struct ProvisioningPolicy {
    allowed_images: Vec<String>,
    max_containers_per_owner: u64,
}

impl Default for ProvisioningPolicy {
    fn default() -> Self {
        Self {
            allowed_images: DEFAULT_ALLOWED_IMAGES.iter().map(|s| s.to_string()).collect(),
            max_containers_per_owner: DEFAULT_MAX_CONTAINERS_PER_OWNER,
        }
    }
}

impl ProvisioningPolicy {
    pub fn new(allowed_images: Vec<String>, max_containers_per_owner: u64) -> Self {
        Self {
            allowed_images,
            max_containers_per_owner,
        }
    }

    pub fn allowed_images(&self) -> &[String] {
        &self.allowed_images
    }

    pub fn max_containers_per_owner(&self) -> u64 {
        self.max_containers_per_owner
    }

    /// Rejects images outside the allow-list.
    pub fn check_image(&self, image: &str) -> Result<(), PlatformError> {
        if self.allowed_images.iter().any(|allowed| allowed == image) {
            Ok(())
        } else {
            Err(PlatformError::BadRequest(format!("Image not allowed: {image}")))
        }
    }

    /// Rejects when the owner already holds the maximum number of counted containers.
    pub fn check_quota(&self, current: u64) -> Result<(), PlatformError> {
        if current >= self.max_containers_per_owner {
            Err(PlatformError::BadRequest(format!(
                "Container limit reached (max {} containers per user)",
                self.max_containers_per_owner
            )))
        } else {
            Ok(())
        }
    }
}

/// Validates a user-chosen container name.
pub fn validate_name(name: &str) -> Result<(), PlatformError> {
    let len = name.chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&len) {
        return Err(PlatformError::BadRequest(format!(
            "Container name must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters"
        )));
    }

    if !name_pattern().is_match(name) {
        return Err(PlatformError::BadRequest(
            "Container name must start with alphanumeric character and contain only letters, numbers, hyphens, and underscores"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validates an environment variable key (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn validate_env_key(key: &str) -> Result<(), PlatformError> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(PlatformError::BadRequest(format!(
            "Invalid environment variable name: '{key}'"
        )))
    }
}
