//! Configuration types for the two workflows.
//!
//! Both configs are plain structs sourced from the Lambda environment, with
//! builder methods for tests. Defaults match what the deployed functions
//! have always used.

use std::env;
use std::time::Duration;

use crate::{OpskeeperError, Result};

/// Configuration for the rotation workflow.
///
/// Use the builder pattern for ergonomic construction in tests:
///
/// ```
/// use opskeeper::RotationConfig;
///
/// let config = RotationConfig::default()
///     .with_users(["alice", "bob"])
///     .with_rotation_tag("Fleet-Rotation", "yes");
/// assert_eq!(config.users.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// User names whose passwords are rotated (env `USERS`, comma-separated)
    pub users: Vec<String>,

    /// Characters excluded from generated passwords (env `EXCLUDE_CHARACTERS`)
    pub exclude_characters: String,

    /// Tag key selecting instances that receive the new passwords
    pub rotation_tag_key: String,

    /// Tag value selecting instances that receive the new passwords
    pub rotation_tag_value: String,

    /// Webhook for operational notifications (env `NOTIFICATION_WEBHOOK_URL`)
    pub webhook_url: Option<String>,

    /// Endpoint override for the secret store (env `SECRETS_MANAGER_ENDPOINT`)
    pub secrets_endpoint: Option<String>,

    /// Endpoint override for the parameter/command store (env `SSM_ENDPOINT`)
    pub ssm_endpoint: Option<String>,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            users: vec!["ec2-user".to_string()],
            exclude_characters: "/@\"'\\".to_string(),
            rotation_tag_key: "Password-Rotation".to_string(),
            rotation_tag_value: "true".to_string(),
            webhook_url: None,
            secrets_endpoint: None,
            ssm_endpoint: None,
        }
    }
}

impl RotationConfig {
    /// Reads the configuration from the Lambda environment.
    ///
    /// Every setting has a default, so this never fails.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            users: env::var("USERS")
                .map(|s| split_users(&s))
                .unwrap_or(defaults.users),
            exclude_characters: env::var("EXCLUDE_CHARACTERS")
                .unwrap_or(defaults.exclude_characters),
            rotation_tag_key: env::var("ROTATION_TAG_KEY").unwrap_or(defaults.rotation_tag_key),
            rotation_tag_value: env::var("ROTATION_TAG_VALUE")
                .unwrap_or(defaults.rotation_tag_value),
            webhook_url: env::var("NOTIFICATION_WEBHOOK_URL").ok(),
            secrets_endpoint: env::var("SECRETS_MANAGER_ENDPOINT").ok(),
            ssm_endpoint: env::var("SSM_ENDPOINT").ok(),
        }
    }

    /// Sets the user list.
    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = users.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the characters excluded from generated passwords.
    pub fn with_exclude_characters(mut self, exclude: impl Into<String>) -> Self {
        self.exclude_characters = exclude.into();
        self
    }

    /// Sets the tag pair used to select target instances.
    pub fn with_rotation_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.rotation_tag_key = key.into();
        self.rotation_tag_value = value.into();
        self
    }

    /// Sets the notification webhook URL.
    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }
}

fn split_users(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration for the log export workflow.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Destination bucket for export tasks (env `S3_BUCKET`, required)
    pub bucket: String,

    /// Tag key selecting log groups to export (env `EXPORT_TAG_KEY`)
    pub export_tag_key: String,

    /// Tag value selecting log groups to export (env `EXPORT_TAG_VALUE`)
    pub export_tag_value: String,

    /// Minimum age of the window before a group is exported again
    pub min_export_age: Duration,

    /// Attempts allowed per export submission under throttling
    pub max_attempts: u32,

    /// Delay between throttled attempts
    pub retry_delay: Duration,

    /// Endpoint override for the parameter store (env `SSM_ENDPOINT`)
    pub ssm_endpoint: Option<String>,
}

impl ExportConfig {
    /// Creates a configuration for the given destination bucket, with the
    /// standard cadence: 24-hour minimum window, 10 attempts, 5 seconds apart.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            export_tag_key: "export".to_string(),
            export_tag_value: "true".to_string(),
            min_export_age: Duration::from_secs(24 * 60 * 60),
            max_attempts: 10,
            retry_delay: Duration::from_secs(5),
            ssm_endpoint: None,
        }
    }

    /// Reads the configuration from the Lambda environment.
    ///
    /// # Errors
    ///
    /// Returns [`OpskeeperError::MissingConfig`] when `S3_BUCKET` is not set.
    pub fn from_env() -> Result<Self> {
        let bucket = env::var("S3_BUCKET").map_err(|_| OpskeeperError::MissingConfig("S3_BUCKET"))?;

        let mut config = Self::new(bucket);
        if let Ok(key) = env::var("EXPORT_TAG_KEY") {
            config.export_tag_key = key;
        }
        if let Ok(value) = env::var("EXPORT_TAG_VALUE") {
            config.export_tag_value = value;
        }
        config.ssm_endpoint = env::var("SSM_ENDPOINT").ok();
        Ok(config)
    }

    /// Sets the tag pair used to select log groups.
    pub fn with_export_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.export_tag_key = key.into();
        self.export_tag_value = value.into();
        self
    }

    /// Sets the delay between throttled attempts. Tests shrink this to zero.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the attempts allowed per submission.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }
}
