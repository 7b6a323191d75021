//! Client trait definitions for the external services.
//!
//! This module defines one trait per capability the workflows depend on:
//! the secret store, the parameter store, the remote-command dispatcher,
//! the log service, and the notifier. The workflows are written against
//! these seams only; production code wires in the AWS SDK implementations
//! from [`aws`] and [`webhook`], tests wire in the in-memory fakes from
//! [`mock`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Result;

pub mod aws;
pub mod mock;
pub mod webhook;

/// Stage label on a secret version.
///
/// A version holds at most one of these at a time; the store moves the
/// `Current` label between versions atomically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// The active version served to readers (`AWSCURRENT`).
    Current,
    /// The candidate version built during rotation (`AWSPENDING`).
    Pending,
}

impl Stage {
    /// The wire label the secret store uses for this stage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "AWSCURRENT",
            Self::Pending => "AWSPENDING",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rotation metadata for a secret, as reported by the store.
#[derive(Debug, Clone, Default)]
pub struct SecretMetadata {
    /// Whether the store has rotation enabled for this secret
    pub rotation_enabled: bool,
    /// Version id to stage labels; a version can carry zero or more labels
    pub versions: HashMap<String, Vec<Stage>>,
}

impl SecretMetadata {
    /// Stage labels attached to a version, if the version is known.
    pub fn stages_of(&self, version_id: &str) -> Option<&[Stage]> {
        self.versions.get(version_id).map(Vec::as_slice)
    }

    /// The version currently holding the `Current` stage, if any.
    pub fn current_version(&self) -> Option<&str> {
        self.versions
            .iter()
            .find(|(_, stages)| stages.contains(&Stage::Current))
            .map(|(version, _)| version.as_str())
    }
}

/// A request to export one log group window to object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTask {
    /// Generated task name, unique per submission
    pub task_name: String,
    /// Source log group
    pub log_group: String,
    /// Window start, epoch milliseconds (inclusive)
    pub from_millis: i64,
    /// Window end, epoch milliseconds (exclusive)
    pub to_millis: i64,
    /// Destination bucket
    pub bucket: String,
    /// Destination key prefix inside the bucket
    pub prefix: String,
}

/// Receipt for a submitted remote command batch.
#[derive(Debug, Clone)]
pub struct SentCommand {
    /// Command id assigned by the dispatch service
    pub command_id: String,
    /// Instances the command was sent to
    pub instance_ids: Vec<String>,
}

/// The versioned secret store (AWS Secrets Manager in production).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetches rotation metadata for a secret.
    ///
    /// # Errors
    ///
    /// Returns [`OpskeeperError::NotFound`](crate::OpskeeperError::NotFound)
    /// if the secret does not exist.
    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata>;

    /// Fetches a secret value, optionally pinned to a version id and stage.
    ///
    /// # Errors
    ///
    /// Returns [`OpskeeperError::NotFound`](crate::OpskeeperError::NotFound)
    /// if no value exists for the given version/stage combination.
    async fn secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        stage: Option<Stage>,
    ) -> Result<String>;

    /// Stores `value` as the pending version for `token`.
    async fn put_pending_value(&self, secret_id: &str, token: &str, value: &str) -> Result<()>;

    /// Moves the `Current` stage onto `move_to`, removing it from
    /// `remove_from` in the same call when given.
    async fn promote_to_current(
        &self,
        secret_id: &str,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<()>;

    /// Generates a random password excluding the given characters.
    async fn random_password(&self, exclude_characters: &str) -> Result<String>;
}

/// The key/value parameter store holding export checkpoints
/// (AWS SSM Parameter Store in production).
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Reads a parameter. `Ok(None)` means the parameter does not exist.
    async fn get_parameter(&self, name: &str) -> Result<Option<String>>;

    /// Writes a parameter, overwriting any existing value.
    async fn put_parameter(&self, name: &str, value: &str) -> Result<()>;
}

/// Fleet inventory plus remote shell dispatch
/// (EC2 + SSM Run Command in production).
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Instance ids of running instances carrying the tag pair.
    async fn running_instances_with_tag(&self, key: &str, value: &str) -> Result<Vec<String>>;

    /// Submits a shell command batch to the given instances.
    async fn run_shell_commands(
        &self,
        instance_ids: &[String],
        commands: &[String],
        comment: &str,
    ) -> Result<SentCommand>;
}

/// The log service (CloudWatch Logs in production).
#[async_trait]
pub trait LogService: Send + Sync {
    /// Names of all log groups. Implementations paginate internally; a
    /// transport failure mid-pagination yields the groups gathered so far.
    async fn log_group_names(&self) -> Result<Vec<String>>;

    /// Tags attached to a log group.
    async fn log_group_tags(&self, log_group: &str) -> Result<HashMap<String, String>>;

    /// Submits an export task and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`OpskeeperError::Throttled`](crate::OpskeeperError::Throttled)
    /// when the service rejects the submission due to rate limiting; the
    /// caller decides whether to retry.
    async fn create_export_task(&self, task: &ExportTask) -> Result<String>;
}

/// Outbound operational notifications.
///
/// Delivery is strictly best-effort: implementations log failures and
/// never surface them, so notifying can never change a workflow's outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers a plain-text message.
    async fn notify(&self, message: &str);
}
