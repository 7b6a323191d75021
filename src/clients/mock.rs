//! In-memory client fakes for testing.
//!
//! These fakes provide complete implementations of the client traits with
//! pre-population helpers, call capture, and error injection, so the
//! workflows can be exercised deterministically without any cloud account.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::clients::{
    CommandDispatcher, ExportTask, LogService, Notifier, ParameterStore, SecretMetadata,
    SecretStore, SentCommand, Stage,
};
use crate::{OpskeeperError, Result};

#[derive(Debug, Clone, Default)]
struct MockSecret {
    rotation_enabled: bool,
    versions: HashMap<String, Vec<Stage>>,
    values: HashMap<String, String>,
}

/// Mock secret store with stage bookkeeping and error injection.
///
/// # Example
///
/// ```
/// use opskeeper::clients::mock::MockSecretStore;
/// use opskeeper::clients::{SecretStore, Stage};
///
/// #[tokio::main]
/// async fn main() -> opskeeper::Result<()> {
///     let store = MockSecretStore::new();
///     store.set_secret("arn:secret", true).await;
///     store
///         .set_version("arn:secret", "v1", &[Stage::Current], Some("{\"ec2-user\":\"old\"}"))
///         .await;
///
///     let metadata = store.describe_secret("arn:secret").await?;
///     assert!(metadata.rotation_enabled);
///     Ok(())
/// }
/// ```
pub struct MockSecretStore {
    secrets: Arc<RwLock<HashMap<String, MockSecret>>>,
    password_requests: Arc<RwLock<Vec<String>>>,
    mutations: Arc<RwLock<u32>>,

    /// Error to return from `put_pending_value()`
    pub put_error: Option<OpskeeperError>,
    /// Error to return from `promote_to_current()`
    pub promote_error: Option<OpskeeperError>,
}

impl MockSecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            secrets: Arc::new(RwLock::new(HashMap::new())),
            password_requests: Arc::new(RwLock::new(Vec::new())),
            mutations: Arc::new(RwLock::new(0)),
            put_error: None,
            promote_error: None,
        }
    }

    /// Registers a secret, replacing any previous registration.
    pub async fn set_secret(&self, secret_id: impl Into<String>, rotation_enabled: bool) {
        let mut secrets = self.secrets.write().await;
        secrets.insert(
            secret_id.into(),
            MockSecret {
                rotation_enabled,
                ..Default::default()
            },
        );
    }

    /// Attaches a version with the given stage labels and optional value.
    pub async fn set_version(
        &self,
        secret_id: &str,
        version_id: impl Into<String>,
        stages: &[Stage],
        value: Option<&str>,
    ) {
        let version_id = version_id.into();
        let mut secrets = self.secrets.write().await;
        let secret = secrets.entry(secret_id.to_string()).or_default();
        secret.versions.insert(version_id.clone(), stages.to_vec());
        if let Some(value) = value {
            secret.values.insert(version_id, value.to_string());
        }
    }

    /// The stage labels currently attached to each version of a secret.
    pub async fn stages(&self, secret_id: &str) -> HashMap<String, Vec<Stage>> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .map(|secret| secret.versions.clone())
            .unwrap_or_default()
    }

    /// The stored value for a specific version, if any.
    pub async fn value_of(&self, secret_id: &str, version_id: &str) -> Option<String> {
        let secrets = self.secrets.read().await;
        secrets
            .get(secret_id)
            .and_then(|secret| secret.values.get(version_id))
            .cloned()
    }

    /// The exclusion sets passed to `random_password()`, in call order.
    pub async fn password_requests(&self) -> Vec<String> {
        self.password_requests.read().await.clone()
    }

    /// Number of store mutations (puts and promotions) performed.
    pub async fn mutation_count(&self) -> u32 {
        *self.mutations.read().await
    }
}

impl Default for MockSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for MockSecretStore {
    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata> {
        let secrets = self.secrets.read().await;
        let secret = secrets
            .get(secret_id)
            .ok_or_else(|| OpskeeperError::NotFound(format!("secret {secret_id}")))?;

        Ok(SecretMetadata {
            rotation_enabled: secret.rotation_enabled,
            versions: secret.versions.clone(),
        })
    }

    async fn secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        stage: Option<Stage>,
    ) -> Result<String> {
        let secrets = self.secrets.read().await;
        let secret = secrets
            .get(secret_id)
            .ok_or_else(|| OpskeeperError::NotFound(format!("secret {secret_id}")))?;

        let resolved = match (version_id, stage) {
            (Some(version), stage) => {
                let labels = secret.versions.get(version);
                match labels {
                    Some(labels) if stage.is_none_or(|s| labels.contains(&s)) => Some(version),
                    _ => None,
                }
            }
            (None, Some(stage)) => secret
                .versions
                .iter()
                .find(|(_, labels)| labels.contains(&stage))
                .map(|(version, _)| version.as_str()),
            (None, None) => secret.versions.keys().next().map(String::as_str),
        };

        resolved
            .and_then(|version| secret.values.get(version))
            .cloned()
            .ok_or_else(|| {
                OpskeeperError::NotFound(format!(
                    "secret value for {secret_id} (version {version_id:?}, stage {stage:?})"
                ))
            })
    }

    async fn put_pending_value(&self, secret_id: &str, token: &str, value: &str) -> Result<()> {
        if let Some(ref err) = self.put_error {
            return Err(OpskeeperError::Other(anyhow!("{err}")));
        }

        let mut secrets = self.secrets.write().await;
        let secret = secrets
            .get_mut(secret_id)
            .ok_or_else(|| OpskeeperError::NotFound(format!("secret {secret_id}")))?;

        let labels = secret.versions.entry(token.to_string()).or_default();
        if !labels.contains(&Stage::Pending) {
            labels.push(Stage::Pending);
        }
        secret.values.insert(token.to_string(), value.to_string());
        drop(secrets);

        *self.mutations.write().await += 1;
        Ok(())
    }

    async fn promote_to_current(
        &self,
        secret_id: &str,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<()> {
        if let Some(ref err) = self.promote_error {
            return Err(OpskeeperError::Other(anyhow!("{err}")));
        }

        let mut secrets = self.secrets.write().await;
        let secret = secrets
            .get_mut(secret_id)
            .ok_or_else(|| OpskeeperError::NotFound(format!("secret {secret_id}")))?;

        if let Some(old) = remove_from {
            if let Some(labels) = secret.versions.get_mut(old) {
                labels.retain(|stage| *stage != Stage::Current);
            }
        }
        let labels = secret.versions.entry(move_to.to_string()).or_default();
        if !labels.contains(&Stage::Current) {
            labels.push(Stage::Current);
        }
        drop(secrets);

        *self.mutations.write().await += 1;
        Ok(())
    }

    async fn random_password(&self, exclude_characters: &str) -> Result<String> {
        let mut requests = self.password_requests.write().await;
        requests.push(exclude_characters.to_string());
        Ok(format!("generated-password-{}", requests.len()))
    }
}

/// Mock parameter store.
pub struct MockParameterStore {
    parameters: Arc<RwLock<HashMap<String, String>>>,
}

impl MockParameterStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            parameters: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Pre-populates a parameter.
    pub async fn set_parameter(&self, name: impl Into<String>, value: impl Into<String>) {
        let mut parameters = self.parameters.write().await;
        parameters.insert(name.into(), value.into());
    }

    /// Reads a parameter back for assertions.
    pub async fn parameter(&self, name: &str) -> Option<String> {
        self.parameters.read().await.get(name).cloned()
    }
}

impl Default for MockParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ParameterStore for MockParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        Ok(self.parameters.read().await.get(name).cloned())
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<()> {
        let mut parameters = self.parameters.write().await;
        parameters.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// A captured remote command batch.
#[derive(Debug, Clone)]
pub struct DispatchedCommand {
    /// Instances the batch targeted
    pub instance_ids: Vec<String>,
    /// Shell commands in the batch
    pub commands: Vec<String>,
    /// Operator-facing comment
    pub comment: String,
}

/// Mock command dispatcher that captures submitted batches.
pub struct MockCommandDispatcher {
    instances: Arc<RwLock<Vec<String>>>,
    dispatched: Arc<RwLock<Vec<DispatchedCommand>>>,

    /// Error to return from `running_instances_with_tag()`
    pub inventory_error: Option<OpskeeperError>,
    /// Error to return from `run_shell_commands()`
    pub send_error: Option<OpskeeperError>,
}

impl MockCommandDispatcher {
    /// Creates a dispatcher with an empty fleet.
    pub fn new() -> Self {
        Self {
            instances: Arc::new(RwLock::new(Vec::new())),
            dispatched: Arc::new(RwLock::new(Vec::new())),
            inventory_error: None,
            send_error: None,
        }
    }

    /// Pre-populates the running fleet.
    pub async fn set_instances<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut instances = self.instances.write().await;
        *instances = ids.into_iter().map(Into::into).collect();
    }

    /// Batches captured so far, in submission order.
    pub async fn dispatched(&self) -> Vec<DispatchedCommand> {
        self.dispatched.read().await.clone()
    }
}

impl Default for MockCommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandDispatcher for MockCommandDispatcher {
    async fn running_instances_with_tag(&self, _key: &str, _value: &str) -> Result<Vec<String>> {
        if let Some(ref err) = self.inventory_error {
            return Err(OpskeeperError::Other(anyhow!("{err}")));
        }
        Ok(self.instances.read().await.clone())
    }

    async fn run_shell_commands(
        &self,
        instance_ids: &[String],
        commands: &[String],
        comment: &str,
    ) -> Result<SentCommand> {
        if let Some(ref err) = self.send_error {
            return Err(OpskeeperError::Other(anyhow!("{err}")));
        }

        let mut dispatched = self.dispatched.write().await;
        dispatched.push(DispatchedCommand {
            instance_ids: instance_ids.to_vec(),
            commands: commands.to_vec(),
            comment: comment.to_string(),
        });

        Ok(SentCommand {
            command_id: format!("mock-command-{}", dispatched.len()),
            instance_ids: instance_ids.to_vec(),
        })
    }
}

/// Mock log service with scripted throttling.
pub struct MockLogService {
    groups: Arc<RwLock<Vec<String>>>,
    tags: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    tag_failures: Arc<RwLock<Vec<String>>>,
    export_failures: Arc<RwLock<Vec<String>>>,
    throttle_remaining: Arc<RwLock<u32>>,
    created: Arc<RwLock<Vec<ExportTask>>>,
}

impl MockLogService {
    /// Creates a service with no log groups.
    pub fn new() -> Self {
        Self {
            groups: Arc::new(RwLock::new(Vec::new())),
            tags: Arc::new(RwLock::new(HashMap::new())),
            tag_failures: Arc::new(RwLock::new(Vec::new())),
            export_failures: Arc::new(RwLock::new(Vec::new())),
            throttle_remaining: Arc::new(RwLock::new(0)),
            created: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a log group with its tags.
    pub async fn set_group(&self, name: impl Into<String>, tags: &[(&str, &str)]) {
        let name = name.into();
        self.groups.write().await.push(name.clone());
        self.tags.write().await.insert(
            name,
            tags.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }

    /// Makes the tag lookup for a group fail.
    pub async fn fail_tags_for(&self, name: impl Into<String>) {
        self.tag_failures.write().await.push(name.into());
    }

    /// Makes export submissions for a group fail with a non-throttling error.
    pub async fn fail_exports_for(&self, name: impl Into<String>) {
        self.export_failures.write().await.push(name.into());
    }

    /// Makes the next `count` export submissions report throttling.
    pub async fn throttle_next(&self, count: u32) {
        *self.throttle_remaining.write().await = count;
    }

    /// Export tasks accepted so far, in submission order.
    pub async fn created_tasks(&self) -> Vec<ExportTask> {
        self.created.read().await.clone()
    }
}

impl Default for MockLogService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogService for MockLogService {
    async fn log_group_names(&self) -> Result<Vec<String>> {
        Ok(self.groups.read().await.clone())
    }

    async fn log_group_tags(&self, log_group: &str) -> Result<HashMap<String, String>> {
        if self
            .tag_failures
            .read()
            .await
            .iter()
            .any(|name| name == log_group)
        {
            return Err(OpskeeperError::Other(anyhow!(
                "tag lookup failed for {log_group}"
            )));
        }
        Ok(self
            .tags
            .read()
            .await
            .get(log_group)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_export_task(&self, task: &ExportTask) -> Result<String> {
        if self
            .export_failures
            .read()
            .await
            .iter()
            .any(|name| *name == task.log_group)
        {
            return Err(OpskeeperError::Other(anyhow!(
                "export rejected for {}",
                task.log_group
            )));
        }

        {
            let mut throttles = self.throttle_remaining.write().await;
            if *throttles > 0 {
                *throttles -= 1;
                return Err(OpskeeperError::Throttled(
                    "LimitExceededException".to_string(),
                ));
            }
        }

        let mut created = self.created.write().await;
        created.push(task.clone());
        Ok(format!("mock-task-{}", created.len()))
    }
}

/// Mock notifier that records every message.
pub struct MockNotifier {
    messages: Arc<RwLock<Vec<String>>>,
}

impl MockNotifier {
    /// Creates a notifier with no messages recorded.
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Messages delivered so far, in order.
    pub async fn messages(&self) -> Vec<String> {
        self.messages.read().await.clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, message: &str) {
        self.messages.write().await.push(message.to_string());
    }
}
