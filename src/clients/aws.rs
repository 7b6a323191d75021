//! AWS SDK implementations of the client traits.
//!
//! Each type wraps one SDK client. Constructors take the shared
//! [`SdkConfig`](aws_config::SdkConfig) loaded once at startup, with an
//! optional per-service endpoint override (LocalStack-style testing).

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ec2::types::Filter;
use aws_sdk_ssm::types::ParameterType;
use tracing::error;

use crate::clients::{
    CommandDispatcher, ExportTask, LogService, ParameterStore, SecretMetadata, SecretStore,
    SentCommand, Stage,
};
use crate::{OpskeeperError, Result};

/// Secrets Manager-backed [`SecretStore`].
pub struct AwsSecretStore {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretStore {
    /// Wraps an existing SDK client.
    pub fn new(client: aws_sdk_secretsmanager::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the shared config, honoring an endpoint override.
    pub fn from_shared(config: &SdkConfig, endpoint: Option<&str>) -> Self {
        let mut builder = aws_sdk_secretsmanager::config::Builder::from(config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: aws_sdk_secretsmanager::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata> {
        let response = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_resource_not_found_exception() {
                    OpskeeperError::NotFound(format!("secret {secret_id}"))
                } else {
                    OpskeeperError::Other(anyhow!("describe_secret {secret_id}: {service}"))
                }
            })?;

        let mut versions = HashMap::new();
        if let Some(map) = response.version_ids_to_stages() {
            for (version, labels) in map {
                let stages = labels
                    .iter()
                    .filter_map(|label| match label.as_str() {
                        "AWSCURRENT" => Some(Stage::Current),
                        "AWSPENDING" => Some(Stage::Pending),
                        _ => None,
                    })
                    .collect();
                versions.insert(version.clone(), stages);
            }
        }

        Ok(SecretMetadata {
            rotation_enabled: response.rotation_enabled().unwrap_or(false),
            versions,
        })
    }

    async fn secret_value(
        &self,
        secret_id: &str,
        version_id: Option<&str>,
        stage: Option<Stage>,
    ) -> Result<String> {
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .set_version_id(version_id.map(String::from))
            .set_version_stage(stage.map(|s| s.as_str().to_string()))
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_resource_not_found_exception() {
                    OpskeeperError::NotFound(format!(
                        "secret value for {secret_id} (version {version_id:?}, stage {stage:?})"
                    ))
                } else {
                    OpskeeperError::Other(anyhow!("get_secret_value {secret_id}: {service}"))
                }
            })?;

        response
            .secret_string()
            .map(String::from)
            .ok_or_else(|| OpskeeperError::NotFound(format!("secret {secret_id} has no string value")))
    }

    async fn put_pending_value(&self, secret_id: &str, token: &str, value: &str) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(token)
            .secret_string(value)
            .version_stages(Stage::Pending.as_str())
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!("put_secret_value {secret_id}: {service}"))
            })?;
        Ok(())
    }

    async fn promote_to_current(
        &self,
        secret_id: &str,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<()> {
        self.client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(Stage::Current.as_str())
            .move_to_version_id(move_to)
            .set_remove_from_version_id(remove_from.map(String::from))
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!(
                    "update_secret_version_stage {secret_id}: {service}"
                ))
            })?;
        Ok(())
    }

    async fn random_password(&self, exclude_characters: &str) -> Result<String> {
        let response = self
            .client
            .get_random_password()
            .exclude_characters(exclude_characters)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!("get_random_password: {service}"))
            })?;

        response
            .random_password()
            .map(String::from)
            .ok_or_else(|| OpskeeperError::Other(anyhow!("store returned an empty password")))
    }
}

/// SSM Parameter Store-backed [`ParameterStore`].
pub struct AwsParameterStore {
    client: aws_sdk_ssm::Client,
}

impl AwsParameterStore {
    /// Wraps an existing SDK client.
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the shared config, honoring an endpoint override.
    pub fn from_shared(config: &SdkConfig, endpoint: Option<&str>) -> Self {
        let mut builder = aws_sdk_ssm::config::Builder::from(config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Self {
            client: aws_sdk_ssm::Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl ParameterStore for AwsParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_parameter().name(name).send().await {
            Ok(response) => Ok(response
                .parameter()
                .and_then(|p| p.value())
                .map(String::from)),
            Err(e) => {
                let service = e.into_service_error();
                if service.is_parameter_not_found() {
                    Ok(None)
                } else {
                    Err(OpskeeperError::Other(anyhow!(
                        "get_parameter {name}: {service}"
                    )))
                }
            }
        }
    }

    async fn put_parameter(&self, name: &str, value: &str) -> Result<()> {
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!("put_parameter {name}: {service}"))
            })?;
        Ok(())
    }
}

/// EC2 + SSM Run Command-backed [`CommandDispatcher`].
pub struct AwsCommandDispatcher {
    ec2: aws_sdk_ec2::Client,
    ssm: aws_sdk_ssm::Client,
}

impl AwsCommandDispatcher {
    /// Wraps existing SDK clients.
    pub fn new(ec2: aws_sdk_ec2::Client, ssm: aws_sdk_ssm::Client) -> Self {
        Self { ec2, ssm }
    }

    /// Builds both clients from the shared config. The SSM endpoint override
    /// applies to command dispatch only; instance lookup always goes to EC2
    /// proper.
    pub fn from_shared(config: &SdkConfig, ssm_endpoint: Option<&str>) -> Self {
        let mut ssm_builder = aws_sdk_ssm::config::Builder::from(config);
        if let Some(endpoint) = ssm_endpoint {
            ssm_builder = ssm_builder.endpoint_url(endpoint);
        }
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            ssm: aws_sdk_ssm::Client::from_conf(ssm_builder.build()),
        }
    }
}

#[async_trait]
impl CommandDispatcher for AwsCommandDispatcher {
    async fn running_instances_with_tag(&self, key: &str, value: &str) -> Result<Vec<String>> {
        let response = self
            .ec2
            .describe_instances()
            .filters(
                Filter::builder()
                    .name(format!("tag:{key}"))
                    .values(value)
                    .build(),
            )
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!("describe_instances: {service}"))
            })?;

        Ok(response
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .filter_map(|instance| instance.instance_id())
            .map(String::from)
            .collect())
    }

    async fn run_shell_commands(
        &self,
        instance_ids: &[String],
        commands: &[String],
        comment: &str,
    ) -> Result<SentCommand> {
        let response = self
            .ssm
            .send_command()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .document_name("AWS-RunShellScript")
            .parameters("commands", commands.to_vec())
            .comment(comment)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!("send_command: {service}"))
            })?;

        let command = response
            .command()
            .ok_or_else(|| OpskeeperError::Other(anyhow!("send_command returned no command")))?;

        Ok(SentCommand {
            command_id: command.command_id().unwrap_or_default().to_string(),
            instance_ids: command.instance_ids().to_vec(),
        })
    }
}

/// CloudWatch Logs-backed [`LogService`].
pub struct AwsLogService {
    client: aws_sdk_cloudwatchlogs::Client,
}

impl AwsLogService {
    /// Wraps an existing SDK client.
    pub fn new(client: aws_sdk_cloudwatchlogs::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the shared config.
    pub fn from_shared(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatchlogs::Client::new(config),
        }
    }
}

#[async_trait]
impl LogService for AwsLogService {
    async fn log_group_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let response = match self
                .client
                .describe_log_groups()
                .set_next_token(next_token.clone())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    // A broken page is treated as end-of-listing; the groups
                    // gathered so far still get their chance to export.
                    error!(error = %e.into_service_error(), "describe_log_groups failed mid-pagination");
                    break;
                }
            };

            names.extend(
                response
                    .log_groups()
                    .iter()
                    .filter_map(|group| group.log_group_name())
                    .map(String::from),
            );

            next_token = response.next_token().map(String::from);
            if next_token.is_none() {
                break;
            }
        }

        Ok(names)
    }

    async fn log_group_tags(&self, log_group: &str) -> Result<HashMap<String, String>> {
        #[allow(deprecated)]
        let response = self
            .client
            .list_tags_log_group()
            .log_group_name(log_group)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                OpskeeperError::Other(anyhow!("list_tags_log_group {log_group}: {service}"))
            })?;

        Ok(response.tags().cloned().unwrap_or_default())
    }

    async fn create_export_task(&self, task: &ExportTask) -> Result<String> {
        let response = self
            .client
            .create_export_task()
            .task_name(&task.task_name)
            .log_group_name(&task.log_group)
            .from(task.from_millis)
            .to(task.to_millis)
            .destination(&task.bucket)
            .destination_prefix(&task.prefix)
            .send()
            .await
            .map_err(|e| {
                let service = e.into_service_error();
                if service.is_limit_exceeded_exception() {
                    OpskeeperError::Throttled(service.to_string())
                } else {
                    OpskeeperError::Other(anyhow!(
                        "create_export_task {}: {service}",
                        task.log_group
                    ))
                }
            })?;

        response
            .task_id()
            .map(String::from)
            .ok_or_else(|| OpskeeperError::Other(anyhow!("create_export_task returned no task id")))
    }
}
