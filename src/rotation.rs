//! The four-step rotation contract.
//!
//! The rotation orchestrator invokes the function once per step with a
//! secret id, a version token, and the step name. Preconditions are checked
//! against the secret's rotation metadata before any step runs; every
//! failure is caught at the handler boundary, logged with full diagnostics,
//! and reported outward as a generic failure.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use crate::clients::{CommandDispatcher, Notifier, SecretStore, Stage};
use crate::config::RotationConfig;
use crate::propagate;
use crate::{OpskeeperError, Result};

/// The rotation request, with the orchestrator's exact field names.
#[derive(Debug, Clone, Deserialize)]
pub struct RotationEvent {
    /// Secret ARN or identifier
    #[serde(rename = "SecretId")]
    pub secret_id: String,

    /// Version token for the in-flight rotation
    #[serde(rename = "ClientRequestToken")]
    pub token: String,

    /// Step name; validated in the dispatcher so that unknown steps are
    /// reported through the normal failure path
    #[serde(rename = "Step")]
    pub step: String,
}

/// One step of the rotation contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStep {
    /// Generate and store the pending secret value
    CreateSecret,
    /// Apply the pending value to the target system (no-op here)
    SetSecret,
    /// Verify the pending value works (no-op here)
    TestSecret,
    /// Promote pending to current, then propagate and notify
    FinishSecret,
}

impl FromStr for RotationStep {
    type Err = OpskeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createSecret" => Ok(Self::CreateSecret),
            "setSecret" => Ok(Self::SetSecret),
            "testSecret" => Ok(Self::TestSecret),
            "finishSecret" => Ok(Self::FinishSecret),
            other => Err(OpskeeperError::InvalidStep(other.to_string())),
        }
    }
}

impl std::fmt::Display for RotationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CreateSecret => "createSecret",
            Self::SetSecret => "setSecret",
            Self::TestSecret => "testSecret",
            Self::FinishSecret => "finishSecret",
        };
        f.write_str(name)
    }
}

/// The response returned to the rotation orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationResponse {
    /// 200 on success, 500 on any failure
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Human-readable outcome
    pub body: String,
}

/// Identity of the running invocation, used for failure diagnostics.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Lambda function name
    pub function_name: String,
    /// Request id assigned by the platform
    pub request_id: String,
    /// Log group receiving this invocation's output
    pub log_group: String,
    /// Log stream receiving this invocation's output
    pub log_stream: String,
}

impl From<&lambda_runtime::Context> for InvocationContext {
    fn from(ctx: &lambda_runtime::Context) -> Self {
        Self {
            function_name: ctx.env_config.function_name.clone(),
            request_id: ctx.request_id.clone(),
            log_group: ctx.env_config.log_group.clone(),
            log_stream: ctx.env_config.log_stream.clone(),
        }
    }
}

/// Runs one rotation step and converts any failure into the generic
/// 500 response.
///
/// Full diagnostics (including a ready-to-run log query) go to the log
/// stream only; the outward notification never carries details.
pub async fn handle_rotation(
    event: RotationEvent,
    ctx: &InvocationContext,
    config: &RotationConfig,
    secrets: &dyn SecretStore,
    dispatcher: &dyn CommandDispatcher,
    notifier: &dyn Notifier,
) -> RotationResponse {
    info!(
        secret_id = %event.secret_id,
        step = %event.step,
        "received rotation event"
    );

    match dispatch(&event, ctx, config, secrets, dispatcher, notifier).await {
        Ok(response) => response,
        Err(err) => {
            let query_hint = log_query_hint(ctx, Utc::now());
            error!(
                function = %ctx.function_name,
                request_id = %ctx.request_id,
                log_group = %ctx.log_group,
                log_stream = %ctx.log_stream,
                error = %err,
                %query_hint,
                "error in secret rotation process"
            );
            notifier
                .notify("Error in secret rotation process. Check the function's log stream for details.")
                .await;
            RotationResponse {
                status_code: 500,
                body: "An error occurred during function execution.".to_string(),
            }
        }
    }
}

async fn dispatch(
    event: &RotationEvent,
    ctx: &InvocationContext,
    config: &RotationConfig,
    secrets: &dyn SecretStore,
    dispatcher: &dyn CommandDispatcher,
    notifier: &dyn Notifier,
) -> Result<RotationResponse> {
    let step = event.step.parse::<RotationStep>()?;

    let metadata = secrets.describe_secret(&event.secret_id).await?;
    if !metadata.rotation_enabled {
        return Err(OpskeeperError::RotationNotEnabled(event.secret_id.clone()));
    }
    let Some(stages) = metadata.stages_of(&event.token) else {
        return Err(OpskeeperError::UnknownVersion {
            secret: event.secret_id.clone(),
            token: event.token.clone(),
        });
    };
    if !stages.contains(&Stage::Pending) {
        return Err(OpskeeperError::VersionNotPending {
            secret: event.secret_id.clone(),
            token: event.token.clone(),
        });
    }

    match step {
        RotationStep::CreateSecret => {
            create_secret(event, config, secrets).await?;
            Ok(step_completed(step))
        }
        RotationStep::SetSecret | RotationStep::TestSecret => {
            info!(%step, "nothing to do, moving to next step");
            Ok(step_completed(step))
        }
        RotationStep::FinishSecret => {
            finish_secret(event, secrets).await?;
            propagate::update_instances(config, dispatcher, &event.secret_id).await?;

            // Generic success message for the notification channel.
            notifier
                .notify("Secret rotation process completed successfully")
                .await;
            info!(
                function = %ctx.function_name,
                "successfully completed all steps in secret rotation"
            );
            Ok(RotationResponse {
                status_code: 200,
                body: "Function executed successfully!".to_string(),
            })
        }
    }
}

fn step_completed(step: RotationStep) -> RotationResponse {
    RotationResponse {
        status_code: 200,
        body: format!("Step {step} completed"),
    }
}

/// Generates and stores the pending value for this token.
///
/// Retries are idempotent: if a pending value already exists for the token,
/// nothing is generated or written.
async fn create_secret(
    event: &RotationEvent,
    config: &RotationConfig,
    secrets: &dyn SecretStore,
) -> Result<()> {
    // The current value must exist before we stage a successor.
    secrets
        .secret_value(&event.secret_id, None, Some(Stage::Current))
        .await?;

    match secrets
        .secret_value(&event.secret_id, Some(&event.token), Some(Stage::Pending))
        .await
    {
        Ok(_) => {
            info!(
                secret_id = %event.secret_id,
                "createSecret: pending value already exists, nothing to do"
            );
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            let mut document = serde_json::Map::new();
            for user in &config.users {
                let password = secrets.random_password(&config.exclude_characters).await?;
                document.insert(user.clone(), Value::String(password));
            }

            let value = serde_json::to_string(&Value::Object(document))?;
            secrets
                .put_pending_value(&event.secret_id, &event.token, &value)
                .await?;
            info!(
                secret_id = %event.secret_id,
                token = %event.token,
                "createSecret: successfully put pending secret value"
            );
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Moves the current stage onto this token.
///
/// A token that already holds current is a finished retry; the store is
/// left untouched.
async fn finish_secret(event: &RotationEvent, secrets: &dyn SecretStore) -> Result<()> {
    let metadata = secrets.describe_secret(&event.secret_id).await?;
    let current = metadata.current_version().map(String::from);

    if current.as_deref() == Some(event.token.as_str()) {
        info!(
            token = %event.token,
            secret_id = %event.secret_id,
            "finishSecret: version already marked as current"
        );
        return Ok(());
    }

    secrets
        .promote_to_current(&event.secret_id, &event.token, current.as_deref())
        .await?;
    info!(
        token = %event.token,
        secret_id = %event.secret_id,
        "finishSecret: successfully moved current stage"
    );
    Ok(())
}

/// A ready-to-run CLI command retrieving this invocation's recent log lines,
/// covering the last seven days and filtered by request id.
fn log_query_hint(ctx: &InvocationContext, now: DateTime<Utc>) -> String {
    let end = now.timestamp();
    let start = (now - Duration::days(7)).timestamp();
    format!(
        "aws logs get-query-results --query-id $(aws logs start-query \
         --log-group-name \"{}\" --start-time {start} --end-time {end} \
         --query-string 'fields @timestamp, @message | filter @requestId like /{}/ \
         | sort @timestamp desc | limit 20' | jq -r .queryId && sleep 5)",
        ctx.log_group, ctx.request_id
    )
}
