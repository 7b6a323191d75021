//! Finish-time credential propagation to the instance fleet.

use tracing::{error, info, warn};

use crate::clients::CommandDispatcher;
use crate::config::RotationConfig;
use crate::Result;

/// Pushes the rotated passwords onto every running instance carrying the
/// rotation tag.
///
/// Each instance receives one shell pipeline per user that fetches the
/// secret's current value and applies that user's password locally, so the
/// new credentials never transit the command channel. An empty fleet is a
/// logged no-op. Submission failure is logged and swallowed: the secret
/// store already holds the promoted value, and the next rotation will
/// converge the fleet.
pub async fn update_instances(
    config: &RotationConfig,
    dispatcher: &dyn CommandDispatcher,
    secret_id: &str,
) -> Result<()> {
    info!(users = ?config.users, "updating passwords for users");
    info!(
        tag_key = %config.rotation_tag_key,
        tag_value = %config.rotation_tag_value,
        "selecting instances by rotation tag"
    );

    let instance_ids = dispatcher
        .running_instances_with_tag(&config.rotation_tag_key, &config.rotation_tag_value)
        .await?;

    if instance_ids.is_empty() {
        warn!(
            tag_key = %config.rotation_tag_key,
            tag_value = %config.rotation_tag_value,
            "no running instances carry the rotation tag"
        );
        return Ok(());
    }
    info!(?instance_ids, "found tagged running instances");

    let commands: Vec<String> = config
        .users
        .iter()
        .map(|user| password_command(secret_id, user))
        .collect();

    match dispatcher
        .run_shell_commands(
            &instance_ids,
            &commands,
            "Update EC2 user passwords with new secret",
        )
        .await
    {
        Ok(sent) => {
            info!(
                command_id = %sent.command_id,
                instance_ids = ?sent.instance_ids,
                "command sent"
            );
        }
        Err(err) => {
            // Best-effort: storage already succeeded, so a failed dispatch
            // must not fail the rotation.
            error!(error = %err, "failed to send command");
        }
    }

    Ok(())
}

/// The per-user shell pipeline applied on each instance.
fn password_command(secret_id: &str, user: &str) -> String {
    format!(
        "aws secretsmanager get-secret-value --secret-id {secret_id} \
         --query 'SecretString' --output text | jq -r '.\"{user}\"' | \
         sudo passwd {user} --stdin"
    )
}
