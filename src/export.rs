//! Scheduled export of tagged log groups to object storage.
//!
//! Each run enumerates log groups, keeps the ones carrying the export tag,
//! and submits one export task per group covering the window from its last
//! checkpoint to now. Checkpoints live in the parameter store and advance
//! only after a confirmed submission.

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::clients::{ExportTask, LogService, ParameterStore};
use crate::config::ExportConfig;
use crate::{OpskeeperError, Result};

/// Parameter path prefix for per-group checkpoints.
pub const CHECKPOINT_PREFIX: &str = "/log-exporter-last-export";

/// The checkpoint parameter name for a log group.
///
/// Log group names start with `/`, so the joined path collapses the doubled
/// separator.
pub fn checkpoint_parameter(log_group: &str) -> String {
    format!("{CHECKPOINT_PREFIX}/{log_group}").replace("//", "/")
}

/// What one export run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Groups whose export task was submitted this run
    pub exported: Vec<String>,
    /// Groups skipped because their window was under the minimum age
    pub skipped: Vec<String>,
}

/// Runs one export pass over all tagged log groups.
///
/// A failed tag lookup skips that group; a failed submission aborts the
/// whole run once the throttling budget is spent. The checkpoint for a
/// group is advanced to the window end only after its task is accepted.
pub async fn run_export(
    config: &ExportConfig,
    logs: &dyn LogService,
    params: &dyn ParameterStore,
    now: DateTime<Utc>,
) -> Result<ExportSummary> {
    let groups = logs.log_group_names().await?;

    let mut to_export = Vec::new();
    for group in groups {
        match logs.log_group_tags(&group).await {
            Ok(tags) => {
                if tags.get(&config.export_tag_key) == Some(&config.export_tag_value) {
                    to_export.push(group);
                }
            }
            Err(err) => {
                error!(log_group = %group, error = %err, "error listing tags for log group");
            }
        }
    }

    let mut summary = ExportSummary::default();
    for log_group in to_export {
        let parameter = checkpoint_parameter(&log_group);
        let last_export = match params.get_parameter(&parameter).await? {
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                OpskeeperError::Other(anyhow!("checkpoint {parameter} is not a timestamp: {e}"))
            })?,
            None => 0,
        };

        let export_time = now.timestamp_millis();
        info!(log_group = %log_group, bucket = %config.bucket, "exporting log group");

        if export_time - last_export < config.min_export_age.as_millis() as i64 {
            info!("skipped until 24hrs from last export is completed");
            summary.skipped.push(log_group);
            continue;
        }

        let task = ExportTask {
            task_name: format!("export-{log_group}-{export_time}"),
            log_group: log_group.clone(),
            from_millis: last_export,
            to_millis: export_time,
            bucket: config.bucket.clone(),
            prefix: log_group.clone(),
        };

        let task_id = submit_with_retry(config, logs, &task).await?;
        info!(%task_id, "task created");

        params
            .put_parameter(&parameter, &export_time.to_string())
            .await?;
        summary.exported.push(log_group);
    }

    Ok(summary)
}

/// Submits one export task, retrying only on throttling.
async fn submit_with_retry(
    config: &ExportConfig,
    logs: &dyn LogService,
    task: &ExportTask,
) -> Result<String> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match logs.create_export_task(task).await {
            Ok(task_id) => return Ok(task_id),
            Err(err) if err.is_throttling() && attempt < config.max_attempts => {
                info!(
                    attempt,
                    log_group = %task.log_group,
                    delay = ?config.retry_delay,
                    "throttled, waiting before retrying"
                );
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(err) if err.is_throttling() => {
                error!(
                    log_group = %task.log_group,
                    "maximum retries reached, unable to create export task"
                );
                return Err(OpskeeperError::RetriesExhausted {
                    log_group: task.log_group.clone(),
                    attempts: attempt,
                });
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::MockLogService;
    use std::time::Duration;

    #[test]
    fn test_checkpoint_parameter_collapses_doubled_slash() {
        assert_eq!(
            checkpoint_parameter("/aws/lambda/app"),
            "/log-exporter-last-export/aws/lambda/app"
        );
        assert_eq!(
            checkpoint_parameter("plain-group"),
            "/log-exporter-last-export/plain-group"
        );
    }

    fn sample_task() -> ExportTask {
        ExportTask {
            task_name: "export-/aws/lambda/app-1".to_string(),
            log_group: "/aws/lambda/app".to_string(),
            from_millis: 0,
            to_millis: 1,
            bucket: "audit-logs".to_string(),
            prefix: "/aws/lambda/app".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_within_budget() {
        let config = ExportConfig::new("audit-logs").with_retry_delay(Duration::ZERO);
        let logs = MockLogService::new();
        logs.throttle_next(9).await;

        let task_id = submit_with_retry(&config, &logs, &sample_task())
            .await
            .unwrap();
        assert_eq!(task_id, "mock-task-1");
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let config = ExportConfig::new("audit-logs").with_retry_delay(Duration::ZERO);
        let logs = MockLogService::new();
        logs.throttle_next(10).await;

        let err = submit_with_retry(&config, &logs, &sample_task())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpskeeperError::RetriesExhausted { attempts: 10, .. }
        ));
        assert!(logs.created_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_non_throttling_error_is_not_retried() {
        let config = ExportConfig::new("audit-logs").with_retry_delay(Duration::ZERO);
        let logs = MockLogService::new();
        logs.fail_exports_for("/aws/lambda/app").await;

        let err = submit_with_retry(&config, &logs, &sample_task())
            .await
            .unwrap_err();
        assert!(matches!(err, OpskeeperError::Other(_)));
    }
}
