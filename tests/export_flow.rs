//! End-to-end export scenarios driven entirely by the mock clients.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use opskeeper::clients::mock::{MockLogService, MockParameterStore};
use opskeeper::export::checkpoint_parameter;
use opskeeper::{run_export, ExportConfig, OpskeeperError};

const GROUP: &str = "/aws/lambda/orders";

fn fast_config() -> ExportConfig {
    ExportConfig::new("audit-logs").with_retry_delay(Duration::ZERO)
}

#[tokio::test]
async fn first_export_covers_from_epoch_and_sets_checkpoint() {
    let logs = MockLogService::new();
    logs.set_group(GROUP, &[("export", "true")]).await;
    let params = MockParameterStore::new();
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let summary = run_export(&fast_config(), &logs, &params, now).await.unwrap();

    assert_eq!(summary.exported, vec![GROUP.to_string()]);
    let tasks = logs.created_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].from_millis, 0);
    assert_eq!(tasks[0].to_millis, now.timestamp_millis());
    assert_eq!(tasks[0].bucket, "audit-logs");
    assert_eq!(tasks[0].prefix, GROUP);
    assert_eq!(tasks[0].task_name, format!("export-{GROUP}-{}", now.timestamp_millis()));

    // Checkpoint advanced to the window end.
    assert_eq!(
        params.parameter(&checkpoint_parameter(GROUP)).await,
        Some(now.timestamp_millis().to_string())
    );
}

#[tokio::test]
async fn recent_checkpoint_skips_the_group() {
    let logs = MockLogService::new();
    logs.set_group(GROUP, &[("export", "true")]).await;
    let params = MockParameterStore::new();

    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();
    let six_hours_ago = now.timestamp_millis() - 6 * 60 * 60 * 1000;
    let parameter = checkpoint_parameter(GROUP);
    params.set_parameter(&parameter, six_hours_ago.to_string()).await;

    let summary = run_export(&fast_config(), &logs, &params, now).await.unwrap();

    assert_eq!(summary.skipped, vec![GROUP.to_string()]);
    assert!(logs.created_tasks().await.is_empty());
    // Checkpoint untouched.
    assert_eq!(
        params.parameter(&parameter).await,
        Some(six_hours_ago.to_string())
    );
}

#[tokio::test]
async fn stale_checkpoint_exports_the_full_window() {
    let logs = MockLogService::new();
    logs.set_group(GROUP, &[("export", "true")]).await;
    let params = MockParameterStore::new();

    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();
    let two_days_ago = now.timestamp_millis() - 48 * 60 * 60 * 1000;
    params
        .set_parameter(checkpoint_parameter(GROUP), two_days_ago.to_string())
        .await;

    let summary = run_export(&fast_config(), &logs, &params, now).await.unwrap();

    assert_eq!(summary.exported, vec![GROUP.to_string()]);
    let tasks = logs.created_tasks().await;
    assert_eq!(tasks[0].from_millis, two_days_ago);
    assert_eq!(tasks[0].to_millis, now.timestamp_millis());
}

#[tokio::test]
async fn untagged_and_unreadable_groups_are_skipped() {
    let logs = MockLogService::new();
    logs.set_group("/aws/lambda/untagged", &[]).await;
    logs.set_group("/aws/lambda/wrong-value", &[("export", "false")]).await;
    logs.set_group("/aws/lambda/broken-tags", &[("export", "true")]).await;
    logs.fail_tags_for("/aws/lambda/broken-tags").await;
    logs.set_group(GROUP, &[("export", "true")]).await;
    let params = MockParameterStore::new();
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let summary = run_export(&fast_config(), &logs, &params, now).await.unwrap();

    // Only the readable, correctly tagged group made it through.
    assert_eq!(summary.exported, vec![GROUP.to_string()]);
    assert_eq!(logs.created_tasks().await.len(), 1);
}

#[tokio::test]
async fn throttling_is_retried_until_accepted() {
    let logs = MockLogService::new();
    logs.set_group(GROUP, &[("export", "true")]).await;
    logs.throttle_next(9).await;
    let params = MockParameterStore::new();
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let summary = run_export(&fast_config(), &logs, &params, now).await.unwrap();

    assert_eq!(summary.exported, vec![GROUP.to_string()]);
    assert_eq!(
        params.parameter(&checkpoint_parameter(GROUP)).await,
        Some(now.timestamp_millis().to_string())
    );
}

#[tokio::test]
async fn exhausted_throttling_budget_aborts_the_run() {
    let logs = MockLogService::new();
    logs.set_group(GROUP, &[("export", "true")]).await;
    logs.throttle_next(10).await;
    let params = MockParameterStore::new();
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let err = run_export(&fast_config(), &logs, &params, now)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OpskeeperError::RetriesExhausted { attempts: 10, .. }
    ));
    // No task was accepted, so the checkpoint stays unset.
    assert!(logs.created_tasks().await.is_empty());
    assert_eq!(params.parameter(&checkpoint_parameter(GROUP)).await, None);
}

#[tokio::test]
async fn one_bad_group_aborts_the_remaining_groups() {
    // Preserved source behavior: a non-throttling submission failure takes
    // down the whole run instead of isolating the group.
    let logs = MockLogService::new();
    logs.set_group("/aws/lambda/poison", &[("export", "true")]).await;
    logs.set_group(GROUP, &[("export", "true")]).await;
    logs.fail_exports_for("/aws/lambda/poison").await;
    let params = MockParameterStore::new();
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 3, 0, 0).unwrap();

    let result = run_export(&fast_config(), &logs, &params, now).await;

    assert!(result.is_err());
    assert!(logs.created_tasks().await.is_empty());
    assert_eq!(params.parameter(&checkpoint_parameter(GROUP)).await, None);
}
