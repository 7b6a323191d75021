//! Lambda entrypoint for the scheduled log export workflow.

use chrono::Utc;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use opskeeper::clients::aws::{AwsLogService, AwsParameterStore};
use opskeeper::{run_export, ExportConfig};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn handle_request(_event: LambdaEvent<Value>) -> Result<(), Error> {
    let config = ExportConfig::from_env()?;
    info!(bucket = %config.bucket, "starting log export run");

    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let logs = AwsLogService::from_shared(&sdk_config);
    let params = AwsParameterStore::from_shared(&sdk_config, config.ssm_endpoint.as_deref());

    let summary = run_export(&config, &logs, &params, Utc::now()).await?;
    info!(
        exported = summary.exported.len(),
        skipped = summary.skipped.len(),
        "export run complete"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().json().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    lambda_runtime::run(service_fn(handle_request)).await
}
