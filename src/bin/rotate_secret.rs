//! Lambda entrypoint for the rotation workflow.

use lambda_runtime::{service_fn, Error, LambdaEvent};
use opskeeper::clients::aws::{AwsCommandDispatcher, AwsSecretStore};
use opskeeper::clients::webhook::WebhookNotifier;
use opskeeper::{handle_rotation, InvocationContext, RotationConfig, RotationEvent, RotationResponse};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn handle_request(event: LambdaEvent<RotationEvent>) -> Result<RotationResponse, Error> {
    let config = RotationConfig::from_env();
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

    let secrets = AwsSecretStore::from_shared(&sdk_config, config.secrets_endpoint.as_deref());
    let dispatcher = AwsCommandDispatcher::from_shared(&sdk_config, config.ssm_endpoint.as_deref());
    let notifier = WebhookNotifier::new(config.webhook_url.as_deref());

    let ctx = InvocationContext::from(&event.context);
    Ok(handle_rotation(event.payload, &ctx, &config, &secrets, &dispatcher, &notifier).await)
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
