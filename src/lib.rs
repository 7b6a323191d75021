//! Opskeeper - operational housekeeping Lambdas.
//!
//! Two independent workflows, each shipped as its own Lambda binary:
//!
//! - **Rotation** (`rotate-secret`): serves the Secrets Manager four-step
//!   rotation contract for a multi-user password secret, then pushes the
//!   new passwords onto the tagged instance fleet via SSM Run Command and
//!   sends an operational notification.
//! - **Log export** (`export-logs`): periodically exports tagged CloudWatch
//!   log groups to S3, tracking a per-group checkpoint in Parameter Store
//!   and retrying throttled submissions a bounded number of times.
//!
//! Both workflows are plain async functions over a config struct and
//! injected client traits, so they run unchanged against the AWS SDK
//! implementations in production and the in-memory fakes in tests.
//!
//! # Quick Start
//!
//! ```
//! use opskeeper::clients::mock::{MockCommandDispatcher, MockNotifier, MockSecretStore};
//! use opskeeper::clients::Stage;
//! use opskeeper::{handle_rotation, InvocationContext, RotationConfig, RotationEvent};
//!
//! #[tokio::main]
//! async fn main() {
//!     let secrets = MockSecretStore::new();
//!     secrets.set_secret("arn:secret", true).await;
//!     secrets
//!         .set_version("arn:secret", "v1", &[Stage::Current], Some("{\"ec2-user\":\"old\"}"))
//!         .await;
//!     secrets.set_version("arn:secret", "v2", &[Stage::Pending], None).await;
//!
//!     let event = RotationEvent {
//!         secret_id: "arn:secret".to_string(),
//!         token: "v2".to_string(),
//!         step: "createSecret".to_string(),
//!     };
//!
//!     let response = handle_rotation(
//!         event,
//!         &InvocationContext::default(),
//!         &RotationConfig::default(),
//!         &secrets,
//!         &MockCommandDispatcher::new(),
//!         &MockNotifier::new(),
//!     )
//!     .await;
//!
//!     assert_eq!(response.status_code, 200);
//! }
//! ```

pub mod clients;
pub mod config;
pub mod error;
pub mod export;
pub mod propagate;
pub mod rotation;

pub use config::{ExportConfig, RotationConfig};
pub use error::{OpskeeperError, Result};
pub use export::{run_export, ExportSummary};
pub use rotation::{handle_rotation, InvocationContext, RotationEvent, RotationResponse, RotationStep};
