//! End-to-end rotation scenarios driven entirely by the mock clients.

use opskeeper::clients::mock::{MockCommandDispatcher, MockNotifier, MockSecretStore};
use opskeeper::clients::Stage;
use opskeeper::{handle_rotation, InvocationContext, RotationConfig, RotationEvent};

const SECRET_ID: &str = "arn:aws:secretsmanager:eu-west-1:123456789012:secret:fleet-users";

fn rotation_event(step: &str, token: &str) -> RotationEvent {
    RotationEvent {
        secret_id: SECRET_ID.to_string(),
        token: token.to_string(),
        step: step.to_string(),
    }
}

fn test_context() -> InvocationContext {
    InvocationContext {
        function_name: "rotate-secret".to_string(),
        request_id: "req-e2e".to_string(),
        log_group: "/aws/lambda/rotate-secret".to_string(),
        log_stream: "2026/08/06/[$LATEST]e2e".to_string(),
    }
}

async fn store_with_current_and_pending() -> MockSecretStore {
    let store = MockSecretStore::new();
    store.set_secret(SECRET_ID, true).await;
    store
        .set_version(
            SECRET_ID,
            "v1",
            &[Stage::Current],
            Some("{\"ec2-user\":\"old-password\"}"),
        )
        .await;
    store.set_version(SECRET_ID, "v2", &[Stage::Pending], None).await;
    store
}

#[tokio::test]
async fn create_secret_generates_one_password_per_user() {
    let store = store_with_current_and_pending().await;
    let dispatcher = MockCommandDispatcher::new();
    let notifier = MockNotifier::new();
    let config = RotationConfig::default()
        .with_users(["alice", "bob"])
        .with_exclude_characters("/@\"'\\");

    let response = handle_rotation(
        rotation_event("createSecret", "v2"),
        &test_context(),
        &config,
        &store,
        &dispatcher,
        &notifier,
    )
    .await;

    assert_eq!(response.status_code, 200);

    let value = store.value_of(SECRET_ID, "v2").await.expect("pending value stored");
    let document: serde_json::Value = serde_json::from_str(&value).unwrap();
    let fields = document.as_object().unwrap();
    assert_eq!(fields.len(), 2);
    assert!(fields.contains_key("alice"));
    assert!(fields.contains_key("bob"));

    // One generation per user, each with the configured exclusion set.
    let requests = store.password_requests().await;
    assert_eq!(requests, vec!["/@\"'\\".to_string(), "/@\"'\\".to_string()]);
}

#[tokio::test]
async fn create_secret_retry_is_idempotent() {
    let store = store_with_current_and_pending().await;
    let dispatcher = MockCommandDispatcher::new();
    let notifier = MockNotifier::new();
    let config = RotationConfig::default().with_users(["alice", "bob"]);

    for _ in 0..2 {
        let response = handle_rotation(
            rotation_event("createSecret", "v2"),
            &test_context(),
            &config,
            &store,
            &dispatcher,
            &notifier,
        )
        .await;
        assert_eq!(response.status_code, 200);
    }

    // The second invocation saw the existing pending value and generated
    // nothing new.
    assert_eq!(store.password_requests().await.len(), 2);
    assert_eq!(store.mutation_count().await, 1);
}

#[tokio::test]
async fn finish_secret_promotes_propagates_and_notifies() {
    let store = store_with_current_and_pending().await;
    store
        .set_version(
            SECRET_ID,
            "v2",
            &[Stage::Pending],
            Some("{\"ec2-user\":\"new-password\"}"),
        )
        .await;
    let dispatcher = MockCommandDispatcher::new();
    dispatcher.set_instances(["i-0aaa", "i-0bbb"]).await;
    let notifier = MockNotifier::new();
    let config = RotationConfig::default();

    let response = handle_rotation(
        rotation_event("finishSecret", "v2"),
        &test_context(),
        &config,
        &store,
        &dispatcher,
        &notifier,
    )
    .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body, "Function executed successfully!");

    // Current moved from v1 to v2.
    let stages = store.stages(SECRET_ID).await;
    assert!(stages["v2"].contains(&Stage::Current));
    assert!(!stages["v1"].contains(&Stage::Current));

    // Propagation went to the tag-filtered running fleet.
    let dispatched = dispatcher.dispatched().await;
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].instance_ids, vec!["i-0aaa", "i-0bbb"]);
    assert!(dispatched[0].commands[0].contains(SECRET_ID));

    // And the operator heard about it.
    assert_eq!(
        notifier.messages().await,
        vec!["Secret rotation process completed successfully".to_string()]
    );
}

#[tokio::test]
async fn finish_secret_is_idempotent_once_current() {
    let store = MockSecretStore::new();
    store.set_secret(SECRET_ID, true).await;
    store
        .set_version(
            SECRET_ID,
            "v2",
            &[Stage::Current, Stage::Pending],
            Some("{\"ec2-user\":\"new-password\"}"),
        )
        .await;
    let dispatcher = MockCommandDispatcher::new();
    let notifier = MockNotifier::new();

    let response = handle_rotation(
        rotation_event("finishSecret", "v2"),
        &test_context(),
        &RotationConfig::default(),
        &store,
        &dispatcher,
        &notifier,
    )
    .await;

    assert_eq!(response.status_code, 200);
    assert_eq!(store.mutation_count().await, 0);
}

#[tokio::test]
async fn stale_token_fails_every_step_without_mutation() {
    let store = MockSecretStore::new();
    store.set_secret(SECRET_ID, true).await;
    store
        .set_version(SECRET_ID, "v1", &[Stage::Current], Some("{}"))
        .await;
    let dispatcher = MockCommandDispatcher::new();
    let notifier = MockNotifier::new();

    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        let response = handle_rotation(
            rotation_event(step, "v9"),
            &test_context(),
            &RotationConfig::default(),
            &store,
            &dispatcher,
            &notifier,
        )
        .await;
        assert_eq!(response.status_code, 500, "step {step} should fail");
    }

    assert_eq!(store.mutation_count().await, 0);
    assert!(dispatcher.dispatched().await.is_empty());
}

#[tokio::test]
async fn failed_propagation_still_counts_as_success() {
    let store = store_with_current_and_pending().await;
    store
        .set_version(
            SECRET_ID,
            "v2",
            &[Stage::Pending],
            Some("{\"ec2-user\":\"new-password\"}"),
        )
        .await;
    let mut dispatcher = MockCommandDispatcher::new();
    dispatcher.send_error = Some(opskeeper::OpskeeperError::Throttled("busy".to_string()));
    dispatcher.set_instances(["i-0aaa"]).await;
    let notifier = MockNotifier::new();

    let response = handle_rotation(
        rotation_event("finishSecret", "v2"),
        &test_context(),
        &RotationConfig::default(),
        &store,
        &dispatcher,
        &notifier,
    )
    .await;

    // The secret store already holds the promoted value; dispatch is
    // best-effort.
    assert_eq!(response.status_code, 200);
    assert_eq!(
        notifier.messages().await,
        vec!["Secret rotation process completed successfully".to_string()]
    );
}
