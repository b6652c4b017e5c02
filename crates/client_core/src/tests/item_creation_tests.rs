use serde_json::json;
use shared::{error::RemoteError, protocol::NotificationVariant};

use super::*;
use crate::test_support::{drain, FakeBackend, Harness};

fn flow(harness: &Harness, bus: &SignalBus, locked: bool) -> ItemCreationFlow {
    let (_tx, rx) = watch::channel(locked);
    ItemCreationFlow::new(CaseId::from("C1"), harness.services(), bus.clone(), rx)
}

fn submitted(value: serde_json::Value) -> FieldSet {
    value.as_object().cloned().expect("object")
}

#[tokio::test]
async fn injected_case_id_overrides_submitted_value() {
    let harness = Harness::new(FakeBackend::new());
    let bus = SignalBus::default();
    let flow = flow(&harness, &bus, false);

    let outcome = flow
        .submit(submitted(json!({ "Quantity": 3, "caseId": "WRONG" })))
        .await;

    assert!(matches!(outcome, CreationOutcome::Created(_)));
    let creates = harness.backend.creates.lock().clone();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0]["caseId"], json!("C1"));
    assert_eq!(creates[0]["Quantity"], json!(3));
}

#[tokio::test]
async fn success_notifies_and_confirms() {
    let harness = Harness::new(FakeBackend::new());
    let bus = SignalBus::default();
    let mut rx = bus.subscribe();
    let flow = flow(&harness, &bus, false);

    flow.submit(submitted(json!({ "quantity": 1 }))).await;

    let shown = harness.notifier.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Added");
    assert_eq!(shown[0].variant, NotificationVariant::Success);
    assert_eq!(
        drain(&mut rx),
        vec![WorkflowSignal::AddConfirmed {
            case_id: CaseId::from("C1")
        }]
    );
}

#[tokio::test]
async fn failure_notifies_without_confirm_and_allows_retry() {
    let backend = FakeBackend::new();
    backend.fail_create(serde_json::from_value::<RemoteError>(json!({
        "body": { "pageErrors": [{ "message": "Product is required" }] }
    }))
    .expect("error shape"));
    let harness = Harness::new(backend);
    let bus = SignalBus::default();
    let mut rx = bus.subscribe();
    let flow = flow(&harness, &bus, false);

    let outcome = flow.submit(submitted(json!({ "quantity": 1 }))).await;

    assert_eq!(outcome, CreationOutcome::Failed("Product is required".into()));
    let errors = harness.notifier.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].title, "Add failed");
    assert!(drain(&mut rx).is_empty());

    flow.submit(submitted(json!({ "quantity": 2 }))).await;
    assert_eq!(harness.backend.creates.lock().len(), 2);
}

#[tokio::test]
async fn cancel_emits_signal_without_remote_call() {
    let harness = Harness::new(FakeBackend::new());
    let bus = SignalBus::default();
    let mut rx = bus.subscribe();
    let flow = flow(&harness, &bus, false);

    flow.cancel().await;

    assert_eq!(
        drain(&mut rx),
        vec![WorkflowSignal::AddCancelled {
            case_id: CaseId::from("C1")
        }]
    );
    assert!(harness.backend.creates.lock().is_empty());
    assert!(harness.notifier.shown().is_empty());
}

#[tokio::test]
async fn locked_case_skips_create() {
    let harness = Harness::new(FakeBackend::new());
    let bus = SignalBus::default();
    let flow = flow(&harness, &bus, true);

    assert_eq!(
        flow.submit(submitted(json!({ "quantity": 1 }))).await,
        CreationOutcome::Locked
    );
    assert!(harness.backend.creates.lock().is_empty());
}
