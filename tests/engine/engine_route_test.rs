//! Tests for routing vectors into the execution engine.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use cx_router::engine::{link_fn, ExecutionEngine};
use cx_router::ledger::Ledger;
use cx_router::policy::{CallContext, PolicyRegistry, PolicyRule};
use cx_router::router::{DispatchOutcome, EngineRoute, Router};
use cx_router::signature::SignatureValidator;

const VECTOR: &str = "worker:alert:0.9:monitor:restart";

type Seen = Arc<Mutex<Vec<(String, Vec<String>, String)>>>;

fn validator() -> SignatureValidator {
    SignatureValidator::new("bridge-test-secret").expect("non-empty secret")
}

/// Router whose engine route resolves callers as `caller`.
async fn router(seen: &Seen, caller: CallContext) -> (Router, Arc<Ledger>) {
    let mut policy = PolicyRegistry::new();
    policy.set_rule("worker", PolicyRule::new(&["monitor:admin"], &[]));
    let mut engine = ExecutionEngine::new(policy, validator());

    let seen = Arc::clone(seen);
    engine.register(
        "worker",
        "monitor",
        Arc::new(link_fn(move |command: String, extras: Vec<String>, ctx: CallContext| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock()
                    .expect("test lock")
                    .push((command, extras, ctx.role().to_owned()));
                Ok(Value::Null)
            }
        })),
    );

    let ledger = Arc::new(Ledger::in_memory().await.expect("ledger should open"));
    let mut router = Router::new().with_ledger(Arc::clone(&ledger));
    router
        .register(
            "worker:alert:monitor:restart",
            Arc::new(EngineRoute::new(Arc::new(engine)).with_resolver(Arc::new(caller))),
        )
        .expect("valid pattern");
    (router, ledger)
}

#[tokio::test]
async fn signed_vector_executes_and_is_recorded() {
    let seen: Seen = Arc::default();
    let (router, ledger) = router(&seen, CallContext::with_role("admin")).await;
    let payload = json!({
        "signature": validator().sign(VECTOR),
        "extras": ["node-3", 2],
    });

    let outcome = router.dispatch(VECTOR, payload).await;
    assert!(matches!(outcome, DispatchOutcome::Handled { .. }), "{outcome:?}");
    assert_eq!(
        *seen.lock().expect("test lock"),
        vec![(
            "restart".to_owned(),
            vec!["node-3".to_owned(), "2".to_owned()],
            "admin".to_owned()
        )]
    );

    ledger.flush().await.expect("flush");
    assert_eq!(ledger.for_entity("worker", 5).await.expect("query").len(), 1);
}

#[tokio::test]
async fn unsigned_vector_fails_without_ledger_entry() {
    let seen: Seen = Arc::default();
    let (router, ledger) = router(&seen, CallContext::with_role("admin")).await;

    let outcome = router.dispatch(VECTOR, json!({})).await;
    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            pattern: "worker:alert:monitor:restart".to_owned(),
            error: "signature invalid".to_owned(),
        }
    );
    assert!(seen.lock().expect("test lock").is_empty());

    ledger.flush().await.expect("flush");
    assert_eq!(ledger.count().await.expect("count"), 0);
}

#[tokio::test]
async fn guest_is_refused_by_policy() {
    let seen: Seen = Arc::default();
    let (router, ledger) = router(&seen, CallContext::default()).await;

    let outcome = router
        .dispatch(VECTOR, json!({ "signature": validator().sign(VECTOR) }))
        .await;
    let DispatchOutcome::Failed { error, .. } = outcome else {
        panic!("expected policy failure, got {outcome:?}");
    };
    assert_eq!(error, "policy denied");
    assert!(seen.lock().expect("test lock").is_empty());

    ledger.flush().await.expect("flush");
    assert_eq!(ledger.count().await.expect("count"), 0);
}

#[tokio::test]
async fn payload_cannot_raise_the_callers_role() {
    let seen: Seen = Arc::default();
    let (router, ledger) = router(&seen, CallContext::default()).await;

    let outcome = router
        .dispatch(
            VECTOR,
            json!({
                "signature": validator().sign(VECTOR),
                "context": { "role": "admin" },
            }),
        )
        .await;
    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            pattern: "worker:alert:monitor:restart".to_owned(),
            error: "policy denied".to_owned(),
        }
    );
    assert!(seen.lock().expect("test lock").is_empty());

    ledger.flush().await.expect("flush");
    assert_eq!(ledger.count().await.expect("count"), 0);
}

#[tokio::test]
async fn default_engine_route_treats_callers_as_guests() {
    let mut policy = PolicyRegistry::new();
    policy.set_rule("worker", PolicyRule::new(&["monitor:admin"], &[]));
    let engine = ExecutionEngine::new(policy, validator());
    let mut router = Router::new();
    router
        .register(
            "worker:alert:monitor:restart",
            Arc::new(EngineRoute::new(Arc::new(engine))),
        )
        .expect("valid pattern");

    let outcome = router
        .dispatch(
            VECTOR,
            json!({
                "signature": validator().sign(VECTOR),
                "context": { "role": "admin" },
            }),
        )
        .await;
    let DispatchOutcome::Failed { error, .. } = outcome else {
        panic!("expected policy failure, got {outcome:?}");
    };
    assert_eq!(error, "policy denied");
}
