//! Tests for `ExecutionEngine::execute`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use cx_router::engine::{link_fn, ExecError, ExecutionEngine, Outcome};
use cx_router::link::CxLink;
use cx_router::policy::{CallContext, PolicyRegistry, PolicyRule};
use cx_router::signature::SignatureValidator;

const SECRET: &str = "engine-test-secret";

fn validator() -> SignatureValidator {
    SignatureValidator::new(SECRET).expect("non-empty secret")
}

fn policy() -> PolicyRegistry {
    let mut policy = PolicyRegistry::new();
    policy.set_rule(
        "alpha",
        PolicyRule::new(&["record:admin", "record:operator"], &["record:operator"]),
    );
    policy.set_rule("beta", PolicyRule::new(&["*"], &[]));
    policy
}

fn signed(entity: &str, function: &str, command: &str) -> CxLink {
    let mut link = CxLink::new(entity, function, command);
    validator().sign_link(&mut link);
    link
}

#[tokio::test]
async fn throwing_handler_leaves_engine_usable() {
    let mut engine = ExecutionEngine::new(policy(), validator());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    engine.register(
        "beta",
        "record",
        Arc::new(link_fn(move |command: String, _, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if command == "explode" {
                    anyhow::bail!("boom");
                }
                Ok(json!({ "command": command }))
            }
        })),
    );

    let ctx = CallContext::default();
    let failed = engine.execute(Some(&signed("beta", "record", "explode")), &ctx).await;
    assert_eq!(failed, Outcome::Failed(ExecError::Handler("boom".to_owned())));
    assert_eq!(failed.to_json(), json!({ "ok": false, "error": "boom" }));

    // Registry, policy, and validator are untouched by the failure.
    assert!(engine.has_handler("beta", "record"));
    assert!(engine.policy().is_allowed("beta", "record", &ctx));
    assert!(engine.validator().verify(&signed("beta", "record", "write")));

    let ok = engine.execute(Some(&signed("beta", "record", "write")), &ctx).await;
    assert_eq!(ok, Outcome::Ok(json!({ "command": "write" })));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn deny_takes_precedence_over_allow() {
    let mut engine = ExecutionEngine::new(policy(), validator());
    engine.register(
        "alpha",
        "record",
        Arc::new(link_fn(|_, _, _| async { Ok(Value::Null) })),
    );
    let link = signed("alpha", "record", "write");

    let denied = engine
        .execute(Some(&link), &CallContext::with_role("operator"))
        .await;
    assert_eq!(denied, Outcome::Failed(ExecError::PolicyDenied));

    let allowed = engine
        .execute(Some(&link), &CallContext::with_role("admin"))
        .await;
    assert!(allowed.is_ok());

    let guest = engine.execute(Some(&link), &CallContext::default()).await;
    assert_eq!(guest, Outcome::Failed(ExecError::PolicyDenied));
}

#[tokio::test]
async fn unknown_entity_is_denied_before_handler_lookup() {
    let engine = ExecutionEngine::new(policy(), validator());
    let outcome = engine
        .execute(
            Some(&signed("gamma", "record", "write")),
            &CallContext::with_role("admin"),
        )
        .await;
    assert_eq!(outcome, Outcome::Failed(ExecError::PolicyDenied));
}

#[tokio::test]
async fn tampered_link_fails_signature_check() {
    let mut engine = ExecutionEngine::new(policy(), validator());
    engine.register(
        "beta",
        "record",
        Arc::new(link_fn(|_, _, _| async { Ok(Value::Null) })),
    );

    let mut link = signed("beta", "record", "write");
    link.raw = "beta:record:purge".to_owned();
    let outcome = engine.execute(Some(&link), &CallContext::default()).await;
    assert_eq!(outcome, Outcome::Failed(ExecError::SignatureInvalid));

    let other = SignatureValidator::new("someone-else").expect("secret");
    let mut foreign = CxLink::new("beta", "record", "write");
    other.sign_link(&mut foreign);
    let outcome = engine.execute(Some(&foreign), &CallContext::default()).await;
    assert_eq!(outcome, Outcome::Failed(ExecError::SignatureInvalid));
}

#[tokio::test]
async fn slow_handler_hits_deadline() {
    let mut engine = ExecutionEngine::new(policy(), validator())
        .with_handler_timeout(Duration::from_millis(50));
    engine.register(
        "beta",
        "record",
        Arc::new(link_fn(|_, _, _| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Value::Null)
        })),
    );

    let outcome = engine
        .execute(Some(&signed("beta", "record", "write")), &CallContext::default())
        .await;
    assert_eq!(
        outcome,
        Outcome::Failed(ExecError::TimedOut(Duration::from_millis(50)))
    );
}

#[tokio::test]
async fn panicking_handler_is_contained() {
    let mut engine = ExecutionEngine::new(policy(), validator());
    engine.register(
        "beta",
        "record",
        Arc::new(link_fn(|command: String, _, _| async move {
            if command == "write" {
                panic!("handler bug");
            }
            Ok(Value::Null)
        })),
    );

    let outcome = engine
        .execute(Some(&signed("beta", "record", "write")), &CallContext::default())
        .await;
    let Some(err) = outcome.error() else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(err.to_string().contains("handler bug"), "{err}");
    assert!(engine.has_handler("beta", "record"));
}
