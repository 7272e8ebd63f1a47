//! Tests for `VectorGroup::execute_all`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use cx_router::engine::{link_fn, ExecError, ExecutionEngine, Outcome};
use cx_router::group::{GroupOutcome, VectorGroup};
use cx_router::link::CxLink;
use cx_router::policy::{CallContext, PolicyRegistry, PolicyRule};
use cx_router::signature::SignatureValidator;

fn validator() -> SignatureValidator {
    SignatureValidator::new("group-test-secret").expect("non-empty secret")
}

/// Engine with `alpha.record` (fails on `explode`) and `alpha.gate`.
fn engine(calls: &Arc<AtomicUsize>) -> ExecutionEngine {
    let mut policy = PolicyRegistry::new();
    policy.set_rule("alpha", PolicyRule::new(&["*"], &["gate:guest"]));
    let mut engine = ExecutionEngine::new(policy, validator());

    let counter = Arc::clone(calls);
    engine.register(
        "alpha",
        "record",
        Arc::new(link_fn(move |command: String, _, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if command == "explode" {
                    anyhow::bail!("record failed");
                }
                Ok(json!(command))
            }
        })),
    );
    engine.register(
        "alpha",
        "gate",
        Arc::new(link_fn(|_, _, _| async { Ok(Value::Null) })),
    );
    engine
}

fn signed(function: &str, command: &str) -> CxLink {
    let mut link = CxLink::new("alpha", function, command);
    validator().sign_link(&mut link);
    link
}

#[tokio::test]
async fn secure_group_without_control_runs_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine(&calls);
    let mut group = VectorGroup::new("alpha", true);
    group.add(signed("record", "one"), false);
    group.add(signed("record", "two"), false);

    let outcome = group
        .execute_all(&engine, &CallContext::with_role("admin"))
        .await;
    assert_eq!(outcome, GroupOutcome::Rejected(ExecError::ControlRejected));
    assert!(outcome.outcomes().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn secure_group_with_unsigned_control_is_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine(&calls);
    let mut group = VectorGroup::new("alpha", true);
    group.add(CxLink::new("alpha", "gate", "open"), true);
    group.add(signed("record", "one"), false);

    let outcome = group
        .execute_all(&engine, &CallContext::with_role("admin"))
        .await;
    assert_eq!(outcome, GroupOutcome::Rejected(ExecError::ControlRejected));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn secure_group_control_is_policy_checked() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine(&calls);
    let mut group = VectorGroup::new("alpha", true);
    group.add(signed("gate", "open"), true);
    group.add(signed("record", "one"), false);

    // `gate:guest` is denied.
    let outcome = group.execute_all(&engine, &CallContext::default()).await;
    assert_eq!(outcome, GroupOutcome::Rejected(ExecError::ControlRejected));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_member_is_attempted_after_a_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine(&calls);
    let mut group = VectorGroup::new("alpha", true);
    group.add(signed("gate", "open"), true);
    group.add(signed("record", "one"), false);
    group.add(signed("record", "explode"), false);
    group.add(signed("record", "three"), false);

    let outcome = group
        .execute_all(&engine, &CallContext::with_role("admin"))
        .await;
    assert_eq!(
        outcome.outcomes(),
        &[
            Outcome::Ok(json!("one")),
            Outcome::Failed(ExecError::Handler("record failed".to_owned())),
            Outcome::Ok(json!("three")),
        ]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn open_group_needs_no_control() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = engine(&calls);
    let mut group = VectorGroup::new("alpha", false);
    group.add(signed("record", "one"), false);
    group.add(CxLink::new("alpha", "record", "unsigned"), false);

    let outcome = group.execute_all(&engine, &CallContext::default()).await;
    assert_eq!(
        outcome.outcomes(),
        &[
            Outcome::Ok(json!("one")),
            Outcome::Failed(ExecError::SignatureInvalid),
        ]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
