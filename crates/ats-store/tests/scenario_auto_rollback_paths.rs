//! Auto-rollback scenarios for the model lifecycle.
//!
//! A PAPER_DEPLOYED model past its 24h soak must roll back — not promote —
//! when any trigger fires: 24h net return below −2%, three drift warnings,
//! or a same-strategy trader at five consecutive losses.

use ats_eval::{rollback_reason, RollbackInputs};
use ats_store::lifecycle::{paper_soak_elapsed, redeploy_cooldown_remaining_h};
use chrono::{Duration, Utc};

#[test]
fn stale_deployment_with_bad_24h_return_rolls_back() {
    let now = Utc::now();
    let deployed_at = Some(now - Duration::hours(25));

    // soak elapsed: eligibility check proceeds to the rollback triggers
    assert!(paper_soak_elapsed(deployed_at, now).is_ok());

    let inputs = RollbackInputs {
        net_return_24h: Some(-0.03),
        drift_warn_count: 0,
        max_consecutive_losses: 0,
    };
    let reason = rollback_reason(&inputs).expect("−3% 24h return must trigger rollback");

    // the persisted reason carries the AUTO_ROLLBACK prefix
    let persisted = format!("AUTO_ROLLBACK: {reason}");
    assert!(persisted.contains("AUTO_ROLLBACK: 24시간 수익률"), "persisted: {persisted}");
    assert!(persisted.contains("-2%"), "persisted: {persisted}");
}

#[test]
fn fresh_deployment_is_not_yet_eligible() {
    let now = Utc::now();
    let deployed_at = Some(now - Duration::hours(20));
    match paper_soak_elapsed(deployed_at, now) {
        Err(remaining) => assert!(remaining > 3.9 && remaining < 4.1),
        Ok(()) => panic!("20h-old deployment must still be soaking"),
    }
}

#[test]
fn drift_warnings_and_loss_streaks_also_trigger() {
    let drift = RollbackInputs { drift_warn_count: 3, ..Default::default() };
    assert!(rollback_reason(&drift).unwrap().contains("Drift"));

    let streak = RollbackInputs { max_consecutive_losses: 5, ..Default::default() };
    assert!(rollback_reason(&streak).unwrap().contains("연속 손실"));
}

#[test]
fn healthy_model_promotes_without_rollback() {
    let inputs = RollbackInputs {
        net_return_24h: Some(0.015),
        drift_warn_count: 2,
        max_consecutive_losses: 4,
    };
    assert!(rollback_reason(&inputs).is_none());
}

#[test]
fn redeploy_cooldown_guards_deploy() {
    let now = Utc::now();
    assert!(redeploy_cooldown_remaining_h(Some(now - Duration::hours(2)), now).is_some());
    assert!(redeploy_cooldown_remaining_h(Some(now - Duration::hours(30)), now).is_none());
}
