//! Integration tests for the recovery (password reset) flow.
//!
//! Every test runs against [`InMemoryIdentityStore`] and, where time
//! matters, a [`ManualClock`]; nothing here touches the network.

use chrono::TimeDelta;
use secrecy::ExposeSecret;

use golden_fig_integration_tests::{InMemoryIdentityStore, ManualClock};
use golden_fig_storefront::flows::{
    AuthError, ConfirmOutcome, FlowError, RecoveryFlow, RecoveryStage, ResendOutcome,
    ValidationError,
};

fn flow_with_clock(
    store: &InMemoryIdentityStore,
) -> (RecoveryFlow<InMemoryIdentityStore, ManualClock>, ManualClock) {
    let clock = ManualClock::fixed();
    let flow = RecoveryFlow::with_clock(store.clone(), clock.clone());
    (flow, clock)
}

// ============================================================================
// Email Step: Non-Disclosure
// ============================================================================

#[tokio::test]
async fn email_step_advances_whether_or_not_accounts_exist() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");

    // Known email
    let flow = RecoveryFlow::new(store.clone());
    let stage = flow.submit_email("a@x.com").await.expect("email ok");
    assert_eq!(stage, RecoveryStage::VerifyOwnership);

    // Unknown email: identical observable behavior
    let ghost = RecoveryFlow::new(store.clone());
    let stage = ghost.submit_email("ghost@x.com").await.expect("email ok");
    assert_eq!(stage, RecoveryStage::VerifyOwnership);
    assert!(ghost.candidates().is_empty());
}

#[tokio::test]
async fn failed_ownership_check_is_the_same_error_for_unknown_emails() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");

    let known = RecoveryFlow::new(store.clone());
    known.submit_email("a@x.com").await.expect("email ok");
    let err_known = known.submit_current_password("wrong").await.unwrap_err();
    assert!(matches!(
        err_known,
        FlowError::Auth(AuthError::InvalidCredentials)
    ));
    assert_eq!(known.stage(), RecoveryStage::VerifyOwnership);

    let ghost = RecoveryFlow::new(store.clone());
    ghost.submit_email("ghost@x.com").await.expect("email ok");
    let err_ghost = ghost.submit_current_password("wrong").await.unwrap_err();
    assert!(matches!(
        err_ghost,
        FlowError::Auth(AuthError::InvalidCredentials)
    ));
    assert_eq!(ghost.stage(), RecoveryStage::VerifyOwnership);

    // Both rejections render identically
    assert_eq!(err_known.to_string(), err_ghost.to_string());
}

// ============================================================================
// Ownership Branching
// ============================================================================

#[tokio::test]
async fn scenario_b_single_match_skips_account_selection() {
    let store = InMemoryIdentityStore::new();
    let first = store.add_account("alice", "shared@x.com", "pw-one");
    store.add_account("alice-work", "shared@x.com", "pw-two");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("shared@x.com").await.expect("email ok");

    // The password matches exactly one of the two accounts: selection is
    // skipped and the code is already bound to that account.
    let stage = flow.submit_current_password("pw-one").await.expect("owned");
    assert_eq!(stage, RecoveryStage::SendAndVerifyCode);
    assert!(flow.candidates().is_empty());
    assert_eq!(store.calls("request_code"), 1);

    // Finish: the reset lands on the matched account only
    flow.confirm_code("123456").await.expect("code ok");
    flow.submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");
    assert_eq!(store.account(first).password, "fresh-pw");
    assert_eq!(
        store.account_by_username("alice-work").password,
        "pw-two"
    );
}

#[tokio::test]
async fn multiple_matches_require_an_explicit_selection() {
    let store = InMemoryIdentityStore::new();
    let personal = store.add_account("alice", "shared@x.com", "same-pw");
    let work = store.add_account("alice-work", "shared@x.com", "same-pw");
    store.add_account("intruder", "shared@x.com", "other-pw");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("shared@x.com").await.expect("email ok");

    let stage = flow
        .submit_current_password("same-pw")
        .await
        .expect("owned");
    assert_eq!(stage, RecoveryStage::SelectAccount);

    // Only the accounts the password matched are offered
    let candidates = flow.candidates();
    let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![personal, work]);

    let stage = flow.select_account(work).await.expect("selected");
    assert_eq!(stage, RecoveryStage::SendAndVerifyCode);

    flow.confirm_code("123456").await.expect("code ok");
    flow.submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");
    assert_eq!(store.account(work).password, "fresh-pw");
    assert_eq!(store.account(personal).password, "same-pw");
}

#[tokio::test]
async fn selecting_a_non_candidate_account_is_rejected_locally() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "shared@x.com", "same-pw");
    store.add_account("alice-work", "shared@x.com", "same-pw");
    let outsider = store.add_account("intruder", "shared@x.com", "other-pw");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("shared@x.com").await.expect("email ok");
    flow.submit_current_password("same-pw").await.expect("owned");

    let before = store.calls("request_code");
    let err = flow.select_account(outsider).await.unwrap_err();
    assert!(matches!(
        err,
        FlowError::Validation(ValidationError::UnknownCandidate)
    ));
    assert_eq!(flow.stage(), RecoveryStage::SelectAccount);
    assert_eq!(store.calls("request_code"), before);
}

// ============================================================================
// Code Stage
// ============================================================================

#[tokio::test]
async fn verify_is_read_only_and_the_code_still_authorizes_the_reset() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");

    // The verify call does not consume the code
    let outcome = flow.confirm_code("123456").await.expect("code ok");
    assert_eq!(outcome, ConfirmOutcome::Confirmed);
    assert_eq!(flow.stage(), RecoveryStage::SetNewPassword);

    // ...so the reset, which does consume it, still succeeds
    flow.submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");
    assert_eq!(flow.stage(), RecoveryStage::Complete);
}

#[tokio::test]
async fn consumed_code_is_rejected_on_replay() {
    let store = InMemoryIdentityStore::new();
    let account = store.add_account("alice", "a@x.com", "pw-alice");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");
    flow.confirm_code("123456").await.expect("code ok");
    flow.submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");

    // A second attempt with the replayed code dies at the verify step
    let replay = RecoveryFlow::new(store.clone());
    replay.submit_email("a@x.com").await.expect("email ok");
    replay
        .submit_current_password("fresh-pw")
        .await
        .expect("owned");
    let err = replay.confirm_code("123456").await.unwrap_err();
    assert!(matches!(err, FlowError::Auth(AuthError::InvalidCode)));
    assert_eq!(store.account(account).password, "fresh-pw");
}

#[tokio::test]
async fn recovery_resend_respects_the_cooldown() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");

    let (flow, clock) = flow_with_clock(&store);
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");

    // The entry send armed the cooldown
    assert_eq!(store.calls("request_code"), 1);
    let outcome = flow.resend_code().await.expect("gated");
    assert!(matches!(outcome, ResendOutcome::CoolingDown { .. }));
    assert_eq!(store.calls("request_code"), 1);

    clock.advance(TimeDelta::seconds(60));
    let outcome = flow.resend_code().await.expect("sent");
    assert_eq!(outcome, ResendOutcome::Sent);
    assert_eq!(store.calls("request_code"), 2);
}

// ============================================================================
// Reset Step
// ============================================================================

#[tokio::test]
async fn scenario_c_code_expiry_at_reset_routes_back_to_the_code_stage() {
    let store = InMemoryIdentityStore::new();
    let account = store.add_account("alice", "a@x.com", "pw-alice");

    let (flow, clock) = flow_with_clock(&store);
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");
    flow.confirm_code("123456").await.expect("code ok");

    // The code's TTL wins the race against the customer typing a password
    store.expire_next_reset();
    let err = flow
        .submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .unwrap_err();
    assert!(matches!(err, FlowError::Auth(AuthError::CodeExpired)));

    // Back to the code stage - not to the email stage
    assert_eq!(flow.stage(), RecoveryStage::SendAndVerifyCode);
    assert_eq!(store.account(account).password, "pw-alice");

    // Recover in place: fresh code, verify, reset
    clock.advance(TimeDelta::seconds(60));
    store.set_code_value("654321");
    flow.resend_code().await.expect("sent");
    flow.confirm_code("654321").await.expect("code ok");
    flow.submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");
    assert_eq!(store.account(account).password, "fresh-pw");
}

#[tokio::test]
async fn reset_signs_the_customer_in_when_the_store_returns_a_session() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");
    flow.confirm_code("123456").await.expect("code ok");

    let completion = flow
        .submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");
    let signed_in = completion.signed_in.expect("store signed us in");
    assert!(!signed_in.token.expose_secret().is_empty());
    assert_eq!(signed_in.account.username.as_str(), "alice");
    assert_eq!(flow.stage(), RecoveryStage::Complete);
}

#[tokio::test]
async fn reset_without_a_session_asks_for_a_manual_sign_in() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");
    store.sign_in_on_reset(false);

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");
    flow.confirm_code("123456").await.expect("code ok");

    let completion = flow
        .submit_new_password("fresh-pw", "fresh-pw", true)
        .await
        .expect("reset ok");
    assert!(completion.signed_in.is_none());
    // The flow still completed; the password is live
    assert_eq!(flow.stage(), RecoveryStage::Complete);
    assert_eq!(store.account_by_username("alice").password, "fresh-pw");
}

#[tokio::test]
async fn duplicate_code_verifications_make_one_network_call() {
    let store = InMemoryIdentityStore::new();
    store.add_account("alice", "a@x.com", "pw-alice");

    let flow = RecoveryFlow::new(store.clone());
    flow.submit_email("a@x.com").await.expect("email ok");
    flow.submit_current_password("pw-alice").await.expect("owned");

    let gate = store.gate_confirmations();
    let first = tokio::spawn({
        let flow = flow.clone();
        async move { flow.confirm_code("123456").await }
    });
    gate.entered.notified().await;

    let second = flow.confirm_code("123456").await.expect("guarded no-op");
    assert_eq!(second, ConfirmOutcome::Ignored);
    assert_eq!(store.calls("verify_recovery_code"), 1);

    gate.release.notify_one();
    let first = first.await.expect("task ran").expect("code ok");
    assert_eq!(first, ConfirmOutcome::Confirmed);
}
