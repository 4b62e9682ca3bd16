//! Recovery (password reset) flow controller.
//!
//! Stage order: `RequestEmail → VerifyOwnership → (SelectAccount) →
//! SendAndVerifyCode → SetNewPassword → Complete`.
//!
//! The email step never discloses whether an account exists: the flow
//! always advances to the ownership check, and only a proven password
//! narrows anything down. Several accounts may share one email, so the
//! ownership check can end in zero, one, or many matches.

use std::sync::{Arc, Mutex, PoisonError};

use secrecy::SecretString;

use golden_fig_core::{AccountId, Email, VerificationCode};

use crate::identity::{AccountSummary, CodePurpose, IdentityError, IdentityStore, SignedIn};

use super::clock::{Clock, SystemClock};
use super::cooldown::Cooldown;
use super::error::{AuthError, FlowError, ValidationError};
use super::session::{FlowKind, FlowSession};
use super::{ConfirmOutcome, RESEND_COOLDOWN_SECS, ResendOutcome, ensure_stage, validate_new_password};

/// Stages of the recovery flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    /// Collecting the email to recover.
    RequestEmail,
    /// Proving ownership with the current password.
    VerifyOwnership,
    /// Choosing between several accounts that matched the password.
    SelectAccount,
    /// A code has been sent; waiting for it to be entered.
    SendAndVerifyCode,
    /// Collecting the replacement password.
    SetNewPassword,
    /// Flow finished; session cleared.
    Complete,
}

/// How a completed recovery left the customer.
#[derive(Debug)]
pub struct RecoveryCompletion {
    /// Fresh session when the store issued one; otherwise the customer
    /// signs in manually with the new password.
    pub signed_in: Option<SignedIn>,
}

/// Controller for one recovery attempt.
///
/// Clone handles share the same session; the internal lock is never held
/// across an `await`.
#[derive(Debug, Clone)]
pub struct RecoveryFlow<S, C = SystemClock> {
    store: S,
    clock: C,
    session: Arc<Mutex<FlowSession<RecoveryStage>>>,
}

impl<S: IdentityStore> RecoveryFlow<S> {
    /// Start a fresh recovery flow against the system clock.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: IdentityStore, C: Clock> RecoveryFlow<S, C> {
    /// Start a fresh recovery flow with an injected clock.
    #[must_use]
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            session: Arc::new(Mutex::new(FlowSession::new(
                FlowKind::Recovery,
                RecoveryStage::RequestEmail,
            ))),
        }
    }

    fn session<T>(&self, f: impl FnOnce(&mut FlowSession<RecoveryStage>) -> T) -> T {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    /// The flow's current stage.
    #[must_use]
    pub fn stage(&self) -> RecoveryStage {
        self.session(|s| s.stage)
    }

    /// Whether a code verification is currently in flight.
    #[must_use]
    pub fn confirmation_in_flight(&self) -> bool {
        self.session(|s| s.guard().is_held())
    }

    /// Seconds until a code resend becomes available; zero when ready.
    #[must_use]
    pub fn resend_remaining(&self) -> u32 {
        let now = self.clock.now();
        self.session(|s| {
            s.cooldown
                .as_ref()
                .map_or(0, |cooldown| cooldown.remaining_seconds(now))
        })
    }

    /// Accounts the entered password matched, for the selection step.
    ///
    /// Empty outside [`RecoveryStage::SelectAccount`].
    #[must_use]
    pub fn candidates(&self) -> Vec<AccountSummary> {
        self.session(|s| s.candidate_accounts.clone())
    }

    /// Discard the attempt and start over at the email step.
    pub fn restart(&self) {
        self.session(|s| s.reset(RecoveryStage::RequestEmail));
        tracing::debug!("recovery flow restarted");
    }

    /// Submit the email to recover.
    ///
    /// Always advances to the ownership check, whatever the store's lookup
    /// returned — branching here would tell an unauthenticated caller
    /// whether the email is registered, and how many accounts share it.
    ///
    /// # Errors
    ///
    /// `Validation` if the email is malformed (no network call),
    /// `Transient` on network failure.
    pub async fn submit_email(&self, email: &str) -> Result<RecoveryStage, FlowError> {
        let email = Email::parse(email).map_err(ValidationError::Email)?;
        self.session(|s| ensure_stage(s.stage, RecoveryStage::RequestEmail))?;

        let accounts = self
            .store
            .request_recovery(&email)
            .await
            .map_err(FlowError::from_identity)?;

        Ok(self.session(|s| {
            s.record_subject_email(email);
            s.lookup_accounts = accounts;
            s.stage = RecoveryStage::VerifyOwnership;
            tracing::debug!(stage = ?s.stage, "recovery advanced");
            s.stage
        }))
    }

    /// Submit the current password to prove ownership.
    ///
    /// The password is checked against every account sharing the email,
    /// one call at a time. One match selects that account and sends a code;
    /// several matches go to the selection step; none is a generic
    /// credentials error — indistinguishable from an email with no accounts
    /// at all.
    ///
    /// # Errors
    ///
    /// `Auth` with a generic invalid-credentials message when nothing
    /// matched (stage unchanged), `Transient` on network failure.
    pub async fn submit_current_password(&self, password: &str) -> Result<RecoveryStage, FlowError> {
        let candidates = self.session(|s| {
            ensure_stage(s.stage, RecoveryStage::VerifyOwnership)?;
            Ok::<_, FlowError>(s.lookup_accounts.clone())
        })?;

        let password = SecretString::from(password.to_owned());
        let mut matched = Vec::new();
        for candidate in candidates {
            let matches = self
                .store
                .verify_ownership(candidate.id, &password)
                .await
                .map_err(FlowError::from_identity)?;
            if matches {
                matched.push(candidate);
            }
        }

        if matched.is_empty() {
            tracing::warn!("recovery ownership check failed");
            return Err(AuthError::InvalidCredentials.into());
        }

        if let [only] = matched.as_slice() {
            let account_id = only.id;
            self.session(|s| s.selected_account = Some(account_id));
            return self.enter_code_stage().await;
        }

        Ok(self.session(|s| {
            s.candidate_accounts = matched;
            s.stage = RecoveryStage::SelectAccount;
            tracing::debug!(stage = ?s.stage, "recovery advanced");
            s.stage
        }))
    }

    /// Pick one of the candidate accounts.
    ///
    /// # Errors
    ///
    /// `Validation` if the account is not among the candidates (no network
    /// call), `Transient` if the code send fails.
    pub async fn select_account(&self, account_id: AccountId) -> Result<RecoveryStage, FlowError> {
        self.session(|s| {
            ensure_stage(s.stage, RecoveryStage::SelectAccount)?;
            if !s.candidate_accounts.iter().any(|c| c.id == account_id) {
                return Err(ValidationError::UnknownCandidate);
            }
            s.selected_account = Some(account_id);
            Ok(())
        })?;
        self.enter_code_stage().await
    }

    /// Send the recovery code for the selected account and move to the code
    /// stage. On a send failure the stage is left where it was, so the same
    /// user action can be retried.
    async fn enter_code_stage(&self) -> Result<RecoveryStage, FlowError> {
        let (email, account_id) = self.subject_and_selected()?;

        self.store
            .request_code(&email, CodePurpose::Recovery(account_id))
            .await
            .map_err(FlowError::from_identity)?;

        Ok(self.session(|s| {
            s.cooldown = Some(Cooldown::arm(self.clock.now(), RESEND_COOLDOWN_SECS));
            s.stage = RecoveryStage::SendAndVerifyCode;
            tracing::debug!(stage = ?s.stage, "recovery advanced");
            s.stage
        }))
    }

    /// Submit the emailed one-time code.
    ///
    /// Guarded like registration confirmation. The check is verify-only:
    /// the code is not consumed and the password is untouched, so the same
    /// code can still authorize the final reset call.
    ///
    /// # Errors
    ///
    /// `Validation` if the code is malformed (no network call), `Auth` if
    /// the store rejects it (stage unchanged), `Transient` on network
    /// failure.
    pub async fn confirm_code(&self, code: &str) -> Result<ConfirmOutcome, FlowError> {
        let code = VerificationCode::parse(code).map_err(ValidationError::Code)?;
        let entered = self.session(|s| {
            ensure_stage(s.stage, RecoveryStage::SendAndVerifyCode)?;
            Ok::<_, FlowError>(s.guard().try_enter())
        })?;
        let Some(_permit) = entered else {
            return Ok(ConfirmOutcome::Ignored);
        };
        let (email, account_id) = self.subject_and_selected()?;

        let valid = self
            .store
            .verify_recovery_code(&email, account_id, &code)
            .await
            .map_err(FlowError::from_identity)?;
        if !valid {
            return Err(AuthError::InvalidCode.into());
        }

        self.session(|s| {
            s.verified_code = Some(code);
            s.stage = RecoveryStage::SetNewPassword;
            tracing::debug!(stage = ?s.stage, "recovery advanced");
        });
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Request a fresh code, subject to the cooldown.
    ///
    /// Before the cooldown elapses this is a local no-op — no network call —
    /// reporting the seconds left.
    ///
    /// # Errors
    ///
    /// `Validation` outside the code stage, `Transient` on network failure.
    pub async fn resend_code(&self) -> Result<ResendOutcome, FlowError> {
        self.session(|s| ensure_stage(s.stage, RecoveryStage::SendAndVerifyCode))?;
        let (email, account_id) = self.subject_and_selected()?;

        let remaining = self.resend_remaining();
        if remaining > 0 {
            return Ok(ResendOutcome::CoolingDown { remaining });
        }

        self.store
            .request_code(&email, CodePurpose::Recovery(account_id))
            .await
            .map_err(FlowError::from_identity)?;

        self.session(|s| s.cooldown = Some(Cooldown::arm(self.clock.now(), RESEND_COOLDOWN_SECS)));
        Ok(ResendOutcome::Sent)
    }

    /// Submit the replacement password.
    ///
    /// `confirmed` must be `true`; the caller is expected to put an explicit
    /// yes/no prompt in front of this destructive action. Consumes the
    /// verified code server-side. If the code's TTL won the race, the flow
    /// routes back to the code stage — not all the way back to the email
    /// step.
    ///
    /// # Errors
    ///
    /// `Validation` for a short or mismatched password or a missing
    /// confirmation (no network call), `Auth` when the code was rejected at
    /// the last moment (stage moved back to `SendAndVerifyCode`),
    /// `Transient` on network failure.
    pub async fn submit_new_password(
        &self,
        password: &str,
        confirmation: &str,
        confirmed: bool,
    ) -> Result<RecoveryCompletion, FlowError> {
        if !confirmed {
            return Err(ValidationError::ResetNotConfirmed.into());
        }
        validate_new_password(password, confirmation)?;

        let (email, account_id, code) = self.session(|s| {
            ensure_stage(s.stage, RecoveryStage::SetNewPassword)?;
            let email = s
                .subject_email()
                .cloned()
                .ok_or(ValidationError::StageMismatch)?;
            let account_id = s.selected_account.ok_or(ValidationError::StageMismatch)?;
            let code = s
                .verified_code
                .clone()
                .ok_or(ValidationError::StageMismatch)?;
            Ok::<_, FlowError>((email, account_id, code))
        })?;

        let password = SecretString::from(password.to_owned());
        let outcome = match self
            .store
            .reset_password(&email, account_id, &code, &password)
            .await
        {
            Ok(outcome) => outcome,
            Err(err @ (IdentityError::CodeExpired | IdentityError::CodeRejected)) => {
                // The code's TTL won the race with the customer. Go back to
                // the code stage; the rest of the session is still good.
                tracing::warn!("recovery code rejected at reset, returning to code stage");
                self.session(|s| {
                    s.verified_code = None;
                    s.stage = RecoveryStage::SendAndVerifyCode;
                });
                return Err(FlowError::from_identity(err));
            }
            Err(other) => return Err(FlowError::from_identity(other)),
        };

        self.session(|s| s.finish(RecoveryStage::Complete));
        tracing::debug!(account = %account_id, "recovery complete");

        Ok(RecoveryCompletion {
            signed_in: outcome.session,
        })
    }

    fn subject_and_selected(&self) -> Result<(Email, AccountId), FlowError> {
        self.session(|s| {
            let email = s
                .subject_email()
                .cloned()
                .ok_or(ValidationError::StageMismatch)?;
            let account_id = s.selected_account.ok_or(ValidationError::StageMismatch)?;
            Ok::<_, FlowError>((email, account_id))
        })
    }
}
