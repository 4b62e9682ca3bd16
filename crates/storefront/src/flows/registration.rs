//! Registration flow controller.
//!
//! Stage order: `CollectUsername → CollectEmail → AwaitCodeConfirmation →
//! CollectFullName → SetPassword → Complete`.
//!
//! The email step is the irreversible one: it provisions a real account
//! server-side under a random placeholder password before the customer has
//! chosen a real one. Everything after that works toward replacing the
//! placeholder via the held token handed out at code confirmation.

use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;
use rand::distr::Alphanumeric;
use secrecy::SecretString;

use golden_fig_core::{Email, Username, VerificationCode};

use crate::identity::{CodePurpose, IdentityError, IdentityStore, SignedIn};

use super::clock::{Clock, SystemClock};
use super::cooldown::Cooldown;
use super::error::{ConflictError, FatalError, FlowError, ValidationError};
use super::session::{FlowKind, FlowSession};
use super::{
    ConfirmOutcome, MAX_FULL_NAME_LENGTH, RESEND_COOLDOWN_SECS, ResendOutcome, ensure_stage,
    validate_new_password,
};

/// Length of the generated placeholder password.
const PLACEHOLDER_PASSWORD_LENGTH: usize = 32;

/// Stages of the registration flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStage {
    /// Collecting a candidate username.
    CollectUsername,
    /// Collecting the email; submitting provisions the account.
    CollectEmail,
    /// Waiting for the emailed one-time code.
    AwaitCodeConfirmation,
    /// Collecting the optional display name.
    CollectFullName,
    /// Collecting the real password.
    SetPassword,
    /// Flow finished; session cleared.
    Complete,
}

/// Controller for one registration attempt.
///
/// Clone handles share the same session, so a second handle observes the
/// step guard while a confirmation is in flight. The internal lock is never
/// held across an `await`.
#[derive(Debug, Clone)]
pub struct RegistrationFlow<S, C = SystemClock> {
    store: S,
    clock: C,
    session: Arc<Mutex<FlowSession<RegistrationStage>>>,
}

impl<S: IdentityStore> RegistrationFlow<S> {
    /// Start a fresh registration flow against the system clock.
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S: IdentityStore, C: Clock> RegistrationFlow<S, C> {
    /// Start a fresh registration flow with an injected clock.
    #[must_use]
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            session: Arc::new(Mutex::new(FlowSession::new(
                FlowKind::Registration,
                RegistrationStage::CollectUsername,
            ))),
        }
    }

    fn session<T>(&self, f: impl FnOnce(&mut FlowSession<RegistrationStage>) -> T) -> T {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut session)
    }

    /// The flow's current stage.
    #[must_use]
    pub fn stage(&self) -> RegistrationStage {
        self.session(|s| s.stage)
    }

    /// Whether a code confirmation is currently in flight.
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

    /// Discard the attempt and start over at the username step.
    ///
    /// Local only: a provisional account already created server-side is not
    /// cleaned up (there is no endpoint for that).
    pub fn restart(&self) {
        self.session(|s| s.reset(RegistrationStage::CollectUsername));
        tracing::debug!("registration flow restarted");
    }

    /// Submit a candidate username.
    ///
    /// Checks availability with the store and reserves the name in the
    /// pending profile.
    ///
    /// # Errors
    ///
    /// `Validation` if the username is malformed (no network call),
    /// `Conflict` if it is taken (stage unchanged), `Transient` on network
    /// failure.
    pub async fn submit_username(&self, username: &str) -> Result<RegistrationStage, FlowError> {
        let username = Username::parse(username).map_err(ValidationError::Username)?;
        self.session(|s| ensure_stage(s.stage, RegistrationStage::CollectUsername))?;

        let available = self
            .store
            .check_username(&username)
            .await
            .map_err(FlowError::from_identity)?;
        if !available {
            tracing::warn!(%username, "username unavailable");
            return Err(ConflictError::UsernameTaken.into());
        }

        Ok(self.session(|s| {
            s.pending_profile.username = Some(username);
            s.stage = RegistrationStage::CollectEmail;
            tracing::debug!(stage = ?s.stage, "registration advanced");
            s.stage
        }))
    }

    /// Submit the email address, provisioning the account.
    ///
    /// On success a persisted account exists server-side under a random
    /// placeholder password, the first code is on its way, and the resend
    /// cooldown is armed. On a uniqueness conflict (the availability check
    /// raced another registration) the flow routes back to the username
    /// step instead of staying half-provisioned.
    ///
    /// # Errors
    ///
    /// `Validation` if the email is malformed (no network call),
    /// `Conflict` on a uniqueness collision (stage moved back to
    /// `CollectUsername`), `Transient` on network failure (stage unchanged,
    /// safe to retry).
    pub async fn submit_email(&self, email: &str) -> Result<RegistrationStage, FlowError> {
        let email = Email::parse(email).map_err(ValidationError::Email)?;
        let username = self.session(|s| {
            ensure_stage(s.stage, RegistrationStage::CollectEmail)?;
            s.pending_profile
                .username
                .clone()
                .ok_or(ValidationError::StageMismatch)
        })?;

        let placeholder = placeholder_password();
        match self
            .store
            .create_provisional_account(&username, &email, &placeholder)
            .await
        {
            Ok(provisioned) => Ok(self.session(|s| {
                s.record_subject_email(email);
                // The token returned at provisioning only becomes usable
                // after code confirmation, so it is deliberately dropped.
                if provisioned.needs_code_confirmation {
                    s.pending_profile.provisional = true;
                    s.cooldown = Some(Cooldown::arm(self.clock.now(), RESEND_COOLDOWN_SECS));
                    s.stage = RegistrationStage::AwaitCodeConfirmation;
                } else {
                    // Store variant without email confirmation: the token is
                    // immediately usable, skip straight to the profile step.
                    s.set_held_token(provisioned.token);
                    s.pending_profile.provisional = false;
                    s.stage = RegistrationStage::CollectFullName;
                }
                tracing::debug!(stage = ?s.stage, "registration advanced");
                s.stage
            })),
            Err(IdentityError::Conflict(message)) => {
                tracing::warn!(%message, "provisioning collided, returning to username step");
                self.session(|s| s.stage = RegistrationStage::CollectUsername);
                Err(ConflictError::AccountExists.into())
            }
            Err(other) => Err(FlowError::from_identity(other)),
        }
    }

    /// Submit the emailed one-time code.
    ///
    /// Guarded: if a confirmation is already in flight the submission is
    /// dropped without a network call and `Ignored` is returned. On success
    /// the held token is stored and the flow advances to the full-name step.
    ///
    /// # Errors
    ///
    /// `Validation` if the code is malformed (no network call), `Auth` if
    /// the store rejects it (stage unchanged; the entered code is the
    /// caller's to keep showing), `Transient` on network failure.
    pub async fn confirm_code(&self, code: &str) -> Result<ConfirmOutcome, FlowError> {
        let code = VerificationCode::parse(code).map_err(ValidationError::Code)?;
        let entered = self.session(|s| {
            ensure_stage(s.stage, RegistrationStage::AwaitCodeConfirmation)?;
            let email = s
                .subject_email()
                .cloned()
                .ok_or(ValidationError::StageMismatch)?;
            Ok::<_, FlowError>(s.guard().try_enter().map(|permit| (permit, email)))
        })?;
        let Some((_permit, email)) = entered else {
            return Ok(ConfirmOutcome::Ignored);
        };

        let confirmed = self
            .store
            .confirm_registration_code(&email, &code)
            .await
            .map_err(FlowError::from_identity)?;

        self.session(|s| {
            s.set_held_token(confirmed.token);
            s.pending_profile.provisional = confirmed.account.provisional;
            if s.pending_profile.full_name.is_none() {
                s.pending_profile.full_name = confirmed.account.full_name.clone();
            }
            s.stage = RegistrationStage::CollectFullName;
            tracing::debug!(stage = ?s.stage, "registration advanced");
        });
        Ok(ConfirmOutcome::Confirmed)
    }

    /// Request a fresh code, subject to the cooldown.
    ///
    /// Before the cooldown elapses this is a local no-op — no network call —
    /// reporting the seconds left. On send, the cooldown re-arms and the
    /// stage stays put.
    ///
    /// # Errors
    ///
    /// `Validation` outside the code stage, `Transient` on network failure.
    pub async fn resend_code(&self) -> Result<ResendOutcome, FlowError> {
        let email = self.session(|s| {
            ensure_stage(s.stage, RegistrationStage::AwaitCodeConfirmation)?;
            s.subject_email()
                .cloned()
                .ok_or(ValidationError::StageMismatch)
        })?;

        let remaining = self.resend_remaining();
        if remaining > 0 {
            return Ok(ResendOutcome::CoolingDown { remaining });
        }

        self.store
            .request_code(&email, CodePurpose::Registration)
            .await
            .map_err(FlowError::from_identity)?;

        self.session(|s| s.cooldown = Some(Cooldown::arm(self.clock.now(), RESEND_COOLDOWN_SECS)));
        Ok(ResendOutcome::Sent)
    }

    /// Submit the optional display name and advance.
    ///
    /// `None` or blank input skips the field, keeping any name the store
    /// already returned with the account snapshot.
    ///
    /// # Errors
    ///
    /// `Validation` if the name exceeds the length limit or the flow is not
    /// at the full-name step. Never contacts the server.
    pub fn submit_full_name(&self, full_name: Option<&str>) -> Result<RegistrationStage, FlowError> {
        let full_name = match full_name.map(str::trim) {
            None | Some("") => None,
            Some(name) => {
                if name.chars().count() > MAX_FULL_NAME_LENGTH {
                    return Err(ValidationError::FullNameTooLong {
                        max: MAX_FULL_NAME_LENGTH,
                    }
                    .into());
                }
                Some(name.to_owned())
            }
        };

        self.session(|s| {
            ensure_stage(s.stage, RegistrationStage::CollectFullName)?;
            if full_name.is_some() {
                s.pending_profile.full_name = full_name;
            }
            s.stage = RegistrationStage::SetPassword;
            tracing::debug!(stage = ?s.stage, "registration advanced");
            Ok(s.stage)
        })
    }

    /// Skip the display name.
    ///
    /// # Errors
    ///
    /// `Validation` if the flow is not at the full-name step.
    pub fn skip_full_name(&self) -> Result<RegistrationStage, FlowError> {
        self.submit_full_name(None)
    }

    /// Submit the real password, finalizing the account.
    ///
    /// Spends the held token to replace the placeholder password and set the
    /// full name, then completes the flow signed in as the new account.
    ///
    /// # Errors
    ///
    /// `Validation` for a short or mismatched password (no network call),
    /// `Fatal` if the held token is missing or rejected — the provisional
    /// account exists server-side but this client cannot finish it, so the
    /// caller must direct the customer to sign in instead — and `Transient`
    /// on network failure (the token is kept for a retry).
    pub async fn submit_password(
        &self,
        password: &str,
        confirmation: &str,
    ) -> Result<SignedIn, FlowError> {
        validate_new_password(password, confirmation)?;

        let (token, full_name) = self.session(|s| {
            ensure_stage(s.stage, RegistrationStage::SetPassword)?;
            let token = s.take_held_token().ok_or(FatalError::HeldTokenMissing)?;
            Ok::<_, FlowError>((token, s.pending_profile.full_name.clone()))
        })?;

        let password = SecretString::from(password.to_owned());
        let account = match self
            .store
            .finalize_registration(&token, &password, full_name.as_deref())
            .await
        {
            Ok(account) => account,
            Err(IdentityError::TokenRejected | IdentityError::InvalidCredentials) => {
                tracing::warn!("held token rejected at finalize");
                return Err(FatalError::HeldTokenRejected.into());
            }
            Err(other) => {
                // Transient failure: put the token back so a retry can spend it.
                let err = FlowError::from_identity(other);
                if err.is_transient() {
                    self.session(|s| s.set_held_token(token.clone()));
                }
                return Err(err);
            }
        };

        self.session(|s| s.finish(RegistrationStage::Complete));
        tracing::debug!(account = %account.id, "registration complete");

        // Final login: the held token plus the finalized profile become the
        // customer's session.
        Ok(SignedIn { token, account })
    }
}

/// Generate the non-disclosed placeholder password for provisioning.
fn placeholder_password() -> SecretString {
    let password: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(PLACEHOLDER_PASSWORD_LENGTH)
        .map(char::from)
        .collect();
    SecretString::from(password)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    use golden_fig_core::AccountId;
    use crate::identity::{
        AccountSnapshot, AccountSummary, ConfirmedRegistration, ProvisionedAccount, ResetOutcome,
    };

    /// Store double that fails the test on any network call.
    #[derive(Clone)]
    struct NoNetworkStore;

    impl IdentityStore for NoNetworkStore {
        async fn check_username(&self, _: &Username) -> Result<bool, IdentityError> {
            panic!("unexpected network call");
        }
        async fn create_provisional_account(
            &self,
            _: &Username,
            _: &Email,
            _: &SecretString,
        ) -> Result<ProvisionedAccount, IdentityError> {
            panic!("unexpected network call");
        }
        async fn confirm_registration_code(
            &self,
            _: &Email,
            _: &VerificationCode,
        ) -> Result<ConfirmedRegistration, IdentityError> {
            panic!("unexpected network call");
        }
        async fn request_code(&self, _: &Email, _: CodePurpose) -> Result<(), IdentityError> {
            panic!("unexpected network call");
        }
        async fn request_recovery(&self, _: &Email) -> Result<Vec<AccountSummary>, IdentityError> {
            panic!("unexpected network call");
        }
        async fn verify_ownership(
            &self,
            _: AccountId,
            _: &SecretString,
        ) -> Result<bool, IdentityError> {
            panic!("unexpected network call");
        }
        async fn verify_recovery_code(
            &self,
            _: &Email,
            _: AccountId,
            _: &VerificationCode,
        ) -> Result<bool, IdentityError> {
            panic!("unexpected network call");
        }
        async fn finalize_registration(
            &self,
            _: &SecretString,
            _: &SecretString,
            _: Option<&str>,
        ) -> Result<AccountSnapshot, IdentityError> {
            panic!("unexpected network call");
        }
        async fn reset_password(
            &self,
            _: &Email,
            _: AccountId,
            _: &VerificationCode,
            _: &SecretString,
        ) -> Result<ResetOutcome, IdentityError> {
            panic!("unexpected network call");
        }
    }

    #[tokio::test]
    async fn test_malformed_username_never_reaches_the_store() {
        let flow = RegistrationFlow::new(NoNetworkStore);
        let err = flow.submit_username("x").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Validation(ValidationError::Username(_))
        ));
        assert_eq!(flow.stage(), RegistrationStage::CollectUsername);
    }

    #[tokio::test]
    async fn test_email_step_requires_username_stage() {
        let flow = RegistrationFlow::new(NoNetworkStore);
        let err = flow.submit_email("a@x.com").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Validation(ValidationError::StageMismatch)
        ));
    }

    #[tokio::test]
    async fn test_short_password_rejected_without_network() {
        let flow = RegistrationFlow::new(NoNetworkStore);
        let err = flow.submit_password("short", "short").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Validation(ValidationError::PasswordTooShort { min: 6 })
        ));

        let err = flow.submit_password("secret1", "secret2").await.unwrap_err();
        assert!(matches!(
            err,
            FlowError::Validation(ValidationError::PasswordMismatch)
        ));
    }

    #[tokio::test]
    async fn test_malformed_code_rejected_without_network() {
        let flow = RegistrationFlow::new(NoNetworkStore);
        let err = flow.confirm_code("12345").await.unwrap_err();
        assert!(matches!(err, FlowError::Validation(ValidationError::Code(_))));
    }

    #[test]
    fn test_full_name_length_limit() {
        let flow = RegistrationFlow::new(NoNetworkStore);
        let err = flow
            .submit_full_name(Some(&"x".repeat(101)))
            .unwrap_err();
        assert!(matches!(
            err,
            FlowError::Validation(ValidationError::FullNameTooLong { max: 100 })
        ));
    }

    #[test]
    fn test_placeholder_password_shape() {
        let a = placeholder_password();
        let b = placeholder_password();
        assert_eq!(a.expose_secret().len(), PLACEHOLDER_PASSWORD_LENGTH);
        assert!(a.expose_secret().chars().all(|c| c.is_ascii_alphanumeric()));
        // Two draws colliding would mean the RNG is broken
        assert_ne!(a.expose_secret(), b.expose_secret());
    }

    #[test]
    fn test_restart_returns_to_username_step() {
        let flow = RegistrationFlow::new(NoNetworkStore);
        flow.restart();
        assert_eq!(flow.stage(), RegistrationStage::CollectUsername);
        assert!(!flow.confirmation_in_flight());
        assert_eq!(flow.resend_remaining(), 0);
    }
}
