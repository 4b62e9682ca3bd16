//! Flow session state.
//!
//! One [`FlowSession`] per in-progress registration or recovery attempt.
//! The session is the only place flow state accumulates — there is no
//! ambient module state, so every test gets a fresh instance and nothing
//! leaks between flows. It lives in memory only and does not survive a
//! page reload.

use secrecy::SecretString;

use golden_fig_core::{AccountId, Email, Username, VerificationCode};

use crate::identity::AccountSummary;

use super::cooldown::Cooldown;
use super::guard::StepGuard;

/// Which workflow a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    /// New-account registration.
    Registration,
    /// Password recovery.
    Recovery,
}

/// Profile fields collected client-side before they hold real server values.
#[derive(Debug, Clone, Default)]
pub struct PendingProfile {
    /// Username reserved at the availability step.
    pub username: Option<Username>,
    /// Optional display name.
    pub full_name: Option<String>,
    /// Whether the server-side account still awaits confirmation.
    pub provisional: bool,
}

/// Client-retained state for one flow attempt.
///
/// `St` is the flow's stage enum. Field invariants:
///
/// - the subject email is set at most once per session;
/// - the held token appears only after a confirmed code and is taken
///   (not copied) when spent;
/// - candidates and the selected account are recovery-only.
#[derive(Debug)]
pub struct FlowSession<St> {
    kind: FlowKind,
    /// Current stage.
    pub(crate) stage: St,
    subject_email: Option<Email>,
    /// Partially collected profile fields.
    pub(crate) pending_profile: PendingProfile,
    held_token: Option<SecretString>,
    /// Accounts returned by the recovery lookup, before ownership is proven.
    /// Held privately; never disclosed to the caller.
    pub(crate) lookup_accounts: Vec<AccountSummary>,
    /// Recovery candidates whose password matched, in store order.
    pub(crate) candidate_accounts: Vec<AccountSummary>,
    /// Account chosen for recovery.
    pub(crate) selected_account: Option<AccountId>,
    /// Last server-accepted code, kept for the final reset call only.
    pub(crate) verified_code: Option<VerificationCode>,
    /// Resend gate; `None` until the first code is sent.
    pub(crate) cooldown: Option<Cooldown>,
    guard: StepGuard,
}

impl<St> FlowSession<St> {
    /// Create a fresh session at the given entry stage.
    #[must_use]
    pub fn new(kind: FlowKind, stage: St) -> Self {
        Self {
            kind,
            stage,
            subject_email: None,
            pending_profile: PendingProfile::default(),
            held_token: None,
            lookup_accounts: Vec::new(),
            candidate_accounts: Vec::new(),
            selected_account: None,
            verified_code: None,
            cooldown: None,
            guard: StepGuard::new(),
        }
    }

    /// The workflow this session belongs to.
    #[must_use]
    pub const fn kind(&self) -> FlowKind {
        self.kind
    }

    /// The email the flow operates on, once known.
    #[must_use]
    pub const fn subject_email(&self) -> Option<&Email> {
        self.subject_email.as_ref()
    }

    /// Record the subject email. The first write wins; the email is
    /// immutable for the rest of the session.
    pub(crate) fn record_subject_email(&mut self, email: Email) {
        if self.subject_email.is_none() {
            self.subject_email = Some(email);
        }
    }

    /// Whether a confirmed-code bearer token is held.
    #[must_use]
    pub const fn has_held_token(&self) -> bool {
        self.held_token.is_some()
    }

    pub(crate) fn set_held_token(&mut self, token: SecretString) {
        self.held_token = Some(token);
    }

    /// Take the held token for its single privileged use.
    pub(crate) fn take_held_token(&mut self) -> Option<SecretString> {
        self.held_token.take()
    }

    /// The confirmation-step reentrancy guard.
    #[must_use]
    pub const fn guard(&self) -> &StepGuard {
        &self.guard
    }

    /// Discard all accumulated state and restart at `stage`.
    ///
    /// Starting a new flow of the same kind goes through here: the previous
    /// attempt is dropped wholesale, never merged. The server is not told —
    /// any provisional account or unconsumed code it holds ages out on its
    /// own terms.
    pub(crate) fn reset(&mut self, stage: St) {
        *self = Self::new(self.kind, stage);
    }

    /// Terminal transition: clear everything the flow accumulated and park
    /// the session at `stage`.
    pub(crate) fn finish(&mut self, stage: St) {
        self.reset(stage);
    }
}
