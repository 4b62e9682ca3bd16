//! Account verification and recovery flows.
//!
//! Two multi-stage workflows coordinate identity provisioning without a
//! server-held session:
//!
//! - [`RegistrationFlow`] - username → email → code confirmation → full name
//!   → password, creating and finalizing a provisional account.
//! - [`RecoveryFlow`] - email → ownership check → (account selection) → code
//!   → new password, resetting the password of an existing account.
//!
//! All accumulated state lives in a [`FlowSession`] owned by the controller;
//! the Identity Store is only reached through the
//! [`IdentityStore`](crate::identity::IdentityStore) contract, at most one
//! call per user action. The [`Cooldown`] and [`StepGuard`] primitives gate
//! resends and duplicate confirmations and are usable (and tested) on their
//! own.

mod error;
mod recovery;
mod registration;
mod session;

pub mod clock;
pub mod cooldown;
pub mod guard;

pub use clock::{Clock, SystemClock};
pub use cooldown::Cooldown;
pub use error::{AuthError, ConflictError, FatalError, FlowError, ValidationError};
pub use guard::{StepGuard, StepPermit};
pub use recovery::{RecoveryCompletion, RecoveryFlow, RecoveryStage};
pub use registration::{RegistrationFlow, RegistrationStage};
pub use session::{FlowKind, FlowSession, PendingProfile};

/// Seconds a freshly sent one-time code is cooled down before a resend.
pub const RESEND_COOLDOWN_SECS: u32 = 60;

/// Minimum length of a customer-chosen password.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum length of the optional full-name field.
pub const MAX_FULL_NAME_LENGTH: usize = 100;

/// Outcome of a guarded confirmation submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The code was accepted and the flow advanced.
    Confirmed,
    /// Another confirmation was already in flight; nothing was sent.
    ///
    /// The only silently-dropped action in the workflow: rendering an error
    /// for a double-tap would be noise.
    Ignored,
}

/// Outcome of a resend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResendOutcome {
    /// A fresh code was requested and the cooldown re-armed.
    Sent,
    /// The cooldown has not elapsed; nothing was sent.
    CoolingDown {
        /// Seconds until resend becomes available.
        remaining: u32,
    },
}

/// Validate a new password and its confirmation, client-side only.
pub(crate) fn validate_new_password(
    password: &str,
    confirmation: &str,
) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    if password != confirmation {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Reject an action submitted outside the stage it belongs to.
pub(crate) fn ensure_stage<St: PartialEq + Copy>(
    actual: St,
    expected: St,
) -> Result<(), ValidationError> {
    if actual == expected {
        Ok(())
    } else {
        Err(ValidationError::StageMismatch)
    }
}
