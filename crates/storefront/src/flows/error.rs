//! Flow error taxonomy.
//!
//! Five classes, each with a distinct handling policy:
//!
//! - [`ValidationError`] - client-side field checks; blocks the transition
//!   and never contacts the server.
//! - [`ConflictError`] - username/email taken; routes back to the offending
//!   earlier stage.
//! - [`AuthError`] - wrong password or bad code; the flow stays in its
//!   current stage and input is preserved for retry.
//! - `Transient` - timeout or network failure; stage unchanged, nothing
//!   discarded, the user may retry.
//! - [`FatalError`] - the held token is gone or spent; the flow cannot
//!   continue and the user is directed to sign in instead.

use thiserror::Error;

use golden_fig_core::{CodeError, EmailError, UsernameError};

use crate::identity::IdentityError;

/// Client-side field validation failures.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Username failed structural validation.
    #[error(transparent)]
    Username(#[from] UsernameError),

    /// Email failed structural validation.
    #[error(transparent)]
    Email(#[from] EmailError),

    /// Verification code failed structural validation.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Password below the minimum length.
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Minimum allowed length.
        min: usize,
    },

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Full name above the maximum length.
    #[error("full name must be at most {max} characters")]
    FullNameTooLong {
        /// Maximum allowed length.
        max: usize,
    },

    /// The destructive reset was submitted without explicit confirmation.
    #[error("password reset was not confirmed")]
    ResetNotConfirmed,

    /// The selected account is not one of the recovery candidates.
    #[error("selected account is not a recovery candidate")]
    UnknownCandidate,

    /// The action does not belong to the flow's current stage.
    #[error("action is not available at this step")]
    StageMismatch,
}

impl ValidationError {
    /// The input field this error annotates, if any.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::Username(_) => Some("username"),
            Self::Email(_) => Some("email"),
            Self::Code(_) => Some("code"),
            Self::PasswordTooShort { .. } => Some("password"),
            Self::PasswordMismatch => Some("password_confirmation"),
            Self::FullNameTooLong { .. } => Some("full_name"),
            Self::ResetNotConfirmed | Self::UnknownCandidate | Self::StageMismatch => None,
        }
    }
}

/// Server-reported uniqueness conflicts.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The requested username is taken.
    #[error("this username is already taken")]
    UsernameTaken,

    /// An account with this username or email already exists.
    #[error("an account with this username or email already exists")]
    AccountExists,
}

/// Server-side authentication rejections that leave the stage unchanged.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Password did not match any candidate account.
    ///
    /// Deliberately generic: "unknown email" would disclose account
    /// existence to an unauthenticated caller.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The one-time code was wrong or already consumed.
    #[error("invalid verification code")]
    InvalidCode,

    /// The one-time code expired before it was consumed.
    #[error("verification code expired, request a new one")]
    CodeExpired,
}

/// Unrecoverable flow failures.
#[derive(Debug, Error)]
pub enum FatalError {
    /// No held token at the finalize step; the provisional account exists
    /// server-side but this client can no longer complete it.
    #[error("registration can no longer be completed here, sign in instead")]
    HeldTokenMissing,

    /// The store rejected the held token (spent or expired).
    #[error("registration session expired, sign in instead")]
    HeldTokenRejected,
}

/// Any error surfaced by a flow controller.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Client-side validation failure; no network call was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Uniqueness conflict reported by the store.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Authentication rejection; retry in place.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Timeout or transport failure; retry the same action.
    #[error("identity service unavailable: {0}")]
    Transient(#[source] IdentityError),

    /// The flow cannot continue.
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl FlowError {
    /// Classify an [`IdentityError`] into the flow taxonomy.
    ///
    /// Stage-specific overrides (conflict route-backs, fatal token handling
    /// at the finalize step) are applied by the controllers before falling
    /// through to this mapping.
    pub(crate) fn from_identity(err: IdentityError) -> Self {
        match err {
            IdentityError::Conflict(_) => Self::Conflict(ConflictError::AccountExists),
            IdentityError::InvalidCredentials => Self::Auth(AuthError::InvalidCredentials),
            IdentityError::CodeRejected => Self::Auth(AuthError::InvalidCode),
            IdentityError::CodeExpired => Self::Auth(AuthError::CodeExpired),
            IdentityError::TokenRejected => Self::Fatal(FatalError::HeldTokenRejected),
            err @ (IdentityError::Http(_) | IdentityError::Parse(_) | IdentityError::Api { .. }) => {
                Self::Transient(err)
            }
        }
    }

    /// Whether retrying the same action may succeed without changing input.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
