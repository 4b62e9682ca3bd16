//! Identity Store contract and client.
//!
//! The Identity Store is an external collaborator: it holds account records
//! (username, email, password hash, flags) and the one-time codes that gate
//! the account flows. This module defines the [`IdentityStore`] trait — one
//! async operation per consumed endpoint — and [`IdentityClient`], the
//! production JSON-over-HTTP implementation.
//!
//! Flow controllers are generic over [`IdentityStore`], so tests substitute
//! an in-memory store and never touch the network.

mod client;
pub mod types;

pub use client::IdentityClient;
pub use types::*;

use secrecy::SecretString;
use thiserror::Error;

use golden_fig_core::{AccountId, Email, Username, VerificationCode};

/// Errors that can occur when calling the Identity Store.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP transport failed (includes client-side timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The store refused to create the account (username/email taken).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Password did not match the account.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The one-time code was wrong or already consumed.
    #[error("Verification code rejected")]
    CodeRejected,

    /// The one-time code's TTL elapsed before it was consumed.
    #[error("Verification code expired")]
    CodeExpired,

    /// The held bearer token was missing, spent, or expired server-side.
    #[error("Bearer token rejected")]
    TokenRejected,

    /// Any other error reported by the store.
    #[error("Identity API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the error envelope, if any.
        message: String,
    },
}

/// The Identity Store endpoint contract consumed by the account flows.
///
/// One operation per endpoint; the flow controllers never reach the store
/// any other way. All operations are request/response — the store keeps no
/// session for the caller, which is the whole premise of the workflow.
pub trait IdentityStore {
    /// Check whether a username is still available (read-only).
    fn check_username(
        &self,
        username: &Username,
    ) -> impl Future<Output = Result<bool, IdentityError>>;

    /// Create a provisional account and send the first confirmation code.
    ///
    /// This is the irreversible step: a persisted account exists afterwards,
    /// holding the non-disclosed placeholder password until finalization.
    fn create_provisional_account(
        &self,
        username: &Username,
        email: &Email,
        placeholder_password: &SecretString,
    ) -> impl Future<Output = Result<ProvisionedAccount, IdentityError>>;

    /// Confirm a registration code (single-use server-side).
    fn confirm_registration_code(
        &self,
        email: &Email,
        code: &VerificationCode,
    ) -> impl Future<Output = Result<ConfirmedRegistration, IdentityError>>;

    /// Request that a fresh one-time code be sent for the given purpose.
    ///
    /// Serves both the initial recovery send and all resends; rate-limited
    /// server-side independently of the client cooldown.
    fn request_code(
        &self,
        email: &Email,
        purpose: CodePurpose,
    ) -> impl Future<Output = Result<(), IdentityError>>;

    /// Look up the accounts associated with an email for recovery.
    ///
    /// May legitimately return zero, one, or many summaries. Callers must
    /// not disclose the count to an unauthenticated user.
    fn request_recovery(
        &self,
        email: &Email,
    ) -> impl Future<Output = Result<Vec<AccountSummary>, IdentityError>>;

    /// Check a password against one account (read-only credential check).
    fn verify_ownership(
        &self,
        account_id: AccountId,
        password: &SecretString,
    ) -> impl Future<Output = Result<bool, IdentityError>>;

    /// Check a recovery code without consuming it or mutating the password.
    fn verify_recovery_code(
        &self,
        email: &Email,
        account_id: AccountId,
        code: &VerificationCode,
    ) -> impl Future<Output = Result<bool, IdentityError>>;

    /// Set the real password and full name on a confirmed registration.
    ///
    /// Spends the held token; the store rejects a second use.
    fn finalize_registration(
        &self,
        token: &SecretString,
        new_password: &SecretString,
        full_name: Option<&str>,
    ) -> impl Future<Output = Result<AccountSnapshot, IdentityError>>;

    /// Consume a recovery code and set the account's new password.
    fn reset_password(
        &self,
        email: &Email,
        account_id: AccountId,
        code: &VerificationCode,
        new_password: &SecretString,
    ) -> impl Future<Output = Result<ResetOutcome, IdentityError>>;
}
