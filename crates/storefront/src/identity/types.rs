//! Identity Store data types.
//!
//! These are the typed payloads the flow controllers exchange with the
//! Identity Store through the [`IdentityStore`](super::IdentityStore)
//! contract. Secret-bearing outcomes (`ProvisionedAccount`,
//! `ConfirmedRegistration`, `SignedIn`) intentionally do not implement
//! `Serialize`; tokens never leave the process through this crate.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use golden_fig_core::{AccountId, Email, Username};

/// Purpose a one-time code is bound to, alongside the email.
///
/// The Verification Code Service scopes codes by purpose, so a registration
/// code can never confirm a recovery and vice versa. Recovery codes are
/// additionally bound to the selected account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    /// Confirming a freshly provisioned registration.
    Registration,
    /// Resetting the password of the given account.
    Recovery(AccountId),
}

/// A compact account listing, as returned by a recovery lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    /// The account's ID.
    pub id: AccountId,
    /// The account's username.
    pub username: Username,
    /// The account's email address.
    pub email: Email,
}

/// A full account snapshot, as returned by mutating identity calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// The account's ID.
    pub id: AccountId,
    /// The account's username.
    pub username: Username,
    /// The account's email address.
    pub email: Email,
    /// The account's display name, once set.
    pub full_name: Option<String>,
    /// Whether the account still awaits code confirmation.
    pub provisional: bool,
}

/// Result of provisioning a new account during registration.
///
/// The token returned here is only usable after the emailed code has been
/// confirmed; until then it authorizes nothing.
pub struct ProvisionedAccount {
    /// Whether the account must be confirmed with an emailed code.
    pub needs_code_confirmation: bool,
    /// Token that becomes usable once the code is confirmed.
    pub token: SecretString,
    /// Snapshot of the provisional account.
    pub account: AccountSnapshot,
}

/// Result of confirming a registration code.
pub struct ConfirmedRegistration {
    /// Bearer token authorizing exactly one finalize call.
    pub token: SecretString,
    /// Snapshot of the now-confirmed account.
    pub account: AccountSnapshot,
}

/// An authenticated session handed to the caller when a flow completes.
pub struct SignedIn {
    /// Session bearer token.
    pub token: SecretString,
    /// The signed-in account.
    pub account: AccountSnapshot,
}

/// Result of a recovery password reset.
///
/// Some deployments of the Identity Store sign the user in on reset; others
/// require a manual sign-in afterwards. `session` is `None` in the latter
/// case.
pub struct ResetOutcome {
    /// Fresh session, when the store issues one.
    pub session: Option<SignedIn>,
}

impl std::fmt::Debug for ProvisionedAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionedAccount")
            .field("needs_code_confirmation", &self.needs_code_confirmation)
            .field("token", &"[REDACTED]")
            .field("account", &self.account)
            .finish()
    }
}

impl std::fmt::Debug for ConfirmedRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmedRegistration")
            .field("token", &"[REDACTED]")
            .field("account", &self.account)
            .finish()
    }
}

impl std::fmt::Debug for SignedIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedIn")
            .field("token", &"[REDACTED]")
            .field("account", &self.account)
            .finish()
    }
}

/// Wire name of the purpose.
impl AsRef<str> for CodePurpose {
    fn as_ref(&self) -> &str {
        match self {
            Self::Registration => "registration",
            Self::Recovery(_) => "recovery",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_redacted_in_debug() {
        let snapshot = AccountSnapshot {
            id: AccountId::new(1),
            username: Username::parse("alice").expect("valid username"),
            email: Email::parse("a@x.com").expect("valid email"),
            full_name: None,
            provisional: true,
        };
        let provisioned = ProvisionedAccount {
            needs_code_confirmation: true,
            token: SecretString::from("opaque-token"),
            account: snapshot,
        };
        let rendered = format!("{provisioned:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("opaque-token"));
    }

    #[test]
    fn test_code_purpose_wire_names() {
        assert_eq!(CodePurpose::Registration.as_ref(), "registration");
        assert_eq!(CodePurpose::Recovery(AccountId::new(3)).as_ref(), "recovery");
    }

    #[test]
    fn test_account_summary_deserializes() {
        let summary: AccountSummary = serde_json::from_str(
            r#"{"id": 9, "username": "alice", "email": "a@x.com"}"#,
        )
        .expect("valid summary");
        assert_eq!(summary.id, AccountId::new(9));
        assert_eq!(summary.username.as_str(), "alice");
    }
}
