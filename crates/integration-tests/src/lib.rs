//! Integration tests for Golden Fig.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p golden-fig-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `registration_flow` - Registration scenario tests
//! - `recovery_flow` - Recovery scenario tests
//!
//! This library holds the shared test harness: [`InMemoryIdentityStore`], a
//! deterministic Identity Store double with per-operation call counters, and
//! [`ManualClock`], a hand-stepped clock for exercising cooldown edges. No
//! test in this crate touches the network.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use golden_fig_core::{AccountId, Email, Username, VerificationCode};
use golden_fig_storefront::flows::Clock;
use golden_fig_storefront::identity::{
    AccountSnapshot, AccountSummary, CodePurpose, ConfirmedRegistration, IdentityError,
    IdentityStore, ProvisionedAccount, ResetOutcome, SignedIn,
};

// =============================================================================
// Manual Clock
// =============================================================================

/// A hand-stepped clock for deterministic cooldown tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Create a clock frozen at an arbitrary fixed instant.
    #[must_use]
    pub fn fixed() -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(1_700_000_000_000)),
        }
    }

    /// Step the clock forward.
    pub fn advance(&self, delta: TimeDelta) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

// =============================================================================
// In-Memory Identity Store
// =============================================================================

/// An account record inside the store double.
#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub id: AccountId,
    pub username: Username,
    pub email: Email,
    pub password: String,
    pub full_name: Option<String>,
    pub provisional: bool,
}

impl StoredAccount {
    fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            provisional: self.provisional,
        }
    }
}

/// Pause/resume handle for in-flight confirmation calls.
///
/// While installed, confirmation operations signal `entered` on arrival and
/// then park until `release` is notified, letting a test assert what a
/// second submission does while the first is suspended mid-network.
#[derive(Clone, Default)]
pub struct ConfirmGate {
    /// Signalled when a confirmation call reaches the store.
    pub entered: Arc<Notify>,
    /// Notify to let the parked confirmation proceed.
    pub release: Arc<Notify>,
}

#[derive(Default)]
struct StoreState {
    accounts: Vec<StoredAccount>,
    next_id: i64,
    /// Value the next issued code will have.
    code_value: String,
    /// Codes currently issued, keyed by (email, purpose key).
    issued: HashMap<(String, String), String>,
    /// Codes already consumed; single-use is enforced here.
    consumed: HashSet<(String, String, String)>,
    /// Held tokens already spent on a finalize call.
    spent_tokens: HashSet<String>,
    calls: HashMap<&'static str, usize>,
    /// Report every username as available, to force a provisioning race.
    assume_username_available: bool,
    /// Fail the next reset with a code-expired error (TTL race).
    expire_next_reset: bool,
    /// Return a fresh session from a successful reset.
    sign_in_on_reset: bool,
    confirm_gate: Option<ConfirmGate>,
}

/// Deterministic [`IdentityStore`] double backing the scenario tests.
///
/// Codes are single-use, held tokens are single-spend, and every operation
/// is counted, so the client-side invariants (no duplicate submissions, no
/// silent re-sends) can be asserted as observed call counts.
#[derive(Clone, Default)]
pub struct InMemoryIdentityStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryIdentityStore {
    /// Create an empty store issuing code `123456`.
    #[must_use]
    pub fn new() -> Self {
        let store = Self::default();
        store.with_state(|state| {
            state.code_value = "123456".to_string();
            state.sign_in_on_reset = true;
            state.next_id = 1;
        });
        store
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut StoreState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Count one call to `op` and fetch the active confirmation gate.
    fn enter(&self, op: &'static str) -> Option<ConfirmGate> {
        self.with_state(|state| {
            *state.calls.entry(op).or_insert(0) += 1;
            state.confirm_gate.clone()
        })
    }

    /// Seed an existing, fully set up account. Returns its ID.
    ///
    /// # Panics
    ///
    /// Panics if `username` or `email` is not structurally valid.
    pub fn add_account(&self, username: &str, email: &str, password: &str) -> AccountId {
        self.with_state(|state| {
            let id = AccountId::new(state.next_id);
            state.next_id += 1;
            state.accounts.push(StoredAccount {
                id,
                username: Username::parse(username).expect("valid test username"),
                email: Email::parse(email).expect("valid test email"),
                password: password.to_string(),
                full_name: None,
                provisional: false,
            });
            id
        })
    }

    /// Number of observed calls to `op` (trait method name).
    #[must_use]
    pub fn calls(&self, op: &str) -> usize {
        self.with_state(|state| state.calls.get(op).copied().unwrap_or(0))
    }

    /// Value the next issued code will have.
    pub fn set_code_value(&self, code: &str) {
        self.with_state(|state| state.code_value = code.to_string());
    }

    /// Report every username as available, forcing the availability-check /
    /// creation race.
    pub fn assume_username_available(&self) {
        self.with_state(|state| state.assume_username_available = true);
    }

    /// Fail the next reset call with a code-expired error.
    pub fn expire_next_reset(&self) {
        self.with_state(|state| state.expire_next_reset = true);
    }

    /// Whether a successful reset returns a fresh session.
    pub fn sign_in_on_reset(&self, enabled: bool) {
        self.with_state(|state| state.sign_in_on_reset = enabled);
    }

    /// Install a [`ConfirmGate`] pausing confirmation calls.
    #[must_use]
    pub fn gate_confirmations(&self) -> ConfirmGate {
        let gate = ConfirmGate::default();
        self.with_state(|state| state.confirm_gate = Some(gate.clone()));
        gate
    }

    /// Fetch an account by ID for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the account does not exist.
    #[must_use]
    pub fn account(&self, id: AccountId) -> StoredAccount {
        self.with_state(|state| {
            state
                .accounts
                .iter()
                .find(|a| a.id == id)
                .cloned()
                .expect("account exists")
        })
    }

    /// Fetch the single account with `username` for assertions.
    ///
    /// # Panics
    ///
    /// Panics if no account has that username.
    #[must_use]
    pub fn account_by_username(&self, username: &str) -> StoredAccount {
        self.with_state(|state| {
            state
                .accounts
                .iter()
                .find(|a| a.username.as_str() == username)
                .cloned()
                .expect("account exists")
        })
    }

    /// Total number of account rows, provisional included.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.with_state(|state| state.accounts.len())
    }

    fn purpose_key(email: &Email, purpose: CodePurpose) -> (String, String) {
        let key = match purpose {
            CodePurpose::Registration => "registration".to_string(),
            CodePurpose::Recovery(id) => format!("recovery:{id}"),
        };
        (email.as_str().to_string(), key)
    }

    fn issue_code(state: &mut StoreState, email: &Email, purpose: CodePurpose) {
        let key = Self::purpose_key(email, purpose);
        let code = state.code_value.clone();
        state.issued.insert(key, code);
    }

    /// Whether `code` is currently issued and unconsumed for the purpose.
    fn code_is_valid(
        state: &StoreState,
        email: &Email,
        purpose: CodePurpose,
        code: &VerificationCode,
    ) -> bool {
        let (email_key, purpose_key) = Self::purpose_key(email, purpose);
        let consumed_key = (
            email_key.clone(),
            purpose_key.clone(),
            code.as_str().to_string(),
        );
        if state.consumed.contains(&consumed_key) {
            return false;
        }
        state.issued.get(&(email_key, purpose_key)) == Some(&code.as_str().to_string())
    }

    fn consume_code(
        state: &mut StoreState,
        email: &Email,
        purpose: CodePurpose,
        code: &VerificationCode,
    ) {
        let (email_key, purpose_key) = Self::purpose_key(email, purpose);
        state
            .consumed
            .insert((email_key, purpose_key, code.as_str().to_string()));
    }
}

impl IdentityStore for InMemoryIdentityStore {
    async fn check_username(&self, username: &Username) -> Result<bool, IdentityError> {
        self.enter("check_username");
        Ok(self.with_state(|state| {
            state.assume_username_available
                || !state
                    .accounts
                    .iter()
                    .any(|a| a.username.as_str() == username.as_str())
        }))
    }

    async fn create_provisional_account(
        &self,
        username: &Username,
        email: &Email,
        placeholder_password: &SecretString,
    ) -> Result<ProvisionedAccount, IdentityError> {
        self.enter("create_provisional_account");
        self.with_state(|state| {
            if state
                .accounts
                .iter()
                .any(|a| a.username.as_str() == username.as_str())
            {
                return Err(IdentityError::Conflict("username already taken".to_string()));
            }

            let id = AccountId::new(state.next_id);
            state.next_id += 1;
            let account = StoredAccount {
                id,
                username: username.clone(),
                email: email.clone(),
                password: placeholder_password.expose_secret().to_string(),
                full_name: None,
                provisional: true,
            };
            let snapshot = account.snapshot();
            state.accounts.push(account);
            Self::issue_code(state, email, CodePurpose::Registration);

            Ok(ProvisionedAccount {
                needs_code_confirmation: true,
                // Usable only after confirmation; the real store would
                // reject it until then, so nothing in the tests spends it.
                token: SecretString::from(format!("pending-token-{id}")),
                account: snapshot,
            })
        })
    }

    async fn confirm_registration_code(
        &self,
        email: &Email,
        code: &VerificationCode,
    ) -> Result<ConfirmedRegistration, IdentityError> {
        let gate = self.enter("confirm_registration_code");
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        self.with_state(|state| {
            if !Self::code_is_valid(state, email, CodePurpose::Registration, code) {
                return Err(IdentityError::CodeRejected);
            }
            Self::consume_code(state, email, CodePurpose::Registration, code);

            let account = state
                .accounts
                .iter()
                .find(|a| a.email == *email && a.provisional)
                .cloned()
                .ok_or(IdentityError::CodeRejected)?;

            Ok(ConfirmedRegistration {
                token: SecretString::from(format!("held-token-{}", account.id)),
                account: account.snapshot(),
            })
        })
    }

    async fn request_code(&self, email: &Email, purpose: CodePurpose) -> Result<(), IdentityError> {
        self.enter("request_code");
        self.with_state(|state| Self::issue_code(state, email, purpose));
        Ok(())
    }

    async fn request_recovery(&self, email: &Email) -> Result<Vec<AccountSummary>, IdentityError> {
        self.enter("request_recovery");
        Ok(self.with_state(|state| {
            state
                .accounts
                .iter()
                .filter(|a| a.email == *email)
                .map(StoredAccount::summary)
                .collect()
        }))
    }

    async fn verify_ownership(
        &self,
        account_id: AccountId,
        password: &SecretString,
    ) -> Result<bool, IdentityError> {
        self.enter("verify_ownership");
        Ok(self.with_state(|state| {
            state
                .accounts
                .iter()
                .any(|a| a.id == account_id && a.password == password.expose_secret())
        }))
    }

    async fn verify_recovery_code(
        &self,
        email: &Email,
        account_id: AccountId,
        code: &VerificationCode,
    ) -> Result<bool, IdentityError> {
        let gate = self.enter("verify_recovery_code");
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        Ok(self.with_state(|state| {
            Self::code_is_valid(state, email, CodePurpose::Recovery(account_id), code)
        }))
    }

    async fn finalize_registration(
        &self,
        token: &SecretString,
        new_password: &SecretString,
        full_name: Option<&str>,
    ) -> Result<AccountSnapshot, IdentityError> {
        self.enter("finalize_registration");
        self.with_state(|state| {
            let token = token.expose_secret().to_string();
            if state.spent_tokens.contains(&token) {
                return Err(IdentityError::TokenRejected);
            }
            let account_id = token
                .strip_prefix("held-token-")
                .and_then(|raw| raw.parse::<i64>().ok())
                .map(AccountId::new)
                .ok_or(IdentityError::TokenRejected)?;

            let account = state
                .accounts
                .iter_mut()
                .find(|a| a.id == account_id)
                .ok_or(IdentityError::TokenRejected)?;

            account.password = new_password.expose_secret().to_string();
            account.full_name = full_name.map(ToOwned::to_owned);
            account.provisional = false;
            let snapshot = account.snapshot();
            state.spent_tokens.insert(token);
            Ok(snapshot)
        })
    }

    async fn reset_password(
        &self,
        email: &Email,
        account_id: AccountId,
        code: &VerificationCode,
        new_password: &SecretString,
    ) -> Result<ResetOutcome, IdentityError> {
        self.enter("reset_password");
        self.with_state(|state| {
            if state.expire_next_reset {
                state.expire_next_reset = false;
                return Err(IdentityError::CodeExpired);
            }
            if !Self::code_is_valid(state, email, CodePurpose::Recovery(account_id), code) {
                return Err(IdentityError::CodeRejected);
            }
            Self::consume_code(state, email, CodePurpose::Recovery(account_id), code);

            let sign_in = state.sign_in_on_reset;
            let account = state
                .accounts
                .iter_mut()
                .find(|a| a.id == account_id)
                .ok_or(IdentityError::CodeRejected)?;
            account.password = new_password.expose_secret().to_string();
            let snapshot = account.snapshot();

            Ok(ResetOutcome {
                session: sign_in.then(|| SignedIn {
                    token: SecretString::from(format!("recovery-session-{account_id}")),
                    account: snapshot,
                }),
            })
        })
    }
}
