//! Identity Store HTTP client.
//!
//! JSON-over-HTTP implementation of the [`IdentityStore`] contract. The
//! store's API is a plain REST surface; every operation is a POST with a
//! JSON body, authenticated with the storefront's service token except for
//! registration finalization, which presents the customer's held token
//! instead.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use golden_fig_core::{AccountId, Email, Username, VerificationCode};

use crate::config::IdentityConfig;

use super::{
    AccountSnapshot, AccountSummary, CodePurpose, ConfirmedRegistration, IdentityError,
    IdentityStore, ProvisionedAccount, ResetOutcome, SignedIn,
};

// ─────────────────────────────────────────────────────────────────────────────
// Error Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Machine-readable error body returned by the Identity Store on non-2xx
/// responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    code: Option<String>,
    message: Option<String>,
}

/// Decode a non-2xx response into an [`IdentityError`].
///
/// The envelope's `code` field is authoritative; the HTTP status is only a
/// fallback for responses without a usable body.
fn decode_error(status: u16, body: &str) -> IdentityError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or(ErrorEnvelope {
        code: None,
        message: None,
    });
    let message = envelope
        .message
        .unwrap_or_else(|| "(no error details provided)".to_string());

    match envelope.code.as_deref() {
        Some("username_taken" | "account_exists") => IdentityError::Conflict(message),
        Some("invalid_credentials") => IdentityError::InvalidCredentials,
        Some("code_invalid") => IdentityError::CodeRejected,
        Some("code_expired") => IdentityError::CodeExpired,
        Some("token_rejected" | "token_spent") => IdentityError::TokenRejected,
        _ => match status {
            409 => IdentityError::Conflict(message),
            401 => IdentityError::InvalidCredentials,
            _ => IdentityError::Api { status, message },
        },
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the Identity Store API.
#[derive(Clone)]
pub struct IdentityClient {
    inner: Arc<IdentityClientInner>,
}

struct IdentityClientInner {
    client: reqwest::Client,
    base_url: String,
    api_token: SecretString,
}

impl IdentityClient {
    /// Create a new Identity Store client.
    ///
    /// The per-request timeout budget from the configuration is applied to
    /// every call; a request that exceeds it surfaces as
    /// [`IdentityError::Http`].
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend cannot be initialized. The configuration
    /// itself cannot make construction fail.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client with static configuration builds");

        Self {
            inner: Arc::new(IdentityClientInner {
                client,
                base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
                api_token: config.api_token.clone(),
            }),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.inner.base_url, path)
    }

    /// Execute a POST with a JSON body and decode a JSON response.
    async fn execute<B, T>(
        &self,
        path: &str,
        body: &B,
        bearer: &SecretString,
    ) -> Result<T, IdentityError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.execute_raw(path, body, bearer).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Execute a POST with a JSON body, discarding any response body.
    async fn execute_no_content<B>(
        &self,
        path: &str,
        body: &B,
        bearer: &SecretString,
    ) -> Result<(), IdentityError>
    where
        B: Serialize + ?Sized,
    {
        self.execute_raw(path, body, bearer).await.map(|_| ())
    }

    async fn execute_raw<B>(
        &self,
        path: &str,
        body: &B,
        bearer: &SecretString,
    ) -> Result<String, IdentityError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(path);
        let response = self
            .inner
            .client
            .post(&url)
            .bearer_auth(bearer.expose_secret())
            .header("User-Agent", "GoldenFig/1.0")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status.is_success() {
            Ok(text)
        } else {
            tracing::warn!(%url, status = status.as_u16(), "identity call failed");
            Err(decode_error(status.as_u16(), &text))
        }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, IdentityError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(path, body, &self.inner.api_token).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IdentityStore Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl IdentityStore for IdentityClient {
    async fn check_username(&self, username: &Username) -> Result<bool, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            username: &'a Username,
        }

        #[derive(Deserialize)]
        struct Response {
            available: bool,
        }

        let response: Response = self
            .post("identity/usernames/check", &Request { username })
            .await?;
        Ok(response.available)
    }

    async fn create_provisional_account(
        &self,
        username: &Username,
        email: &Email,
        placeholder_password: &SecretString,
    ) -> Result<ProvisionedAccount, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            username: &'a Username,
            email: &'a Email,
            password: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            needs_code_confirmation: bool,
            token: String,
            account: AccountSnapshot,
        }

        let response: Response = self
            .post(
                "identity/accounts",
                &Request {
                    username,
                    email,
                    password: placeholder_password.expose_secret(),
                },
            )
            .await?;

        Ok(ProvisionedAccount {
            needs_code_confirmation: response.needs_code_confirmation,
            token: SecretString::from(response.token),
            account: response.account,
        })
    }

    async fn confirm_registration_code(
        &self,
        email: &Email,
        code: &VerificationCode,
    ) -> Result<ConfirmedRegistration, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            email: &'a Email,
            code: &'a VerificationCode,
        }

        #[derive(Deserialize)]
        struct Response {
            token: String,
            account: AccountSnapshot,
        }

        let response: Response = self
            .post("identity/accounts/confirm", &Request { email, code })
            .await?;

        Ok(ConfirmedRegistration {
            token: SecretString::from(response.token),
            account: response.account,
        })
    }

    async fn request_code(&self, email: &Email, purpose: CodePurpose) -> Result<(), IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            email: &'a Email,
            purpose: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            account_id: Option<AccountId>,
        }

        let account_id = match purpose {
            CodePurpose::Registration => None,
            CodePurpose::Recovery(id) => Some(id),
        };

        self.execute_no_content(
            "identity/codes",
            &Request {
                email,
                purpose: purpose.as_ref(),
                account_id,
            },
            &self.inner.api_token,
        )
        .await
    }

    async fn request_recovery(&self, email: &Email) -> Result<Vec<AccountSummary>, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            email: &'a Email,
        }

        #[derive(Deserialize)]
        struct Response {
            accounts: Vec<AccountSummary>,
        }

        let response: Response = self.post("identity/recovery", &Request { email }).await?;
        Ok(response.accounts)
    }

    async fn verify_ownership(
        &self,
        account_id: AccountId,
        password: &SecretString,
    ) -> Result<bool, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            account_id: AccountId,
            password: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            matches: bool,
        }

        let response: Response = self
            .post(
                "identity/recovery/password-check",
                &Request {
                    account_id,
                    password: password.expose_secret(),
                },
            )
            .await?;
        Ok(response.matches)
    }

    async fn verify_recovery_code(
        &self,
        email: &Email,
        account_id: AccountId,
        code: &VerificationCode,
    ) -> Result<bool, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            email: &'a Email,
            account_id: AccountId,
            code: &'a VerificationCode,
        }

        #[derive(Deserialize)]
        struct Response {
            valid: bool,
        }

        let response: Response = self
            .post(
                "identity/recovery/code-check",
                &Request {
                    email,
                    account_id,
                    code,
                },
            )
            .await?;
        Ok(response.valid)
    }

    async fn finalize_registration(
        &self,
        token: &SecretString,
        new_password: &SecretString,
        full_name: Option<&str>,
    ) -> Result<AccountSnapshot, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            password: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            full_name: Option<&'a str>,
        }

        #[derive(Deserialize)]
        struct Response {
            account: AccountSnapshot,
        }

        // The held token, not the service token, authorizes this call.
        let response: Response = self
            .execute(
                "identity/accounts/finalize",
                &Request {
                    password: new_password.expose_secret(),
                    full_name,
                },
                token,
            )
            .await?;
        Ok(response.account)
    }

    async fn reset_password(
        &self,
        email: &Email,
        account_id: AccountId,
        code: &VerificationCode,
        new_password: &SecretString,
    ) -> Result<ResetOutcome, IdentityError> {
        #[derive(Serialize)]
        struct Request<'a> {
            email: &'a Email,
            account_id: AccountId,
            code: &'a VerificationCode,
            password: &'a str,
        }

        #[derive(Deserialize)]
        struct Response {
            token: Option<String>,
            account: Option<AccountSnapshot>,
        }

        let response: Response = self
            .post(
                "identity/recovery/reset",
                &Request {
                    email,
                    account_id,
                    code,
                    password: new_password.expose_secret(),
                },
            )
            .await?;

        let session = match (response.token, response.account) {
            (Some(token), Some(account)) => Some(SignedIn {
                token: SecretString::from(token),
                account,
            }),
            _ => None,
        };

        Ok(ResetOutcome { session })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use url::Url;

    fn test_client() -> IdentityClient {
        let config = IdentityConfig::new(
            Url::parse("https://identity.example.com/api/").unwrap(),
            SecretString::from("service-token"),
        );
        IdentityClient::new(&config)
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = test_client();
        assert_eq!(
            client.endpoint("identity/accounts"),
            "https://identity.example.com/api/identity/accounts"
        );
    }

    #[test]
    fn test_decode_error_prefers_envelope_code() {
        // Status says conflict, envelope says expired code; envelope wins
        let err = decode_error(409, r#"{"code": "code_expired", "message": "gone"}"#);
        assert!(matches!(err, IdentityError::CodeExpired));
    }

    #[test]
    fn test_decode_error_envelope_codes() {
        assert!(matches!(
            decode_error(422, r#"{"code": "username_taken", "message": "taken"}"#),
            IdentityError::Conflict(_)
        ));
        assert!(matches!(
            decode_error(401, r#"{"code": "invalid_credentials"}"#),
            IdentityError::InvalidCredentials
        ));
        assert!(matches!(
            decode_error(422, r#"{"code": "code_invalid"}"#),
            IdentityError::CodeRejected
        ));
        assert!(matches!(
            decode_error(401, r#"{"code": "token_spent"}"#),
            IdentityError::TokenRejected
        ));
    }

    #[test]
    fn test_decode_error_falls_back_to_status() {
        assert!(matches!(
            decode_error(409, "not json"),
            IdentityError::Conflict(_)
        ));
        assert!(matches!(
            decode_error(401, ""),
            IdentityError::InvalidCredentials
        ));
        assert!(matches!(
            decode_error(503, r#"{"message": "maintenance"}"#),
            IdentityError::Api {
                status: 503,
                ..
            }
        ));
    }
}
