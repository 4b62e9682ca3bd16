//! One-time verification code type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`VerificationCode`].
#[derive(thiserror::Error, Debug, Clone)]
pub enum CodeError {
    /// The input is not exactly the expected number of digits.
    #[error("verification code must be exactly {expected} digits")]
    WrongLength {
        /// Expected number of digits.
        expected: usize,
    },
    /// The input contains a non-digit character.
    #[error("verification code may only contain digits")]
    NotNumeric,
}

/// A short-lived, single-use numeric verification code.
///
/// Codes are issued by the Verification Code Service bound to an email and a
/// purpose; this type only enforces the surface shape (six ASCII digits) so a
/// malformed entry is rejected before any network call. Whether a
/// well-formed code is actually valid is the server's call.
///
/// ## Examples
///
/// ```
/// use golden_fig_core::VerificationCode;
///
/// assert!(VerificationCode::parse("123456").is_ok());
/// assert!(VerificationCode::parse("12345").is_err());   // too short
/// assert!(VerificationCode::parse("12345a").is_err());  // non-digit
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Number of digits in a verification code.
    pub const DIGITS: usize = 6;

    /// Parse a `VerificationCode` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly six ASCII digits.
    pub fn parse(s: &str) -> Result<Self, CodeError> {
        if !s.chars().all(|c| c.is_ascii_digit()) {
            return Err(CodeError::NotNumeric);
        }

        if s.len() != Self::DIGITS {
            return Err(CodeError::WrongLength {
                expected: Self::DIGITS,
            });
        }

        Ok(Self(s.to_owned()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for VerificationCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_code() {
        let code = VerificationCode::parse("123456").unwrap();
        assert_eq!(code.as_str(), "123456");
        // Leading zeros survive because the code is not a number
        let code = VerificationCode::parse("012345").unwrap();
        assert_eq!(code.as_str(), "012345");
    }

    #[test]
    fn test_parse_wrong_length() {
        assert!(matches!(
            VerificationCode::parse("12345"),
            Err(CodeError::WrongLength { expected: 6 })
        ));
        assert!(matches!(
            VerificationCode::parse("1234567"),
            Err(CodeError::WrongLength { .. })
        ));
        assert!(matches!(
            VerificationCode::parse(""),
            Err(CodeError::WrongLength { .. })
        ));
    }

    #[test]
    fn test_parse_not_numeric() {
        assert!(matches!(
            VerificationCode::parse("12345a"),
            Err(CodeError::NotNumeric)
        ));
        assert!(matches!(
            VerificationCode::parse("12 456"),
            Err(CodeError::NotNumeric)
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let code = VerificationCode::parse("654321").unwrap();
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, "\"654321\"");

        let parsed: VerificationCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, code);
    }
}
