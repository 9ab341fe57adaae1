//! Verification code records, purposes, and validation outcomes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::clock::current_timestamp_rfc3339;

/// Number of digits in an issued code.
pub const CODE_LENGTH: usize = 6;

/// Purpose a code was issued for. Codes are scoped per `(email, code_type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeType {
    /// Account registration.
    Register,
    /// Passwordless login.
    Login,
    /// Password reset.
    ResetPassword,
    /// Email address change.
    ChangeEmail,
}

impl CodeType {
    /// Wire name used in cache keys and mail payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::ResetPassword => "reset_password",
            Self::ChangeEmail => "change_email",
        }
    }

    /// Mail subject line for this purpose.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Register => "Your registration code",
            Self::Login => "Your login code",
            Self::ResetPassword => "Your password reset code",
            Self::ChangeEmail => "Confirm your new email address",
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when parsing an unknown code type.
#[derive(Debug, Error)]
#[error("Unknown code type: {0}")]
pub struct UnknownCodeType(pub String);

impl FromStr for CodeType {
    type Err = UnknownCodeType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "register" => Ok(Self::Register),
            "login" => Ok(Self::Login),
            "reset_password" => Ok(Self::ResetPassword),
            "change_email" => Ok(Self::ChangeEmail),
            other => Err(UnknownCodeType(other.to_string())),
        }
    }
}

/// Lifetimes applied when issuing codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerificationSettings {
    /// How long an issued code stays valid.
    pub code_ttl: Duration,
    /// Window during which repeat requests for the same key are rejected.
    pub rate_limit_window: Duration,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            code_ttl: Duration::from_secs(300),
            rate_limit_window: Duration::from_secs(60),
        }
    }
}

/// Cached code record, stored as JSON under [`code_key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    /// Six-digit code.
    pub code: String,
    /// Recipient address.
    pub email: String,
    /// Purpose the code was issued for.
    pub code_type: CodeType,
    /// RFC 3339 issue timestamp.
    pub created_at: String,
    /// Flips to `true` exactly once, on successful validation.
    pub is_used: bool,
}

impl VerificationCode {
    /// Fresh, unused record issued now.
    pub fn issue(email: &str, code_type: CodeType, code: String) -> Self {
        Self {
            code,
            email: email.to_string(),
            code_type,
            created_at: current_timestamp_rfc3339(),
            is_used: false,
        }
    }

    /// Outcome of presenting `input` against this record, without mutating it.
    pub fn check(&self, input: &str) -> ValidationOutcome {
        if self.is_used {
            ValidationOutcome::AlreadyUsed
        } else if self.code != input {
            ValidationOutcome::IncorrectCode
        } else {
            ValidationOutcome::Success
        }
    }
}

/// Result of validating a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationOutcome {
    /// Code matched and is now consumed.
    Success,
    /// No record exists for the key, or it expired.
    InvalidOrExpired,
    /// The record was already consumed.
    AlreadyUsed,
    /// The record exists but the code differs.
    IncorrectCode,
    /// The cache could not be reached.
    Unavailable,
}

impl ValidationOutcome {
    /// Message handed back to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::InvalidOrExpired => "invalid or expired",
            Self::AlreadyUsed => "already used",
            Self::IncorrectCode => "incorrect code",
            Self::Unavailable => "verification service unavailable",
        }
    }

    /// Whether the code was accepted.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// `(accepted, message)` pair.
    pub fn as_pair(&self) -> (bool, &'static str) {
        (self.is_success(), self.message())
    }

    /// Map a `(status, message)` script reply back to an outcome.
    pub fn from_reply(status: i64, message: &str) -> Option<Self> {
        let outcome = match message {
            "success" => Self::Success,
            "invalid or expired" => Self::InvalidOrExpired,
            "already used" => Self::AlreadyUsed,
            "incorrect code" => Self::IncorrectCode,
            _ => return None,
        };
        (outcome.is_success() == (status == 1)).then_some(outcome)
    }
}

impl fmt::Display for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Rate-limit key for `(email, code_type)`.
pub fn limit_key(email: &str, code_type: CodeType) -> String {
    format!("limit:{email}:{code_type}")
}

/// Record key for `(email, code_type)`.
pub fn code_key(email: &str, code_type: CodeType) -> String {
    format!("code:{email}:{code_type}")
}

/// Six uniformly random decimal digits.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(b'0' + rng.gen_range(0..10_u8)))
        .collect()
}
