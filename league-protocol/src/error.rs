//! The one error type and error-code enumeration shared by every service:
//! a single `thiserror`-derived enum, no stack traces leaving the process.

use serde::{Deserialize, Serialize};

/// Machine-readable error code carried on every `ERROR` envelope and
/// JSON-RPC error (spec §6/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    EnvelopeInvalid,
    AuthRequired,
    AuthInvalid,
    RegistrationClosed,
    DuplicateId,
    PreconditionFailed,
    NotAssigned,
    ResultConflict,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EnvelopeInvalid => "ENVELOPE_INVALID",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::AuthInvalid => "AUTH_INVALID",
            ErrorCode::RegistrationClosed => "REGISTRATION_CLOSED",
            ErrorCode::DuplicateId => "DUPLICATE_ID",
            ErrorCode::PreconditionFailed => "PRECONDITION_FAILED",
            ErrorCode::NotAssigned => "NOT_ASSIGNED",
            ErrorCode::ResultConflict => "RESULT_CONFLICT",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// League-level error, returned as a JSON-RPC success whose `result`
/// carries an `ERROR` envelope plus these fields (never a JSON-RPC
/// transport-level error, which is reserved for malformed requests —
/// see `jsonrpc::RpcErrorCode`).
#[derive(Debug, thiserror::Error)]
pub enum LeagueError {
    #[error("envelope invalid: {0}")]
    EnvelopeInvalid(String),

    #[error("auth token required")]
    AuthRequired,

    #[error("auth token invalid or expired")]
    AuthInvalid,

    #[error("registration window is closed")]
    RegistrationClosed,

    #[error("duplicate id: {0}")]
    DuplicateId(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("sender is not assigned to this match")]
    NotAssigned,

    #[error("result conflicts with a previously accepted report")]
    ResultConflict,

    #[error("operation timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl LeagueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LeagueError::EnvelopeInvalid(_) => ErrorCode::EnvelopeInvalid,
            LeagueError::AuthRequired => ErrorCode::AuthRequired,
            LeagueError::AuthInvalid => ErrorCode::AuthInvalid,
            LeagueError::RegistrationClosed => ErrorCode::RegistrationClosed,
            LeagueError::DuplicateId(_) => ErrorCode::DuplicateId,
            LeagueError::PreconditionFailed(_) => ErrorCode::PreconditionFailed,
            LeagueError::NotAssigned => ErrorCode::NotAssigned,
            LeagueError::ResultConflict => ErrorCode::ResultConflict,
            LeagueError::Timeout => ErrorCode::Timeout,
            LeagueError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Human-readable message safe to put on the wire (no internal detail
    /// leaks for `Internal`, matching spec §7 "no stack traces cross the wire").
    pub fn public_message(&self) -> String {
        match self {
            LeagueError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Structured body of an `ERROR` envelope payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&LeagueError> for ErrorPayload {
    fn from(err: &LeagueError) -> Self {
        ErrorPayload {
            error_code: err.code(),
            message: err.public_message(),
            detail: None,
            field: None,
            retry_after: None,
        }
    }
}
