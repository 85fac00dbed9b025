//! Error envelope and error codes.

use serde::{Deserialize, Serialize};

/// JSON error body returned for failed requests.
///
/// The gateway returns this envelope for every non-200 outcome; the code is
/// machine-readable, the message human-readable. Deadline expiry is *not* an
/// error — it produces a 200 partial response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Machine-readable error code.
    pub code: ErrorCode,

    /// Human-readable error message.
    pub message: String,

    /// Additional context (offending field, engine detail).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorEnvelope {
    /// Create a new envelope.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Error codes for gateway operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Required tenant header absent on a search path.
    MissingTenantId,

    /// Bearer token present but malformed.
    Unauthorized,

    /// Authorization rejected the request for this tenant.
    Forbidden,

    /// Body failed schema validation, or an option is out of range, or a
    /// cursor is undecodable.
    BadRequest,

    /// Non-timeout failure from a backing engine.
    EngineError,

    /// The service is not ready to take traffic.
    NotReady,

    /// Internal server error.
    Internal,
}

impl ErrorCode {
    /// The HTTP status code for this error.
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::MissingTenantId => 400,
            ErrorCode::BadRequest => 400,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::EngineError => 500,
            ErrorCode::Internal => 500,
            ErrorCode::NotReady => 503,
        }
    }

    /// Whether requests failing with this code are typically retryable.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::EngineError | ErrorCode::Internal | ErrorCode::NotReady
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::MissingTenantId => "MISSING_TENANT_ID",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::EngineError => "ENGINE_ERROR",
            ErrorCode::NotReady => "NOT_READY",
            ErrorCode::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorEnvelope {}
