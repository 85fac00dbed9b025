//! Service-level error types for the gateway pipeline.
//!
//! These errors are internal to the pipeline and are converted to protocol
//! [`ErrorCode`]s at the single point where the daemon builds an HTTP
//! response. Two variants never reach that point: `Timeout` is consumed by
//! the dispatcher's fallback chain, and `CacheFault` is swallowed after
//! being counted.

use searchgate_protocol::ErrorCode;
use thiserror::Error;

/// Internal gateway errors.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Required tenant header absent on a search path.
    #[error("tenant header missing")]
    MissingTenant,

    /// Bearer token present but not decodable.
    #[error("invalid bearer token: {message}")]
    Unauthorized { message: String },

    /// Authorization rejected the request.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// Body failed validation at the edge.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// Non-timeout failure from an engine adapter.
    #[error("engine '{engine}' error: {message}")]
    Engine { engine: String, message: String },

    /// An engine call exceeded its budget. Never surfaces to clients;
    /// the dispatcher turns it into a fallback result.
    #[error("deadline exceeded after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// A cache tier misbehaved. Never user-visible.
    #[error("cache fault: {message}")]
    CacheFault { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// Shorthand for a bad-request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        GatewayError::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for an engine error.
    pub fn engine(engine: impl Into<String>, message: impl Into<String>) -> Self {
        GatewayError::Engine {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a cache fault.
    pub fn cache_fault(message: impl Into<String>) -> Self {
        GatewayError::CacheFault {
            message: message.into(),
        }
    }

    /// Convert to the protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            GatewayError::MissingTenant => ErrorCode::MissingTenantId,
            GatewayError::Unauthorized { .. } => ErrorCode::Unauthorized,
            GatewayError::Forbidden { .. } => ErrorCode::Forbidden,
            GatewayError::BadRequest { .. } => ErrorCode::BadRequest,
            GatewayError::Engine { .. } => ErrorCode::EngineError,
            // Internal-only variants; mapped defensively if they ever leak.
            GatewayError::Timeout { .. }
            | GatewayError::CacheFault { .. }
            | GatewayError::Internal { .. } => ErrorCode::Internal,
        }
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            GatewayError::MissingTenant.error_code(),
            ErrorCode::MissingTenantId
        );
        assert_eq!(
            GatewayError::bad_request("x").error_code(),
            ErrorCode::BadRequest
        );
        assert_eq!(
            GatewayError::engine("simple", "boom").error_code(),
            ErrorCode::EngineError
        );
        assert_eq!(
            GatewayError::Timeout { elapsed_ms: 700 }.error_code(),
            ErrorCode::Internal
        );
    }

    #[test]
    fn test_display_carries_engine_name() {
        let err = GatewayError::engine("complex", "mapping missing");
        assert!(err.to_string().contains("complex"));
    }
}
