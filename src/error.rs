//! Error taxonomy (component F), following the `thiserror`-enum-plus-status-
//! mapping convention used throughout the source project's own error types
//! (`AuthError`, `AppError`, `RoleError`, ...), adapted to the OAuth2 wire
//! contract (`{error, error_description, error_uri}`) rather than the
//! source's `{error, message, status_code}` admin-API shape.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// One of the ordinal error-code tokens from `SPEC_FULL.md` §6, or a
/// custom-extension code a `Provider` chose to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnauthorizedClient,
    UnsupportedGrantType,
    UnsupportedResponseType,
    InvalidScope,
    ServerError,
    TemporarilyUnavailable,
    Custom(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::ServerError => "server_error",
            ErrorCode::TemporarilyUnavailable => "temporarily_unavailable",
            ErrorCode::Custom(code) => code.as_str(),
        }
    }

    /// HTTP status this error code maps onto, per `SPEC_FULL.md` §6.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::InvalidClient => 401,
            ErrorCode::ServerError => 500,
            _ => 400,
        }
    }

    pub fn from_wire(code: &str) -> ErrorCode {
        match code {
            "invalid_request" => ErrorCode::InvalidRequest,
            "invalid_client" => ErrorCode::InvalidClient,
            "invalid_grant" => ErrorCode::InvalidGrant,
            "unauthorized_client" => ErrorCode::UnauthorizedClient,
            "unsupported_grant_type" => ErrorCode::UnsupportedGrantType,
            "unsupported_response_type" => ErrorCode::UnsupportedResponseType,
            "invalid_scope" => ErrorCode::InvalidScope,
            "server_error" => ErrorCode::ServerError,
            "temporarily_unavailable" => ErrorCode::TemporarilyUnavailable,
            other => ErrorCode::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The crate's unified error type. Every protocol-level rejection the driver
/// produces, and every internal fault (codec failure, an uncaught `Provider`
/// error) surfaced via [`OidcError::server`], is expressed as one of these.
#[derive(Debug, Error)]
#[error("{code}")]
pub struct OidcError {
    pub code: ErrorCode,
    pub description: Option<String>,
    pub uri: Option<String>,
    #[source]
    source: Option<anyhow::Error>,
}

impl OidcError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            description: None,
            uri: None,
            source: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Wraps an internal fault (a `Provider` callback failure, a codec
    /// signing error) as `server_error`, matching the source project's
    /// `InternalError(#[from] anyhow::Error)` convention.
    pub fn server(err: impl Into<anyhow::Error>) -> Self {
        Self {
            code: ErrorCode::ServerError,
            description: None,
            uri: None,
            source: Some(err.into()),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest).with_description(description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidClient).with_description(description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant).with_description(description)
    }

    /// Resolves a handler-supplied [`crate::extensions::ProtocolError`]
    /// against a fallback code for the extension point that produced it.
    pub fn from_protocol_error(
        error: crate::extensions::ProtocolError,
        default_code: ErrorCode,
    ) -> Self {
        let (code, description, uri) = error.resolve(default_code.as_str());
        Self {
            code: ErrorCode::from_wire(&code),
            description,
            uri,
            source: None,
        }
    }
}

impl From<anyhow::Error> for OidcError {
    fn from(err: anyhow::Error) -> Self {
        OidcError::server(err)
    }
}

/// The JSON body shape of an error response, per `SPEC_FULL.md` §6.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

impl From<&OidcError> for ErrorBody {
    fn from(err: &OidcError) -> Self {
        ErrorBody {
            error: err.code.as_str().to_string(),
            error_description: err.description.clone(),
            error_uri: err.uri.clone(),
        }
    }
}

#[cfg(feature = "http")]
mod http_adapter {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    impl IntoResponse for OidcError {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.code.status()).unwrap_or(StatusCode::BAD_REQUEST);
            let body = Json(ErrorBody::from(&self));
            (status, body).into_response()
        }
    }
}
