use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::version::ApiVersion;

/// Kind of gateway operation a failed request belonged to.
///
/// Carried by [`Error::FailedOperation`] so callers can tell a rejected
/// create from a rejected delete without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Create,
    Update,
    Delete,
    Action,
    Login,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Action => "action",
            Self::Login => "login",
        })
    }
}

/// Details of a non-success gateway response.
///
/// Built once per failed call from the HTTP status and the gateway's
/// `{ "message": ..., "errorCode": ..., "httpStatusCode": ... }` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub message: Option<String>,
    pub code: Option<String>,
    pub path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GatewayErrorBody {
    message: Option<String>,
    error_code: Option<serde_json::Value>,
}

impl ApiError {
    /// Build the envelope from a raw response body.
    ///
    /// Non-JSON bodies are kept (truncated) as the message.
    pub fn from_body(status: u16, body: &str, path: &str) -> Self {
        let (message, code) = match serde_json::from_str::<GatewayErrorBody>(body) {
            Ok(parsed) => (
                parsed.message,
                parsed.error_code.map(|c| match c {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            ),
            Err(_) => {
                let trimmed = body.trim();
                let message = (!trimmed.is_empty())
                    .then(|| trimmed.chars().take(200).collect::<String>());
                (message, None)
            }
        };
        Self {
            status,
            message,
            code,
            path: path.to_owned(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} on {}", self.status, self.path)?;
        if let Some(ref message) = self.message {
            write!(f, ": {message}")?;
        }
        if let Some(ref code) = self.code {
            write!(f, " (code {code})")?;
        }
        Ok(())
    }
}

/// Top-level error type for the `powerflex-api` crate.
///
/// Every failure a caller can observe maps onto one of these variants;
/// nothing is retried or swallowed apart from the single token renewal
/// performed by the request pipeline.
#[derive(Debug, Error)]
pub enum Error {
    // ── Session ─────────────────────────────────────────────────────
    /// An operation was attempted before `initialize()` succeeded.
    #[error("PowerFlex client is not initialized -- call `initialize()` first")]
    NotInitialized,

    /// Login rejected, or a request was rejected again after renewal.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Unreachable gateway, TLS failure or timeout.
    #[error("Cannot reach gateway: {0}")]
    Connection(#[from] reqwest::Error),

    /// Local TLS setup failed (unreadable or invalid CA certificate).
    #[error("TLS error: {0}")]
    Tls(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Gateway ─────────────────────────────────────────────────────
    /// The connected gateway is too old for the requested operation.
    #[error("{operation} requires PowerFlex gateway {required} or newer (connected: {actual})")]
    UnsupportedGatewayVersion {
        operation: &'static str,
        required: ApiVersion,
        actual: ApiVersion,
    },

    /// The gateway has no entity at the requested path.
    #[error("Resource not found: {0}")]
    ResourceNotFound(ApiError),

    /// The gateway rejected the operation.
    #[error("Failed to {operation} PowerFlex resource: {error}")]
    FailedOperation { operation: Operation, error: ApiError },

    // ── Caller input ────────────────────────────────────────────────
    /// A caller-supplied parameter is structurally invalid.
    #[error("Invalid option: {message}")]
    InvalidOption { message: String },

    /// Required connection settings are missing.
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A success body was not the expected JSON, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    pub(crate) fn invalid_option(message: impl Into<String>) -> Self {
        Self::InvalidOption {
            message: message.into(),
        }
    }

    /// Returns `true` for login rejections and renewal failures.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the gateway could not be reached at all.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_))
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_))
    }

    /// The gateway's error envelope, when the failure came from a response.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::ResourceNotFound(error) | Self::FailedOperation { error, .. } => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_from_gateway_json() {
        let body = r#"{"message":"Could not find the volume","httpStatusCode":500,"errorCode":79}"#;
        let err = ApiError::from_body(500, body, "/instances/Volume::abc");
        assert_eq!(err.message.as_deref(), Some("Could not find the volume"));
        assert_eq!(err.code.as_deref(), Some("79"));
        assert_eq!(
            err.to_string(),
            "HTTP 500 on /instances/Volume::abc: Could not find the volume (code 79)"
        );
    }

    #[test]
    fn envelope_from_plain_text() {
        let err = ApiError::from_body(502, "  Bad Gateway \n", "/version");
        assert_eq!(err.message.as_deref(), Some("Bad Gateway"));
        assert_eq!(err.code, None);

        let empty = ApiError::from_body(500, "", "/version");
        assert_eq!(empty.message, None);
    }

    #[test]
    fn classification_helpers() {
        let not_found = Error::ResourceNotFound(ApiError::from_body(404, "", "/x"));
        assert!(not_found.is_not_found());
        assert_eq!(not_found.api_error().map(|e| e.status), Some(404));
        assert!(Error::Authentication { message: "no".into() }.is_auth_error());
        assert!(Error::Tls("bad pem".into()).is_connection_error());
        assert!(Error::NotInitialized.api_error().is_none());
    }
}
