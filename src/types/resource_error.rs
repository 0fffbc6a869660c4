//! Structured, user-facing backend errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a backend failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Forbidden,
    Unauthorized,
    NotFound,
    Timeout,
    Conflict,
    ConnectionError,
    CertificateError,
    /// No classification rule matched
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::CertificateError => "CERTIFICATE_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            ErrorCode::Forbidden => "Access denied",
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::Timeout => "Request timed out",
            ErrorCode::Conflict => "Resource conflict",
            ErrorCode::ConnectionError => "Connection failed",
            ErrorCode::CertificateError => "Certificate error",
            ErrorCode::Internal => "Unexpected error",
        }
    }

    fn suggestions(&self) -> &'static [&'static str] {
        match self {
            ErrorCode::Forbidden => &[
                "Check that your role grants access to this resource",
                "Ask an administrator to review your permissions",
            ],
            ErrorCode::Unauthorized => &[
                "Your credentials may have expired; refresh them and reconnect",
                "Verify the connection is using the expected identity",
            ],
            ErrorCode::NotFound => &[
                "The resource may have been deleted",
                "Check the namespace and resource name",
            ],
            ErrorCode::Timeout => &[
                "The backend may be overloaded; try again shortly",
                "Check network latency to the backend",
            ],
            ErrorCode::Conflict => &[
                "The resource was modified concurrently; reload and retry",
            ],
            ErrorCode::ConnectionError => &[
                "Check that the backend endpoint is reachable",
                "Verify VPN or proxy settings",
            ],
            ErrorCode::CertificateError => &[
                "Verify the certificate authority configured for this connection",
                "Check that the system clock is correct",
            ],
            ErrorCode::Internal => &[],
        }
    }
}

/// A classified backend error, serializable as a flat JSON object for display
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[error("{title}: {message}")]
pub struct ResourceError {
    pub code: ErrorCode,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ResourceError {
    /// Build an error with the default title and suggestions for `code`
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            title: code.title().to_string(),
            message: message.into(),
            suggestions: code.suggestions().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Classify a backend failure from an optional HTTP-like status code and
    /// its message. Status codes win over message patterns.
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let code = status
            .and_then(code_from_status)
            .unwrap_or_else(|| code_from_message(&message));
        Self::new(code, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

fn code_from_status(status: u16) -> Option<ErrorCode> {
    match status {
        401 => Some(ErrorCode::Unauthorized),
        403 => Some(ErrorCode::Forbidden),
        404 => Some(ErrorCode::NotFound),
        408 | 504 => Some(ErrorCode::Timeout),
        409 => Some(ErrorCode::Conflict),
        _ => None,
    }
}

fn code_from_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    let has = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

    // Certificate failures often also mention the connection, so check them first
    if has(&["x509", "certificate", "tls handshake"]) {
        ErrorCode::CertificateError
    } else if has(&["unauthorized", "unauthenticated", "invalid token", "token has expired"]) {
        ErrorCode::Unauthorized
    } else if has(&["forbidden", "access denied", "permission denied"]) {
        ErrorCode::Forbidden
    } else if has(&["not found", "does not exist", "no such resource"]) {
        ErrorCode::NotFound
    } else if has(&["timeout", "timed out", "deadline exceeded"]) {
        ErrorCode::Timeout
    } else if has(&["conflict", "already exists", "the object has been modified"]) {
        ErrorCode::Conflict
    } else if has(&[
        "connection refused",
        "connection reset",
        "no such host",
        "dial tcp",
        "network is unreachable",
        "dns error",
    ]) {
        ErrorCode::ConnectionError
    } else {
        ErrorCode::Internal
    }
}
