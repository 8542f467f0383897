//! Error classification for API failures.
//!
//! Every failed request ends up as an [`AppError`]: a kind, a user-facing
//! message, a severity and a retry hint. [`classify`] is the only place that
//! decides which failures are worth another attempt.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Broad category of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Authentication,
    Authorization,
    Validation,
    Server,
    NotFound,
    Timeout,
    Unknown,
}

impl ErrorKind {
    /// Message used when nothing more specific is known.
    pub fn default_message(self) -> &'static str {
        match self {
            ErrorKind::Network => "Network error. Please check your internet connection.",
            ErrorKind::Authentication => "Authentication error. Please sign in again.",
            ErrorKind::Authorization => "You do not have permission to perform this action.",
            ErrorKind::Validation => "Invalid input. Please check your data and try again.",
            ErrorKind::Server => "Server error. Our team has been notified.",
            ErrorKind::NotFound => "The requested resource was not found.",
            ErrorKind::Timeout => "Request timed out. Please try again.",
            ErrorKind::Unknown => "An unexpected error occurred. Please try again.",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Authorization => "authorization",
            ErrorKind::Validation => "validation",
            ErrorKind::Server => "server",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How loudly a failure should be surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    pub severity: Severity,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl AppError {
    /// Creates an error with the kind's default message, `Error` severity
    /// and no retry hint.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            severity: Severity::Error,
            retryable: false,
            code: None,
            data: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        if !message.is_empty() {
            self.message = message;
        }
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The error raised when an authenticated request has no usable token.
    pub fn authentication_required() -> Self {
        AppError::new(ErrorKind::Authentication)
            .with_message("Authentication required")
            .with_severity(Severity::Warning)
            .with_code("AUTH_REQUIRED")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for AppError {}

/// A raw failure, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The request never produced a response (connect, DNS, reset, ...).
    Network(String),
    /// The request deadline passed before a response arrived.
    Timeout,
    /// The server answered with a non-success status.
    Status { status: u16, body: Value },
    /// A success response whose body could not be decoded.
    Decode(String),
    Other(String),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Network(msg) => write!(f, "network failure: {}", msg),
            Failure::Timeout => write!(f, "request timed out"),
            Failure::Status { status, .. } => write!(f, "request failed with status {}", status),
            Failure::Decode(msg) => write!(f, "failed to decode response: {}", msg),
            Failure::Other(msg) => f.write_str(msg),
        }
    }
}

/// Maps a raw failure to an [`AppError`]. First matching rule wins.
pub fn classify(failure: &Failure) -> AppError {
    match failure {
        Failure::Network(_) => AppError::new(ErrorKind::Network)
            .with_severity(Severity::Warning)
            .with_code("NETWORK_ERROR")
            .with_retryable(true),
        Failure::Timeout => AppError::new(ErrorKind::Timeout)
            .with_severity(Severity::Warning)
            .with_code("TIMEOUT_ERROR")
            .with_retryable(true),
        Failure::Status { status, body } => classify_status(*status, body),
        Failure::Decode(msg) | Failure::Other(msg) => unknown(msg),
    }
}

fn classify_status(status: u16, body: &Value) -> AppError {
    let upstream = body.get("message").and_then(Value::as_str);
    let (kind, fallback, severity, code, retryable) = match status {
        401 => (
            ErrorKind::Authentication,
            "Your session has expired. Please sign in again.",
            Severity::Warning,
            "UNAUTHORIZED".to_string(),
            false,
        ),
        403 => (
            ErrorKind::Authorization,
            "You do not have permission to perform this action.",
            Severity::Warning,
            "FORBIDDEN".to_string(),
            false,
        ),
        // Resending the same payload cannot fix it; callers can opt out
        // through `ApiConfig::retry_validation`.
        400 | 422 => (
            ErrorKind::Validation,
            "Please check your input and try again.",
            Severity::Warning,
            "VALIDATION_ERROR".to_string(),
            true,
        ),
        404 => (
            ErrorKind::NotFound,
            "The requested resource was not found.",
            Severity::Warning,
            "NOT_FOUND".to_string(),
            false,
        ),
        s if s >= 500 => (
            ErrorKind::Server,
            "Something went wrong on our end. Please try again later.",
            Severity::Error,
            format!("SERVER_ERROR_{}", s),
            s < 503,
        ),
        s => {
            let message = upstream
                .map(str::to_string)
                .unwrap_or_else(|| format!("Request failed with status {}", s));
            return unknown(&message);
        }
    };

    AppError::new(kind)
        .with_message(upstream.unwrap_or(fallback))
        .with_severity(severity)
        .with_code(code)
        .with_retryable(retryable)
        .with_data(body.clone())
}

fn unknown(message: &str) -> AppError {
    let message = if message.is_empty() {
        "An unexpected error occurred."
    } else {
        message
    };
    AppError::new(ErrorKind::Unknown)
        .with_message(message)
        .with_code("UNKNOWN_ERROR")
        .with_retryable(true)
}
