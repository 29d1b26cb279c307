//! Error handling for key checking operations.
//!
//! This module defines the error type shared by the remote clients, the
//! configuration layer and the key/report file helpers. A key that simply does
//! not exist is *not* an error: it is reported through `CheckOutcome::Missing`.

use std::fmt;
use std::time::Duration;

/// Main error type for key checking operations.
#[derive(Debug, Clone)]
pub enum KeyCheckError {
    /// Network-related errors (connection refused, DNS, reset, etc.)
    NetworkError {
        message: String,
        source: Option<String>,
    },

    /// The object store answered with an unexpected HTTP status
    StorageError {
        bucket: String,
        message: String,
        status_code: Option<u16>,
    },

    /// The listing response could not be interpreted
    ParseError {
        message: String,
        content: Option<String>,
    },

    /// Configuration errors (invalid settings, etc.)
    ConfigError { message: String },

    /// File I/O errors when reading key lists or writing reports
    FileError { path: String, message: String },

    /// Timeout errors when a remote call takes too long
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Rate limiting errors when the store throttles requests
    RateLimited {
        service: String,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Generic internal errors that don't fit other categories
    Internal { message: String },
}

impl KeyCheckError {
    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new network error with source information.
    pub fn network_with_source<M: Into<String>, S: Into<String>>(message: M, source: S) -> Self {
        Self::NetworkError {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new storage error with HTTP status code.
    pub fn storage_with_status<B: Into<String>, M: Into<String>>(
        bucket: B,
        message: M,
        status_code: u16,
    ) -> Self {
        Self::StorageError {
            bucket: bucket.into(),
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a new parse error for a response body that does not match the
    /// expected listing shape.
    pub fn parse<M: Into<String>>(message: M) -> Self {
        Self::ParseError {
            message: message.into(),
            content: None,
        }
    }

    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<O: Into<String>>(operation: O, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Check if this error suggests the operation should be retried.
    ///
    /// Authorization failures, malformed responses and configuration problems
    /// will not get better on a second attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::StorageError {
                    status_code: Some(500..=599),
                    ..
                }
        )
    }
}

impl fmt::Display for KeyCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NetworkError { message, source } => {
                if let Some(source) = source {
                    write!(f, "Network error: {} (source: {})", message, source)
                } else {
                    write!(f, "Network error: {}", message)
                }
            }
            Self::StorageError {
                bucket,
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(
                        f,
                        "Storage error for bucket '{}' (HTTP {}): {}",
                        bucket, code, message
                    )
                } else {
                    write!(f, "Storage error for bucket '{}': {}", bucket, message)
                }
            }
            Self::ParseError { message, content: _ } => {
                write!(f, "Parse error: {}", message)
            }
            Self::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            Self::FileError { path, message } => {
                write!(f, "File error at '{}': {}", path, message)
            }
            Self::Timeout {
                operation,
                duration,
            } => {
                write!(f, "Timeout after {:?} during: {}", duration, operation)
            }
            Self::RateLimited {
                service,
                message,
                retry_after,
            } => {
                if let Some(retry) = retry_after {
                    write!(
                        f,
                        "Rate limited by {} (retry after {:?}): {}",
                        service, retry, message
                    )
                } else {
                    write!(f, "Rate limited by {}: {}", service, message)
                }
            }
            Self::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for KeyCheckError {}

#[cfg(feature = "s3")]
impl From<reqwest::Error> for KeyCheckError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // The client-level deadline differs from the per-check timeout.
            Self::network_with_source("HTTP request timed out", err.to_string())
        } else if err.is_connect() {
            Self::network_with_source("Connection failed", err.to_string())
        } else {
            Self::network_with_source("HTTP request failed", err.to_string())
        }
    }
}

#[cfg(feature = "s3")]
impl From<quick_xml::DeError> for KeyCheckError {
    fn from(err: quick_xml::DeError) -> Self {
        Self::ParseError {
            message: format!("XML parsing failed: {}", err),
            content: None,
        }
    }
}

impl From<std::io::Error> for KeyCheckError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}
