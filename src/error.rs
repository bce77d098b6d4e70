//! Typed error taxonomy shared by every pipeline.
//!
//! Per-item failures inside fan-out operations (ingestion, memory storage)
//! are captured as [`RecordedError`] values and counted. Linear pipelines
//! return [`Error`] only when no degraded fallback exists.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Nothing indexed, or no stored document of the requested kind.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    /// Embedding, completion, loader, or vector-store failure.
    #[error("{service} error: {message}")]
    ExternalService {
        service: &'static str,
        message: String,
        retryable: bool,
    },

    /// Credential rejected by an upstream service. Never retried.
    #[error("{service} rejected credentials: {message}")]
    Unauthorized {
        service: &'static str,
        message: String,
    },

    #[error("{service} call timed out after {seconds}s")]
    Timeout { service: &'static str, seconds: u64 },

    /// The document generator exhausted its repair budget.
    #[error("document incomplete after repair attempts; missing sections: {}", format_sections(.missing))]
    IncompleteGeneration { missing: Vec<u32> },
}

impl Error {
    pub fn external(service: &'static str, message: impl Into<String>, retryable: bool) -> Self {
        Error::ExternalService {
            service,
            message: message.into(),
            retryable,
        }
    }

    /// Retry predicate: only transient upstream failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ExternalService {
                retryable: true,
                ..
            }
        )
    }

    /// Classify a non-success HTTP status from a model provider.
    pub fn from_status(service: &'static str, status: reqwest::StatusCode, body: String) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        match status.as_u16() {
            401 | 403 => Error::Unauthorized { service, message },
            429 => Error::external(service, message, true),
            s if s >= 500 => Error::external(service, message, true),
            _ => Error::external(service, message, false),
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(service: &'static str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                service,
                seconds: timeout_secs,
            }
        } else {
            Error::external(service, err.to_string(), true)
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::external("vector-store", err.to_string(), false)
    }
}

/// A failure captured inside a fan-out operation instead of propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedError {
    /// What failed: a file path or a memory item's content prefix.
    pub subject: String,
    pub message: String,
}

impl RecordedError {
    pub fn new(subject: impl Into<String>, err: &Error) -> Self {
        Self {
            subject: subject.into(),
            message: err.to_string(),
        }
    }
}

fn format_sections(missing: &[u32]) -> String {
    missing
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
