//! Core error type.
//!
//! Every fallible operation in the catalog core returns [`Error`]. The
//! variants mirror the error kinds in the specification: validation,
//! not-found, conflict, parse, transient-store, plugin, permission and
//! fatal. Callers at the boundary (REST handlers, the MCP wrapper, …) are
//! expected to map these onto their own status codes; this crate never
//! does that mapping itself.

use std::fmt;

use crate::query::ParseError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request or config violates a declared constraint. Not retried.
    #[error("validation failed on field '{field}': {reason}")]
    Validation { field: String, reason: String },

    /// Named entity absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Uniqueness violation (MRN, rule target, membership, lineage edge).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Query language parse failure.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Database unavailable or contention; safe to retry.
    #[error("transient store error: {0}")]
    TransientStore(String),

    /// Upstream discovery failure, with the offending plugin id attached.
    #[error("plugin '{plugin_id}' failed: {message}")]
    Plugin { plugin_id: String, message: String },

    /// Capability check failed upstream. The core does not enforce
    /// authorization itself; it only propagates this when an upstream
    /// caller has already attached the denial.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Encryption misconfiguration, schema migration mismatch, or any
    /// other condition the process cannot safely continue past.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl Error {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn plugin(plugin_id: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Plugin {
            plugin_id: plugin_id.into(),
            message: message.into(),
        }
    }

    /// True if retrying the same operation might succeed without any
    /// other change in the world.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientStore(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                // Postgres SQLSTATE 23505 = unique_violation
                if db_err.code().as_deref() == Some("23505") {
                    return Error::Conflict(db_err.message().to_string());
                }
                Error::TransientStore(err.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::TransientStore(err.to_string())
            }
            sqlx::Error::RowNotFound => Error::NotFound {
                entity: "row",
                id: "<unknown>".to_string(),
            },
            _ => Error::TransientStore(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation {
            field: "json".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Lightweight wrapper so `Display` of a position-carrying error reads
/// `byte 12: unexpected token`, used by [`Error::Parse`]'s `#[error]`
/// attribute above without duplicating `ParseError`'s own `Display`.
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {})", self.message, self.position)
    }
}

impl std::error::Error for ParseError {}
