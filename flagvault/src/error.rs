//! Error types for the flagvault library.
//!
//! This module provides the error hierarchy shared by every operation in the
//! library, using `thiserror` for ergonomic error handling. Each variant maps
//! onto one of the caller-facing classes exposed by [`ErrorKind`].

use thiserror::Error;

/// Result type alias for operations that may fail with a flagvault error.
///
/// # Examples
///
/// ```
/// use flagvault::{Error, Result};
///
/// fn example_operation() -> Result<u64> {
///     Ok(1)
/// }
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the flagvault library.
#[derive(Debug, Error)]
pub enum Error {
    /// The request was malformed, targeted something that no longer accepts
    /// the operation, or violated a project policy.
    #[error("bad request: {message}")]
    BadRequest {
        /// A description of what was wrong with the request.
        message: String,
    },

    /// The caller lacks the role required for the operation.
    #[error("forbidden: {message}")]
    Forbidden {
        /// A description of the missing permission.
        message: String,
    },

    /// The requested resource was not found.
    #[error("not found: {resource}")]
    NotFound {
        /// The resource that was not found.
        resource: String,
    },

    /// A compare-and-swap on a version counter failed.
    #[error("version conflict on {entity}: expected version {expected}, found {found}")]
    VersionConflict {
        /// The entity whose version did not match.
        entity: String,
        /// The version the caller last observed.
        expected: i64,
        /// The version currently stored.
        found: i64,
    },

    /// A validation error occurred.
    #[error("validation error for '{field}': {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// A description of the validation failure.
        message: String,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A configuration file could not be parsed.
    #[error("configuration error: {0}")]
    Configuration(#[from] serde_yaml::Error),

    /// A stored JSON document could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An unsupported schema version was encountered.
    #[error("unsupported schema version: expected {expected}, found {found}")]
    UnsupportedSchemaVersion {
        /// The expected schema version.
        expected: i32,
        /// The schema version found in the database.
        found: i32,
    },
}

/// Caller-facing classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, invalid state transition, version conflict or
    /// policy violation.
    BadRequest,
    /// Missing role or invisible resource.
    Forbidden,
    /// Missing resource.
    NotFound,
    /// Storage or encoding failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad_request"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::NotFound => write!(f, "not_found"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Creates a [`Error::BadRequest`] with the given message.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Creates a [`Error::Forbidden`] with the given message.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a [`Error::NotFound`] for the given resource description.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a [`Error::Validation`] for the given field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the caller-facing class of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagvault::{Error, ErrorKind};
    ///
    /// let err = Error::VersionConflict { entity: "variant".into(), expected: 1, found: 2 };
    /// assert_eq!(err.kind(), ErrorKind::BadRequest);
    /// ```
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest { .. } | Self::VersionConflict { .. } | Self::Validation { .. } => {
                ErrorKind::BadRequest
            }
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Database(_)
            | Self::Configuration(_)
            | Self::Json(_)
            | Self::Io(_)
            | Self::UnsupportedSchemaVersion { .. } => ErrorKind::Internal,
        }
    }

    /// Check if error is a failed compare-and-swap.
    #[must_use]
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    /// Check if error is permission-related.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Check if error indicates a missing resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
