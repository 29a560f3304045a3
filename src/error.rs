//! Error types for `taskflow`.

use serde::{Deserialize, Serialize};

/// The kind of entity a lookup failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    /// A project (the scope that owns flows, statuses and tasks).
    Project,
    /// A flow graph.
    Flow,
    /// A status bucket (Kanban column).
    Status,
    /// A task node.
    Task,
    /// A dependency edge.
    Edge,
}

impl Entity {
    /// Get the string representation of the entity kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Flow => "flow",
            Self::Status => "status",
            Self::Task => "task",
            Self::Edge => "edge",
        }
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error classification exposed to callers.
///
/// Every [`Error`] maps onto exactly one kind. Storage and transport failures
/// all collapse onto [`ErrorKind::Internal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced flow, status, node, or edge does not exist or is out of scope.
    NotFound,
    /// Duplicate id on create.
    Conflict,
    /// Empty batch, malformed permutation, or non-membership in a bucket.
    InvalidArgument,
    /// The actor could not be identified.
    Unauthorized,
    /// The actor is known but may not touch the project.
    Forbidden,
    /// A batch was cancelled or ran past its deadline before commit.
    Cancelled,
    /// Storage or transport failure.
    Internal,
}

impl ErrorKind {
    /// Get the string representation of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidArgument => "invalid_argument",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the flow engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced entity does not exist or is outside the requested scope.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up.
        entity: Entity,
        /// The id that failed to resolve.
        id: String,
    },

    /// An entity with the same id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The request is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The actor is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The actor is not allowed to act on the project.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A batch was cancelled before commit.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON parsing error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML parsing error occurred.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A `SQLite` database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: Entity, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) | Self::Database(_) => ErrorKind::Internal,
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
