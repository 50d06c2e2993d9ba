use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::service::access::Denial;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error("security file '{0}' is missing and generation is disabled")]
    MissingSecurity(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialize(#[from] bson::ser::Error),
    #[error(transparent)]
    Deserialize(#[from] bson::de::Error),
    #[error("value of unique field '{0}' is already taken")]
    Duplicate(&'static str),
    #[error("injected storage fault on {0}")]
    Injected(&'static str),
    #[error("rollback failed after '{cause}': {reason}")]
    Rollback { cause: String, reason: String },
}

impl StorageError {
    /// Whether repeating the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        use mongodb::error::{ErrorKind, TRANSIENT_TRANSACTION_ERROR, UNKNOWN_TRANSACTION_COMMIT_RESULT};

        match self {
            StorageError::Database(e) => {
                e.contains_label(TRANSIENT_TRANSACTION_ERROR)
                    || e.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
                    || matches!(
                        e.kind.as_ref(),
                        ErrorKind::Io(_)
                            | ErrorKind::ConnectionPoolCleared { .. }
                            | ErrorKind::ServerSelection { .. }
                    )
            }
            StorageError::Injected(_) => true,
            _ => false,
        }
    }

    /// The commit may or may not have been applied by the server.
    pub fn commit_outcome_unknown(&self) -> bool {
        match self {
            StorageError::Database(e) => {
                e.contains_label(mongodb::error::UNKNOWN_TRANSACTION_COMMIT_RESULT)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResourceKind {
    User,
    Course,
    Lesson,
    Avatar,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::User => write!(f, "user"),
            ResourceKind::Course => write!(f, "course"),
            ResourceKind::Lesson => write!(f, "lesson"),
            ResourceKind::Avatar => write!(f, "avatar"),
        }
    }
}

/// Outcome of a rejected domain operation. None of these leave partial writes.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{kind} '{id}' doesn't exist")]
    NotFound { kind: ResourceKind, id: Uuid },
    #[error("user '{user}' is already enrolled in course '{course}'")]
    AlreadyEnrolled { user: Uuid, course: Uuid },
    #[error("user '{user}' is not enrolled in course '{course}'")]
    NotEnrolled { user: Uuid, course: Uuid },
    #[error("forbidden: {0}")]
    Forbidden(Denial),
    #[error("{0}")]
    Conflict(String),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ServiceError {
    pub fn not_found(kind: ResourceKind, id: Uuid) -> ServiceError {
        ServiceError::NotFound { kind, id }
    }

    pub fn invalid(field: &'static str, reason: impl ToString) -> ServiceError {
        ServiceError::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}
