//! Error types for task-engine operations.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Unresolved date: cannot resolve '{phrase}'")]
    UnresolvedDate { phrase: String },

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl TaskError {
    pub fn unresolved(phrase: impl Into<String>) -> Self {
        TaskError::UnresolvedDate {
            phrase: phrase.into(),
        }
    }

    /// The machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::UnresolvedDate { .. } => ErrorKind::UnresolvedDate,
            TaskError::NotFound(_) => ErrorKind::NotFound,
            TaskError::Persistence(_) => ErrorKind::Persistence,
            TaskError::Validation(_) => ErrorKind::Validation,
        }
    }

    /// JSON-serializable form of this error for transport layers.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        }
    }
}

/// Error kinds for programmatic handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UnresolvedDate,
    NotFound,
    Persistence,
    Validation,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_carries_phrase() {
        let err = TaskError::unresolved("next blue moon");
        assert_eq!(err.kind(), ErrorKind::UnresolvedDate);
        assert!(err.to_string().contains("next blue moon"));
    }

    #[test]
    fn test_payload_shape() {
        let err = TaskError::NotFound("abc".to_string());
        let json = serde_json::to_value(err.payload()).unwrap();
        assert_eq!(json["error"]["kind"], "NOT_FOUND");
        assert_eq!(json["error"]["message"], "Task not found: abc");
    }
}
