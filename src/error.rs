//! Error handling for the CRM core
//!
//! This module provides idiomatic Rust error types using thiserror for
//! better error messages and proper error chain handling. Every error
//! carries a stable machine-checkable kind alongside its human message.

use thiserror::Error;
use uuid::Uuid;

use crate::authz::{Action, Resource};
use crate::database::deletion_planner::BlockedDeletion;

/// Main error type for the CRM core
#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{resource} {id} not found or already deleted")]
    NotFound { resource: Resource, id: Uuid },

    #[error("not authorized to {action} {resource}")]
    Authorization { resource: Resource, action: Action },

    #[error("validation failed: {details}")]
    Validation { details: String },

    #[error("cannot delete {} {}: {} active dependent(s) exist", .blocked.kind, .blocked.id, .blocked.total_dependents)]
    BlockedDelete { blocked: BlockedDeletion },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Stable, machine-checkable error discriminant surfaced to API layers.
///
/// Blocked deletions are classified as `Validation` rather than a hard
/// failure kind: they carry remediation data and are actionable by the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Authorization,
    Validation,
    Database,
}

impl CrmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CrmError::NotFound { .. } => ErrorKind::NotFound,
            CrmError::Authorization { .. } => ErrorKind::Authorization,
            CrmError::Validation { .. } | CrmError::BlockedDelete { .. } => {
                ErrorKind::Validation
            }
            CrmError::Database(_) | CrmError::Serialization(_) => ErrorKind::Database,
        }
    }

    /// Remediation payload for blocked deletions, if this error carries one.
    pub fn blocked(&self) -> Option<&BlockedDeletion> {
        match self {
            CrmError::BlockedDelete { blocked } => Some(blocked),
            _ => None,
        }
    }

    pub fn validation(details: impl Into<String>) -> Self {
        CrmError::Validation {
            details: details.into(),
        }
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, CrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let err = CrmError::NotFound {
            resource: Resource::Companies,
            id: Uuid::new_v4(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = CrmError::Authorization {
            resource: Resource::Leads,
            action: Action::Delete,
        };
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert!(err.to_string().contains("delete"));
        assert!(err.to_string().contains("leads"));

        let err = CrmError::validation("missing force parameter");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
