//! Engine error types with numeric classification.
//!
//! [`EngineError`] is the central error type for the cascade engine. Each
//! variant carries a numeric code used by callers (activity log, request
//! failure records) to classify failures without string matching.

use crate::domain::ids::{RequestId, StudentId, TargetId, WarningId};
use crate::domain::update_request::{EntityKind, RequestStatus};

/// Central error enum for the cascade engine.
///
/// # Error Code Ranges
///
/// | Range     | Category               |
/// |-----------|------------------------|
/// | 1000–1999 | Validation             |
/// | 2000–2999 | Not found              |
/// | 3000–3999 | Storage / internal     |
/// | 4000–4999 | Conflict / state       |
/// | 5000–5999 | Authorization          |
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Request or input failed validation before any mutation.
    #[error("invalid input: {0}")]
    Validation(String),

    /// An update-request payload did not parse for its declared kind.
    #[error("malformed {kind} payload: {detail}")]
    MalformedPayload {
        /// Request kind the payload was declared as.
        kind: String,
        /// What failed to parse.
        detail: String,
    },

    /// A points value exceeded the configured upper bound.
    #[error("points value {value} exceeds upper bound {max}")]
    PointsOutOfRange {
        /// Offending value.
        value: i64,
        /// Configured maximum.
        max: i64,
    },

    /// Student with the given ID was not found.
    #[error("student not found: {0}")]
    StudentNotFound(StudentId),

    /// Warning with the given ID was not found.
    #[error("warning not found: {0}")]
    WarningNotFound(WarningId),

    /// Target with the given ID was not found.
    #[error("target not found: {0}")]
    TargetNotFound(TargetId),

    /// Update request with the given ID was not found.
    #[error("update request not found: {0}")]
    RequestNotFound(RequestId),

    /// Entity targeted by an update request was not found.
    #[error("{kind} entity not found: {id}")]
    EntityNotFound {
        /// Entity kind the request targeted.
        kind: EntityKind,
        /// Identifier that failed to resolve.
        id: uuid::Uuid,
    },

    /// Storage layer failure, distinct from domain validation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),

    /// A PENDING request already exists for the target entity.
    #[error("a pending request already exists for {kind} {id}")]
    DuplicatePending {
        /// Entity kind of the conflicting request.
        kind: EntityKind,
        /// Entity ID of the conflicting request.
        id: uuid::Uuid,
    },

    /// The requested status transition is not allowed by the state machine.
    #[error("cannot {action} a request in status {from:?}")]
    InvalidTransition {
        /// Current request status.
        from: RequestStatus,
        /// Attempted action, e.g. `"approve"`.
        action: &'static str,
    },

    /// The acting user lacks the privilege the operation requires.
    #[error("actor {actor} is not privileged to {action}")]
    Unauthorized {
        /// Actor identifier as presented to the privilege port.
        actor: String,
        /// Attempted action.
        action: &'static str,
    },
}

impl EngineError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::MalformedPayload { .. } => 1002,
            Self::PointsOutOfRange { .. } => 1003,
            Self::StudentNotFound(_) => 2001,
            Self::WarningNotFound(_) => 2002,
            Self::TargetNotFound(_) => 2003,
            Self::RequestNotFound(_) => 2004,
            Self::EntityNotFound { .. } => 2005,
            Self::Internal(_) => 3000,
            Self::Storage(_) => 3001,
            Self::DuplicatePending { .. } => 4001,
            Self::InvalidTransition { .. } => 4002,
            Self::Unauthorized { .. } => 5001,
        }
    }

    /// Returns `true` for the validation class: failures reported to the
    /// caller verbatim, before any mutation, never retried automatically.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::MalformedPayload { .. }
                | Self::PointsOutOfRange { .. }
                | Self::DuplicatePending { .. }
        )
    }

    /// Returns `true` for storage-layer failures, which request execution
    /// records as FAILED and rolls back.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Internal(_))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_class_ranges() {
        let validation = EngineError::Validation("x".to_string());
        assert!((1000..2000).contains(&validation.error_code()));

        let not_found = EngineError::StudentNotFound(StudentId::new());
        assert!((2000..3000).contains(&not_found.error_code()));

        let storage = EngineError::Storage("db down".to_string());
        assert!((3000..4000).contains(&storage.error_code()));

        let conflict = EngineError::DuplicatePending {
            kind: EntityKind::Attendance,
            id: uuid::Uuid::new_v4(),
        };
        assert!((4000..5000).contains(&conflict.error_code()));
    }

    #[test]
    fn validation_class_covers_duplicate_pending() {
        let err = EngineError::DuplicatePending {
            kind: EntityKind::Homework,
            id: uuid::Uuid::new_v4(),
        };
        assert!(err.is_validation());
        assert!(!err.is_storage());
    }

    #[test]
    fn display_includes_detail() {
        let err = EngineError::MalformedPayload {
            kind: "attendance_status_change".to_string(),
            detail: "missing field `status`".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("attendance_status_change"));
        assert!(msg.contains("missing field"));
    }
}
