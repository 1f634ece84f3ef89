//! Student entity and lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StudentId;

/// Lifecycle status of a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentStatus {
    /// Enrolled and participating; counted in rankings.
    Active,
    /// Removed from active rosters; excluded from rankings until restored.
    Archived,
}

/// A student enrolled in the tutoring program.
///
/// Archiving and restoring are owned by the student-management collaborator;
/// the engine consumes the transitions as inputs and, on restore, resolves
/// absence-related warnings and resets consecutivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Unique identifier (immutable after registration).
    pub id: StudentId,
    /// Display name, used as the final ranking tie-breaker.
    pub name: String,
    /// Lifecycle status.
    pub status: StudentStatus,
    /// Registration timestamp (immutable; ranking tie-breaker).
    pub registered_at: DateTime<Utc>,
}

impl Student {
    /// Creates a new active student registered now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: StudentId::new(),
            name: name.into(),
            status: StudentStatus::Active,
            registered_at: Utc::now(),
        }
    }

    /// Returns `true` while the student is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, StudentStatus::Active)
    }
}
