//! Warning records and their lifecycle.
//!
//! A warning moves `none → active → resolved` and resolution is terminal.
//! Multiple warnings of the same kind may coexist historically; only active
//! ones count as current.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{StudentId, WarningId};

/// Kind of a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Two consecutive absences.
    ConsecutiveAbsence,
    /// Three consecutive absences; prompts manual archival.
    Archived,
    /// Behavioral rule fired (same-kind run or monthly count).
    Behavioral,
}

impl WarningKind {
    /// Stable string label for logs and notification text.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::ConsecutiveAbsence => "consecutive_absence",
            Self::Archived => "archived",
            Self::Behavioral => "behavioral",
        }
    }
}

/// A warning raised against a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    /// Warning identifier.
    pub id: WarningId,
    /// Student the warning concerns.
    pub student_id: StudentId,
    /// Warning kind.
    pub kind: WarningKind,
    /// Why the warning was raised.
    pub reason: String,
    /// `true` until resolved; resolution is terminal.
    pub active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Resolution timestamp, set exactly once.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Why the warning was resolved.
    pub resolution_reason: Option<String>,
}

impl Warning {
    /// Creates a new active warning.
    #[must_use]
    pub fn new(student_id: StudentId, kind: WarningKind, reason: impl Into<String>) -> Self {
        Self {
            id: WarningId::new(),
            student_id,
            kind,
            reason: reason.into(),
            active: true,
            created_at: Utc::now(),
            resolved_at: None,
            resolution_reason: None,
        }
    }

    /// Marks the warning resolved. Returns `false` (and changes nothing)
    /// if it was already resolved — resolution is idempotent.
    pub fn resolve(&mut self, reason: impl Into<String>) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.resolved_at = Some(Utc::now());
        self.resolution_reason = Some(reason.into());
        true
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_warning_is_active() {
        let warning = Warning::new(
            StudentId::new(),
            WarningKind::ConsecutiveAbsence,
            "2 consecutive absences",
        );
        assert!(warning.active);
        assert!(warning.resolved_at.is_none());
    }

    #[test]
    fn resolve_is_terminal_and_idempotent() {
        let mut warning = Warning::new(StudentId::new(), WarningKind::Archived, "3 absences");
        assert!(warning.resolve("student restored"));
        let first_resolved_at = warning.resolved_at;

        // Second resolve is a no-op.
        assert!(!warning.resolve("again"));
        assert_eq!(warning.resolved_at, first_resolved_at);
        assert_eq!(
            warning.resolution_reason.as_deref(),
            Some("student restored")
        );
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(WarningKind::Behavioral.label(), "behavioral");
        assert_eq!(
            WarningKind::ConsecutiveAbsence.label(),
            "consecutive_absence"
        );
    }
}
