//! Consecutivity tracking records.
//!
//! One record exists per (student, dimension). The record is mutated
//! exclusively by the tracker service: incremented or reset as signals
//! arrive, never deleted, only zeroed on explicit full reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::facts::IncidentKind;
use super::ids::{LessonId, StudentId};

/// Dimension along which a consecutive run is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedDimension {
    /// Consecutive absences.
    Absence,
    /// Consecutive same-kind behavioral incidents.
    BehavioralIncident,
}

/// Running consecutive count for one (student, dimension).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsecutivityRecord {
    /// Student being tracked.
    pub student_id: StudentId,
    /// Tracked dimension.
    pub dimension: TrackedDimension,
    /// Current consecutive count, always >= 0.
    pub count: u32,
    /// Lesson associated with the most recent signal.
    pub last_lesson_id: Option<LessonId>,
    /// Kind of the most recent incident; only meaningful for the
    /// behavioral dimension, where a differently-kinded incident resets
    /// the run.
    pub last_incident_kind: Option<IncidentKind>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl ConsecutivityRecord {
    /// Creates a zeroed record for the given student and dimension.
    #[must_use]
    pub fn new(student_id: StudentId, dimension: TrackedDimension) -> Self {
        Self {
            student_id,
            dimension,
            count: 0,
            last_lesson_id: None,
            last_incident_kind: None,
            updated_at: Utc::now(),
        }
    }

    /// Resets the count to zero, clearing the associated signal context.
    pub fn reset(&mut self) {
        self.count = 0;
        self.last_lesson_id = None;
        self.last_incident_kind = None;
        self.updated_at = Utc::now();
    }
}
