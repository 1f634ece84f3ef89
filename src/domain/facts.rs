//! Primary-fact records: attendance, homework, quiz scores, behavioral
//! incidents.
//!
//! These are the inputs of the cascade. The engine owns their mutation only
//! through the primary entry points and the approval orchestrator; derived
//! state (consecutivity, warnings, points, targets) reacts to them.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{IncidentId, LessonId, QuizId, StudentId};

/// Presence status of a student in a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// Attended the lesson; breaks any absence streak.
    Present,
    /// Missed the lesson; extends the absence streak.
    Absent,
}

/// One attendance mark for (student, lesson).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Student the mark belongs to.
    pub student_id: StudentId,
    /// Lesson the mark belongs to.
    pub lesson_id: LessonId,
    /// Present or absent.
    pub status: AttendanceStatus,
    /// When the mark was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Creates a mark recorded now.
    #[must_use]
    pub fn new(student_id: StudentId, lesson_id: LessonId, status: AttendanceStatus) -> Self {
        Self {
            student_id,
            lesson_id,
            status,
            recorded_at: Utc::now(),
        }
    }
}

/// Completion status of one homework assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HomeworkStatus {
    /// Fully completed, worth 3 homework points.
    Done,
    /// Partially completed, worth 1 homework point.
    Partial,
    /// Not handed in, worth 0 homework points.
    NotDone,
}

impl HomeworkStatus {
    /// Homework points earned for this status.
    #[must_use]
    pub const fn points(self) -> i64 {
        match self {
            Self::Done => 3,
            Self::Partial => 1,
            Self::NotDone => 0,
        }
    }
}

/// One homework mark for (student, lesson).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HomeworkRecord {
    /// Student the mark belongs to.
    pub student_id: StudentId,
    /// Lesson the homework was assigned in.
    pub lesson_id: LessonId,
    /// Completion status.
    pub status: HomeworkStatus,
    /// When the mark was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl HomeworkRecord {
    /// Creates a mark recorded now.
    #[must_use]
    pub fn new(student_id: StudentId, lesson_id: LessonId, status: HomeworkStatus) -> Self {
        Self {
            student_id,
            lesson_id,
            status,
            recorded_at: Utc::now(),
        }
    }
}

/// Score earned by a student on a graded quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizScore {
    /// Student who took the quiz.
    pub student_id: StudentId,
    /// Quiz identifier.
    pub quiz_id: QuizId,
    /// Points earned.
    pub score: i64,
    /// Grading timestamp.
    pub graded_at: DateTime<Utc>,
}

impl QuizScore {
    /// Creates a score graded now.
    #[must_use]
    pub fn new(student_id: StudentId, quiz_id: QuizId, score: i64) -> Self {
        Self {
            student_id,
            quiz_id,
            score,
            graded_at: Utc::now(),
        }
    }
}

/// Kind of a behavioral incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Disruptive behavior during a lesson.
    Disruption,
    /// Disrespect toward staff or peers.
    Disrespect,
    /// Arrived late to a lesson.
    Lateness,
    /// Missing required materials.
    MissingMaterials,
}

impl IncidentKind {
    /// Human-readable label used in warning reasons and notifications.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disruption => "disruption",
            Self::Disrespect => "disrespect",
            Self::Lateness => "lateness",
            Self::MissingMaterials => "missing materials",
        }
    }
}

/// A recorded behavioral incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralIncident {
    /// Incident identifier.
    pub id: IncidentId,
    /// Student involved.
    pub student_id: StudentId,
    /// Lesson during which the incident occurred.
    pub lesson_id: LessonId,
    /// Incident kind; same-kind runs drive the behavioral dimension.
    pub kind: IncidentKind,
    /// Free-text description.
    pub note: String,
    /// When the incident was recorded.
    pub occurred_at: DateTime<Utc>,
}

impl BehavioralIncident {
    /// Creates an incident recorded now.
    #[must_use]
    pub fn new(
        student_id: StudentId,
        lesson_id: LessonId,
        kind: IncidentKind,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: IncidentId::new(),
            student_id,
            lesson_id,
            kind,
            note: note.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Calendar month key (year, month) used by the monthly incident rule.
    #[must_use]
    pub fn month_key(&self) -> (i32, u32) {
        (self.occurred_at.year(), self.occurred_at.month())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn homework_weights() {
        assert_eq!(HomeworkStatus::Done.points(), 3);
        assert_eq!(HomeworkStatus::Partial.points(), 1);
        assert_eq!(HomeworkStatus::NotDone.points(), 0);
    }

    #[test]
    fn incident_month_key_matches_timestamp() {
        let incident = BehavioralIncident::new(
            StudentId::new(),
            LessonId::new(),
            IncidentKind::Lateness,
            "arrived 20 minutes late",
        );
        let (year, month) = incident.month_key();
        assert_eq!(year, incident.occurred_at.year());
        assert_eq!(month, incident.occurred_at.month());
    }

    #[test]
    fn attendance_status_serializes_snake_case() {
        let json = serde_json::to_string(&AttendanceStatus::Present).ok();
        assert_eq!(json.as_deref(), Some("\"present\""));
    }
}
