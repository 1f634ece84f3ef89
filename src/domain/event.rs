//! Domain events reflecting derived-state changes.
//!
//! Every mutation publishes a [`DomainEvent`] through the
//! [`super::EventBus`] outbox. Events are observational: no in-core logic
//! subscribes to them — the cascade is wired with explicit calls — but
//! notification planning, activity logging, and reporting consume them.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::consecutivity::TrackedDimension;
use super::ids::{LessonId, RequestId, StudentId, TargetId, WarningId};
use super::target::TargetCategory;
use super::update_request::RequestKind;
use super::warning::WarningKind;

/// Class of a consecutivity threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdClass {
    /// Count reached the warning boundary (2 consecutive absences, or a
    /// behavioral run of 2 or more).
    Warning,
    /// Count reached the archival boundary (3 consecutive absences).
    Archival,
}

/// One row of the rankings-changed payload.
#[derive(Debug, Clone, Serialize)]
pub struct RankingEntry {
    /// 1-based position.
    pub rank: usize,
    /// Student identifier.
    pub student_id: StudentId,
    /// Student display name.
    pub name: String,
    /// Total points at publication time.
    pub total_points: i64,
}

/// Domain event emitted after a state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// Unconditional hook: a consecutivity record was updated.
    ConsecutivityUpdated {
        /// Student being tracked.
        student_id: StudentId,
        /// Dimension that changed.
        dimension: TrackedDimension,
        /// New consecutive count.
        count: u32,
        /// Lesson that triggered the update.
        lesson_id: LessonId,
        /// Update timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A consecutivity count crossed a threshold boundary.
    ConsecutiveThresholdReached {
        /// Student being tracked.
        student_id: StudentId,
        /// Dimension that crossed.
        dimension: TrackedDimension,
        /// Count at crossing time.
        count: u32,
        /// Warning-class or archival-class crossing.
        class: ThresholdClass,
        /// Lesson that triggered the crossing.
        lesson_id: LessonId,
        /// Crossing timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A warning was created.
    WarningGenerated {
        /// Warning identifier.
        warning_id: WarningId,
        /// Student the warning concerns.
        student_id: StudentId,
        /// Warning kind.
        kind: WarningKind,
        /// Why the warning was raised.
        reason: String,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A warning was resolved.
    WarningResolved {
        /// Warning identifier.
        warning_id: WarningId,
        /// Student the warning concerns.
        student_id: StudentId,
        /// Warning kind.
        kind: WarningKind,
        /// Resolution reason.
        reason: String,
        /// Resolution timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A student's points record was recomputed.
    PointsUpdated {
        /// Student whose points changed.
        student_id: StudentId,
        /// Quiz sub-total.
        quiz_points: i64,
        /// Attendance sub-total.
        attendance_points: i64,
        /// Homework sub-total.
        homework_points: i64,
        /// Target (streak) sub-total.
        target_points: i64,
        /// Derived total.
        total_points: i64,
        /// Recompute timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The ranking order changed; carries the current leading entries.
    RankingsChanged {
        /// Leading entries, in rank order.
        top: Vec<RankingEntry>,
        /// Publication timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A remedial target was created after a performance drop.
    TargetCreated {
        /// Target identifier.
        target_id: TargetId,
        /// Student the target belongs to.
        student_id: StudentId,
        /// Performance domain.
        category: TargetCategory,
        /// PI value to recover to.
        threshold: i64,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A remedial target was achieved.
    TargetAchieved {
        /// Target identifier.
        target_id: TargetId,
        /// Student the target belongs to.
        student_id: StudentId,
        /// Performance domain.
        category: TargetCategory,
        /// PI value that was recovered.
        threshold: i64,
        /// Achievement timestamp.
        timestamp: DateTime<Utc>,
    },

    /// The achievement streak changed.
    StreakUpdated {
        /// Student the streak belongs to.
        student_id: StudentId,
        /// New streak value.
        streak: u32,
        /// Cumulative bonus points after the change.
        cumulative_points: i64,
        /// Update timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An update request was submitted.
    RequestSubmitted {
        /// Request identifier.
        request_id: RequestId,
        /// Requested mutation kind.
        kind: RequestKind,
        /// Student the request concerns.
        student_id: StudentId,
        /// Submitting actor.
        requester: String,
        /// Submission timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An update request was approved (execution may still fail).
    RequestApproved {
        /// Request identifier.
        request_id: RequestId,
        /// Approving actor.
        reviewer: String,
        /// Approval timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An update request was rejected.
    RequestRejected {
        /// Request identifier.
        request_id: RequestId,
        /// Rejecting actor.
        reviewer: String,
        /// Rejection reason.
        reason: String,
        /// Rejection timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An update request was administratively blocked.
    RequestBlocked {
        /// Request identifier.
        request_id: RequestId,
        /// Blocking actor.
        reviewer: String,
        /// Suspension reason.
        reason: String,
        /// Block timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An approved request's mutation and cascade both succeeded.
    RequestCompleted {
        /// Request identifier.
        request_id: RequestId,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// An approved request failed; the transaction was rolled back.
    RequestFailed {
        /// Request identifier.
        request_id: RequestId,
        /// Failure reason as recorded on the request.
        reason: String,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A student was archived.
    StudentArchived {
        /// Archived student.
        student_id: StudentId,
        /// Archival timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A student was restored to active.
    StudentRestored {
        /// Restored student.
        student_id: StudentId,
        /// Restoration timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::ConsecutivityUpdated { .. } => "consecutivity_updated",
            Self::ConsecutiveThresholdReached { .. } => "consecutive_threshold_reached",
            Self::WarningGenerated { .. } => "warning_generated",
            Self::WarningResolved { .. } => "warning_resolved",
            Self::PointsUpdated { .. } => "points_updated",
            Self::RankingsChanged { .. } => "rankings_changed",
            Self::TargetCreated { .. } => "target_created",
            Self::TargetAchieved { .. } => "target_achieved",
            Self::StreakUpdated { .. } => "streak_updated",
            Self::RequestSubmitted { .. } => "request_submitted",
            Self::RequestApproved { .. } => "request_approved",
            Self::RequestRejected { .. } => "request_rejected",
            Self::RequestBlocked { .. } => "request_blocked",
            Self::RequestCompleted { .. } => "request_completed",
            Self::RequestFailed { .. } => "request_failed",
            Self::StudentArchived { .. } => "student_archived",
            Self::StudentRestored { .. } => "student_restored",
        }
    }

    /// Returns the student this event concerns, when it concerns exactly
    /// one.
    #[must_use]
    pub const fn student_id(&self) -> Option<StudentId> {
        match self {
            Self::ConsecutivityUpdated { student_id, .. }
            | Self::ConsecutiveThresholdReached { student_id, .. }
            | Self::WarningGenerated { student_id, .. }
            | Self::WarningResolved { student_id, .. }
            | Self::PointsUpdated { student_id, .. }
            | Self::TargetCreated { student_id, .. }
            | Self::TargetAchieved { student_id, .. }
            | Self::StreakUpdated { student_id, .. }
            | Self::RequestSubmitted { student_id, .. }
            | Self::StudentArchived { student_id, .. }
            | Self::StudentRestored { student_id, .. } => Some(*student_id),
            Self::RankingsChanged { .. }
            | Self::RequestApproved { .. }
            | Self::RequestRejected { .. }
            | Self::RequestBlocked { .. }
            | Self::RequestCompleted { .. }
            | Self::RequestFailed { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn event_type_strings_are_snake_case() {
        let event = DomainEvent::StreakUpdated {
            student_id: StudentId::new(),
            streak: 2,
            cumulative_points: 3,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "streak_updated");
    }

    #[test]
    fn serializes_with_event_type_tag() {
        let event = DomainEvent::WarningGenerated {
            warning_id: WarningId::new(),
            student_id: StudentId::new(),
            kind: WarningKind::ConsecutiveAbsence,
            reason: "2 consecutive absences".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert!(json.contains("\"event_type\":\"warning_generated\""));
        assert!(json.contains("consecutive_absence"));
    }

    #[test]
    fn student_id_accessor() {
        let id = StudentId::new();
        let event = DomainEvent::StudentRestored {
            student_id: id,
            timestamp: Utc::now(),
        };
        assert_eq!(event.student_id(), Some(id));

        let rankings = DomainEvent::RankingsChanged {
            top: Vec::new(),
            timestamp: Utc::now(),
        };
        assert!(rankings.student_id().is_none());
    }
}
