//! Notification planner.
//!
//! Pure mapping from a [`DomainEvent`] to zero or more notification
//! drafts. The planner holds no state and performs no delivery; callers
//! subscribe to the [`crate::domain::EventBus`] and hand each event to
//! [`NotificationPlanner::plan`], then dispatch the drafts through
//! whatever channel they own.

use std::collections::HashSet;

use crate::domain::event::{DomainEvent, ThresholdClass};
use crate::domain::ids::StudentId;
use crate::domain::warning::WarningKind;

/// Who a notification draft is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The student's guardian contact.
    Guardian,
    /// The student themselves.
    Student,
    /// Administrative staff.
    Staff,
}

/// A notification draft produced by the planner.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Addressee class.
    pub recipient: Recipient,
    /// Short subject line.
    pub subject: String,
    /// Human-readable body.
    pub body: String,
}

impl Notification {
    fn new(recipient: Recipient, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Planner translating domain events into notification drafts.
///
/// Holds only the last published top-N membership, used to detect rank
/// entries without re-notifying students who stay in.
#[derive(Debug, Clone, Default)]
pub struct NotificationPlanner {
    last_top: HashSet<StudentId>,
}

impl NotificationPlanner {
    /// Creates a new planner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the notification drafts warranted by `event`.
    ///
    /// Routine churn (consecutivity updates, points recomputes) produces
    /// no drafts; only events that a person should act on do. Ranking
    /// publications notify only students newly entering the top list.
    pub fn plan(&mut self, event: &DomainEvent) -> Vec<Notification> {
        match event {
            DomainEvent::ConsecutiveThresholdReached {
                student_id,
                count,
                class,
                ..
            } => match class {
                ThresholdClass::Warning => vec![Notification::new(
                    Recipient::Guardian,
                    "Attendance warning",
                    format!("Student {student_id} has missed {count} consecutive lessons."),
                )],
                ThresholdClass::Archival => vec![
                    Notification::new(
                        Recipient::Guardian,
                        "Enrollment at risk",
                        format!(
                            "Student {student_id} has missed {count} consecutive lessons \
                             and is flagged for archival."
                        ),
                    ),
                    Notification::new(
                        Recipient::Staff,
                        "Archival flag raised",
                        format!("Review enrollment of student {student_id}."),
                    ),
                ],
            },

            DomainEvent::WarningGenerated {
                student_id,
                kind,
                reason,
                ..
            } => {
                let recipient = match kind {
                    WarningKind::Behavioral => Recipient::Staff,
                    WarningKind::ConsecutiveAbsence | WarningKind::Archived => Recipient::Guardian,
                };
                vec![Notification::new(
                    recipient,
                    format!("{} warning", kind.label()),
                    format!("Student {student_id}: {reason}"),
                )]
            }

            DomainEvent::TargetAchieved {
                student_id,
                category,
                threshold,
                ..
            } => vec![Notification::new(
                Recipient::Student,
                "Target achieved",
                format!(
                    "Student {student_id} recovered {} performance to {threshold}.",
                    category.label()
                ),
            )],

            DomainEvent::RequestRejected {
                request_id, reason, ..
            } => vec![Notification::new(
                Recipient::Staff,
                "Update request rejected",
                format!("Request {request_id} was rejected: {reason}"),
            )],

            DomainEvent::RequestFailed {
                request_id, reason, ..
            } => vec![Notification::new(
                Recipient::Staff,
                "Update request failed",
                format!("Request {request_id} failed and was rolled back: {reason}"),
            )],

            DomainEvent::StudentArchived { student_id, .. } => vec![Notification::new(
                Recipient::Guardian,
                "Enrollment archived",
                format!("Student {student_id} has been archived."),
            )],

            DomainEvent::StudentRestored { student_id, .. } => vec![Notification::new(
                Recipient::Guardian,
                "Enrollment restored",
                format!("Student {student_id} has been restored to active."),
            )],

            DomainEvent::RankingsChanged { top, .. } => {
                let current: HashSet<StudentId> =
                    top.iter().map(|entry| entry.student_id).collect();
                let drafts = top
                    .iter()
                    .filter(|entry| !self.last_top.contains(&entry.student_id))
                    .map(|entry| {
                        Notification::new(
                            Recipient::Student,
                            "Top ranking",
                            format!(
                                "{} entered the rankings at position {} with {} points.",
                                entry.name, entry.rank, entry.total_points
                            ),
                        )
                    })
                    .collect();
                self.last_top = current;
                drafts
            }

            _ => Vec::new(),
        }
    }
}
