//! Approval-gated update requests.
//!
//! A non-privileged actor submits a change request; a privileged actor
//! approves or rejects it. Approval executes the underlying mutation inside
//! a transaction and runs the same cascade the primary mutation path runs.
//!
//! Status machine:
//!
//! ```text
//! PENDING ─approve→ APPROVED ─execute ok→ APPLIED ─cascade ok→ COMPLETED
//!    │                  └──────execute/cascade failure────────→ FAILED
//!    ├─reject→ REJECTED
//!    └─block→  BLOCKED      (administrative suspension, terminal)
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::facts::{AttendanceStatus, HomeworkStatus, IncidentKind};
use super::ids::{IncidentId, LessonId, QuizId, RequestId, StudentId};
use crate::error::EngineError;

/// Status of an update request. Strict state machine; see module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Submitted, awaiting review. The only in-flight status.
    Pending,
    /// Approved by a privileged actor; execution in progress.
    Approved,
    /// Handler mutation applied; cascade in progress.
    Applied,
    /// Rejected by a privileged actor. Terminal.
    Rejected,
    /// Mutation and cascade both succeeded. Terminal.
    Completed,
    /// Execution or cascade failed; transaction rolled back. Terminal.
    Failed,
    /// Administratively suspended while pending. Terminal.
    Blocked,
}

impl RequestStatus {
    /// Returns `true` if the request still counts as in-flight for the
    /// one-pending-request-per-entity rule.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` for statuses with no outgoing transition.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Completed | Self::Failed | Self::Blocked
        )
    }
}

/// Kind of entity an update request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// An attendance record.
    Attendance,
    /// A homework record.
    Homework,
    /// A quiz score.
    QuizScore,
    /// A behavioral incident.
    Incident,
    /// A student record.
    Student,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Attendance => "attendance",
            Self::Homework => "homework",
            Self::QuizScore => "quiz_score",
            Self::Incident => "incident",
            Self::Student => "student",
        };
        write!(f, "{label}")
    }
}

/// Kind of mutation an update request asks for. Closed enumeration: the
/// orchestrator routes by this to a fixed set of handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Change a recorded attendance status.
    AttendanceStatusChange,
    /// Change a recorded homework status.
    HomeworkStatusChange,
    /// Correct a quiz score.
    QuizScoreCorrection,
    /// Add a behavioral incident after the fact.
    AddIncident,
    /// Remove a mistakenly recorded behavioral incident.
    RemoveIncident,
    /// Restore an archived student to active.
    RestoreStudent,
}

impl RequestKind {
    /// Stable snake_case label, used in payload errors and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AttendanceStatusChange => "attendance_status_change",
            Self::HomeworkStatusChange => "homework_status_change",
            Self::QuizScoreCorrection => "quiz_score_correction",
            Self::AddIncident => "add_incident",
            Self::RemoveIncident => "remove_incident",
            Self::RestoreStudent => "restore_student",
        }
    }

    /// Entity kind this request kind targets.
    #[must_use]
    pub const fn entity_kind(self) -> EntityKind {
        match self {
            Self::AttendanceStatusChange => EntityKind::Attendance,
            Self::HomeworkStatusChange => EntityKind::Homework,
            Self::QuizScoreCorrection => EntityKind::QuizScore,
            Self::AddIncident | Self::RemoveIncident => EntityKind::Incident,
            Self::RestoreStudent => EntityKind::Student,
        }
    }
}

/// Typed request payload, parsed from the submitted JSON at validation
/// time. The raw JSON stays on the request record for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPayload {
    /// Set the attendance status of (student, lesson).
    AttendanceStatusChange {
        /// Lesson whose mark changes.
        lesson_id: LessonId,
        /// New status.
        status: AttendanceStatus,
    },
    /// Set the homework status of (student, lesson).
    HomeworkStatusChange {
        /// Lesson whose homework mark changes.
        lesson_id: LessonId,
        /// New status.
        status: HomeworkStatus,
    },
    /// Replace a quiz score.
    QuizScoreCorrection {
        /// Quiz whose score is corrected.
        quiz_id: QuizId,
        /// Corrected score.
        score: i64,
    },
    /// Record a behavioral incident.
    AddIncident {
        /// Lesson the incident occurred in.
        lesson_id: LessonId,
        /// Incident kind.
        kind: IncidentKind,
        /// Free-text description.
        note: String,
    },
    /// Delete a behavioral incident.
    RemoveIncident {
        /// Incident to remove.
        incident_id: IncidentId,
    },
    /// Restore an archived student.
    RestoreStudent {},
}

impl RequestPayload {
    /// Parses and validates a raw JSON payload for the given request kind.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedPayload`] when the JSON does not
    /// match the shape the kind requires.
    pub fn parse(kind: RequestKind, raw: &serde_json::Value) -> Result<Self, EngineError> {
        let malformed = |e: serde_json::Error| EngineError::MalformedPayload {
            kind: kind.label().to_string(),
            detail: e.to_string(),
        };
        match kind {
            RequestKind::AttendanceStatusChange => {
                #[derive(Deserialize)]
                struct Raw {
                    lesson_id: LessonId,
                    status: AttendanceStatus,
                }
                let raw: Raw = serde_json::from_value(raw.clone()).map_err(malformed)?;
                Ok(Self::AttendanceStatusChange {
                    lesson_id: raw.lesson_id,
                    status: raw.status,
                })
            }
            RequestKind::HomeworkStatusChange => {
                #[derive(Deserialize)]
                struct Raw {
                    lesson_id: LessonId,
                    status: HomeworkStatus,
                }
                let raw: Raw = serde_json::from_value(raw.clone()).map_err(malformed)?;
                Ok(Self::HomeworkStatusChange {
                    lesson_id: raw.lesson_id,
                    status: raw.status,
                })
            }
            RequestKind::QuizScoreCorrection => {
                #[derive(Deserialize)]
                struct Raw {
                    quiz_id: QuizId,
                    score: i64,
                }
                let raw: Raw = serde_json::from_value(raw.clone()).map_err(malformed)?;
                Ok(Self::QuizScoreCorrection {
                    quiz_id: raw.quiz_id,
                    score: raw.score,
                })
            }
            RequestKind::AddIncident => {
                #[derive(Deserialize)]
                struct Raw {
                    lesson_id: LessonId,
                    kind: IncidentKind,
                    note: String,
                }
                let raw: Raw = serde_json::from_value(raw.clone()).map_err(malformed)?;
                Ok(Self::AddIncident {
                    lesson_id: raw.lesson_id,
                    kind: raw.kind,
                    note: raw.note,
                })
            }
            RequestKind::RemoveIncident => {
                #[derive(Deserialize)]
                struct Raw {
                    incident_id: IncidentId,
                }
                let raw: Raw = serde_json::from_value(raw.clone()).map_err(malformed)?;
                Ok(Self::RemoveIncident {
                    incident_id: raw.incident_id,
                })
            }
            RequestKind::RestoreStudent => Ok(Self::RestoreStudent {}),
        }
    }

    /// Identifier of the finest-grained record this payload addresses,
    /// used together with the entity kind as the one-pending-per-entity
    /// conflict key. Lesson- and quiz-scoped payloads derive a stable
    /// (student, record) composite so corrections to different lessons or
    /// quizzes of the same student stay independent; incident removal
    /// keys on the incident itself and restoration on the student.
    #[must_use]
    pub fn conflict_id(&self, student_id: StudentId) -> uuid::Uuid {
        let scoped =
            |record: &uuid::Uuid| uuid::Uuid::new_v5(student_id.as_uuid(), record.as_bytes());
        match self {
            Self::AttendanceStatusChange { lesson_id, .. }
            | Self::HomeworkStatusChange { lesson_id, .. }
            | Self::AddIncident { lesson_id, .. } => scoped(lesson_id.as_uuid()),
            Self::QuizScoreCorrection { quiz_id, .. } => scoped(quiz_id.as_uuid()),
            Self::RemoveIncident { incident_id } => *incident_id.as_uuid(),
            Self::RestoreStudent {} => *student_id.as_uuid(),
        }
    }
}

/// An update request record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Requested mutation kind.
    pub kind: RequestKind,
    /// Student whose data the request concerns.
    pub student_id: StudentId,
    /// Entity kind targeted, derived from `kind`.
    pub entity_kind: EntityKind,
    /// Conflict-key identifier of the targeted entity.
    pub entity_id: uuid::Uuid,
    /// Raw submitted payload, kept for audit.
    pub payload: serde_json::Value,
    /// Actor who submitted the request.
    pub requester: String,
    /// Current status.
    pub status: RequestStatus,
    /// Privileged actor who reviewed the request.
    pub reviewer: Option<String>,
    /// When the review decision was made.
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Free-text review notes or rejection reason.
    pub review_notes: Option<String>,
    /// Failure reason recorded when execution or cascade fails.
    pub failure_reason: Option<String>,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
}

impl UpdateRequest {
    /// Creates a new PENDING request.
    #[must_use]
    pub fn new(
        kind: RequestKind,
        student_id: StudentId,
        entity_id: uuid::Uuid,
        payload: serde_json::Value,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            kind,
            student_id,
            entity_kind: kind.entity_kind(),
            entity_id,
            payload,
            requester: requester.into(),
            status: RequestStatus::Pending,
            reviewer: None,
            reviewed_at: None,
            review_notes: None,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }

    /// PENDING → APPROVED.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] if the request is not
    /// pending.
    pub fn approve(
        &mut self,
        reviewer: impl Into<String>,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        self.transition(RequestStatus::Pending, RequestStatus::Approved, "approve")?;
        self.reviewer = Some(reviewer.into());
        self.reviewed_at = Some(Utc::now());
        self.review_notes = notes;
        Ok(())
    }

    /// PENDING → REJECTED.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] if the request is not
    /// pending.
    pub fn reject(
        &mut self,
        reviewer: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.transition(RequestStatus::Pending, RequestStatus::Rejected, "reject")?;
        self.reviewer = Some(reviewer.into());
        self.reviewed_at = Some(Utc::now());
        self.review_notes = Some(reason.into());
        Ok(())
    }

    /// PENDING → BLOCKED (administrative suspension).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] if the request is not
    /// pending.
    pub fn block(
        &mut self,
        reviewer: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.transition(RequestStatus::Pending, RequestStatus::Blocked, "block")?;
        self.reviewer = Some(reviewer.into());
        self.reviewed_at = Some(Utc::now());
        self.review_notes = Some(reason.into());
        Ok(())
    }

    /// APPROVED → APPLIED.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] on any other status.
    pub fn mark_applied(&mut self) -> Result<(), EngineError> {
        self.transition(RequestStatus::Approved, RequestStatus::Applied, "apply")
    }

    /// APPLIED → COMPLETED.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] on any other status.
    pub fn mark_completed(&mut self) -> Result<(), EngineError> {
        self.transition(RequestStatus::Applied, RequestStatus::Completed, "complete")
    }

    /// APPROVED or APPLIED → FAILED, recording the reason.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] on any other status.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        if !matches!(
            self.status,
            RequestStatus::Approved | RequestStatus::Applied
        ) {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                action: "fail",
            });
        }
        self.status = RequestStatus::Failed;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    fn transition(
        &mut self,
        from: RequestStatus,
        to: RequestStatus,
        action: &'static str,
    ) -> Result<(), EngineError> {
        if self.status != from {
            return Err(EngineError::InvalidTransition {
                from: self.status,
                action,
            });
        }
        self.status = to;
        Ok(())
    }
}
