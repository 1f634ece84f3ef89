//! Cascade engine: primary-fact entry points and explicit cascade wiring.
//!
//! [`CascadeEngine`] owns the stores, the event bus, and all services.
//! Each entry point applies a primary fact and then runs the derived-state
//! cascade in a fixed order: consecutivity, then warnings, then points,
//! then rankings. The [`EventBus`] is an outbox for observers; nothing in
//! the cascade subscribes to it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::domain::event::DomainEvent;
use crate::domain::event_bus::EventBus;
use crate::domain::facts::{
    AttendanceRecord, AttendanceStatus, BehavioralIncident, HomeworkRecord, HomeworkStatus,
    IncidentKind, QuizScore,
};
use crate::domain::ids::{LessonId, QuizId, RequestId, StudentId, WarningId};
use crate::domain::points::{Fasee7Points, RankedStudent};
use crate::domain::student::{Student, StudentStatus};
use crate::domain::target::{Target, TargetCategory};
use crate::domain::update_request::{EntityKind, RequestKind, UpdateRequest};
use crate::domain::warning::{Warning, WarningKind};
use crate::error::EngineError;
use crate::service::consecutivity::{AbsenceOutcome, BehavioralOutcome, ConsecutivityTracker};
use crate::service::points::PointsService;
use crate::service::requests::{PrivilegeCheck, UpdateRequestService};
use crate::service::targets::TargetService;
use crate::service::warnings::WarningService;
use crate::store::Stores;

/// Result of recording a behavioral incident.
#[derive(Debug, Clone)]
pub struct IncidentOutcome {
    /// Consecutivity state after the incident.
    pub run: BehavioralOutcome,
    /// Behavioral warning created by the review step, if either rule
    /// matched.
    pub warning: Option<Warning>,
}

/// Owns all state and services; every mutation flows through here.
#[derive(Debug, Clone)]
pub struct CascadeEngine {
    stores: Arc<Stores>,
    bus: EventBus,
    tracker: ConsecutivityTracker,
    warnings: WarningService,
    points: PointsService,
    targets: TargetService,
    requests: UpdateRequestService,
    max_points: i64,
}

impl CascadeEngine {
    /// Builds an engine from configuration and a privilege check.
    #[must_use]
    pub fn new(config: &EngineConfig, privileges: Arc<dyn PrivilegeCheck>) -> Self {
        let stores = Arc::new(Stores::new());
        let bus = EventBus::new(config.event_bus_capacity);
        let tracker = ConsecutivityTracker::new(Arc::clone(&stores), bus.clone());
        let warnings = WarningService::new(
            Arc::clone(&stores),
            bus.clone(),
            config.monthly_incident_threshold,
        );
        let points = PointsService::new(Arc::clone(&stores), bus.clone(), config.ranking_top_n);
        let targets = TargetService::new(Arc::clone(&stores), bus.clone());
        let requests = UpdateRequestService::new(
            Arc::clone(&stores),
            bus.clone(),
            privileges,
            tracker.clone(),
            warnings.clone(),
            points.clone(),
            targets.clone(),
            config.max_points,
        );
        Self {
            stores,
            bus,
            tracker,
            warnings,
            points,
            targets,
            requests,
            max_points: config.max_points,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns a reference to the inner [`Stores`].
    #[must_use]
    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    // ------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------

    /// Registers a new active student.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] when the name is blank.
    pub async fn register_student(&self, name: &str) -> Result<Student, EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation(
                "student name must not be empty".to_string(),
            ));
        }
        let student = Student::new(name);
        if !self
            .stores
            .students
            .insert(student.id, student.clone())
            .await
        {
            return Err(EngineError::Internal("student id collision".to_string()));
        }
        tracing::info!(student_id = %student.id, name, "student registered");
        Ok(student)
    }

    /// Archives an active student. Archival is always an explicit
    /// operation; the absence threshold only raises the prompting warning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] for an unknown student and
    /// [`EngineError::Validation`] when the student is already archived.
    pub async fn archive_student(&self, student_id: StudentId) -> Result<Student, EngineError> {
        let archived = self
            .stores
            .students
            .update(&student_id, |student| {
                if student.status == StudentStatus::Archived {
                    false
                } else {
                    student.status = StudentStatus::Archived;
                    true
                }
            })
            .await
            .ok_or(EngineError::StudentNotFound(student_id))?;
        if !archived {
            return Err(EngineError::Validation(format!(
                "student {student_id} is already archived"
            )));
        }
        self.bus.publish(DomainEvent::StudentArchived {
            student_id,
            timestamp: Utc::now(),
        });
        // Archived students drop out of the ranking.
        self.points.publish_rankings().await;
        tracing::info!(%student_id, "student archived");
        self.stores.student(student_id).await
    }

    /// Restores an archived student to active and re-derives their state:
    /// archival-related warnings resolve, consecutivity resets, points
    /// recompute.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] for an unknown student and
    /// [`EngineError::Validation`] when the student is already active.
    pub async fn restore_student(&self, student_id: StudentId) -> Result<Student, EngineError> {
        let restored = self
            .stores
            .students
            .update(&student_id, |student| {
                if student.status == StudentStatus::Active {
                    false
                } else {
                    student.status = StudentStatus::Active;
                    true
                }
            })
            .await
            .ok_or(EngineError::StudentNotFound(student_id))?;
        if !restored {
            return Err(EngineError::Validation(format!(
                "student {student_id} is already active"
            )));
        }
        self.bus.publish(DomainEvent::StudentRestored {
            student_id,
            timestamp: Utc::now(),
        });
        let _ = self.warnings.on_student_restored(student_id).await?;
        if let Err(err) = self.tracker.reset(student_id).await {
            tracing::warn!(%student_id, error = %err, "consecutivity reset failed");
        }
        let _ = self.points.recompute_all(student_id).await?;
        self.points.publish_rankings().await;
        tracing::info!(%student_id, "student restored");
        self.stores.student(student_id).await
    }

    // ------------------------------------------------------------------
    // Attendance
    // ------------------------------------------------------------------

    /// Records attendance for one lesson and runs the absence cascade.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] for an unknown student.
    pub async fn record_attendance(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        status: AttendanceStatus,
    ) -> Result<AbsenceOutcome, EngineError> {
        let outcome = self
            .apply_attendance(student_id, lesson_id, status)
            .await?;
        let _ = self.points.recompute_attendance(student_id).await?;
        self.points.publish_rankings().await;
        Ok(outcome)
    }

    /// Records a batch of attendance facts, recomputing points once per
    /// touched student and publishing the ranking once at the end.
    ///
    /// # Errors
    ///
    /// Returns the first per-record error; earlier records stay applied.
    pub async fn record_attendance_batch(
        &self,
        records: &[(StudentId, LessonId, AttendanceStatus)],
    ) -> Result<usize, EngineError> {
        let mut touched = HashSet::new();
        for (student_id, lesson_id, status) in records {
            let _ = self
                .apply_attendance(*student_id, *lesson_id, *status)
                .await?;
            let _ = touched.insert(*student_id);
        }
        for student_id in &touched {
            let _ = self.points.recompute_attendance(*student_id).await?;
        }
        if !touched.is_empty() {
            self.points.publish_rankings().await;
        }
        Ok(records.len())
    }

    /// Applies one attendance fact: persist, track consecutivity, raise
    /// the threshold warning if a boundary was crossed. Points are the
    /// caller's business so batches can coalesce recomputes.
    async fn apply_attendance(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        status: AttendanceStatus,
    ) -> Result<AbsenceOutcome, EngineError> {
        let _ = self.stores.student(student_id).await?;
        let record = AttendanceRecord::new(student_id, lesson_id, status);
        self.stores
            .attendance
            .upsert((student_id, lesson_id), record.clone())
            .await;
        let outcome = self.tracker.record_attendance(&record).await?;
        if outcome.crossing.is_some() {
            let _ = self
                .warnings
                .handle_absence_threshold(student_id, outcome.count)
                .await?;
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Homework and quizzes
    // ------------------------------------------------------------------

    /// Records a homework status and recomputes homework points.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] for an unknown student.
    pub async fn record_homework(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        status: HomeworkStatus,
    ) -> Result<Fasee7Points, EngineError> {
        let _ = self.stores.student(student_id).await?;
        let record = HomeworkRecord::new(student_id, lesson_id, status);
        self.stores
            .homework
            .upsert((student_id, lesson_id), record)
            .await;
        let points = self.points.recompute_homework(student_id).await?;
        self.points.publish_rankings().await;
        Ok(points)
    }

    /// Records a batch of homework facts, recomputing once per touched
    /// student.
    ///
    /// # Errors
    ///
    /// Returns the first per-record error; earlier records stay applied.
    pub async fn record_homework_batch(
        &self,
        records: &[(StudentId, LessonId, HomeworkStatus)],
    ) -> Result<usize, EngineError> {
        let mut touched = HashSet::new();
        for (student_id, lesson_id, status) in records {
            let _ = self.stores.student(*student_id).await?;
            let record = HomeworkRecord::new(*student_id, *lesson_id, *status);
            self.stores
                .homework
                .upsert((*student_id, *lesson_id), record)
                .await;
            let _ = touched.insert(*student_id);
        }
        for student_id in &touched {
            let _ = self.points.recompute_homework(*student_id).await?;
        }
        if !touched.is_empty() {
            self.points.publish_rankings().await;
        }
        Ok(records.len())
    }

    /// Records the graded scores of one quiz. Every score is validated
    /// against the configured upper bound before anything persists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::PointsOutOfRange`] when any score falls
    /// outside `0..=max_points`, or [`EngineError::StudentNotFound`] for an
    /// unknown student. Nothing persists on a validation failure.
    pub async fn complete_quiz_grading(
        &self,
        quiz_id: QuizId,
        scores: &[(StudentId, i64)],
    ) -> Result<usize, EngineError> {
        for (student_id, score) in scores {
            let _ = self.stores.student(*student_id).await?;
            if *score < 0 || *score > self.max_points {
                return Err(EngineError::PointsOutOfRange {
                    value: *score,
                    max: self.max_points,
                });
            }
        }
        for (student_id, score) in scores {
            let record = QuizScore::new(*student_id, quiz_id, *score);
            self.stores
                .quiz_scores
                .upsert((*student_id, quiz_id), record)
                .await;
            let _ = self.points.recompute_quiz(*student_id).await?;
        }
        if !scores.is_empty() {
            self.points.publish_rankings().await;
        }
        tracing::info!(%quiz_id, graded = scores.len(), "quiz grading completed");
        Ok(scores.len())
    }

    // ------------------------------------------------------------------
    // Behavioral incidents
    // ------------------------------------------------------------------

    /// Records a behavioral incident, extends or resets the same-kind
    /// run, and reviews both behavioral warning rules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] for an unknown student.
    pub async fn record_incident(
        &self,
        student_id: StudentId,
        lesson_id: LessonId,
        kind: IncidentKind,
        note: &str,
    ) -> Result<IncidentOutcome, EngineError> {
        let _ = self.stores.student(student_id).await?;
        let previous_kind = self
            .stores
            .latest_incident(student_id)
            .await
            .map(|incident| incident.kind);
        let incident = BehavioralIncident::new(student_id, lesson_id, kind, note);
        if !self
            .stores
            .incidents
            .insert(incident.id, incident.clone())
            .await
        {
            return Err(EngineError::Internal("incident id collision".to_string()));
        }
        let run = self.tracker.record_incident(&incident, previous_kind).await?;
        let warning = self.warnings.review_behavioral(student_id).await?;
        Ok(IncidentOutcome { run, warning })
    }

    // ------------------------------------------------------------------
    // Performance indicators
    // ------------------------------------------------------------------

    /// Reacts to a performance-indicator drop: resets the streak and
    /// creates one remedial target per lost level.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] unless `previous_pi > current_pi`.
    pub async fn on_pi_degraded(
        &self,
        student_id: StudentId,
        category: TargetCategory,
        previous_pi: i64,
        current_pi: i64,
    ) -> Result<Vec<Target>, EngineError> {
        let _ = self.stores.student(student_id).await?;
        let created = self
            .targets
            .on_degradation(student_id, category, previous_pi, current_pi)
            .await?;
        let _ = self.points.recompute_target(student_id).await?;
        self.points.publish_rankings().await;
        Ok(created)
    }

    /// Reacts to a performance-indicator rise: achieves every reachable
    /// active target in threshold order and banks the streak bonus.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] for an unknown student.
    pub async fn on_pi_improved(
        &self,
        student_id: StudentId,
        category: TargetCategory,
        new_pi: i64,
    ) -> Result<Vec<Target>, EngineError> {
        let _ = self.stores.student(student_id).await?;
        let achieved = self
            .targets
            .on_improvement(student_id, category, new_pi)
            .await?;
        if !achieved.is_empty() {
            let _ = self.points.recompute_target(student_id).await?;
            self.points.publish_rankings().await;
        }
        Ok(achieved)
    }

    // ------------------------------------------------------------------
    // Queries and delegations
    // ------------------------------------------------------------------

    /// Resolves a warning; `false` when it was already resolved.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WarningNotFound`] for an unknown warning.
    pub async fn resolve_warning(
        &self,
        warning_id: WarningId,
        reason: &str,
    ) -> Result<bool, EngineError> {
        self.warnings.resolve_warning(warning_id, reason).await
    }

    /// Active warnings for a student, optionally filtered by kind.
    pub async fn active_warnings(
        &self,
        student_id: StudentId,
        kind: Option<WarningKind>,
    ) -> Vec<Warning> {
        self.stores.active_warnings(student_id, kind).await
    }

    /// Current ranking of active students. Pure read; publishes nothing.
    pub async fn ranking(&self) -> Vec<RankedStudent> {
        self.points.ranking().await
    }

    /// 1-based rank of a student, `-1` when unranked.
    pub async fn rank_of(&self, student_id: StudentId) -> i64 {
        self.points.rank_of(student_id).await
    }

    /// Pending update requests, oldest first.
    pub async fn pending_requests(&self) -> Vec<UpdateRequest> {
        self.stores.pending_requests().await
    }

    /// All requests ever filed against one entity.
    pub async fn requests_for_entity(
        &self,
        kind: EntityKind,
        entity_id: uuid::Uuid,
    ) -> Vec<UpdateRequest> {
        self.stores.requests_for_entity(kind, entity_id).await
    }

    /// Submits an update request on behalf of a non-privileged actor.
    ///
    /// # Errors
    ///
    /// Returns a validation, payload, or duplicate-pending error from the
    /// request service.
    pub async fn submit_request(
        &self,
        kind: RequestKind,
        student_id: StudentId,
        payload: serde_json::Value,
        requester: &str,
    ) -> Result<UpdateRequest, EngineError> {
        self.requests
            .submit(kind, student_id, payload, requester)
            .await
    }

    /// Approves a request and executes it transactionally.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] for a non-privileged actor or a
    /// transition error; execution failure is reported through the returned
    /// request's status, not through `Err`.
    pub async fn approve_request(
        &self,
        actor: &str,
        request_id: RequestId,
        notes: Option<String>,
    ) -> Result<UpdateRequest, EngineError> {
        self.requests.approve(actor, request_id, notes).await
    }

    /// Rejects a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] for a non-privileged actor or
    /// [`EngineError::InvalidTransition`] when the request is not pending.
    pub async fn reject_request(
        &self,
        actor: &str,
        request_id: RequestId,
        reason: &str,
    ) -> Result<UpdateRequest, EngineError> {
        self.requests.reject(actor, request_id, reason).await
    }

    /// Administratively blocks a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] for a non-privileged actor or
    /// [`EngineError::InvalidTransition`] when the request is not pending.
    pub async fn block_request(
        &self,
        actor: &str,
        request_id: RequestId,
        reason: &str,
    ) -> Result<UpdateRequest, EngineError> {
        self.requests.block(actor, request_id, reason).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::service::requests::StaticPrivileges;

    fn make_engine() -> CascadeEngine {
        let config = EngineConfig::default();
        CascadeEngine::new(&config, Arc::new(StaticPrivileges::new(["admin-1"])))
    }

    #[tokio::test]
    async fn register_rejects_blank_name() {
        let engine = make_engine();
        assert!(engine.register_student("   ").await.is_err());
    }

    #[tokio::test]
    async fn third_absence_raises_archival_warning() {
        let engine = make_engine();
        let student = engine.register_student("Hala").await;
        let Ok(student) = student else {
            panic!("registration failed");
        };

        for _ in 0..3 {
            let result = engine
                .record_attendance(student.id, LessonId::new(), AttendanceStatus::Absent)
                .await;
            assert!(result.is_ok());
        }

        let archival = engine
            .active_warnings(student.id, Some(WarningKind::Archived))
            .await;
        assert_eq!(archival.len(), 1);
        // The warning-class threshold fired once on the way up too.
        let absence = engine
            .active_warnings(student.id, Some(WarningKind::ConsecutiveAbsence))
            .await;
        assert_eq!(absence.len(), 1);
    }

    #[tokio::test]
    async fn archive_then_restore_round_trip() {
        let engine = make_engine();
        let student = engine.register_student("Tarek").await;
        let Ok(student) = student else {
            panic!("registration failed");
        };

        let archived = engine.archive_student(student.id).await;
        let Ok(archived) = archived else {
            panic!("archive failed");
        };
        assert_eq!(archived.status, StudentStatus::Archived);
        // Archived students are not ranked.
        assert_eq!(engine.rank_of(student.id).await, -1);

        let restored = engine.restore_student(student.id).await;
        let Ok(restored) = restored else {
            panic!("restore failed");
        };
        assert!(restored.is_active());
        // Double archive and double restore are rejected.
        assert!(engine.restore_student(student.id).await.is_err());
    }

    #[tokio::test]
    async fn quiz_grading_validates_bounds_before_persisting() {
        let engine = make_engine();
        let a = engine.register_student("Mira").await;
        let b = engine.register_student("Jude").await;
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("registration failed");
        };

        let result = engine
            .complete_quiz_grading(QuizId::new(), &[(a.id, 10), (b.id, -1)])
            .await;
        assert!(matches!(
            result,
            Err(EngineError::PointsOutOfRange { .. })
        ));
        // Nothing persisted for either student.
        assert!(engine.stores().quiz_scores.is_empty().await);
    }

    #[tokio::test]
    async fn attendance_batch_counts_every_record() {
        let engine = make_engine();
        let a = engine.register_student("Lina").await;
        let b = engine.register_student("Fadi").await;
        let (Ok(a), Ok(b)) = (a, b) else {
            panic!("registration failed");
        };

        let lesson = LessonId::new();
        let applied = engine
            .record_attendance_batch(&[
                (a.id, lesson, AttendanceStatus::Present),
                (b.id, lesson, AttendanceStatus::Absent),
            ])
            .await;
        let Ok(applied) = applied else {
            panic!("batch failed");
        };
        assert_eq!(applied, 2);
        assert_eq!(engine.stores().attendance.len().await, 2);
    }

    #[tokio::test]
    async fn same_kind_incident_run_raises_behavioral_warning() {
        let engine = make_engine();
        let student = engine.register_student("Yara").await;
        let Ok(student) = student else {
            panic!("registration failed");
        };

        let first = engine
            .record_incident(
                student.id,
                LessonId::new(),
                IncidentKind::Disruption,
                "talking over the lesson",
            )
            .await;
        let Ok(first) = first else {
            panic!("incident failed");
        };
        assert!(first.warning.is_none());

        let second = engine
            .record_incident(
                student.id,
                LessonId::new(),
                IncidentKind::Disruption,
                "again",
            )
            .await;
        let Ok(second) = second else {
            panic!("incident failed");
        };
        assert_eq!(second.run.count, 2);
        assert!(second.warning.is_some());
    }

    #[tokio::test]
    async fn degradation_then_improvement_awards_streak_points() {
        let engine = make_engine();
        let student = engine.register_student("Omar").await;
        let Ok(student) = student else {
            panic!("registration failed");
        };

        let created = engine
            .on_pi_degraded(student.id, TargetCategory::Reading, 10, 6)
            .await;
        let Ok(created) = created else {
            panic!("degradation failed");
        };
        assert_eq!(created.len(), 4);

        let achieved = engine
            .on_pi_improved(student.id, TargetCategory::Reading, 9)
            .await;
        let Ok(achieved) = achieved else {
            panic!("improvement failed");
        };
        assert_eq!(achieved.len(), 3);

        // Streak ran 1, 2, 3: cumulative bonus 6 flows into points.
        let points = engine.stores().points_or_init(student.id).await;
        assert_eq!(points.target_points, 6);
        assert_eq!(
            points.total_points,
            points.quiz_points
                + points.attendance_points
                + points.homework_points
                + points.target_points
        );
    }
}
