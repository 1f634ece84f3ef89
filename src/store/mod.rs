//! Repository layer: one in-memory table per entity plus the finders the
//! services need.
//!
//! [`Stores`] is the single owner of persisted state. Every finder and
//! mutation the services use goes through here, mirroring the repository
//! ports a durable implementation would provide: find-by-id,
//! find-by-student, insert, update, upsert, and the entity-specific
//! finders (by lesson and student, latest by student and category, ...).
//!
//! [`Stores::snapshot`] / [`Stores::restore`] form the transaction scope
//! of update-request execution: the snapshot covers every entity table
//! *except* update requests themselves, so a rollback erases the
//! handler's mutations while the request's FAILED status survives.

pub mod table;

use std::collections::HashMap;

use crate::domain::consecutivity::{ConsecutivityRecord, TrackedDimension};
use crate::domain::facts::{
    AttendanceRecord, BehavioralIncident, HomeworkRecord, QuizScore,
};
use crate::domain::ids::{
    IncidentId, LessonId, QuizId, RequestId, StudentId, TargetId, WarningId,
};
use crate::domain::points::Fasee7Points;
use crate::domain::student::Student;
use crate::domain::target::{Target, TargetCategory, TargetStreak};
use crate::domain::update_request::{EntityKind, UpdateRequest};
use crate::domain::warning::{Warning, WarningKind};
use crate::error::EngineError;
use table::Table;

/// All entity tables, one instance per engine.
#[derive(Debug, Default)]
pub struct Stores {
    /// Students by id.
    pub students: Table<StudentId, Student>,
    /// Attendance marks by (student, lesson).
    pub attendance: Table<(StudentId, LessonId), AttendanceRecord>,
    /// Homework marks by (student, lesson).
    pub homework: Table<(StudentId, LessonId), HomeworkRecord>,
    /// Quiz scores by (student, quiz).
    pub quiz_scores: Table<(StudentId, QuizId), QuizScore>,
    /// Behavioral incidents by id.
    pub incidents: Table<IncidentId, BehavioralIncident>,
    /// Consecutivity records by (student, dimension).
    pub consecutivity: Table<(StudentId, TrackedDimension), ConsecutivityRecord>,
    /// Warnings by id.
    pub warnings: Table<WarningId, Warning>,
    /// Points records by student.
    pub points: Table<StudentId, Fasee7Points>,
    /// Remedial targets by id.
    pub targets: Table<TargetId, Target>,
    /// Achievement streaks by student.
    pub streaks: Table<StudentId, TargetStreak>,
    /// Update requests by id.
    pub requests: Table<RequestId, UpdateRequest>,
}

/// Point-in-time copy of every entity table except update requests.
#[derive(Debug)]
pub struct StoreSnapshot {
    students: HashMap<StudentId, Student>,
    attendance: HashMap<(StudentId, LessonId), AttendanceRecord>,
    homework: HashMap<(StudentId, LessonId), HomeworkRecord>,
    quiz_scores: HashMap<(StudentId, QuizId), QuizScore>,
    incidents: HashMap<IncidentId, BehavioralIncident>,
    consecutivity: HashMap<(StudentId, TrackedDimension), ConsecutivityRecord>,
    warnings: HashMap<WarningId, Warning>,
    points: HashMap<StudentId, Fasee7Points>,
    targets: HashMap<TargetId, Target>,
    streaks: HashMap<StudentId, TargetStreak>,
}

impl Stores {
    /// Creates an empty store set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a student or fails with [`EngineError::StudentNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StudentNotFound`] when no student with the
    /// given id exists.
    pub async fn student(&self, id: StudentId) -> Result<Student, EngineError> {
        self.students
            .get(&id)
            .await
            .ok_or(EngineError::StudentNotFound(id))
    }

    /// All incidents of one student, oldest first.
    pub async fn incidents_for_student(&self, student_id: StudentId) -> Vec<BehavioralIncident> {
        let mut incidents = self
            .incidents
            .find(|i| i.student_id == student_id)
            .await;
        incidents.sort_by_key(|i| i.occurred_at);
        incidents
    }

    /// The most recent incident of one student, if any.
    pub async fn latest_incident(&self, student_id: StudentId) -> Option<BehavioralIncident> {
        self.incidents
            .find(|i| i.student_id == student_id)
            .await
            .into_iter()
            .max_by_key(|i| i.occurred_at)
    }

    /// Active warnings of one student, optionally restricted to a kind.
    pub async fn active_warnings(
        &self,
        student_id: StudentId,
        kind: Option<WarningKind>,
    ) -> Vec<Warning> {
        self.warnings
            .find(|w| {
                w.active
                    && w.student_id == student_id
                    && kind.is_none_or(|k| w.kind == k)
            })
            .await
    }

    /// Active, unachieved targets of one student in one category.
    pub async fn active_targets(
        &self,
        student_id: StudentId,
        category: TargetCategory,
    ) -> Vec<Target> {
        self.targets
            .find(|t| !t.achieved && t.student_id == student_id && t.category == category)
            .await
    }

    /// Loads the points record for a student, lazily initializing a zeroed
    /// one on first access.
    pub async fn points_or_init(&self, student_id: StudentId) -> Fasee7Points {
        if let Some(points) = self.points.get(&student_id).await {
            return points;
        }
        let fresh = Fasee7Points::new(student_id);
        // Another writer may have raced us; keep whichever row landed.
        let _ = self.points.insert(student_id, fresh.clone()).await;
        self.points.get(&student_id).await.unwrap_or(fresh)
    }

    /// Loads the streak record for a student, lazily initializing an empty
    /// one on first access.
    pub async fn streak_or_init(&self, student_id: StudentId) -> TargetStreak {
        if let Some(streak) = self.streaks.get(&student_id).await {
            return streak;
        }
        let fresh = TargetStreak::new(student_id);
        let _ = self.streaks.insert(student_id, fresh.clone()).await;
        self.streaks.get(&student_id).await.unwrap_or(fresh)
    }

    /// Loads the consecutivity record for (student, dimension), lazily
    /// initializing a zeroed one.
    pub async fn consecutivity_or_init(
        &self,
        student_id: StudentId,
        dimension: TrackedDimension,
    ) -> ConsecutivityRecord {
        let key = (student_id, dimension);
        if let Some(record) = self.consecutivity.get(&key).await {
            return record;
        }
        let fresh = ConsecutivityRecord::new(student_id, dimension);
        let _ = self.consecutivity.insert(key, fresh.clone()).await;
        self.consecutivity.get(&key).await.unwrap_or(fresh)
    }

    /// Inserts a new update request, enforcing the one-PENDING-per-entity
    /// rule inside the table's write lock so two racing submissions cannot
    /// both pass the check.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicatePending`] when an in-flight request
    /// for the same (entity kind, entity id) already exists.
    pub async fn insert_request(&self, request: UpdateRequest) -> Result<(), EngineError> {
        let entity_kind = request.entity_kind;
        let entity_id = request.entity_id;
        self.requests
            .insert_unique(request.id, request, |existing| {
                existing.status.is_in_flight()
                    && existing.entity_kind == entity_kind
                    && existing.entity_id == entity_id
            })
            .await
            .map_err(|_| EngineError::DuplicatePending {
                kind: entity_kind,
                id: entity_id,
            })
    }

    /// All in-flight requests, oldest first.
    pub async fn pending_requests(&self) -> Vec<UpdateRequest> {
        let mut pending = self
            .requests
            .find(|r| r.status.is_in_flight())
            .await;
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// All requests ever filed against an entity, oldest first.
    pub async fn requests_for_entity(
        &self,
        kind: EntityKind,
        entity_id: uuid::Uuid,
    ) -> Vec<UpdateRequest> {
        let mut requests = self
            .requests
            .find(|r| r.entity_kind == kind && r.entity_id == entity_id)
            .await;
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    /// Copies every entity table except update requests.
    pub async fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            students: self.students.snapshot().await,
            attendance: self.attendance.snapshot().await,
            homework: self.homework.snapshot().await,
            quiz_scores: self.quiz_scores.snapshot().await,
            incidents: self.incidents.snapshot().await,
            consecutivity: self.consecutivity.snapshot().await,
            warnings: self.warnings.snapshot().await,
            points: self.points.snapshot().await,
            targets: self.targets.snapshot().await,
            streaks: self.streaks.snapshot().await,
        }
    }

    /// Restores every entity table except update requests from a snapshot.
    pub async fn restore(&self, snapshot: StoreSnapshot) {
        self.students.restore(snapshot.students).await;
        self.attendance.restore(snapshot.attendance).await;
        self.homework.restore(snapshot.homework).await;
        self.quiz_scores.restore(snapshot.quiz_scores).await;
        self.incidents.restore(snapshot.incidents).await;
        self.consecutivity.restore(snapshot.consecutivity).await;
        self.warnings.restore(snapshot.warnings).await;
        self.points.restore(snapshot.points).await;
        self.targets.restore(snapshot.targets).await;
        self.streaks.restore(snapshot.streaks).await;
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::facts::IncidentKind;
    use crate::domain::update_request::RequestKind;

    #[tokio::test]
    async fn student_lookup_errors_when_missing() {
        let stores = Stores::new();
        let result = stores.student(StudentId::new()).await;
        assert!(matches!(result, Err(EngineError::StudentNotFound(_))));
    }

    #[tokio::test]
    async fn points_lazily_initialize_once() {
        let stores = Stores::new();
        let student_id = StudentId::new();

        let first = stores.points_or_init(student_id).await;
        assert_eq!(first.total_points, 0);
        assert_eq!(stores.points.len().await, 1);

        let _ = stores.points_or_init(student_id).await;
        assert_eq!(stores.points.len().await, 1);
    }

    #[tokio::test]
    async fn latest_incident_is_most_recent() {
        let stores = Stores::new();
        let student_id = StudentId::new();

        let older = BehavioralIncident {
            occurred_at: chrono::Utc::now() - chrono::Duration::hours(2),
            ..BehavioralIncident::new(
                student_id,
                LessonId::new(),
                IncidentKind::Lateness,
                "late",
            )
        };
        let newer = BehavioralIncident::new(
            student_id,
            LessonId::new(),
            IncidentKind::Disruption,
            "talking",
        );
        let newer_id = newer.id;
        let _ = stores.incidents.insert(older.id, older).await;
        let _ = stores.incidents.insert(newer_id, newer).await;

        let latest = stores.latest_incident(student_id).await;
        let Some(latest) = latest else {
            panic!("expected an incident");
        };
        assert_eq!(latest.id, newer_id);
    }

    #[tokio::test]
    async fn duplicate_pending_request_is_rejected_then_allowed_after_resolve() {
        let stores = Stores::new();
        let student_id = StudentId::new();

        let first = UpdateRequest::new(
            RequestKind::RestoreStudent,
            student_id,
            *student_id.as_uuid(),
            serde_json::json!({}),
            "assistant-1",
        );
        let first_id = first.id;
        assert!(stores.insert_request(first).await.is_ok());

        let second = UpdateRequest::new(
            RequestKind::RestoreStudent,
            student_id,
            *student_id.as_uuid(),
            serde_json::json!({}),
            "assistant-2",
        );
        assert!(matches!(
            stores.insert_request(second).await,
            Err(EngineError::DuplicatePending { .. })
        ));

        // Resolve the first, then a new submission passes.
        let _ = stores
            .requests
            .update(&first_id, |r| r.reject("admin", "no"))
            .await;
        let third = UpdateRequest::new(
            RequestKind::RestoreStudent,
            student_id,
            *student_id.as_uuid(),
            serde_json::json!({}),
            "assistant-3",
        );
        assert!(stores.insert_request(third).await.is_ok());
    }

    #[tokio::test]
    async fn restore_reverts_entities_but_not_requests() {
        let stores = Stores::new();
        let student = Student::new("Nour");
        let student_id = student.id;
        let _ = stores.students.insert(student_id, student).await;

        let snapshot = stores.snapshot().await;

        // Mutate an entity table and file a request.
        let warning = Warning::new(student_id, WarningKind::Behavioral, "no");
        let _ = stores.warnings.insert(warning.id, warning).await;
        let request = UpdateRequest::new(
            RequestKind::RestoreStudent,
            student_id,
            *student_id.as_uuid(),
            serde_json::json!({}),
            "assistant-1",
        );
        let _ = stores.insert_request(request).await;

        stores.restore(snapshot).await;
        assert!(stores.warnings.is_empty().await);
        assert_eq!(stores.requests.len().await, 1);
    }
}
