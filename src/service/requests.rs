//! Update request orchestrator.
//!
//! Non-privileged actors submit change requests; privileged actors
//! approve, reject, or block them. Approval executes the requested
//! mutation inside a snapshot transaction and then runs the same cascade
//! the primary mutation path runs. Handler or cascade failure marks the
//! request FAILED and restores the snapshot, so no partial mutation stays
//! visible; the FAILED status itself survives the rollback.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::event::DomainEvent;
use crate::domain::event_bus::EventBus;
use crate::domain::facts::BehavioralIncident;
use crate::domain::ids::{RequestId, StudentId};
use crate::domain::student::StudentStatus;
use crate::domain::update_request::{
    EntityKind, RequestKind, RequestPayload, UpdateRequest,
};
use crate::error::EngineError;
use crate::service::consecutivity::ConsecutivityTracker;
use crate::service::points::PointsService;
use crate::service::targets::TargetService;
use crate::service::warnings::WarningService;
use crate::store::Stores;

/// Port answering whether an actor may approve, reject, or block
/// requests.
pub trait PrivilegeCheck: std::fmt::Debug + Send + Sync {
    /// Returns `true` if the actor holds the privileged role.
    fn is_privileged(&self, actor: &str) -> bool;
}

/// Fixed-set privilege check used by the demo driver and tests.
#[derive(Debug, Default)]
pub struct StaticPrivileges {
    privileged: HashSet<String>,
}

impl StaticPrivileges {
    /// Creates a check that grants privilege to exactly the given actors.
    #[must_use]
    pub fn new<I, S>(actors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            privileged: actors.into_iter().map(Into::into).collect(),
        }
    }
}

impl PrivilegeCheck for StaticPrivileges {
    fn is_privileged(&self, actor: &str) -> bool {
        self.privileged.contains(actor)
    }
}

/// Orchestrates the update-request lifecycle.
#[derive(Debug, Clone)]
pub struct UpdateRequestService {
    stores: Arc<Stores>,
    bus: EventBus,
    privileges: Arc<dyn PrivilegeCheck>,
    tracker: ConsecutivityTracker,
    warnings: WarningService,
    points: PointsService,
    targets: TargetService,
    /// Upper bound for any submitted points value.
    max_points: i64,
}

impl UpdateRequestService {
    /// Creates the orchestrator over the shared stores, outbox, privilege
    /// port, and the downstream services its cascade calls.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stores: Arc<Stores>,
        bus: EventBus,
        privileges: Arc<dyn PrivilegeCheck>,
        tracker: ConsecutivityTracker,
        warnings: WarningService,
        points: PointsService,
        targets: TargetService,
        max_points: i64,
    ) -> Self {
        Self {
            stores,
            bus,
            privileges,
            tracker,
            warnings,
            points,
            targets,
            max_points,
        }
    }

    /// Submits a change request on behalf of a non-privileged actor.
    ///
    /// Validates the payload against its declared kind, checks value
    /// bounds, verifies the target entity exists, and rejects the
    /// submission if an in-flight request for the same entity already
    /// exists. Nothing is mutated on any validation failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MalformedPayload`],
    /// [`EngineError::PointsOutOfRange`], a not-found error, or
    /// [`EngineError::DuplicatePending`].
    pub async fn submit(
        &self,
        kind: RequestKind,
        student_id: StudentId,
        payload: serde_json::Value,
        requester: &str,
    ) -> Result<UpdateRequest, EngineError> {
        let parsed = RequestPayload::parse(kind, &payload)?;
        self.validate_bounds(&parsed)?;
        self.verify_entity(student_id, &parsed).await?;

        let entity_id = parsed.conflict_id(student_id);
        let request = UpdateRequest::new(kind, student_id, entity_id, payload, requester);
        self.stores.insert_request(request.clone()).await?;

        tracing::info!(
            request_id = %request.id,
            kind = kind.label(),
            %student_id,
            requester,
            "update request submitted"
        );
        self.bus.publish(DomainEvent::RequestSubmitted {
            request_id: request.id,
            kind,
            student_id,
            requester: requester.to_string(),
            timestamp: Utc::now(),
        });
        Ok(request)
    }

    /// Rejects a pending request. Never touches the target entity.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] for non-privileged actors,
    /// [`EngineError::RequestNotFound`], or
    /// [`EngineError::InvalidTransition`] when not pending.
    pub async fn reject(
        &self,
        actor: &str,
        request_id: RequestId,
        reason: &str,
    ) -> Result<UpdateRequest, EngineError> {
        self.require_privilege(actor, "reject")?;
        let request = self
            .persist_transition(request_id, |r| r.reject(actor, reason))
            .await?;

        self.bus.publish(DomainEvent::RequestRejected {
            request_id,
            reviewer: actor.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        Ok(request)
    }

    /// Administratively blocks a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`] for non-privileged actors,
    /// [`EngineError::RequestNotFound`], or
    /// [`EngineError::InvalidTransition`] when not pending.
    pub async fn block(
        &self,
        actor: &str,
        request_id: RequestId,
        reason: &str,
    ) -> Result<UpdateRequest, EngineError> {
        self.require_privilege(actor, "block")?;
        let request = self
            .persist_transition(request_id, |r| r.block(actor, reason))
            .await?;

        self.bus.publish(DomainEvent::RequestBlocked {
            request_id,
            reviewer: actor.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        Ok(request)
    }

    /// Approves a pending request and executes it.
    ///
    /// Re-verifies the target entity, transitions to APPROVED, snapshots
    /// the stores, runs the kind-specific handler, and on success runs the
    /// same cascade the primary path runs. Handler or cascade failure
    /// restores the snapshot and records the request as FAILED — the
    /// outcome is reported through the returned request's status, not as
    /// an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Unauthorized`], a not-found error from
    /// re-verification (the request stays PENDING), or
    /// [`EngineError::InvalidTransition`] when not pending.
    pub async fn approve(
        &self,
        actor: &str,
        request_id: RequestId,
        notes: Option<String>,
    ) -> Result<UpdateRequest, EngineError> {
        self.require_privilege(actor, "approve")?;

        let request = self
            .stores
            .requests
            .get(&request_id)
            .await
            .ok_or(EngineError::RequestNotFound(request_id))?;
        let payload = RequestPayload::parse(request.kind, &request.payload)?;

        // Conflict and existence failures surface before any transition
        // or transaction; the request stays PENDING.
        self.verify_entity(request.student_id, &payload).await?;

        let request = self
            .persist_transition(request_id, |r| r.approve(actor, notes.clone()))
            .await?;
        self.bus.publish(DomainEvent::RequestApproved {
            request_id,
            reviewer: actor.to_string(),
            timestamp: Utc::now(),
        });

        // Transaction scope: everything the handler and cascade touch is
        // restored on failure; the request row itself is not covered.
        let snapshot = self.stores.snapshot().await;

        let outcome = self.execute_and_cascade(&request, &payload).await;
        match outcome {
            Ok(()) => {
                let request = self
                    .persist_transition(request_id, UpdateRequest::mark_completed)
                    .await?;
                self.bus.publish(DomainEvent::RequestCompleted {
                    request_id,
                    timestamp: Utc::now(),
                });
                tracing::info!(%request_id, "update request completed");
                Ok(request)
            }
            Err(err) => {
                let reason = format!("[{}] {err}", err.error_code());
                self.stores.restore(snapshot).await;
                let request = self
                    .persist_transition(request_id, |r| r.mark_failed(reason.clone()))
                    .await?;
                self.bus.publish(DomainEvent::RequestFailed {
                    request_id,
                    reason,
                    timestamp: Utc::now(),
                });
                tracing::warn!(%request_id, error = %err, "update request failed; rolled back");
                Ok(request)
            }
        }
    }

    async fn execute_and_cascade(
        &self,
        request: &UpdateRequest,
        payload: &RequestPayload,
    ) -> Result<(), EngineError> {
        self.execute_handler(request, payload).await?;
        self.persist_transition(request.id, UpdateRequest::mark_applied)
            .await?;
        self.run_cascade(request, payload).await
    }

    /// Routes to the kind-specific mutation handler.
    async fn execute_handler(
        &self,
        request: &UpdateRequest,
        payload: &RequestPayload,
    ) -> Result<(), EngineError> {
        let student_id = request.student_id;
        match payload {
            RequestPayload::AttendanceStatusChange { lesson_id, status } => {
                self.stores
                    .attendance
                    .update(&(student_id, *lesson_id), |record| {
                        record.status = *status;
                        record.recorded_at = Utc::now();
                    })
                    .await
                    .ok_or(EngineError::EntityNotFound {
                        kind: EntityKind::Attendance,
                        id: *lesson_id.as_uuid(),
                    })
            }
            RequestPayload::HomeworkStatusChange { lesson_id, status } => {
                self.stores
                    .homework
                    .update(&(student_id, *lesson_id), |record| {
                        record.status = *status;
                        record.recorded_at = Utc::now();
                    })
                    .await
                    .ok_or(EngineError::EntityNotFound {
                        kind: EntityKind::Homework,
                        id: *lesson_id.as_uuid(),
                    })
            }
            RequestPayload::QuizScoreCorrection { quiz_id, score } => {
                self.stores
                    .quiz_scores
                    .update(&(student_id, *quiz_id), |record| {
                        record.score = *score;
                        record.graded_at = Utc::now();
                    })
                    .await
                    .ok_or(EngineError::EntityNotFound {
                        kind: EntityKind::QuizScore,
                        id: *quiz_id.as_uuid(),
                    })
            }
            RequestPayload::AddIncident {
                lesson_id,
                kind,
                note,
            } => {
                let incident =
                    BehavioralIncident::new(student_id, *lesson_id, *kind, note.clone());
                if !self
                    .stores
                    .incidents
                    .insert(incident.id, incident)
                    .await
                {
                    return Err(EngineError::Internal(
                        "incident id collision".to_string(),
                    ));
                }
                Ok(())
            }
            RequestPayload::RemoveIncident { incident_id } => self
                .stores
                .incidents
                .remove(incident_id)
                .await
                .map(|_| ())
                .ok_or(EngineError::EntityNotFound {
                    kind: EntityKind::Incident,
                    id: *incident_id.as_uuid(),
                }),
            RequestPayload::RestoreStudent {} => {
                self.stores
                    .students
                    .update(&student_id, |student| {
                        student.status = StudentStatus::Active;
                    })
                    .await
                    .ok_or(EngineError::StudentNotFound(student_id))?;
                self.bus.publish(DomainEvent::StudentRestored {
                    student_id,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
        }
    }

    /// Runs the same derived-state cascade the primary mutation path runs
    /// for the affected fact.
    async fn run_cascade(
        &self,
        request: &UpdateRequest,
        payload: &RequestPayload,
    ) -> Result<(), EngineError> {
        let student_id = request.student_id;
        match payload {
            RequestPayload::AttendanceStatusChange { lesson_id, .. } => {
                // The corrected record re-enters the tracker as a fresh
                // signal: absence runs reflect correction order, not
                // lesson chronology.
                let record = self
                    .stores
                    .attendance
                    .get(&(student_id, *lesson_id))
                    .await
                    .ok_or(EngineError::EntityNotFound {
                        kind: EntityKind::Attendance,
                        id: *lesson_id.as_uuid(),
                    })?;
                let outcome = self.tracker.record_attendance(&record).await?;
                if let Some(_class) = outcome.crossing {
                    let _ = self
                        .warnings
                        .handle_absence_threshold(student_id, outcome.count)
                        .await?;
                }
                let _ = self.points.recompute_attendance(student_id).await?;
                self.points.publish_rankings().await;
                Ok(())
            }
            RequestPayload::HomeworkStatusChange { .. } => {
                let _ = self.points.recompute_homework(student_id).await?;
                self.points.publish_rankings().await;
                Ok(())
            }
            RequestPayload::QuizScoreCorrection { .. } => {
                let _ = self.points.recompute_quiz(student_id).await?;
                self.points.publish_rankings().await;
                Ok(())
            }
            RequestPayload::AddIncident { .. } => {
                let incident = self
                    .stores
                    .latest_incident(student_id)
                    .await
                    .ok_or_else(|| {
                        EngineError::Internal("incident missing after insert".to_string())
                    })?;
                let previous_kind = self
                    .stores
                    .incidents_for_student(student_id)
                    .await
                    .iter()
                    .rev()
                    .find(|i| i.id != incident.id)
                    .map(|i| i.kind);
                let _ = self.tracker.record_incident(&incident, previous_kind).await?;
                let _ = self.warnings.review_behavioral(student_id).await?;
                Ok(())
            }
            RequestPayload::RemoveIncident { .. } => {
                self.rebuild_behavioral_run(student_id).await?;
                let _ = self.warnings.review_behavioral(student_id).await?;
                Ok(())
            }
            RequestPayload::RestoreStudent {} => {
                let _ = self.warnings.on_student_restored(student_id).await?;
                // Consecutivity reset is best-effort on restore: log and
                // continue rather than fail the approval.
                if let Err(err) = self.tracker.reset(student_id).await {
                    tracing::warn!(%student_id, error = %err, "consecutivity reset failed");
                }
                let _ = self.points.recompute_all(student_id).await?;
                self.points.publish_rankings().await;
                Ok(())
            }
        }
    }

    /// Re-derives the behavioral consecutivity record from the remaining
    /// incident history after a removal. No threshold events fire from a
    /// correction.
    async fn rebuild_behavioral_run(&self, student_id: StudentId) -> Result<(), EngineError> {
        let incidents = self.stores.incidents_for_student(student_id).await;
        let run_kind = incidents.last().map(|i| i.kind);
        let run_len = match run_kind {
            Some(kind) => u32::try_from(
                incidents
                    .iter()
                    .rev()
                    .take_while(|i| i.kind == kind)
                    .count(),
            )
            .unwrap_or(u32::MAX),
            None => 0,
        };
        let last_lesson = incidents.last().map(|i| i.lesson_id);

        let _ = self
            .stores
            .consecutivity_or_init(
                student_id,
                crate::domain::consecutivity::TrackedDimension::BehavioralIncident,
            )
            .await;
        self.stores
            .consecutivity
            .update(
                &(
                    student_id,
                    crate::domain::consecutivity::TrackedDimension::BehavioralIncident,
                ),
                |row| {
                    row.count = run_len;
                    row.last_incident_kind = run_kind;
                    row.last_lesson_id = last_lesson;
                    row.updated_at = Utc::now();
                },
            )
            .await
            .ok_or_else(|| {
                EngineError::Storage("consecutivity record vanished during rebuild".to_string())
            })
    }

    fn validate_bounds(&self, payload: &RequestPayload) -> Result<(), EngineError> {
        if let RequestPayload::QuizScoreCorrection { score, .. } = payload {
            if *score < 0 || *score > self.max_points {
                return Err(EngineError::PointsOutOfRange {
                    value: *score,
                    max: self.max_points,
                });
            }
        }
        Ok(())
    }

    /// Existence checks shared by submit and approve-time re-verification.
    async fn verify_entity(
        &self,
        student_id: StudentId,
        payload: &RequestPayload,
    ) -> Result<(), EngineError> {
        let student = self.stores.student(student_id).await?;
        if let RequestPayload::RestoreStudent {} = payload {
            if student.status != StudentStatus::Archived {
                return Err(EngineError::Validation(format!(
                    "student {student_id} is not archived"
                )));
            }
        }
        if let RequestPayload::RemoveIncident { incident_id } = payload {
            let incident = self.stores.incidents.get(incident_id).await.ok_or(
                EngineError::EntityNotFound {
                    kind: EntityKind::Incident,
                    id: *incident_id.as_uuid(),
                },
            )?;
            if incident.student_id != student_id {
                return Err(EngineError::Validation(format!(
                    "incident {incident_id} does not belong to student {student_id}"
                )));
            }
        }
        Ok(())
    }

    fn require_privilege(&self, actor: &str, action: &'static str) -> Result<(), EngineError> {
        if self.privileges.is_privileged(actor) {
            return Ok(());
        }
        Err(EngineError::Unauthorized {
            actor: actor.to_string(),
            action,
        })
    }

    async fn persist_transition<F>(
        &self,
        request_id: RequestId,
        f: F,
    ) -> Result<UpdateRequest, EngineError>
    where
        F: FnOnce(&mut UpdateRequest) -> Result<(), EngineError>,
    {
        self.stores
            .requests
            .update(&request_id, |r| f(r).map(|()| r.clone()))
            .await
            .ok_or(EngineError::RequestNotFound(request_id))?
    }
}
