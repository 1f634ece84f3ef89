//! Consecutivity tracker: running consecutive counts per student and
//! dimension, with threshold crossing detection.
//!
//! The two dimensions deliberately differ in trigger policy:
//!
//! - **Absence** is edge-triggered: the warning-class event fires exactly
//!   when the count reaches 2 and the archival-class event exactly when it
//!   reaches 3; counts of 4, 5, ... fire nothing further.
//! - **Behavioral** is level-triggered: every incident that leaves the
//!   same-kind run at 2 or more fires a threshold event.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::consecutivity::TrackedDimension;
use crate::domain::event::{DomainEvent, ThresholdClass};
use crate::domain::event_bus::EventBus;
use crate::domain::facts::{AttendanceRecord, AttendanceStatus, BehavioralIncident, IncidentKind};
use crate::domain::ids::StudentId;
use crate::error::EngineError;
use crate::store::Stores;

/// Absence count that raises a consecutive-absence warning.
const ABSENCE_WARNING_COUNT: u32 = 2;
/// Absence count that raises an archival-class warning.
const ABSENCE_ARCHIVAL_COUNT: u32 = 3;
/// Same-kind incident run length at which behavioral thresholds fire.
const BEHAVIORAL_RUN_LENGTH: u32 = 2;

/// Result of feeding one attendance mark into the tracker.
#[derive(Debug, Clone, Copy)]
pub struct AbsenceOutcome {
    /// New consecutive-absence count.
    pub count: u32,
    /// Threshold crossed by this mark, if any.
    pub crossing: Option<ThresholdClass>,
}

/// Result of feeding one behavioral incident into the tracker.
#[derive(Debug, Clone, Copy)]
pub struct BehavioralOutcome {
    /// New same-kind run length.
    pub count: u32,
    /// `true` whenever the run length is at the threshold or beyond.
    pub threshold_hit: bool,
}

/// Maintains per-(student, dimension) consecutive counts.
#[derive(Debug, Clone)]
pub struct ConsecutivityTracker {
    stores: Arc<Stores>,
    bus: EventBus,
}

impl ConsecutivityTracker {
    /// Creates a tracker over the shared stores and outbox.
    #[must_use]
    pub fn new(stores: Arc<Stores>, bus: EventBus) -> Self {
        Self { stores, bus }
    }

    /// Feeds one attendance mark into the absence dimension.
    ///
    /// ABSENT increments the stored count and records the lesson; PRESENT
    /// resets the count to 0. Always publishes `consecutivity_updated`;
    /// publishes a threshold event only on the exact crossings.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn record_attendance(
        &self,
        record: &AttendanceRecord,
    ) -> Result<AbsenceOutcome, EngineError> {
        let key = (record.student_id, TrackedDimension::Absence);
        let _ = self
            .stores
            .consecutivity_or_init(record.student_id, TrackedDimension::Absence)
            .await;

        let count = self
            .stores
            .consecutivity
            .update(&key, |row| {
                match record.status {
                    AttendanceStatus::Absent => {
                        row.count += 1;
                        row.last_lesson_id = Some(record.lesson_id);
                    }
                    AttendanceStatus::Present => {
                        row.count = 0;
                        row.last_lesson_id = Some(record.lesson_id);
                    }
                }
                row.updated_at = Utc::now();
                row.count
            })
            .await
            .ok_or_else(|| {
                EngineError::Storage("consecutivity record vanished during update".to_string())
            })?;

        self.bus.publish(DomainEvent::ConsecutivityUpdated {
            student_id: record.student_id,
            dimension: TrackedDimension::Absence,
            count,
            lesson_id: record.lesson_id,
            timestamp: Utc::now(),
        });

        // Edge-triggered: `==`, not `>=`, so each boundary fires once.
        let crossing = if record.status == AttendanceStatus::Absent {
            match count {
                ABSENCE_WARNING_COUNT => Some(ThresholdClass::Warning),
                ABSENCE_ARCHIVAL_COUNT => Some(ThresholdClass::Archival),
                _ => None,
            }
        } else {
            None
        };

        if let Some(class) = crossing {
            tracing::info!(
                student_id = %record.student_id,
                count,
                ?class,
                "absence threshold crossed"
            );
            self.bus.publish(DomainEvent::ConsecutiveThresholdReached {
                student_id: record.student_id,
                dimension: TrackedDimension::Absence,
                count,
                class,
                lesson_id: record.lesson_id,
                timestamp: Utc::now(),
            });
        }

        Ok(AbsenceOutcome { count, crossing })
    }

    /// Feeds one behavioral incident into the behavioral dimension.
    ///
    /// `previous_kind` is the kind of the immediately preceding incident
    /// for this student, if any. Same kind extends the run; a different
    /// kind (or no prior incident) restarts it at 1.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn record_incident(
        &self,
        incident: &BehavioralIncident,
        previous_kind: Option<IncidentKind>,
    ) -> Result<BehavioralOutcome, EngineError> {
        let key = (incident.student_id, TrackedDimension::BehavioralIncident);
        let _ = self
            .stores
            .consecutivity_or_init(incident.student_id, TrackedDimension::BehavioralIncident)
            .await;

        let same_kind = previous_kind == Some(incident.kind);
        let count = self
            .stores
            .consecutivity
            .update(&key, |row| {
                row.count = if same_kind { row.count + 1 } else { 1 };
                row.last_lesson_id = Some(incident.lesson_id);
                row.last_incident_kind = Some(incident.kind);
                row.updated_at = Utc::now();
                row.count
            })
            .await
            .ok_or_else(|| {
                EngineError::Storage("consecutivity record vanished during update".to_string())
            })?;

        self.bus.publish(DomainEvent::ConsecutivityUpdated {
            student_id: incident.student_id,
            dimension: TrackedDimension::BehavioralIncident,
            count,
            lesson_id: incident.lesson_id,
            timestamp: Utc::now(),
        });

        // Level-triggered: fires on every qualifying incident.
        let threshold_hit = count >= BEHAVIORAL_RUN_LENGTH;
        if threshold_hit {
            self.bus.publish(DomainEvent::ConsecutiveThresholdReached {
                student_id: incident.student_id,
                dimension: TrackedDimension::BehavioralIncident,
                count,
                class: ThresholdClass::Warning,
                lesson_id: incident.lesson_id,
                timestamp: Utc::now(),
            });
        }

        Ok(BehavioralOutcome {
            count,
            threshold_hit,
        })
    }

    /// Zeroes both dimensions for a student. Used on restore; callers
    /// treat the reset as best-effort and log rather than propagate.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if a record cannot be persisted.
    pub async fn reset(&self, student_id: StudentId) -> Result<(), EngineError> {
        for dimension in [
            TrackedDimension::Absence,
            TrackedDimension::BehavioralIncident,
        ] {
            let _ = self
                .stores
                .consecutivity_or_init(student_id, dimension)
                .await;
            self.stores
                .consecutivity
                .update(&(student_id, dimension), |row| row.reset())
                .await
                .ok_or_else(|| {
                    EngineError::Storage("consecutivity record vanished during reset".to_string())
                })?;
        }
        tracing::debug!(%student_id, "consecutivity reset");
        Ok(())
    }
}
