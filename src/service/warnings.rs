//! Warning manager: generation and idempotent resolution of warnings.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::event::DomainEvent;
use crate::domain::event_bus::EventBus;
use crate::domain::ids::{StudentId, WarningId};
use crate::domain::warning::{Warning, WarningKind};
use crate::error::EngineError;
use crate::store::Stores;

/// Generates and resolves warning records.
#[derive(Debug, Clone)]
pub struct WarningService {
    stores: Arc<Stores>,
    bus: EventBus,
    /// Incidents within one calendar month that trigger a behavioral
    /// warning.
    monthly_incident_threshold: usize,
}

impl WarningService {
    /// Creates a warning service over the shared stores and outbox.
    #[must_use]
    pub fn new(stores: Arc<Stores>, bus: EventBus, monthly_incident_threshold: usize) -> Self {
        Self {
            stores,
            bus,
            monthly_incident_threshold,
        }
    }

    /// Reacts to an absence threshold crossing: derives the warning kind
    /// from the count (>= 3 archival, == 2 consecutive absence) and
    /// creates an active warning.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] for counts below the warning
    /// boundary, which never cross a threshold.
    pub async fn handle_absence_threshold(
        &self,
        student_id: StudentId,
        count: u32,
    ) -> Result<Warning, EngineError> {
        let (kind, reason) = if count >= 3 {
            (
                WarningKind::Archived,
                format!("{count} consecutive absences; archival recommended"),
            )
        } else if count == 2 {
            (
                WarningKind::ConsecutiveAbsence,
                "2 consecutive absences".to_string(),
            )
        } else {
            return Err(EngineError::Validation(format!(
                "absence count {count} does not cross a warning threshold"
            )));
        };
        self.create(student_id, kind, reason).await
    }

    /// Re-derives the behavioral rules for a student after an incident was
    /// added: (a) the last two incidents share a kind, or (b) any single
    /// calendar month holds at least the configured number of incidents.
    /// Either rule creates an active BEHAVIORAL warning whose reason names
    /// the rule that fired. Returns `None` when neither holds.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the warning cannot be persisted.
    pub async fn review_behavioral(
        &self,
        student_id: StudentId,
    ) -> Result<Option<Warning>, EngineError> {
        let incidents = self.stores.incidents_for_student(student_id).await;

        let same_kind_run = incidents
            .len()
            .checked_sub(2)
            .and_then(|i| Some((incidents.get(i)?, incidents.get(i + 1)?)))
            .is_some_and(|(a, b)| a.kind == b.kind);

        let mut per_month: HashMap<(i32, u32), usize> = HashMap::new();
        for incident in &incidents {
            *per_month.entry(incident.month_key()).or_insert(0) += 1;
        }
        let monthly_hit = per_month
            .values()
            .any(|&n| n >= self.monthly_incident_threshold);

        let reason = if same_kind_run {
            let kind_label = incidents
                .last()
                .map(|i| i.kind.label())
                .unwrap_or("unknown");
            format!("two consecutive incidents of the same kind ({kind_label})")
        } else if monthly_hit {
            format!(
                "at least {} incidents within one calendar month",
                self.monthly_incident_threshold
            )
        } else {
            return Ok(None);
        };

        let warning = self
            .create(student_id, WarningKind::Behavioral, reason)
            .await?;
        Ok(Some(warning))
    }

    /// Resolves a single warning. Idempotent: resolving an already
    /// resolved warning is a no-op and returns `false` without emitting a
    /// second resolution event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WarningNotFound`] when the id is unknown.
    pub async fn resolve_warning(
        &self,
        warning_id: WarningId,
        reason: &str,
    ) -> Result<bool, EngineError> {
        let resolved = self
            .stores
            .warnings
            .update(&warning_id, |w| {
                if w.resolve(reason) {
                    Some(w.clone())
                } else {
                    None
                }
            })
            .await
            .ok_or(EngineError::WarningNotFound(warning_id))?;

        if let Some(warning) = resolved {
            self.publish_resolved(&warning, reason);
            return Ok(true);
        }
        Ok(false)
    }

    /// Resolves every active warning of one kind for a student. Returns
    /// the number of warnings actually resolved.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if a warning row disappears while
    /// being resolved.
    pub async fn resolve_warnings_by_student(
        &self,
        student_id: StudentId,
        kind: WarningKind,
        reason: &str,
    ) -> Result<usize, EngineError> {
        let active = self.stores.active_warnings(student_id, Some(kind)).await;
        let mut resolved = 0;
        for warning in active {
            if self.resolve_warning(warning.id, reason).await? {
                resolved += 1;
            }
        }
        Ok(resolved)
    }

    /// Reacts to a student restoration: resolves all active ARCHIVED and
    /// CONSECUTIVE_ABSENCE warnings. Behavioral warnings are untouched —
    /// restoration does not erase behavioral history.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if a resolution cannot be persisted.
    pub async fn on_student_restored(&self, student_id: StudentId) -> Result<usize, EngineError> {
        let mut resolved = 0;
        for kind in [WarningKind::Archived, WarningKind::ConsecutiveAbsence] {
            resolved += self
                .resolve_warnings_by_student(student_id, kind, "student restored")
                .await?;
        }
        tracing::info!(%student_id, resolved, "absence warnings resolved on restore");
        Ok(resolved)
    }

    async fn create(
        &self,
        student_id: StudentId,
        kind: WarningKind,
        reason: String,
    ) -> Result<Warning, EngineError> {
        let warning = Warning::new(student_id, kind, reason);
        if !self
            .stores
            .warnings
            .insert(warning.id, warning.clone())
            .await
        {
            return Err(EngineError::Internal(format!(
                "warning id collision: {}",
                warning.id
            )));
        }

        tracing::info!(
            %student_id,
            warning_id = %warning.id,
            kind = kind.label(),
            "warning generated"
        );
        self.bus.publish(DomainEvent::WarningGenerated {
            warning_id: warning.id,
            student_id,
            kind,
            reason: warning.reason.clone(),
            timestamp: Utc::now(),
        });
        Ok(warning)
    }

    fn publish_resolved(&self, warning: &Warning, reason: &str) {
        self.bus.publish(DomainEvent::WarningResolved {
            warning_id: warning.id,
            student_id: warning.student_id,
            kind: warning.kind,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::facts::{BehavioralIncident, IncidentKind};
    use crate::domain::ids::LessonId;

    fn make_service() -> (WarningService, Arc<Stores>, EventBus) {
        let stores = Arc::new(Stores::new());
        let bus = EventBus::new(100);
        let service = WarningService::new(Arc::clone(&stores), bus.clone(), 3);
        (service, stores, bus)
    }

    async fn add_incident(stores: &Stores, student_id: StudentId, kind: IncidentKind) {
        let incident = BehavioralIncident::new(student_id, LessonId::new(), kind, "note");
        let _ = stores.incidents.insert(incident.id, incident).await;
    }

    #[tokio::test]
    async fn absence_count_two_creates_consecutive_absence_warning() {
        let (service, _, _) = make_service();
        let warning = service
            .handle_absence_threshold(StudentId::new(), 2)
            .await;
        let Ok(warning) = warning else {
            panic!("expected warning");
        };
        assert_eq!(warning.kind, WarningKind::ConsecutiveAbsence);
    }

    #[tokio::test]
    async fn absence_count_three_creates_archival_warning() {
        let (service, _, _) = make_service();
        let warning = service
            .handle_absence_threshold(StudentId::new(), 3)
            .await;
        let Ok(warning) = warning else {
            panic!("expected warning");
        };
        assert_eq!(warning.kind, WarningKind::Archived);
        assert!(warning.reason.contains("archival"));
    }

    #[tokio::test]
    async fn sub_threshold_count_is_a_validation_error() {
        let (service, _, _) = make_service();
        let result = service.handle_absence_threshold(StudentId::new(), 1).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn behavioral_same_kind_rule_fires() {
        let (service, stores, _) = make_service();
        let student_id = StudentId::new();
        add_incident(&stores, student_id, IncidentKind::Disruption).await;
        add_incident(&stores, student_id, IncidentKind::Disruption).await;

        let warning = service.review_behavioral(student_id).await;
        let Ok(Some(warning)) = warning else {
            panic!("expected behavioral warning");
        };
        assert_eq!(warning.kind, WarningKind::Behavioral);
        assert!(warning.reason.contains("same kind"));
    }

    #[tokio::test]
    async fn behavioral_monthly_rule_fires() {
        let (service, stores, _) = make_service();
        let student_id = StudentId::new();
        // Three different kinds in the same month: the same-kind rule
        // stays silent, the monthly rule fires.
        add_incident(&stores, student_id, IncidentKind::Disruption).await;
        add_incident(&stores, student_id, IncidentKind::Lateness).await;
        add_incident(&stores, student_id, IncidentKind::MissingMaterials).await;

        let warning = service.review_behavioral(student_id).await;
        let Ok(Some(warning)) = warning else {
            panic!("expected behavioral warning");
        };
        assert!(warning.reason.contains("calendar month"));
    }

    #[tokio::test]
    async fn no_rule_no_warning() {
        let (service, stores, _) = make_service();
        let student_id = StudentId::new();
        add_incident(&stores, student_id, IncidentKind::Disruption).await;

        let result = service.review_behavioral(student_id).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn resolution_is_idempotent() {
        let (service, _, bus) = make_service();
        let mut rx = bus.subscribe();
        let student_id = StudentId::new();

        let warning = service.handle_absence_threshold(student_id, 2).await;
        let Ok(warning) = warning else {
            panic!("expected warning");
        };
        let _ = rx.try_recv(); // drain warning_generated

        let first = service.resolve_warning(warning.id, "cleared").await;
        assert!(matches!(first, Ok(true)));
        let second = service.resolve_warning(warning.id, "cleared again").await;
        assert!(matches!(second, Ok(false)));

        // Exactly one resolution event.
        let mut resolution_events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_type_str() == "warning_resolved" {
                resolution_events += 1;
            }
        }
        assert_eq!(resolution_events, 1);
    }

    #[tokio::test]
    async fn restore_resolves_absence_kinds_but_not_behavioral() {
        let (service, stores, _) = make_service();
        let student_id = StudentId::new();

        let _ = service.handle_absence_threshold(student_id, 2).await;
        let _ = service.handle_absence_threshold(student_id, 3).await;
        add_incident(&stores, student_id, IncidentKind::Disrespect).await;
        add_incident(&stores, student_id, IncidentKind::Disrespect).await;
        let _ = service.review_behavioral(student_id).await;

        let resolved = service.on_student_restored(student_id).await;
        assert!(matches!(resolved, Ok(2)));

        let behavioral = stores
            .active_warnings(student_id, Some(WarningKind::Behavioral))
            .await;
        assert_eq!(behavioral.len(), 1);
        let absence = stores
            .active_warnings(student_id, Some(WarningKind::ConsecutiveAbsence))
            .await;
        assert!(absence.is_empty());
    }

    #[tokio::test]
    async fn resolving_unknown_warning_is_not_found() {
        let (service, _, _) = make_service();
        let result = service.resolve_warning(WarningId::new(), "x").await;
        assert!(matches!(result, Err(EngineError::WarningNotFound(_))));
    }
}
