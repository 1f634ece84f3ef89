//! Target & streak engine.
//!
//! Generates stacked remedial targets when a performance indicator drops,
//! achieves them as it recovers, and maintains the monotonic achievement
//! streak with its growing bonus.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::event::DomainEvent;
use crate::domain::event_bus::EventBus;
use crate::domain::ids::StudentId;
use crate::domain::target::{Target, TargetCategory};
use crate::error::EngineError;
use crate::store::Stores;

/// Creates and achieves remedial targets and keeps the streak.
#[derive(Debug, Clone)]
pub struct TargetService {
    stores: Arc<Stores>,
    bus: EventBus,
}

impl TargetService {
    /// Creates a target service over the shared stores and outbox.
    #[must_use]
    pub fn new(stores: Arc<Stores>, bus: EventBus) -> Self {
        Self { stores, bus }
    }

    /// Handles a detected performance drop: resets the streak and creates
    /// one target per integer PI value from `current_pi + 1` up to and
    /// including `previous_pi`. Values already covered by an active target
    /// in the category are skipped, not overwritten. Returns the targets
    /// actually created.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Validation`] unless `previous_pi >
    /// current_pi`.
    pub async fn on_degradation(
        &self,
        student_id: StudentId,
        category: TargetCategory,
        previous_pi: i64,
        current_pi: i64,
    ) -> Result<Vec<Target>, EngineError> {
        if previous_pi <= current_pi {
            return Err(EngineError::Validation(format!(
                "degradation requires previous PI ({previous_pi}) > current PI ({current_pi})"
            )));
        }

        self.reset_streak(student_id).await;

        let existing: Vec<i64> = self
            .stores
            .active_targets(student_id, category)
            .await
            .iter()
            .map(|t| t.threshold)
            .collect();

        let mut created = Vec::new();
        for threshold in (current_pi + 1)..=previous_pi {
            if existing.contains(&threshold) {
                continue;
            }
            let target = Target::new(student_id, category, threshold);
            let _ = self.stores.targets.insert(target.id, target.clone()).await;
            self.bus.publish(DomainEvent::TargetCreated {
                target_id: target.id,
                student_id,
                category,
                threshold,
                timestamp: Utc::now(),
            });
            created.push(target);
        }

        tracing::info!(
            %student_id,
            category = category.label(),
            previous_pi,
            current_pi,
            created = created.len(),
            "performance degraded; remedial targets created"
        );
        Ok(created)
    }

    /// Handles a detected performance recovery: achieves every active
    /// target in the category whose threshold is at or below `new_pi`,
    /// incrementing the streak once per achievement (lowest threshold
    /// first). Returns the achieved targets.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if a target row disappears while
    /// being achieved.
    pub async fn on_improvement(
        &self,
        student_id: StudentId,
        category: TargetCategory,
        new_pi: i64,
    ) -> Result<Vec<Target>, EngineError> {
        let mut reachable: Vec<Target> = self
            .stores
            .active_targets(student_id, category)
            .await
            .into_iter()
            .filter(|t| t.threshold <= new_pi)
            .collect();
        reachable.sort_by_key(|t| t.threshold);

        let mut achieved = Vec::new();
        for target in reachable {
            let updated = self
                .stores
                .targets
                .update(&target.id, |t| {
                    if t.achieve() { Some(t.clone()) } else { None }
                })
                .await
                .ok_or(EngineError::TargetNotFound(target.id))?;

            // Already achieved concurrently; achievement is append-only.
            let Some(target) = updated else { continue };

            self.bus.publish(DomainEvent::TargetAchieved {
                target_id: target.id,
                student_id,
                category,
                threshold: target.threshold,
                timestamp: Utc::now(),
            });
            self.bump_streak(student_id).await;
            achieved.push(target);
        }

        if !achieved.is_empty() {
            tracing::info!(
                %student_id,
                category = category.label(),
                new_pi,
                achieved = achieved.len(),
                "performance recovered; targets achieved"
            );
        }
        Ok(achieved)
    }

    async fn reset_streak(&self, student_id: StudentId) {
        let _ = self.stores.streak_or_init(student_id).await;
        let after = self
            .stores
            .streaks
            .update(&student_id, |s| {
                s.reset();
                (s.current_streak, s.cumulative_points)
            })
            .await;
        if let Some((streak, cumulative_points)) = after {
            self.bus.publish(DomainEvent::StreakUpdated {
                student_id,
                streak,
                cumulative_points,
                timestamp: Utc::now(),
            });
        }
    }

    async fn bump_streak(&self, student_id: StudentId) {
        let _ = self.stores.streak_or_init(student_id).await;
        let after = self
            .stores
            .streaks
            .update(&student_id, |s| {
                let _ = s.record_achievement();
                (s.current_streak, s.cumulative_points)
            })
            .await;
        if let Some((streak, cumulative_points)) = after {
            self.bus.publish(DomainEvent::StreakUpdated {
                student_id,
                streak,
                cumulative_points,
                timestamp: Utc::now(),
            });
        }
    }
}
