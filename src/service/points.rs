//! Points & ranking engine.
//!
//! Four independently recomputed sub-totals per student (quiz, attendance,
//! homework, target) with a derived total, and a deterministically
//! tie-broken ranking over active students. Computing the ranking is pure;
//! the rankings-changed event is published from the points-mutation paths
//! only, never from reads.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::event::{DomainEvent, RankingEntry};
use crate::domain::event_bus::EventBus;
use crate::domain::facts::AttendanceStatus;
use crate::domain::ids::StudentId;
use crate::domain::points::{Fasee7Points, RankedStudent};
use crate::error::EngineError;
use crate::store::Stores;

/// Which sub-total a recompute entry point refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Quiz,
    Attendance,
    Homework,
    Target,
}

/// Maintains points records and produces the program ranking.
#[derive(Debug, Clone)]
pub struct PointsService {
    stores: Arc<Stores>,
    bus: EventBus,
    /// Number of leading entries carried by the rankings-changed event.
    top_n: usize,
}

impl PointsService {
    /// Creates a points service over the shared stores and outbox.
    #[must_use]
    pub fn new(stores: Arc<Stores>, bus: EventBus, top_n: usize) -> Self {
        Self {
            stores,
            bus,
            top_n,
        }
    }

    /// Recomputes the quiz sub-total from the sum of quiz scores earned.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn recompute_quiz(&self, student_id: StudentId) -> Result<Fasee7Points, EngineError> {
        self.recompute(student_id, &[Component::Quiz]).await
    }

    /// Recomputes the attendance sub-total from the count of PRESENT
    /// marks.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn recompute_attendance(
        &self,
        student_id: StudentId,
    ) -> Result<Fasee7Points, EngineError> {
        self.recompute(student_id, &[Component::Attendance]).await
    }

    /// Recomputes the homework sub-total from the weighted sum of homework
    /// statuses.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn recompute_homework(
        &self,
        student_id: StudentId,
    ) -> Result<Fasee7Points, EngineError> {
        self.recompute(student_id, &[Component::Homework]).await
    }

    /// Recomputes the target sub-total from the student's cumulative
    /// streak points.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn recompute_target(
        &self,
        student_id: StudentId,
    ) -> Result<Fasee7Points, EngineError> {
        self.recompute(student_id, &[Component::Target]).await
    }

    /// Recomputes all four sub-totals in one pass; bootstrap/repair entry
    /// point.
    ///
    /// # Errors
    ///
    /// Returns a storage-tagged error if the record cannot be persisted.
    pub async fn recompute_all(&self, student_id: StudentId) -> Result<Fasee7Points, EngineError> {
        self.recompute(
            student_id,
            &[
                Component::Quiz,
                Component::Attendance,
                Component::Homework,
                Component::Target,
            ],
        )
        .await
    }

    async fn recompute(
        &self,
        student_id: StudentId,
        components: &[Component],
    ) -> Result<Fasee7Points, EngineError> {
        let mut points = self.stores.points_or_init(student_id).await;

        for component in components {
            match component {
                Component::Quiz => {
                    points.quiz_points = self
                        .stores
                        .quiz_scores
                        .find(|s| s.student_id == student_id)
                        .await
                        .iter()
                        .map(|s| s.score)
                        .sum();
                }
                Component::Attendance => {
                    points.attendance_points = i64::try_from(
                        self.stores
                            .attendance
                            .find(|a| {
                                a.student_id == student_id
                                    && a.status == AttendanceStatus::Present
                            })
                            .await
                            .len(),
                    )
                    .unwrap_or(i64::MAX);
                }
                Component::Homework => {
                    points.homework_points = self
                        .stores
                        .homework
                        .find(|h| h.student_id == student_id)
                        .await
                        .iter()
                        .map(|h| h.status.points())
                        .sum();
                }
                Component::Target => {
                    points.target_points =
                        self.stores.streak_or_init(student_id).await.cumulative_points;
                }
            }
        }

        points.recompute_total();
        self.stores.points.upsert(student_id, points.clone()).await;

        tracing::debug!(
            %student_id,
            total = points.total_points,
            "points recomputed"
        );
        self.bus.publish(DomainEvent::PointsUpdated {
            student_id,
            quiz_points: points.quiz_points,
            attendance_points: points.attendance_points,
            homework_points: points.homework_points,
            target_points: points.target_points,
            total_points: points.total_points,
            timestamp: Utc::now(),
        });

        Ok(points)
    }

    /// Computes the ranking over active students with points records.
    /// Pure: no event is published from this read.
    ///
    /// Order: total points descending, then the fixed tie-break chain —
    /// quiz, target, homework, attendance points (each descending), then
    /// registration date ascending, then name ascending.
    pub async fn ranking(&self) -> Vec<RankedStudent> {
        let mut rows = Vec::new();
        for points in self.stores.points.all().await {
            let Some(student) = self.stores.students.get(&points.student_id).await else {
                continue;
            };
            if !student.is_active() {
                continue;
            }
            rows.push((student, points));
        }

        rows.sort_by(|(sa, pa), (sb, pb)| compare_ranked(sa, pa, sb, pb));

        rows.into_iter()
            .enumerate()
            .map(|(i, (student, points))| RankedStudent {
                rank: i + 1,
                student_id: student.id,
                name: student.name,
                points,
            })
            .collect()
    }

    /// Returns the 1-based rank of a student, or -1 when the student is
    /// not in the ranking (archived, unknown, or no points record).
    pub async fn rank_of(&self, student_id: StudentId) -> i64 {
        self.ranking()
            .await
            .iter()
            .find(|r| r.student_id == student_id)
            .map_or(-1, |r| i64::try_from(r.rank).unwrap_or(-1))
    }

    /// Publishes the rankings-changed event carrying the current leading
    /// entries. Called by the cascade after points mutations, never from
    /// ranking reads.
    pub async fn publish_rankings(&self) {
        let top: Vec<RankingEntry> = self
            .ranking()
            .await
            .into_iter()
            .take(self.top_n)
            .map(|r| RankingEntry {
                rank: r.rank,
                student_id: r.student_id,
                name: r.name,
                total_points: r.points.total_points,
            })
            .collect();

        self.bus.publish(DomainEvent::RankingsChanged {
            top,
            timestamp: Utc::now(),
        });
    }
}

/// The fixed six-key tie-break chain. Not configurable.
fn compare_ranked(
    student_a: &crate::domain::Student,
    points_a: &Fasee7Points,
    student_b: &crate::domain::Student,
    points_b: &Fasee7Points,
) -> Ordering {
    points_b
        .total_points
        .cmp(&points_a.total_points)
        .then_with(|| points_b.quiz_points.cmp(&points_a.quiz_points))
        .then_with(|| points_b.target_points.cmp(&points_a.target_points))
        .then_with(|| points_b.homework_points.cmp(&points_a.homework_points))
        .then_with(|| points_b.attendance_points.cmp(&points_a.attendance_points))
        .then_with(|| student_a.registered_at.cmp(&student_b.registered_at))
        .then_with(|| {
            student_a
                .name
                .to_lowercase()
                .cmp(&student_b.name.to_lowercase())
        })
}
