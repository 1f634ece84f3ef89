//! Fasee7 points record: the four sub-totals and their derived total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StudentId;

/// Per-student points record.
///
/// Four independently-owned sub-totals plus a derived total. The total is
/// recomputed through [`Fasee7Points::recompute_total`] every time any
/// sub-total changes; no sub-total is ever stale relative to the total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fasee7Points {
    /// Student the record belongs to.
    pub student_id: StudentId,
    /// Sum of quiz scores earned.
    pub quiz_points: i64,
    /// Count of lessons attended.
    pub attendance_points: i64,
    /// Weighted sum of homework statuses.
    pub homework_points: i64,
    /// The student's cumulative streak points.
    pub target_points: i64,
    /// Derived: sum of the four sub-totals.
    pub total_points: i64,
    /// When any component last changed.
    pub updated_at: DateTime<Utc>,
}

impl Fasee7Points {
    /// Creates a zeroed record for the student.
    #[must_use]
    pub fn new(student_id: StudentId) -> Self {
        Self {
            student_id,
            quiz_points: 0,
            attendance_points: 0,
            homework_points: 0,
            target_points: 0,
            total_points: 0,
            updated_at: Utc::now(),
        }
    }

    /// Recomputes the derived total and stamps the record.
    pub fn recompute_total(&mut self) {
        self.total_points = self.quiz_points
            + self.attendance_points
            + self.homework_points
            + self.target_points;
        self.updated_at = Utc::now();
    }
}

/// One row of the program ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedStudent {
    /// 1-based position in the ranking order.
    pub rank: usize,
    /// Student identifier.
    pub student_id: StudentId,
    /// Student display name.
    pub name: String,
    /// Full points breakdown at ranking time.
    pub points: Fasee7Points,
}
