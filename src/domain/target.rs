//! Remedial targets and the achievement streak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{StudentId, TargetId};

/// Performance domain a target belongs to.
///
/// Mirrors the quiz-derived performance-indicator categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetCategory {
    /// Reading comprehension.
    Reading,
    /// Grammar.
    Grammar,
    /// Vocabulary.
    Vocabulary,
    /// Listening comprehension.
    Listening,
}

impl TargetCategory {
    /// Human-readable label for notifications and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Grammar => "grammar",
            Self::Vocabulary => "vocabulary",
            Self::Listening => "listening",
        }
    }
}

/// A remedial performance goal created after a performance drop.
///
/// Immutable once achieved: achievement sets the flag and timestamp exactly
/// once and is never reversed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Target identifier.
    pub id: TargetId,
    /// Student the target belongs to.
    pub student_id: StudentId,
    /// Performance domain.
    pub category: TargetCategory,
    /// Performance-indicator value to recover to.
    pub threshold: i64,
    /// `true` once the PI recovers to the threshold.
    pub achieved: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Achievement timestamp, set exactly once.
    pub achieved_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Creates a new unachieved target.
    #[must_use]
    pub fn new(student_id: StudentId, category: TargetCategory, threshold: i64) -> Self {
        Self {
            id: TargetId::new(),
            student_id,
            category,
            threshold,
            achieved: false,
            created_at: Utc::now(),
            achieved_at: None,
        }
    }

    /// Marks the target achieved. Returns `false` (and changes nothing) if
    /// it was already achieved.
    pub fn achieve(&mut self) -> bool {
        if self.achieved {
            return false;
        }
        self.achieved = true;
        self.achieved_at = Some(Utc::now());
        true
    }
}

/// Per-student monotonic achievement streak.
///
/// `cumulative_points` only ever increases, by the value of the streak
/// counter at the moment the streak increments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStreak {
    /// Student the streak belongs to.
    pub student_id: StudentId,
    /// Current consecutive achievement count, >= 0.
    pub current_streak: u32,
    /// When the streak last incremented.
    pub last_achievement_at: Option<DateTime<Utc>>,
    /// Total bonus points earned across all streaks. Monotonically
    /// non-decreasing, even across streak resets.
    pub cumulative_points: i64,
}

impl TargetStreak {
    /// Creates an empty streak for the student.
    #[must_use]
    pub fn new(student_id: StudentId) -> Self {
        Self {
            student_id,
            current_streak: 0,
            last_achievement_at: None,
            cumulative_points: 0,
        }
    }

    /// Records one achievement: streak += 1, cumulative += new streak
    /// value. Returns the points added.
    pub fn record_achievement(&mut self) -> i64 {
        self.current_streak += 1;
        let earned = i64::from(self.current_streak);
        self.cumulative_points += earned;
        self.last_achievement_at = Some(Utc::now());
        earned
    }

    /// Resets the streak counter. Cumulative points are kept.
    pub fn reset(&mut self) {
        self.current_streak = 0;
    }
}
