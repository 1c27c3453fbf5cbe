use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bkt;
use crate::domain::MasteryLevel;

/// Mutable per (student, node) mastery record.
///
/// Created lazily on first interaction with a node, updated on every
/// answer, never deleted. `level` is always recomputed from probability
/// and practice count through `bkt::level_for`; the scheduler fields only
/// change through `srs::scheduler::next_review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryScore {
  pub student_id: String,
  pub node_code: String,
  /// Probability of mastery, always in [0, 1]
  pub bkt_probability: f64,
  pub level: MasteryLevel,
  pub practice_count: u32,
  pub correct_count: u32,
  pub last_practiced: Option<DateTime<Utc>>,
  /// Fastest correct response observed, in milliseconds
  pub best_response_ms: Option<i64>,

  // Scheduler fields
  pub review_count: i64,
  pub interval_days: i64,
  pub easiness: f64,
  pub next_due: Option<DateTime<Utc>>,

  // Flags
  pub fluency_drill_active: bool,
  pub truly_mastered: bool,
}

impl MasteryScore {
  pub fn new(student_id: impl Into<String>, node_code: impl Into<String>) -> Self {
    Self {
      student_id: student_id.into(),
      node_code: node_code.into(),
      bkt_probability: bkt::INITIAL_PROBABILITY,
      level: MasteryLevel::Novice,
      practice_count: 0,
      correct_count: 0,
      last_practiced: None,
      best_response_ms: None,
      review_count: 0,
      interval_days: 0,
      easiness: 2.5,
      next_due: None,
      fluency_drill_active: false,
      truly_mastered: false,
    }
  }

  /// Apply one assessed answer: BKT update, counters, personal best.
  ///
  /// Not called for readiness-check answers (step 2), which carry zero
  /// weight in the tracing model.
  pub fn apply_answer(&mut self, was_correct: bool, response_ms: i64, now: DateTime<Utc>) {
    self.bkt_probability = bkt::update(self.bkt_probability, was_correct);
    self.practice_count += 1;
    if was_correct {
      self.correct_count += 1;
      self.best_response_ms = Some(match self.best_response_ms {
        Some(best) => best.min(response_ms),
        None => response_ms,
      });
    }
    self.last_practiced = Some(now);
    self.level = bkt::level_for(self.bkt_probability, self.practice_count);
  }

  pub fn accuracy(&self) -> f64 {
    if self.practice_count > 0 {
      self.correct_count as f64 / self.practice_count as f64
    } else {
      0.0
    }
  }
}
