//! Multi-signal mastery gate.
//!
//! Invoked only after a correct mastery-proof answer. Four independent
//! signals are computed from the response log and the mastery record:
//! accuracy, speed, retention, and consistency. The catch-all decision is
//! always more practice; an evaluation error must never be read as
//! evidence of mastery.

use serde::{Deserialize, Serialize};

use crate::config;
use crate::domain::{ActivityTag, MasteryScore, QuestionResponse};
use crate::error::{EngineError, Result};

/// Responses considered by the accuracy signal
const ACCURACY_WINDOW: usize = 10;
const ACCURACY_THRESHOLD: f64 = 0.8;

/// Gap that separates two sittings for the retention signal
const RETENTION_GAP_HOURS: i64 = 8;
const RETENTION_THRESHOLD: f64 = 0.6;

/// Responses considered by the consistency signal
const CONSISTENCY_WINDOW: usize = 8;
const CONSISTENCY_MIN_SAMPLES: usize = 4;
/// Bernoulli variance ceiling; p(1-p) above this means streaky answers
const CONSISTENCY_MAX_VARIANCE: f64 = 0.2;

/// Outcome of a gate evaluation. Every consumer must handle all four
/// variants; `Practice` is the fail-closed default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
  /// All four signals passed: true mastery, terminal for this node until
  /// a future review
  Advance,
  /// Accurate and retained but slow: route into an untimed fluency drill
  FluencyDrill,
  /// Accurate within the sitting but not retained across sittings: back
  /// to the readiness check
  RetentionReview,
  /// Catch-all: more practice
  Practice,
}

impl GateDecision {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Advance => "advance",
      Self::FluencyDrill => "fluency_drill",
      Self::RetentionReview => "retention_review",
      Self::Practice => "practice",
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct Signals {
  accuracy: bool,
  speed: bool,
  retention: bool,
  consistency: bool,
}

fn accuracy_signal(history: &[&QuestionResponse]) -> bool {
  let window: Vec<_> = history.iter().rev().take(ACCURACY_WINDOW).collect();
  if window.is_empty() {
    return false;
  }
  let correct = window.iter().filter(|r| r.was_correct).count();
  correct as f64 / window.len() as f64 >= ACCURACY_THRESHOLD
}

fn speed_signal(score: &MasteryScore, latest: &QuestionResponse, grade_level: u8) -> bool {
  if latest.response_ms > config::grade_speed_threshold_ms(grade_level) {
    return false;
  }
  match score.best_response_ms {
    Some(best) => latest.response_ms as f64 <= best as f64 * config::SPEED_TOLERANCE,
    None => true,
  }
}

/// Correctness measured across sittings, not within one. Responses at
/// least `RETENTION_GAP_HOURS` older than the latest answer form the
/// earlier sittings; with no earlier sitting the signal passes vacuously
/// (there is nothing yet to have forgotten).
fn retention_signal(history: &[&QuestionResponse], latest: &QuestionResponse) -> bool {
  let cutoff = latest.answered_at - chrono::Duration::hours(RETENTION_GAP_HOURS);
  let earlier: Vec<_> = history.iter().filter(|r| r.answered_at <= cutoff).collect();
  if earlier.is_empty() {
    return true;
  }
  let correct = earlier.iter().filter(|r| r.was_correct).count();
  correct as f64 / earlier.len() as f64 >= RETENTION_THRESHOLD
}

/// Low variance over the recent window; a streak of failures followed by
/// a lucky run shows up as high variance and fails.
fn consistency_signal(history: &[&QuestionResponse]) -> bool {
  let window: Vec<_> = history.iter().rev().take(CONSISTENCY_WINDOW).collect();
  if window.len() < CONSISTENCY_MIN_SAMPLES {
    return true;
  }
  let p = window.iter().filter(|r| r.was_correct).count() as f64 / window.len() as f64;
  let variance = p * (1.0 - p);
  variance <= CONSISTENCY_MAX_VARIANCE && p >= 0.5
}

/// Evaluate the four signals and map them to a decision.
///
/// `history` is the full response log for this (student, node) pair in
/// ascending time order, latest answer included.
pub fn evaluate(
  score: &MasteryScore,
  history: &[QuestionResponse],
  grade_level: u8,
) -> Result<GateDecision> {
  // Diagnostic probes predate teaching and carry no gate weight
  let assessed: Vec<&QuestionResponse> = history
    .iter()
    .filter(|r| r.activity != ActivityTag::Diagnostic)
    .collect();

  let latest = *assessed
    .last()
    .ok_or_else(|| EngineError::GateEvaluation("empty response history".to_string()))?;

  if latest.node_code != score.node_code {
    return Err(EngineError::GateEvaluation(format!(
      "history is for node {}, score is for node {}",
      latest.node_code, score.node_code
    )));
  }

  let signals = Signals {
    accuracy: accuracy_signal(&assessed),
    speed: speed_signal(score, latest, grade_level),
    retention: retention_signal(&assessed, latest),
    consistency: consistency_signal(&assessed),
  };

  tracing::debug!(
    node = %score.node_code,
    accuracy = signals.accuracy,
    speed = signals.speed,
    retention = signals.retention,
    consistency = signals.consistency,
    "gate signals"
  );

  let decision = if signals.accuracy && signals.speed && signals.retention && signals.consistency {
    GateDecision::Advance
  } else if signals.accuracy && signals.retention && !signals.speed {
    GateDecision::FluencyDrill
  } else if signals.accuracy && !signals.retention {
    GateDecision::RetentionReview
  } else {
    GateDecision::Practice
  };

  Ok(decision)
}

/// Fail-closed wrapper: any evaluation error resolves to more practice.
pub fn evaluate_or_practice(
  score: &MasteryScore,
  history: &[QuestionResponse],
  grade_level: u8,
) -> GateDecision {
  match evaluate(score, history, grade_level) {
    Ok(decision) => decision,
    Err(e) => {
      tracing::warn!(node = %score.node_code, error = %e, "gate evaluation failed, failing closed");
      GateDecision::Practice
    }
  }
}
