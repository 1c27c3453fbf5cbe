use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::machine::{self, SessionState};
use crate::step_loop::StepLoop;

/// Mutable record of one tutoring session.
///
/// Carries the outer state machine state and the nested practice loop as
/// two independent structures; the orchestrator composes them. Lifecycle
/// is monotonic from creation to a terminal COMPLETED state (which may
/// only reset to IDLE).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSession {
  pub id: String,
  pub student_id: String,
  pub grade_level: u8,
  pub state: SessionState,
  pub current_node: Option<String>,
  pub step_loop: StepLoop,
  /// Questions answered across the whole session, any activity
  pub questions_answered: u32,
  pub questions_correct: u32,
  /// Consecutive incorrect answers; drives struggle detection
  pub incorrect_streak: u32,
  pub hints_used: u32,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

impl LearningSession {
  pub fn new(id: impl Into<String>, student_id: impl Into<String>, grade_level: u8) -> Self {
    Self {
      id: id.into(),
      student_id: student_id.into(),
      grade_level,
      state: SessionState::Idle,
      current_node: None,
      step_loop: StepLoop::new(),
      questions_answered: 0,
      questions_correct: 0,
      incorrect_streak: 0,
      hints_used: 0,
      started_at: Utc::now(),
      completed_at: None,
    }
  }

  /// The only mutation path for the state field; validates against the
  /// central transition table.
  pub fn transition_to(&mut self, to: SessionState, event: impl Into<String>) -> Result<()> {
    let t = machine::transition(self.state, to, event)?;
    tracing::debug!(
      session = %self.id,
      from = t.from.as_str(),
      to = t.to.as_str(),
      event = %t.event,
      "session transition"
    );
    self.state = to;
    if to == SessionState::Completed {
      self.completed_at = Some(Utc::now());
    }
    Ok(())
  }

  /// Record an answer into the session-wide counters.
  pub fn tally_answer(&mut self, was_correct: bool) {
    self.questions_answered += 1;
    if was_correct {
      self.questions_correct += 1;
      self.incorrect_streak = 0;
    } else {
      self.incorrect_streak += 1;
    }
  }

  pub fn is_terminal(&self) -> bool {
    self.state == SessionState::Completed
  }
}
