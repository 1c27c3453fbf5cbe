//! The 5-step practice loop.
//!
//! Tracked as an integer step 1-5 plus a per-step (correct, total)
//! counter, fully independent of the outer session state machine. The two
//! are composed by the orchestrator; neither knows the other exists.
//!
//! Step quotas and pass thresholds:
//!   2 check_understanding    1 question, any answer advances
//!   3 guided_practice        3 questions, >= 2 correct
//!   4 independent_practice   5 questions, >= 4 correct
//!   5 mastery_proof          1 question, correct qualifies for the gate
//!
//! Step 1 is the lesson itself and asks no questions. A failed step 3, 4,
//! or 5 returns to step 2. Passing step 5 does not grant mastery; it only
//! makes the student gate-eligible.

use serde::{Deserialize, Serialize};

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 5;

/// Questions asked before a step is evaluated
pub fn questions_required(step: u8) -> u32 {
  match step {
    3 => 3,
    4 => 5,
    _ => 1,
  }
}

/// Correct answers needed to pass a step's evaluation
pub fn pass_threshold(step: u8) -> u32 {
  match step {
    2 => 0,
    3 => 2,
    4 => 4,
    _ => 1,
  }
}

pub fn step_name(step: u8) -> &'static str {
  match step {
    1 => "introduction",
    2 => "check_understanding",
    3 => "guided_practice",
    4 => "independent_practice",
    5 => "mastery_proof",
    _ => "unknown",
  }
}

/// Outcome of recording one answer into the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  /// The current step still needs more questions
  InProgress,
  /// The step's quota was met and passed; now at the contained step
  Advanced(u8),
  /// The step's quota was met and failed; back at step 2
  SentBack,
  /// A correct mastery-proof answer; the mastery gate decides what happens
  GateEligible,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLoop {
  step: u8,
  correct: u32,
  total: u32,
}

impl Default for StepLoop {
  fn default() -> Self {
    Self::new()
  }
}

impl StepLoop {
  pub fn new() -> Self {
    Self {
      step: FIRST_STEP,
      correct: 0,
      total: 0,
    }
  }

  /// Rebuild a loop from persisted counters.
  pub fn from_parts(step: u8, correct: u32, total: u32) -> Self {
    Self {
      step: step.clamp(FIRST_STEP, LAST_STEP),
      correct,
      total,
    }
  }

  pub fn step(&self) -> u8 {
    self.step
  }

  pub fn correct(&self) -> u32 {
    self.correct
  }

  pub fn total(&self) -> u32 {
    self.total
  }

  /// Whether answers at the current step carry weight in the tracing
  /// model. The readiness check (step 2) reads mastery but never updates
  /// it; the introduction asks no questions at all.
  pub fn updates_mastery(&self) -> bool {
    self.step >= 3
  }

  /// Leave the introduction and start asking readiness questions.
  pub fn advance_from_introduction(&mut self) {
    if self.step == 1 {
      self.enter_step(2);
    }
  }

  /// Jump to a specific step, clearing the per-step counters.
  pub fn enter_step(&mut self, step: u8) {
    self.step = step.clamp(FIRST_STEP, LAST_STEP);
    self.correct = 0;
    self.total = 0;
  }

  /// Record one answered question at the current step.
  pub fn record_answer(&mut self, was_correct: bool) -> StepOutcome {
    if self.step < 2 {
      // The introduction asks no questions; nothing to record
      return StepOutcome::InProgress;
    }

    self.total += 1;
    if was_correct {
      self.correct += 1;
    }

    if self.total < questions_required(self.step) {
      return StepOutcome::InProgress;
    }

    // Quota met: evaluate the step
    match self.step {
      2 => {
        // Readiness check: any answer advances
        self.enter_step(3);
        StepOutcome::Advanced(3)
      }
      5 => {
        if self.correct >= 1 {
          // Counters stay until the gate decides where to go next
          StepOutcome::GateEligible
        } else {
          self.enter_step(2);
          StepOutcome::SentBack
        }
      }
      step => {
        if self.correct >= pass_threshold(step) {
          let next = step + 1;
          self.enter_step(next);
          StepOutcome::Advanced(next)
        } else {
          self.enter_step(2);
          StepOutcome::SentBack
        }
      }
    }
  }
}
