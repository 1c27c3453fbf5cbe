//! Session state machine.
//!
//! Eleven named states with a directed transition table enforced centrally:
//! every state change goes through `transition` (or
//! `LearningSession::transition_to`), and a disallowed pair is always
//! rejected with an error naming both states. Each state maps to exactly
//! one recommended next action for the presentation layer.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
  Idle,
  Diagnostic,
  Teaching,
  Practice,
  HintRequested,
  Struggling,
  Celebrating,
  BossChallenge,
  EmotionalCheck,
  Review,
  Completed,
}

/// All states, in declaration order. Used for exhaustive pairwise checks.
pub const ALL_STATES: [SessionState; 11] = [
  SessionState::Idle,
  SessionState::Diagnostic,
  SessionState::Teaching,
  SessionState::Practice,
  SessionState::HintRequested,
  SessionState::Struggling,
  SessionState::Celebrating,
  SessionState::BossChallenge,
  SessionState::EmotionalCheck,
  SessionState::Review,
  SessionState::Completed,
];

impl SessionState {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Idle => "IDLE",
      Self::Diagnostic => "DIAGNOSTIC",
      Self::Teaching => "TEACHING",
      Self::Practice => "PRACTICE",
      Self::HintRequested => "HINT_REQUESTED",
      Self::Struggling => "STRUGGLING",
      Self::Celebrating => "CELEBRATING",
      Self::BossChallenge => "BOSS_CHALLENGE",
      Self::EmotionalCheck => "EMOTIONAL_CHECK",
      Self::Review => "REVIEW",
      Self::Completed => "COMPLETED",
    }
  }

  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "IDLE" => Some(Self::Idle),
      "DIAGNOSTIC" => Some(Self::Diagnostic),
      "TEACHING" => Some(Self::Teaching),
      "PRACTICE" => Some(Self::Practice),
      "HINT_REQUESTED" => Some(Self::HintRequested),
      "STRUGGLING" => Some(Self::Struggling),
      "CELEBRATING" => Some(Self::Celebrating),
      "BOSS_CHALLENGE" => Some(Self::BossChallenge),
      "EMOTIONAL_CHECK" => Some(Self::EmotionalCheck),
      "REVIEW" => Some(Self::Review),
      "COMPLETED" => Some(Self::Completed),
      _ => None,
    }
  }
}

/// Allowed targets for each state. This table is the single source of
/// truth for the machine; directed, not bidirectional.
pub fn allowed_targets(from: SessionState) -> &'static [SessionState] {
  use SessionState::*;
  match from {
    Idle => &[Diagnostic, Teaching],
    Diagnostic => &[Teaching, Completed],
    Teaching => &[Practice, EmotionalCheck, Completed],
    Practice => &[
      Celebrating,
      Struggling,
      HintRequested,
      Review,
      BossChallenge,
      Teaching,
      Completed,
    ],
    HintRequested => &[Practice, Struggling, Completed],
    Struggling => &[EmotionalCheck, Teaching, HintRequested, Completed],
    Celebrating => &[Practice, Teaching, BossChallenge, Completed],
    BossChallenge => &[Celebrating, Struggling, Teaching, Completed],
    EmotionalCheck => &[Teaching, Struggling, Idle, Completed],
    Review => &[Practice, Teaching, Completed],
    Completed => &[Idle],
  }
}

pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
  allowed_targets(from).contains(&to)
}

/// A completed transition, with the event that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
  pub from: SessionState,
  pub to: SessionState,
  pub event: String,
}

/// Pure transition: validates against the table and returns the record,
/// or an error naming both states.
pub fn transition(from: SessionState, to: SessionState, event: impl Into<String>) -> Result<Transition> {
  if !is_valid_transition(from, to) {
    return Err(EngineError::InvalidTransition {
      from: from.as_str(),
      to: to.as_str(),
    });
  }
  Ok(Transition {
    from,
    to,
    event: event.into(),
  })
}

/// The single recommended next action for each state; the presentation
/// layer uses this label to decide what to render. Total over all states.
pub fn recommended_action(state: SessionState) -> &'static str {
  match state {
    SessionState::Idle => "start_session",
    SessionState::Diagnostic => "ask_diagnostic_question",
    SessionState::Teaching => "present_lesson",
    SessionState::Practice => "ask_practice_question",
    SessionState::HintRequested => "show_hint",
    SessionState::Struggling => "offer_support",
    SessionState::Celebrating => "celebrate_progress",
    SessionState::BossChallenge => "ask_boss_question",
    SessionState::EmotionalCheck => "check_in",
    SessionState::Review => "ask_review_question",
    SessionState::Completed => "end_session",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use SessionState::*;

  /// The table from the design doc, written out as explicit pairs so the
  /// exhaustive test below cannot drift with the implementation.
  const EXPECTED: [(SessionState, &[SessionState]); 11] = [
    (Idle, &[Diagnostic, Teaching]),
    (Diagnostic, &[Teaching, Completed]),
    (Teaching, &[Practice, EmotionalCheck, Completed]),
    (
      Practice,
      &[Celebrating, Struggling, HintRequested, Review, BossChallenge, Teaching, Completed],
    ),
    (HintRequested, &[Practice, Struggling, Completed]),
    (Struggling, &[EmotionalCheck, Teaching, HintRequested, Completed]),
    (Celebrating, &[Practice, Teaching, BossChallenge, Completed]),
    (BossChallenge, &[Celebrating, Struggling, Teaching, Completed]),
    (EmotionalCheck, &[Teaching, Struggling, Idle, Completed]),
    (Review, &[Practice, Teaching, Completed]),
    (Completed, &[Idle]),
  ];

  #[test]
  fn test_all_pairs_exhaustive() {
    for from in ALL_STATES {
      let allowed = EXPECTED
        .iter()
        .find(|(f, _)| *f == from)
        .map(|(_, targets)| *targets)
        .unwrap();
      for to in ALL_STATES {
        assert_eq!(
          is_valid_transition(from, to),
          allowed.contains(&to),
          "mismatch for {} -> {}",
          from.as_str(),
          to.as_str()
        );
      }
    }
  }

  #[test]
  fn test_transition_returns_record() {
    let t = transition(Idle, Teaching, "lesson_selected").unwrap();
    assert_eq!(t.from, Idle);
    assert_eq!(t.to, Teaching);
    assert_eq!(t.event, "lesson_selected");
  }

  #[test]
  fn test_invalid_transition_names_states() {
    let err = transition(Idle, Celebrating, "nope").unwrap_err();
    match err {
      EngineError::InvalidTransition { from, to } => {
        assert_eq!(from, "IDLE");
        assert_eq!(to, "CELEBRATING");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_no_self_transitions() {
    for state in ALL_STATES {
      assert!(
        !is_valid_transition(state, state),
        "{} should not transition to itself",
        state.as_str()
      );
    }
  }

  #[test]
  fn test_completed_only_resets_to_idle() {
    for to in ALL_STATES {
      assert_eq!(is_valid_transition(Completed, to), to == Idle);
    }
  }

  #[test]
  fn test_recommended_action_total_and_distinct_per_state() {
    for state in ALL_STATES {
      // Total: every state yields a non-empty action label
      assert!(!recommended_action(state).is_empty());
    }
    assert_eq!(recommended_action(HintRequested), "show_hint");
    assert_eq!(recommended_action(Review), "ask_review_question");
  }

  #[test]
  fn test_state_string_roundtrip() {
    for state in ALL_STATES {
      assert_eq!(SessionState::from_str(state.as_str()), Some(state));
    }
    assert_eq!(SessionState::from_str("PAUSED"), None);
  }

  #[test]
  fn test_serde_wire_names() {
    let json = serde_json::to_string(&SessionState::BossChallenge).unwrap();
    assert_eq!(json, "\"BOSS_CHALLENGE\"");
    let parsed: SessionState = serde_json::from_str("\"HINT_REQUESTED\"").unwrap();
    assert_eq!(parsed, SessionState::HintRequested);
  }
}
