use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which activity produced an answer. Step tags mirror the practice loop;
/// the rest cover activities outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTag {
  Diagnostic,
  CheckUnderstanding,
  GuidedPractice,
  IndependentPractice,
  MasteryProof,
  FluencyDrill,
  BossChallenge,
  Review,
}

impl ActivityTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Diagnostic => "diagnostic",
      Self::CheckUnderstanding => "check_understanding",
      Self::GuidedPractice => "guided_practice",
      Self::IndependentPractice => "independent_practice",
      Self::MasteryProof => "mastery_proof",
      Self::FluencyDrill => "fluency_drill",
      Self::BossChallenge => "boss_challenge",
      Self::Review => "review",
    }
  }

  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "diagnostic" => Some(Self::Diagnostic),
      "check_understanding" => Some(Self::CheckUnderstanding),
      "guided_practice" => Some(Self::GuidedPractice),
      "independent_practice" => Some(Self::IndependentPractice),
      "mastery_proof" => Some(Self::MasteryProof),
      "fluency_drill" => Some(Self::FluencyDrill),
      "boss_challenge" => Some(Self::BossChallenge),
      "review" => Some(Self::Review),
      _ => None,
    }
  }

  /// Practice-loop step that produced this activity, if any
  pub fn step(&self) -> Option<u8> {
    match self {
      Self::CheckUnderstanding => Some(2),
      Self::GuidedPractice => Some(3),
      Self::IndependentPractice => Some(4),
      Self::MasteryProof => Some(5),
      _ => None,
    }
  }

  pub fn for_step(step: u8) -> Option<Self> {
    match step {
      2 => Some(Self::CheckUnderstanding),
      3 => Some(Self::GuidedPractice),
      4 => Some(Self::IndependentPractice),
      5 => Some(Self::MasteryProof),
      _ => None,
    }
  }
}

/// Immutable log record of one answered question. Write-once; the mastery
/// gate reads these for retention and consistency analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
  pub student_id: String,
  pub node_code: String,
  pub session_id: String,
  pub question_text: String,
  pub was_correct: bool,
  pub response_ms: i64,
  pub activity: ActivityTag,
  pub answered_at: DateTime<Utc>,
}

impl QuestionResponse {
  pub fn new(
    student_id: impl Into<String>,
    node_code: impl Into<String>,
    session_id: impl Into<String>,
    question_text: impl Into<String>,
    was_correct: bool,
    response_ms: i64,
    activity: ActivityTag,
  ) -> Self {
    Self {
      student_id: student_id.into(),
      node_code: node_code.into(),
      session_id: session_id.into(),
      question_text: question_text.into(),
      was_correct,
      response_ms,
      activity,
      answered_at: Utc::now(),
    }
  }
}
