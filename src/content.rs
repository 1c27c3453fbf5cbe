//! Content collaborator contract.
//!
//! Question and explanation payloads are produced by an external
//! generator; the engine only consumes shape-validated output. When the
//! collaborator returns something malformed, the engine falls back to a
//! built-in default payload so the session keeps moving.

use serde::{Deserialize, Serialize};

use crate::domain::{KnowledgeNode, MasteryLevel};
use crate::error::{EngineError, Result};

/// Every question carries exactly this many options
pub const OPTION_COUNT: usize = 4;

/// Student context handed to the content collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentContext {
  pub student_id: String,
  pub grade_level: u8,
  pub mastery_level: MasteryLevel,
}

/// A multiple-choice question with exactly one correct option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedQuestion {
  pub node_code: String,
  pub prompt: String,
  pub options: Vec<String>,
  pub correct_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
  pub node_code: String,
  pub summary: String,
  pub example: Option<String>,
}

/// External question/explanation generator.
pub trait ContentSource {
  fn question(&self, node: &KnowledgeNode, ctx: &StudentContext) -> Result<GeneratedQuestion>;
  fn explanation(&self, node: &KnowledgeNode, ctx: &StudentContext) -> Result<Explanation>;
}

/// Shape-validate a generated question: fixed option count, in-range
/// answer index, nothing blank.
pub fn validate_question(question: &GeneratedQuestion) -> Result<()> {
  if question.options.len() != OPTION_COUNT {
    return Err(EngineError::Validation(format!(
      "expected {} options, got {}",
      OPTION_COUNT,
      question.options.len()
    )));
  }
  if question.correct_index >= question.options.len() {
    return Err(EngineError::Validation(format!(
      "correct_index {} out of range",
      question.correct_index
    )));
  }
  if question.prompt.trim().is_empty() {
    return Err(EngineError::Validation("empty prompt".to_string()));
  }
  if question.options.iter().any(|o| o.trim().is_empty()) {
    return Err(EngineError::Validation("blank option".to_string()));
  }
  Ok(())
}

/// Built-in default question used when the collaborator fails or returns
/// malformed output. A self-check prompt that works for any node.
pub fn fallback_question(node: &KnowledgeNode) -> GeneratedQuestion {
  GeneratedQuestion {
    node_code: node.code.clone(),
    prompt: format!("How well do you know \"{}\" right now?", node.title),
    options: vec![
      "I can explain it and give an example".to_string(),
      "I remember most of it".to_string(),
      "I need a refresher".to_string(),
      "I have not seen this before".to_string(),
    ],
    correct_index: 0,
  }
}

pub fn fallback_explanation(node: &KnowledgeNode) -> Explanation {
  Explanation {
    node_code: node.code.clone(),
    summary: node
      .description
      .clone()
      .unwrap_or_else(|| format!("Let's work through {} together.", node.title)),
    example: None,
  }
}

/// Fetch a question, validating the collaborator's output and falling
/// back to the built-in payload on any failure.
pub fn question_or_fallback<C: ContentSource>(
  source: &C,
  node: &KnowledgeNode,
  ctx: &StudentContext,
) -> GeneratedQuestion {
  match source.question(node, ctx) {
    Ok(question) => match validate_question(&question) {
      Ok(()) => question,
      Err(e) => {
        tracing::warn!(node = %node.code, error = %e, "malformed question, using fallback");
        fallback_question(node)
      }
    },
    Err(e) => {
      tracing::warn!(node = %node.code, error = %e, "content source failed, using fallback");
      fallback_question(node)
    }
  }
}

/// Fetch an explanation with the same fallback guarantee.
pub fn explanation_or_fallback<C: ContentSource>(
  source: &C,
  node: &KnowledgeNode,
  ctx: &StudentContext,
) -> Explanation {
  match source.explanation(node, ctx) {
    Ok(explanation) if !explanation.summary.trim().is_empty() => explanation,
    Ok(_) => {
      tracing::warn!(node = %node.code, "blank explanation, using fallback");
      fallback_explanation(node)
    }
    Err(e) => {
      tracing::warn!(node = %node.code, error = %e, "content source failed, using fallback");
      fallback_explanation(node)
    }
  }
}
