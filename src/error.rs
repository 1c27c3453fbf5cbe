//! Engine error taxonomy.
//!
//! Every error the engine can surface falls into one of these buckets.
//! Invalid transitions and missing records are always surfaced to the
//! caller; content validation failures and gate evaluation failures are
//! handled internally (fallback payload / fail-closed practice) and only
//! appear here when a lower layer reports them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// The state machine was asked to move to a disallowed target.
  #[error("invalid transition from {from} to {to}")]
  InvalidTransition { from: &'static str, to: &'static str },

  /// A referenced node, session, or mastery record does not exist.
  #[error("{kind} not found: {key}")]
  NotFound { kind: &'static str, key: String },

  /// Malformed input or a broken graph invariant.
  #[error("validation failed: {0}")]
  Validation(String),

  /// The mastery gate could not be evaluated.
  #[error("gate evaluation failed: {0}")]
  GateEvaluation(String),

  /// The persistence collaborator failed.
  #[error("storage error: {0}")]
  Storage(String),
}

impl EngineError {
  pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
    Self::NotFound {
      kind,
      key: key.into(),
    }
  }
}

impl From<rusqlite::Error> for EngineError {
  fn from(e: rusqlite::Error) -> Self {
    Self::Storage(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, EngineError>;
