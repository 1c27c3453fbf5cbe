//! Fire-and-forget notifications to gamification and messaging
//! collaborators. A sink failure is logged and swallowed; it must never
//! fail or roll back the mastery or scheduler update that triggered it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
  NodeMastered {
    student_id: String,
    node_code: String,
  },
  FluencyDrillStarted {
    student_id: String,
    node_code: String,
  },
  StruggleDetected {
    student_id: String,
    node_code: String,
  },
  PlacementCompleted {
    student_id: String,
    frontier: Option<String>,
  },
  ReviewCompleted {
    student_id: String,
    node_code: String,
    was_correct: bool,
  },
  SessionCompleted {
    session_id: String,
    questions_answered: u32,
  },
}

impl EngineEvent {
  pub fn name(&self) -> &'static str {
    match self {
      Self::NodeMastered { .. } => "node_mastered",
      Self::FluencyDrillStarted { .. } => "fluency_drill_started",
      Self::StruggleDetected { .. } => "struggle_detected",
      Self::PlacementCompleted { .. } => "placement_completed",
      Self::ReviewCompleted { .. } => "review_completed",
      Self::SessionCompleted { .. } => "session_completed",
    }
  }
}

/// Notification collaborator. Implementations may forward to gamification,
/// messaging, or analytics services.
pub trait EventSink {
  fn publish(&self, event: &EngineEvent) -> Result<(), String>;
}

/// Sink that drops everything; the default for callers that do not care.
pub struct NoopSink;

impl EventSink for NoopSink {
  fn publish(&self, _event: &EngineEvent) -> Result<(), String> {
    Ok(())
  }
}

/// Publish an event, swallowing and logging any sink failure.
pub fn notify<E: EventSink>(sink: &E, event: EngineEvent) {
  if let Err(e) = sink.publish(&event) {
    tracing::warn!(event = event.name(), error = %e, "event sink failed; continuing");
  }
}
