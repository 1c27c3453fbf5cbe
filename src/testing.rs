//! Shared test fixtures.
//!
//! Builders for node graphs, deterministic content, and recording event
//! sinks, so engine tests do not each re-invent their scaffolding.

use std::sync::Mutex;

use crate::config::EngineConfig;
use crate::content::{ContentSource, Explanation, GeneratedQuestion, StudentContext};
use crate::domain::KnowledgeNode;
use crate::error::Result;
use crate::events::{EngineEvent, EventSink};
use crate::orchestrator::Engine;
use crate::store::MemoryStore;

/// A chain n0 -> n1 -> ... with ascending difficulty at grade 4.
pub fn linear_graph(len: usize) -> Vec<KnowledgeNode> {
  (0..len)
    .map(|i| {
      let mut node = KnowledgeNode::new(format!("n{i}"), format!("Concept {i}"), "math");
      node.grade_level = 4;
      node.difficulty = i as u8;
      if i > 0 {
        node.prerequisites = vec![format!("n{}", i - 1)];
      }
      if i + 1 < len {
        node.successors = vec![format!("n{}", i + 1)];
      }
      node
    })
    .collect()
}

/// Content source that always returns a well-formed deterministic payload.
pub struct FixedContent;

impl ContentSource for FixedContent {
  fn question(&self, node: &KnowledgeNode, _ctx: &StudentContext) -> Result<GeneratedQuestion> {
    Ok(GeneratedQuestion {
      node_code: node.code.clone(),
      prompt: format!("Question about {}", node.title),
      options: vec!["right".into(), "wrong 1".into(), "wrong 2".into(), "wrong 3".into()],
      correct_index: 0,
    })
  }

  fn explanation(&self, node: &KnowledgeNode, _ctx: &StudentContext) -> Result<Explanation> {
    Ok(Explanation {
      node_code: node.code.clone(),
      summary: format!("All about {}", node.title),
      example: None,
    })
  }
}

/// Event sink that remembers everything it was given.
#[derive(Default)]
pub struct RecordingSink {
  events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
  pub fn recorded(&self) -> Vec<EngineEvent> {
    self.events.lock().expect("Recording sink lock poisoned").clone()
  }
}

impl EventSink for RecordingSink {
  fn publish(&self, event: &EngineEvent) -> std::result::Result<(), String> {
    self.events.lock().expect("Recording sink lock poisoned").push(event.clone());
    Ok(())
  }
}

/// Event sink that always fails; for verifying fire-and-forget behavior.
pub struct FailingSink;

impl EventSink for FailingSink {
  fn publish(&self, _event: &EngineEvent) -> std::result::Result<(), String> {
    Err("sink is down".to_string())
  }
}

pub type TestEngine = Engine<MemoryStore, FixedContent, RecordingSink>;

/// Engine over an in-memory store seeded with the given nodes.
pub fn engine_with_nodes(nodes: Vec<KnowledgeNode>) -> TestEngine {
  Engine::new(
    MemoryStore::with_nodes(nodes),
    FixedContent,
    RecordingSink::default(),
    EngineConfig::default(),
  )
}

/// Same, but every event notification fails.
pub fn engine_with_failing_sink(
  nodes: Vec<KnowledgeNode>,
) -> Engine<MemoryStore, FixedContent, FailingSink> {
  Engine::new(
    MemoryStore::with_nodes(nodes),
    FixedContent,
    FailingSink,
    EngineConfig::default(),
  )
}
