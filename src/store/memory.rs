//! In-memory store backend.
//!
//! The default for tests and for callers that keep durable persistence
//! outside the engine. A single mutex serializes writes, which satisfies
//! the per-pair atomicity contract trivially.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{KnowledgeNode, LearningSession, MasteryScore, QuestionResponse};
use crate::error::Result;
use crate::store::Store;

#[derive(Default)]
struct Inner {
  nodes: HashMap<String, KnowledgeNode>,
  mastery: HashMap<(String, String), MasteryScore>,
  responses: Vec<QuestionResponse>,
  sessions: HashMap<String, LearningSession>,
}

#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<Inner>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Convenience for seeding a node set at startup.
  pub fn with_nodes(nodes: impl IntoIterator<Item = KnowledgeNode>) -> Self {
    let store = Self::new();
    {
      let mut inner = store.inner.lock().expect("Memory store lock poisoned");
      for node in nodes {
        inner.nodes.insert(node.code.clone(), node);
      }
    }
    store
  }
}

impl Store for MemoryStore {
  fn get_node(&self, code: &str) -> Result<Option<KnowledgeNode>> {
    let inner = self.inner.lock().expect("Memory store lock poisoned");
    Ok(inner.nodes.get(code).cloned())
  }

  fn put_node(&self, node: &KnowledgeNode) -> Result<()> {
    let mut inner = self.inner.lock().expect("Memory store lock poisoned");
    inner.nodes.insert(node.code.clone(), node.clone());
    Ok(())
  }

  fn all_nodes(&self) -> Result<Vec<KnowledgeNode>> {
    let inner = self.inner.lock().expect("Memory store lock poisoned");
    let mut nodes: Vec<KnowledgeNode> = inner.nodes.values().cloned().collect();
    nodes.sort_by_key(|n| (n.difficulty, n.code.clone()));
    Ok(nodes)
  }

  fn get_mastery(&self, student_id: &str, node_code: &str) -> Result<Option<MasteryScore>> {
    let inner = self.inner.lock().expect("Memory store lock poisoned");
    Ok(inner.mastery.get(&(student_id.to_string(), node_code.to_string())).cloned())
  }

  fn put_mastery(&self, score: &MasteryScore) -> Result<()> {
    let mut inner = self.inner.lock().expect("Memory store lock poisoned");
    inner.mastery.insert(
      (score.student_id.clone(), score.node_code.clone()),
      score.clone(),
    );
    Ok(())
  }

  fn mastery_for_student(&self, student_id: &str) -> Result<Vec<MasteryScore>> {
    let inner = self.inner.lock().expect("Memory store lock poisoned");
    let mut scores: Vec<MasteryScore> = inner
      .mastery
      .values()
      .filter(|s| s.student_id == student_id)
      .cloned()
      .collect();
    scores.sort_by_key(|s| s.node_code.clone());
    Ok(scores)
  }

  fn append_response(&self, response: &QuestionResponse) -> Result<()> {
    let mut inner = self.inner.lock().expect("Memory store lock poisoned");
    inner.responses.push(response.clone());
    Ok(())
  }

  fn responses_for_node(&self, student_id: &str, node_code: &str) -> Result<Vec<QuestionResponse>> {
    let inner = self.inner.lock().expect("Memory store lock poisoned");
    let mut responses: Vec<QuestionResponse> = inner
      .responses
      .iter()
      .filter(|r| r.student_id == student_id && r.node_code == node_code)
      .cloned()
      .collect();
    responses.sort_by_key(|r| r.answered_at);
    Ok(responses)
  }

  fn get_session(&self, id: &str) -> Result<Option<LearningSession>> {
    let inner = self.inner.lock().expect("Memory store lock poisoned");
    Ok(inner.sessions.get(id).cloned())
  }

  fn put_session(&self, session: &LearningSession) -> Result<()> {
    let mut inner = self.inner.lock().expect("Memory store lock poisoned");
    inner.sessions.insert(session.id.clone(), session.clone());
    Ok(())
  }
}
