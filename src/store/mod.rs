//! Persistence collaborator.
//!
//! The engine never assumes a storage technology; it only relies on
//! key-addressed reads and writes behind this trait. Updates for one (student, node)
//! pair are applied as whole-record puts so concurrent writers for the
//! same pair cannot silently drop each other's fields; writers for
//! different pairs are independent.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::domain::{KnowledgeNode, LearningSession, MasteryScore, QuestionResponse};
use crate::error::Result;

pub trait Store {
  fn get_node(&self, code: &str) -> Result<Option<KnowledgeNode>>;
  fn put_node(&self, node: &KnowledgeNode) -> Result<()>;
  fn all_nodes(&self) -> Result<Vec<KnowledgeNode>>;

  fn get_mastery(&self, student_id: &str, node_code: &str) -> Result<Option<MasteryScore>>;
  fn put_mastery(&self, score: &MasteryScore) -> Result<()>;
  fn mastery_for_student(&self, student_id: &str) -> Result<Vec<MasteryScore>>;

  /// Append-only; responses are never mutated or deleted
  fn append_response(&self, response: &QuestionResponse) -> Result<()>;
  /// Responses for one (student, node) pair in ascending answer order
  fn responses_for_node(&self, student_id: &str, node_code: &str) -> Result<Vec<QuestionResponse>>;

  fn get_session(&self, id: &str) -> Result<Option<LearningSession>>;
  fn put_session(&self, session: &LearningSession) -> Result<()>;
}
