use serde::{Deserialize, Serialize};

/// Discrete mastery classification derived from BKT probability and
/// practice count. Never stored independently of a recompute path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
  Novice,
  Developing,
  Proficient,
  Mastered,
}

impl MasteryLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Novice => "novice",
      Self::Developing => "developing",
      Self::Proficient => "proficient",
      Self::Mastered => "mastered",
    }
  }

  pub fn from_str(s: &str) -> Option<Self> {
    match s {
      "novice" => Some(Self::Novice),
      "developing" => Some(Self::Developing),
      "proficient" => Some(Self::Proficient),
      "mastered" => Some(Self::Mastered),
      _ => None,
    }
  }

  /// Ordinal rank for comparisons (Novice = 0 .. Mastered = 3)
  pub fn rank(&self) -> u8 {
    match self {
      Self::Novice => 0,
      Self::Developing => 1,
      Self::Proficient => 2,
      Self::Mastered => 3,
    }
  }

  pub fn is_at_least(&self, other: MasteryLevel) -> bool {
    self.rank() >= other.rank()
  }
}

/// An immutable concept definition in the prerequisite graph.
///
/// Nodes are identified by a stable code (e.g. "MATH.G4.FRACTIONS.EQUIV")
/// and connected by directed prerequisite/successor edges. The full node
/// set forms a DAG; cycles are an invariant violation caught by
/// `bkt::validate_graph`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeNode {
  pub code: String,
  pub title: String,
  pub description: Option<String>,
  pub subject: String,
  pub grade_level: u8,
  /// Ordinal difficulty within the subject; orders diagnostic search spaces
  pub difficulty: u8,
  pub prerequisites: Vec<String>,
  pub successors: Vec<String>,
}

impl KnowledgeNode {
  pub fn new(code: impl Into<String>, title: impl Into<String>, subject: impl Into<String>) -> Self {
    Self {
      code: code.into(),
      title: title.into(),
      description: None,
      subject: subject.into(),
      grade_level: 0,
      difficulty: 0,
      prerequisites: Vec::new(),
      successors: Vec::new(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_level_rank_ordering() {
    assert!(MasteryLevel::Novice.rank() < MasteryLevel::Developing.rank());
    assert!(MasteryLevel::Developing.rank() < MasteryLevel::Proficient.rank());
    assert!(MasteryLevel::Proficient.rank() < MasteryLevel::Mastered.rank());
  }

  #[test]
  fn test_level_is_at_least() {
    assert!(MasteryLevel::Proficient.is_at_least(MasteryLevel::Proficient));
    assert!(MasteryLevel::Mastered.is_at_least(MasteryLevel::Proficient));
    assert!(!MasteryLevel::Developing.is_at_least(MasteryLevel::Proficient));
  }

  #[test]
  fn test_level_roundtrip() {
    let levels = vec![
      MasteryLevel::Novice,
      MasteryLevel::Developing,
      MasteryLevel::Proficient,
      MasteryLevel::Mastered,
    ];

    for level in levels {
      let s = level.as_str();
      assert_eq!(MasteryLevel::from_str(s), Some(level));
    }
  }

  #[test]
  fn test_level_from_str_invalid() {
    assert_eq!(MasteryLevel::from_str("expert"), None);
    assert_eq!(MasteryLevel::from_str(""), None);
    assert_eq!(MasteryLevel::from_str("Mastered"), None); // case sensitive
  }

  #[test]
  fn test_node_new_defaults() {
    let node = KnowledgeNode::new("MATH.G4.FRACTIONS", "Fractions", "math");
    assert_eq!(node.code, "MATH.G4.FRACTIONS");
    assert_eq!(node.title, "Fractions");
    assert_eq!(node.subject, "math");
    assert!(node.description.is_none());
    assert_eq!(node.difficulty, 0);
    assert!(node.prerequisites.is_empty());
    assert!(node.successors.is_empty());
  }
}
