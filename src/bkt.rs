//! Bayesian knowledge tracing.
//!
//! Two-parameter model: a fixed guess probability (correct answer without
//! mastery) and a fixed slip probability (incorrect answer despite
//! mastery). Each observed answer moves the mastery estimate through a
//! Bayesian posterior, blended with the prior so that a single lucky
//! guess at a low estimate cannot flip the concept to mastered, and a
//! single slip at a high estimate cannot crater it.

use std::collections::HashMap;

use crate::domain::{KnowledgeNode, MasteryLevel, MasteryScore};
use crate::error::{EngineError, Result};

/// P(correct | not mastered)
const GUESS: f64 = 0.2;

/// P(incorrect | mastered)
const SLIP: f64 = 0.1;

/// Prior for a never-practiced node
pub const INITIAL_PROBABILITY: f64 = 0.1;

/// Blend weight floor/ceiling for the damped posterior step
const BLEND_BASE: f64 = 0.3;
const BLEND_SCALE: f64 = 0.5;

// Level thresholds
const DEVELOPING_THRESHOLD: f64 = 0.4;
const PROFICIENT_THRESHOLD: f64 = 0.65;
const MASTERED_THRESHOLD: f64 = 0.85;

/// A node cannot classify as Mastered before this many attempts, no
/// matter how high the probability climbs
pub const MASTERY_MIN_ATTEMPTS: u32 = 5;

/// One observed answer: previous probability in, new probability out.
///
/// A correct answer never decreases the probability; an incorrect answer
/// never increases it; the result is always in [0, 1].
pub fn update(probability: f64, was_correct: bool) -> f64 {
  let p = probability.clamp(0.0, 1.0);

  let (posterior, blend) = if was_correct {
    let evidence = p * (1.0 - SLIP) + (1.0 - p) * GUESS;
    let posterior = if evidence > 0.0 { p * (1.0 - SLIP) / evidence } else { p };
    // Damped by the current probability: low estimates move slowly up
    (posterior, BLEND_BASE + BLEND_SCALE * p)
  } else {
    let evidence = p * SLIP + (1.0 - p) * (1.0 - GUESS);
    let posterior = if evidence > 0.0 { p * SLIP / evidence } else { p };
    // Symmetric damping: high estimates move slowly down
    (posterior, BLEND_BASE + BLEND_SCALE * (1.0 - p))
  };

  (p + (posterior - p) * blend).clamp(0.0, 1.0)
}

/// Bucket a probability + practice count into a discrete level.
///
/// Pure; the stored `MasteryScore.level` is only ever the output of this
/// function.
pub fn level_for(probability: f64, practice_count: u32) -> MasteryLevel {
  if practice_count == 0 {
    return MasteryLevel::Novice;
  }
  if probability >= MASTERED_THRESHOLD && practice_count >= MASTERY_MIN_ATTEMPTS {
    MasteryLevel::Mastered
  } else if probability >= PROFICIENT_THRESHOLD {
    MasteryLevel::Proficient
  } else if probability >= DEVELOPING_THRESHOLD {
    MasteryLevel::Developing
  } else {
    MasteryLevel::Novice
  }
}

/// Whether the student is ready to progress past this node.
pub fn should_advance_node(score: &MasteryScore) -> bool {
  score.level.is_at_least(MasteryLevel::Proficient)
}

fn level_of(scores: &HashMap<String, MasteryScore>, code: &str) -> MasteryLevel {
  scores
    .get(code)
    .map(|s| s.level)
    .unwrap_or(MasteryLevel::Novice)
}

/// A node is unlocked once every prerequisite is at least Proficient.
pub fn is_unlocked(node: &KnowledgeNode, scores: &HashMap<String, MasteryScore>) -> bool {
  node
    .prerequisites
    .iter()
    .all(|code| level_of(scores, code).is_at_least(MasteryLevel::Proficient))
}

/// Pick the next node to work on: the lowest-difficulty unlocked node the
/// student still needs. Nodes already at Proficient or better (including
/// placement-seeded ones) do not need teaching.
pub fn recommend_next_node<'a>(
  nodes: &'a [KnowledgeNode],
  scores: &HashMap<String, MasteryScore>,
) -> Option<&'a KnowledgeNode> {
  nodes
    .iter()
    .filter(|node| {
      let already_done = scores
        .get(&node.code)
        .map(|s| s.truly_mastered || s.level.is_at_least(MasteryLevel::Proficient))
        .unwrap_or(false);
      !already_done && is_unlocked(node, scores)
    })
    .min_by_key(|node| (node.difficulty, node.code.clone()))
}

/// Check the graph invariants: every edge resolves, and the prerequisite
/// relation contains no cycle.
pub fn validate_graph(nodes: &[KnowledgeNode]) -> Result<()> {
  let by_code: HashMap<&str, &KnowledgeNode> =
    nodes.iter().map(|n| (n.code.as_str(), n)).collect();

  for node in nodes {
    for edge in node.prerequisites.iter().chain(node.successors.iter()) {
      if !by_code.contains_key(edge.as_str()) {
        return Err(EngineError::Validation(format!(
          "node {} references unknown node {}",
          node.code, edge
        )));
      }
    }
  }

  // Depth-first cycle detection over prerequisite edges
  #[derive(Clone, Copy, PartialEq)]
  enum Mark {
    Unvisited,
    InProgress,
    Done,
  }

  fn visit(
    code: &str,
    by_code: &HashMap<&str, &KnowledgeNode>,
    marks: &mut HashMap<String, Mark>,
  ) -> Result<()> {
    match marks.get(code).copied().unwrap_or(Mark::Unvisited) {
      Mark::Done => return Ok(()),
      Mark::InProgress => {
        return Err(EngineError::Validation(format!(
          "prerequisite cycle through node {}",
          code
        )));
      }
      Mark::Unvisited => {}
    }
    marks.insert(code.to_string(), Mark::InProgress);
    if let Some(node) = by_code.get(code) {
      for prereq in &node.prerequisites {
        visit(prereq, by_code, marks)?;
      }
    }
    marks.insert(code.to_string(), Mark::Done);
    Ok(())
  }

  let mut marks = HashMap::new();
  for node in nodes {
    visit(&node.code, &by_code, &mut marks)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_correct_never_decreases_probability() {
    for i in 0..=20 {
      let p = i as f64 / 20.0;
      assert!(update(p, true) >= p, "decreased at p={}", p);
    }
  }

  #[test]
  fn test_incorrect_never_increases_probability() {
    for i in 0..=20 {
      let p = i as f64 / 20.0;
      assert!(update(p, false) <= p, "increased at p={}", p);
    }
  }

  #[test]
  fn test_update_stays_in_bounds() {
    let mut p = INITIAL_PROBABILITY;
    for _ in 0..50 {
      p = update(p, true);
      assert!((0.0..=1.0).contains(&p));
    }
    for _ in 0..50 {
      p = update(p, false);
      assert!((0.0..=1.0).contains(&p));
    }
  }

  #[test]
  fn test_single_lucky_guess_does_not_flip_mastery() {
    let after = update(INITIAL_PROBABILITY, true);
    assert!(after < PROFICIENT_THRESHOLD);
  }

  #[test]
  fn test_single_slip_does_not_crater_mastery() {
    let after = update(0.9, false);
    assert!(after > PROFICIENT_THRESHOLD);
  }

  #[test]
  fn test_repeated_correct_converges_upward() {
    let mut p = INITIAL_PROBABILITY;
    for _ in 0..10 {
      p = update(p, true);
    }
    assert!(p >= MASTERED_THRESHOLD);
  }

  #[test]
  fn test_repeated_incorrect_converges_downward() {
    let mut p = 0.9;
    for _ in 0..10 {
      p = update(p, false);
    }
    assert!(p < DEVELOPING_THRESHOLD);
  }

  #[test]
  fn test_level_buckets() {
    assert_eq!(level_for(0.2, 3), MasteryLevel::Novice);
    assert_eq!(level_for(0.5, 3), MasteryLevel::Developing);
    assert_eq!(level_for(0.7, 3), MasteryLevel::Proficient);
    assert_eq!(level_for(0.9, 10), MasteryLevel::Mastered);
  }

  #[test]
  fn test_no_attempts_is_novice() {
    assert_eq!(level_for(0.99, 0), MasteryLevel::Novice);
  }

  #[test]
  fn test_mastery_needs_minimum_attempts() {
    // High probability with too few data points stays Proficient
    assert_eq!(level_for(0.95, MASTERY_MIN_ATTEMPTS - 1), MasteryLevel::Proficient);
    assert_eq!(level_for(0.95, MASTERY_MIN_ATTEMPTS), MasteryLevel::Mastered);
  }

  #[test]
  fn test_should_advance_at_proficient() {
    let mut score = MasteryScore::new("student-1", "n1");
    score.bkt_probability = 0.5;
    score.practice_count = 4;
    score.level = level_for(0.5, 4);
    assert!(!should_advance_node(&score));

    score.bkt_probability = 0.7;
    score.level = level_for(0.7, 4);
    assert!(should_advance_node(&score));
  }

  fn node(code: &str, difficulty: u8, prereqs: &[&str]) -> KnowledgeNode {
    let mut n = KnowledgeNode::new(code, code, "math");
    n.difficulty = difficulty;
    n.prerequisites = prereqs.iter().map(|s| s.to_string()).collect();
    n
  }

  fn score_at(code: &str, probability: f64, attempts: u32) -> MasteryScore {
    let mut s = MasteryScore::new("student-1", code);
    s.bkt_probability = probability;
    s.practice_count = attempts;
    s.level = level_for(probability, attempts);
    s
  }

  #[test]
  fn test_node_locked_until_prereqs_proficient() {
    let n = node("b", 2, &["a"]);
    let mut scores = HashMap::new();
    assert!(!is_unlocked(&n, &scores));

    scores.insert("a".to_string(), score_at("a", 0.5, 3));
    assert!(!is_unlocked(&n, &scores));

    scores.insert("a".to_string(), score_at("a", 0.7, 3));
    assert!(is_unlocked(&n, &scores));
  }

  #[test]
  fn test_recommend_next_node_picks_easiest_unlocked() {
    let nodes = vec![node("a", 1, &[]), node("b", 2, &["a"]), node("c", 3, &["a"])];
    let mut scores = HashMap::new();

    // Nothing practiced: only "a" is unlocked
    let next = recommend_next_node(&nodes, &scores).unwrap();
    assert_eq!(next.code, "a");

    // "a" proficient: "b" unlocks and wins on difficulty
    scores.insert("a".to_string(), score_at("a", 0.9, 10));
    let next = recommend_next_node(&nodes, &scores).unwrap();
    assert_eq!(next.code, "b");
  }

  #[test]
  fn test_recommend_skips_truly_mastered() {
    let nodes = vec![node("a", 1, &[])];
    let mut scores = HashMap::new();
    let mut done = score_at("a", 0.9, 10);
    done.truly_mastered = true;
    scores.insert("a".to_string(), done);
    assert!(recommend_next_node(&nodes, &scores).is_none());
  }

  #[test]
  fn test_validate_graph_accepts_dag() {
    let nodes = vec![node("a", 1, &[]), node("b", 2, &["a"]), node("c", 3, &["a", "b"])];
    assert!(validate_graph(&nodes).is_ok());
  }

  #[test]
  fn test_validate_graph_rejects_cycle() {
    let nodes = vec![node("a", 1, &["b"]), node("b", 2, &["a"])];
    let err = validate_graph(&nodes).unwrap_err();
    assert!(err.to_string().contains("cycle"));
  }

  #[test]
  fn test_validate_graph_rejects_self_loop() {
    let nodes = vec![node("a", 1, &["a"])];
    assert!(validate_graph(&nodes).is_err());
  }

  #[test]
  fn test_validate_graph_rejects_dangling_edge() {
    let nodes = vec![node("a", 1, &["ghost"])];
    let err = validate_graph(&nodes).unwrap_err();
    assert!(err.to_string().contains("ghost"));
  }
}
