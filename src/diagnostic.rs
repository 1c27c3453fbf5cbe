//! Adaptive diagnostic placement.
//!
//! Locates a student's frontier in a prerequisite-ordered concept space
//! with a bounded binary search: a correct answer moves the lower bound of
//! "known" up toward harder concepts, an incorrect answer moves the upper
//! bound down. The run ends when the space is exhausted, the bracket
//! converges, or the question budget runs out. Exhaustion is a defined
//! completion path, never an error.
//!
//! Diagnostic state is ephemeral: it lives in an expiring keyed store for
//! the duration of the run and is garbage-collected by TTL if abandoned.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::domain::{KnowledgeNode, MasteryScore};
use crate::error::{EngineError, Result};

/// Mastery seeded for a concept the diagnostic confirmed or inferred known
pub const PLACEMENT_KNOWN_PROBABILITY: f64 = 0.8;

/// Mastery seeded for a confirmed or inferred gap
pub const PLACEMENT_GAP_PROBABILITY: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticMode {
  /// Search the full default concept space for the student's grade
  Standard,
  /// Search only the prerequisite chain of a specific learning goal
  GoalAware,
}

/// Ephemeral state of one diagnostic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticState {
  pub session_id: String,
  pub mode: DiagnosticMode,
  /// Candidate node codes ordered by ascending difficulty
  pub candidates: Vec<String>,
  pub confirmed_mastered: Vec<String>,
  pub confirmed_gaps: Vec<String>,
  /// Bracket: candidates below `low` are known, at or above `high` are
  /// gaps, in between is unexplored
  pub low: usize,
  pub high: usize,
  pub questions_asked: usize,
  pub complete: bool,
}

impl DiagnosticState {
  fn new(session_id: impl Into<String>, mode: DiagnosticMode, candidates: Vec<String>) -> Self {
    let complete = candidates.is_empty();
    let high = candidates.len();
    Self {
      session_id: session_id.into(),
      mode,
      candidates,
      confirmed_mastered: Vec::new(),
      confirmed_gaps: Vec::new(),
      low: 0,
      high,
      questions_asked: 0,
      complete,
    }
  }

  /// Standard mode: every node at the student's grade level, ordered by
  /// difficulty.
  pub fn standard(session_id: impl Into<String>, nodes: &[KnowledgeNode], grade_level: u8) -> Self {
    let mut space: Vec<&KnowledgeNode> =
      nodes.iter().filter(|n| n.grade_level == grade_level).collect();
    space.sort_by_key(|n| (n.difficulty, n.code.clone()));
    Self::new(
      session_id,
      DiagnosticMode::Standard,
      space.into_iter().map(|n| n.code.clone()).collect(),
    )
  }

  /// Goal-aware mode: the transitive prerequisite chain of the goal node,
  /// goal included, ordered by difficulty.
  pub fn goal_aware(
    session_id: impl Into<String>,
    nodes: &[KnowledgeNode],
    goal_code: &str,
  ) -> Result<Self> {
    let by_code: HashMap<&str, &KnowledgeNode> =
      nodes.iter().map(|n| (n.code.as_str(), n)).collect();
    if !by_code.contains_key(goal_code) {
      return Err(EngineError::not_found("node", goal_code));
    }

    let mut chain: HashSet<&str> = HashSet::new();
    let mut stack = vec![goal_code];
    while let Some(code) = stack.pop() {
      if !chain.insert(code) {
        continue;
      }
      if let Some(node) = by_code.get(code) {
        for prereq in &node.prerequisites {
          stack.push(prereq);
        }
      }
    }

    let mut space: Vec<&KnowledgeNode> = chain
      .into_iter()
      .filter_map(|code| by_code.get(code).copied())
      .collect();
    space.sort_by_key(|n| (n.difficulty, n.code.clone()));
    Ok(Self::new(
      session_id,
      DiagnosticMode::GoalAware,
      space.into_iter().map(|n| n.code.clone()).collect(),
    ))
  }

  pub fn is_complete(&self) -> bool {
    self.complete
  }

  fn probe_index(&self) -> usize {
    self.low + (self.high - self.low) / 2
  }

  /// The node to probe next, or None once the run is complete.
  pub fn current_probe(&self) -> Option<&str> {
    if self.complete {
      return None;
    }
    self.candidates.get(self.probe_index()).map(|s| s.as_str())
  }

  /// Record the answer to the current probe and tighten the bracket.
  /// Marks the run complete when the bracket converges or the question
  /// budget is reached.
  pub fn record_answer(&mut self, was_correct: bool, question_budget: usize) {
    if self.complete {
      return;
    }
    let mid = self.probe_index();
    let code = self.candidates[mid].clone();
    if was_correct {
      self.confirmed_mastered.push(code);
      self.low = mid + 1;
    } else {
      self.confirmed_gaps.push(code);
      self.high = mid;
    }
    self.questions_asked += 1;

    if self.low >= self.high || self.questions_asked >= question_budget {
      self.complete = true;
    }
  }

  /// Compute the placement from whatever brackets exist. Valid at any
  /// point, including forced completion on an exhausted space.
  pub fn placement(&self, nodes: &[KnowledgeNode]) -> PlacementResult {
    let index_of: HashMap<&str, usize> = self
      .candidates
      .iter()
      .enumerate()
      .map(|(i, code)| (code.as_str(), i))
      .collect();

    // Highest confirmed-mastered node; gaps all sit above the bracket
    let frontier = self
      .confirmed_mastered
      .iter()
      .max_by_key(|code| index_of.get(code.as_str()).copied().unwrap_or(0))
      .cloned();

    let skill_map = match self.mode {
      DiagnosticMode::Standard => None,
      DiagnosticMode::GoalAware => Some(self.skill_map(nodes)),
    };

    PlacementResult {
      session_id: self.session_id.clone(),
      mode: self.mode,
      frontier,
      mastered: self.confirmed_mastered.clone(),
      gaps: self.confirmed_gaps.clone(),
      questions_used: self.questions_asked,
      skill_map,
    }
  }

  fn skill_map(&self, nodes: &[KnowledgeNode]) -> SkillMap {
    let difficulty_of: HashMap<&str, u8> =
      nodes.iter().map(|n| (n.code.as_str(), n.difficulty)).collect();

    let mut entries = Vec::with_capacity(self.candidates.len());
    let mut total_gap_hours = 0.0;
    for (idx, code) in self.candidates.iter().enumerate() {
      let status = if idx < self.low {
        SkillStatus::Mastered
      } else if idx >= self.high {
        SkillStatus::Gap
      } else {
        SkillStatus::Untested
      };
      let estimated_hours = if status == SkillStatus::Gap {
        let difficulty = difficulty_of.get(code.as_str()).copied().unwrap_or(0);
        let hours = config::estimated_hours(difficulty);
        total_gap_hours += hours;
        Some(hours)
      } else {
        None
      };
      entries.push(SkillMapEntry {
        node_code: code.clone(),
        status,
        estimated_hours,
      });
    }

    SkillMap {
      entries,
      total_gap_hours,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillStatus {
  Mastered,
  Gap,
  Untested,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMapEntry {
  pub node_code: String,
  pub status: SkillStatus,
  /// Estimated hours to close the gap; only present for gaps
  pub estimated_hours: Option<f64>,
}

/// Goal-aware placement detail: every candidate classified, with a time
/// estimate per gap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMap {
  pub entries: Vec<SkillMapEntry>,
  pub total_gap_hours: f64,
}

/// Result of a completed diagnostic run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementResult {
  pub session_id: String,
  pub mode: DiagnosticMode,
  pub frontier: Option<String>,
  pub mastered: Vec<String>,
  pub gaps: Vec<String>,
  pub questions_used: usize,
  pub skill_map: Option<SkillMap>,
}

/// Seed per-concept mastery from a placement before any teaching occurs.
/// Bracket-inferred nodes are seeded like confirmed ones; untested nodes
/// are left for lazy creation on first practice.
pub fn bootstrap_scores(student_id: &str, state: &DiagnosticState) -> Vec<MasteryScore> {
  let mut scores = Vec::new();
  for (idx, code) in state.candidates.iter().enumerate() {
    let (probability, correct) = if idx < state.low {
      (PLACEMENT_KNOWN_PROBABILITY, 1)
    } else if idx >= state.high {
      (PLACEMENT_GAP_PROBABILITY, 0)
    } else {
      continue;
    };
    let mut score = MasteryScore::new(student_id, code.clone());
    score.bkt_probability = probability;
    score.practice_count = 1;
    score.correct_count = correct;
    score.level = crate::bkt::level_for(probability, score.practice_count);
    score.last_practiced = Some(Utc::now());
    scores.push(score);
  }
  scores
}

// ==================== Expiring store ====================

struct StoreEntry {
  state: DiagnosticState,
  last_access: DateTime<Utc>,
}

/// In-memory store for in-flight diagnostic runs, keyed by session id.
///
/// Entries expire after a TTL of inactivity so that abandoned runs are
/// garbage-collected; cleanup piggybacks on accesses with a small
/// probability rather than requiring a background task.
pub struct DiagnosticStore {
  entries: Mutex<HashMap<String, StoreEntry>>,
  ttl_minutes: i64,
}

impl DiagnosticStore {
  pub fn new(ttl_minutes: i64) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      ttl_minutes,
    }
  }

  pub fn get(&self, session_id: &str) -> Option<DiagnosticState> {
    let mut entries = self.entries.lock().expect("Diagnostic store lock poisoned");

    // Clean up expired runs occasionally (~10% chance)
    if rand::random::<u8>() < config::DIAGNOSTIC_CLEANUP_THRESHOLD {
      Self::drop_expired(&mut entries, self.ttl_minutes);
    }

    let entry = entries.get_mut(session_id)?;
    if Utc::now() - entry.last_access > Duration::minutes(self.ttl_minutes) {
      entries.remove(session_id);
      return None;
    }
    entry.last_access = Utc::now();
    Some(entry.state.clone())
  }

  pub fn put(&self, state: DiagnosticState) {
    let mut entries = self.entries.lock().expect("Diagnostic store lock poisoned");
    entries.insert(
      state.session_id.clone(),
      StoreEntry {
        state,
        last_access: Utc::now(),
      },
    );
  }

  pub fn remove(&self, session_id: &str) -> Option<DiagnosticState> {
    let mut entries = self.entries.lock().expect("Diagnostic store lock poisoned");
    entries.remove(session_id).map(|entry| entry.state)
  }

  /// Drop every entry past the TTL. Also called probabilistically on
  /// access.
  pub fn cleanup_expired(&self) {
    let mut entries = self.entries.lock().expect("Diagnostic store lock poisoned");
    Self::drop_expired(&mut entries, self.ttl_minutes);
  }

  fn drop_expired(entries: &mut HashMap<String, StoreEntry>, ttl_minutes: i64) {
    let expiry = Utc::now() - Duration::minutes(ttl_minutes);
    entries.retain(|_, entry| entry.last_access > expiry);
  }

  pub fn len(&self) -> usize {
    self.entries.lock().expect("Diagnostic store lock poisoned").len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
