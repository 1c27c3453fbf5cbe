//! Review session assembly.
//!
//! Builds a bounded daily review set from due and going-stale concepts.
//! Due nodes come first, overdue before due-today, weakest first within a
//! bucket; leftover slots (at most 3) go to mastered nodes that have not
//! been practiced in two weeks. Answers inside a review session feed the
//! same mastery state as regular practice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config;
use crate::domain::{MasteryLevel, MasteryScore};
use crate::srs::scheduler::{self, ScheduleResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
  /// More than one day past due
  Overdue,
  /// Due now, within the overdue grace window
  DueToday,
  /// Not due, but mastered and unpracticed long enough to risk decay
  Refresher,
}

impl ReviewKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Overdue => "overdue",
      Self::DueToday => "due_today",
      Self::Refresher => "refresher",
    }
  }
}

/// One selected node with a snapshot of its mastery at selection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
  pub node_code: String,
  pub kind: ReviewKind,
  pub probability: f64,
  pub level: MasteryLevel,
}

/// A transient grouping of up to `REVIEW_SESSION_LIMIT` nodes for one
/// review pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
  pub student_id: String,
  pub items: Vec<ReviewItem>,
  pub created_at: DateTime<Utc>,
}

fn item_from(score: &MasteryScore, kind: ReviewKind) -> ReviewItem {
  ReviewItem {
    node_code: score.node_code.clone(),
    kind,
    probability: score.bkt_probability,
    level: score.level,
  }
}

/// Assemble a review session of at most `limit` nodes from a student's
/// mastery records.
///
/// Returns `None` when there is nothing to review; an empty session is
/// never built.
pub fn build_review_session(
  student_id: &str,
  scores: &[MasteryScore],
  now: DateTime<Utc>,
  limit: usize,
) -> Option<ReviewSession> {
  let overdue_cutoff = Duration::days(config::OVERDUE_GRACE_DAYS);

  // Due nodes, tagged overdue or due-today
  let mut due: Vec<(&MasteryScore, ReviewKind)> = scores
    .iter()
    .filter_map(|score| {
      let due_at = score.next_due?;
      if due_at > now {
        return None;
      }
      let kind = if now - due_at > overdue_cutoff {
        ReviewKind::Overdue
      } else {
        ReviewKind::DueToday
      };
      Some((score, kind))
    })
    .collect();

  // Overdue first, then weakest first within each bucket
  due.sort_by(|(a, ka), (b, kb)| {
    let bucket = |k: &ReviewKind| if *k == ReviewKind::Overdue { 0 } else { 1 };
    bucket(ka)
      .cmp(&bucket(kb))
      .then(a.bkt_probability.partial_cmp(&b.bkt_probability).unwrap_or(std::cmp::Ordering::Equal))
  });
  due.truncate(limit);

  let mut items: Vec<ReviewItem> = due.iter().map(|(score, kind)| item_from(score, *kind)).collect();

  // Fill leftover slots with refreshers: mastered, unpracticed 14+ days,
  // oldest first, excluding anything already selected
  if items.len() < limit {
    let stale_cutoff = now - Duration::days(config::REFRESHER_STALE_DAYS);
    let mut refreshers: Vec<&MasteryScore> = scores
      .iter()
      .filter(|score| {
        score.level == MasteryLevel::Mastered
          && score.last_practiced.map(|t| t <= stale_cutoff).unwrap_or(false)
          && !items.iter().any(|item| item.node_code == score.node_code)
      })
      .collect();
    refreshers.sort_by_key(|score| score.last_practiced);

    let open_slots = limit - items.len();
    let slots = open_slots.min(config::REFRESHER_SLOT_LIMIT);
    items.extend(
      refreshers
        .into_iter()
        .take(slots)
        .map(|score| item_from(score, ReviewKind::Refresher)),
    );
  }

  if items.is_empty() {
    tracing::debug!(student = student_id, "nothing to review");
    return None;
  }

  Some(ReviewSession {
    student_id: student_id.to_string(),
    items,
    created_at: now,
  })
}

/// Apply one review answer: the tracing model updates exactly as regular
/// practice would, then the scheduler recomputes the next due date.
pub fn apply_review_answer(
  score: &mut MasteryScore,
  was_correct: bool,
  response_ms: i64,
  now: DateTime<Utc>,
) -> ScheduleResult {
  score.apply_answer(was_correct, response_ms, now);

  let result = scheduler::next_review(
    score.interval_days,
    score.easiness,
    score.review_count,
    was_correct,
    now,
  );
  score.interval_days = result.interval_days;
  score.easiness = result.easiness;
  score.review_count = result.review_count;
  score.next_due = Some(result.due);
  result
}
