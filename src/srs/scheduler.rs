use chrono::{DateTime, Duration, Utc};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 2.5;

/// Easiness penalty applied on a failed review
const EASE_PENALTY: f64 = 0.2;

/// Fixed interval ladder (days) for the first four successful reviews,
/// applied regardless of easiness
const FIXED_INTERVALS: [i64; 4] = [1, 3, 7, 16];

#[derive(Debug)]
pub struct ScheduleResult {
  pub interval_days: i64,
  pub easiness: f64,
  pub review_count: i64,
  pub due: DateTime<Utc>,
}

/// Compute the next review for a mastered concept.
///
/// Failed review: interval resets to 1 day, easiness drops by 0.2 with a
/// floor of 1.3, and the review count restarts. Successful review: the
/// first four follow the fixed ladder; from the fifth onward the interval
/// grows by the easiness factor, so hard concepts space out slowly and
/// easy ones accelerate.
pub fn next_review(
  interval_days: i64,
  easiness: f64,
  review_count: i64,
  was_correct: bool,
  now: DateTime<Utc>,
) -> ScheduleResult {
  if !was_correct {
    let new_easiness = (easiness - EASE_PENALTY).max(MIN_EASE_FACTOR);
    return ScheduleResult {
      interval_days: 1,
      easiness: new_easiness,
      review_count: 0,
      due: now + Duration::days(1),
    };
  }

  let new_easiness = easiness.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR);
  let new_interval = if (review_count as usize) < FIXED_INTERVALS.len() {
    FIXED_INTERVALS[review_count as usize]
  } else {
    ((interval_days.max(1) as f64) * new_easiness).round() as i64
  };

  ScheduleResult {
    interval_days: new_interval,
    easiness: new_easiness,
    review_count: review_count + 1,
    due: now + Duration::days(new_interval),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fixed_ladder_for_first_four_reviews() {
    let now = Utc::now();
    for (count, expected) in [(0, 1), (1, 3), (2, 7), (3, 16)] {
      let result = next_review(0, 2.5, count, true, now);
      assert_eq!(result.interval_days, expected);
      assert_eq!(result.review_count, count + 1);
    }
  }

  #[test]
  fn test_fixed_ladder_ignores_easiness() {
    let now = Utc::now();
    let low = next_review(0, 1.3, 2, true, now);
    let high = next_review(0, 2.5, 2, true, now);
    assert_eq!(low.interval_days, 7);
    assert_eq!(high.interval_days, 7);
  }

  #[test]
  fn test_fifth_review_multiplies_by_easiness() {
    let now = Utc::now();
    let result = next_review(16, 2.0, 4, true, now);
    assert_eq!(result.interval_days, 32);
    assert_eq!(result.review_count, 5);
  }

  #[test]
  fn test_multiplied_interval_rounds() {
    let now = Utc::now();
    // 7 * 1.5 = 10.5 -> 11
    let result = next_review(7, 1.5, 5, true, now);
    assert_eq!(result.interval_days, 11);
  }

  #[test]
  fn test_failed_review_resets() {
    let now = Utc::now();
    let result = next_review(32, 2.0, 6, false, now);
    assert_eq!(result.interval_days, 1);
    assert_eq!(result.review_count, 0);
    assert!((result.easiness - 1.8).abs() < 1e-9);
    assert_eq!(result.due, now + Duration::days(1));
  }

  #[test]
  fn test_easiness_floor() {
    let now = Utc::now();
    let mut easiness = 2.5;
    for _ in 0..10 {
      easiness = next_review(10, easiness, 5, false, now).easiness;
    }
    assert!((easiness - MIN_EASE_FACTOR).abs() < 1e-9);
  }

  #[test]
  fn test_easiness_clamped_on_success() {
    let now = Utc::now();
    let result = next_review(10, 3.0, 5, true, now);
    assert!((result.easiness - MAX_EASE_FACTOR).abs() < 1e-9);
    assert_eq!(result.interval_days, 25);
  }

  #[test]
  fn test_due_date_is_now_plus_interval() {
    let now = Utc::now();
    let result = next_review(0, 2.5, 3, true, now);
    assert_eq!(result.due, now + Duration::days(16));
  }

  #[test]
  fn test_interval_grows_exponentially_after_ladder() {
    let now = Utc::now();
    let mut interval = 16;
    let mut count = 4;
    let mut previous = interval;

    for _ in 0..4 {
      let result = next_review(interval, 2.0, count, true, now);
      interval = result.interval_days;
      count = result.review_count;
      assert!(interval > previous);
      previous = interval;
    }
    assert_eq!(interval, 256);
  }
}
