//! Engine configuration constants.
//!
//! This module centralizes the tunable values used across the engine.
//! Algorithm-inherent constants (BKT guess/slip, the review ladder) live
//! next to their algorithms; everything operational lives here.

use serde::Deserialize;

// ==================== Diagnostic Configuration ====================

/// Hard cap on questions asked in a single diagnostic run
pub const DIAGNOSTIC_QUESTION_BUDGET: usize = 20;

/// Minutes an abandoned diagnostic session survives in the store
pub const DIAGNOSTIC_TTL_MINUTES: i64 = 120;

/// Probability threshold for store cleanup (0-255, lower = more frequent)
/// Value of 25 means ~10% chance (25/256) on each store access
pub const DIAGNOSTIC_CLEANUP_THRESHOLD: u8 = 25;

// ==================== Review Configuration ====================

/// Maximum nodes in one review session
pub const REVIEW_SESSION_LIMIT: usize = 10;

/// Maximum refresher slots when the due list does not fill a session
pub const REFRESHER_SLOT_LIMIT: usize = 3;

/// Days without practice before a mastered node becomes a refresher candidate
pub const REFRESHER_STALE_DAYS: i64 = 14;

/// Days past due before a node counts as overdue rather than due-today
pub const OVERDUE_GRACE_DAYS: i64 = 1;

// ==================== Practice Configuration ====================

/// Consecutive incorrect answers before the session routes to STRUGGLING
pub const STRUGGLE_STREAK: u32 = 3;

/// Multiplier over the personal-best response time that still counts as fluent
pub const SPEED_TOLERANCE: f64 = 1.5;

// ==================== Grade-Level Speed Thresholds ====================

/// Absolute response-time ceiling by grade band, in milliseconds.
/// Younger students get more time before the speed signal fails.
pub fn grade_speed_threshold_ms(grade_level: u8) -> i64 {
    match grade_level {
        0..=2 => 45_000,
        3..=5 => 30_000,
        6..=8 => 20_000,
        _ => 15_000,
    }
}

// ==================== Gap Time Heuristic ====================

/// Estimated hours to close a gap on a node of the given ordinal difficulty.
/// Used by the goal-aware diagnostic skill map.
pub fn estimated_hours(difficulty: u8) -> f64 {
    match difficulty {
        0..=2 => 1.0,
        3..=4 => 2.0,
        5..=6 => 3.5,
        7..=8 => 5.0,
        _ => 6.5,
    }
}

// ==================== Config Loading ====================

/// Configuration file structure for config.toml
#[derive(Debug, Deserialize)]
struct FileConfig {
    engine: Option<EngineSection>,
}

#[derive(Debug, Deserialize)]
struct EngineSection {
    diagnostic_question_budget: Option<usize>,
    diagnostic_ttl_minutes: Option<i64>,
    review_session_limit: Option<usize>,
}

/// Runtime-overridable engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub diagnostic_question_budget: usize,
    pub diagnostic_ttl_minutes: i64,
    pub review_session_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            diagnostic_question_budget: DIAGNOSTIC_QUESTION_BUDGET,
            diagnostic_ttl_minutes: DIAGNOSTIC_TTL_MINUTES,
            review_session_limit: REVIEW_SESSION_LIMIT,
        }
    }
}

/// Load engine settings with priority: config.toml > env > defaults
pub fn load_engine_config() -> EngineConfig {
    let _ = dotenvy::dotenv();

    let mut config = EngineConfig::default();

    if let Ok(contents) = std::fs::read_to_string("config.toml") {
        if let Ok(file_config) = toml::from_str::<FileConfig>(&contents) {
            if let Some(engine) = file_config.engine {
                if let Some(budget) = engine.diagnostic_question_budget {
                    config.diagnostic_question_budget = budget;
                }
                if let Some(ttl) = engine.diagnostic_ttl_minutes {
                    config.diagnostic_ttl_minutes = ttl;
                }
                if let Some(limit) = engine.review_session_limit {
                    config.review_session_limit = limit;
                }
                tracing::info!("Using engine settings from config.toml");
                return config;
            }
        }
    }

    if let Ok(budget) = std::env::var("DIAGNOSTIC_QUESTION_BUDGET") {
        if let Ok(budget) = budget.parse() {
            tracing::info!("Using diagnostic budget from env: {}", budget);
            config.diagnostic_question_budget = budget;
        }
    }

    config
}
