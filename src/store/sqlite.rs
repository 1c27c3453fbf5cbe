//! Sqlite store backend.
//!
//! Whole-record upserts keep the per-pair atomicity contract: a mastery
//! write is a single statement, so concurrent writers for the same
//! (student, node) pair serialize at the database and never interleave
//! field-by-field.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::bkt;
use crate::domain::{ActivityTag, KnowledgeNode, LearningSession, MasteryScore, QuestionResponse};
use crate::error::Result;
use crate::machine::SessionState;
use crate::step_loop::StepLoop;
use crate::store::Store;

pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  pub fn open(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
    self.conn.lock().expect("Sqlite store lock poisoned")
  }
}

fn init_schema(conn: &Connection) -> Result<()> {
  conn.execute_batch(
    r#"
    CREATE TABLE IF NOT EXISTS knowledge_nodes (
      code TEXT PRIMARY KEY,
      title TEXT NOT NULL,
      description TEXT,
      subject TEXT NOT NULL,
      grade_level INTEGER NOT NULL,
      difficulty INTEGER NOT NULL,
      prerequisites TEXT NOT NULL DEFAULT '[]',
      successors TEXT NOT NULL DEFAULT '[]'
    );

    CREATE TABLE IF NOT EXISTS mastery_scores (
      student_id TEXT NOT NULL,
      node_code TEXT NOT NULL,
      bkt_probability REAL NOT NULL,
      practice_count INTEGER NOT NULL DEFAULT 0,
      correct_count INTEGER NOT NULL DEFAULT 0,
      last_practiced TEXT,
      best_response_ms INTEGER,
      review_count INTEGER NOT NULL DEFAULT 0,
      interval_days INTEGER NOT NULL DEFAULT 0,
      easiness REAL NOT NULL DEFAULT 2.5,
      next_due TEXT,
      fluency_drill_active INTEGER NOT NULL DEFAULT 0,
      truly_mastered INTEGER NOT NULL DEFAULT 0,
      PRIMARY KEY (student_id, node_code)
    );

    CREATE TABLE IF NOT EXISTS question_responses (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      student_id TEXT NOT NULL,
      node_code TEXT NOT NULL,
      session_id TEXT NOT NULL,
      question_text TEXT NOT NULL,
      was_correct INTEGER NOT NULL,
      response_ms INTEGER NOT NULL,
      activity TEXT NOT NULL,
      answered_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS learning_sessions (
      id TEXT PRIMARY KEY,
      student_id TEXT NOT NULL,
      grade_level INTEGER NOT NULL DEFAULT 0,
      state TEXT NOT NULL,
      current_node TEXT,
      step INTEGER NOT NULL DEFAULT 1,
      step_correct INTEGER NOT NULL DEFAULT 0,
      step_total INTEGER NOT NULL DEFAULT 0,
      questions_answered INTEGER NOT NULL DEFAULT 0,
      questions_correct INTEGER NOT NULL DEFAULT 0,
      incorrect_streak INTEGER NOT NULL DEFAULT 0,
      hints_used INTEGER NOT NULL DEFAULT 0,
      started_at TEXT NOT NULL,
      completed_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_mastery_student ON mastery_scores(student_id);
    CREATE INDEX IF NOT EXISTS idx_mastery_next_due ON mastery_scores(next_due);
    CREATE INDEX IF NOT EXISTS idx_responses_pair ON question_responses(student_id, node_code);
    CREATE INDEX IF NOT EXISTS idx_responses_answered_at ON question_responses(answered_at);
    CREATE INDEX IF NOT EXISTS idx_sessions_student ON learning_sessions(student_id);
    "#,
  )?;
  Ok(())
}

fn parse_time(s: &str) -> DateTime<Utc> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_time(s: Option<String>) -> Option<DateTime<Utc>> {
  s.map(|s| parse_time(&s))
}

fn codes_to_json(codes: &[String]) -> String {
  serde_json::to_string(codes).unwrap_or_else(|_| "[]".to_string())
}

fn codes_from_json(raw: &str) -> Vec<String> {
  serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeNode> {
  let prerequisites: String = row.get(6)?;
  let successors: String = row.get(7)?;
  Ok(KnowledgeNode {
    code: row.get(0)?,
    title: row.get(1)?,
    description: row.get(2)?,
    subject: row.get(3)?,
    grade_level: row.get(4)?,
    difficulty: row.get(5)?,
    prerequisites: codes_from_json(&prerequisites),
    successors: codes_from_json(&successors),
  })
}

fn row_to_score(row: &rusqlite::Row) -> rusqlite::Result<MasteryScore> {
  let probability: f64 = row.get(2)?;
  let practice_count: u32 = row.get(3)?;
  let last_practiced: Option<String> = row.get(5)?;
  let next_due: Option<String> = row.get(10)?;
  Ok(MasteryScore {
    student_id: row.get(0)?,
    node_code: row.get(1)?,
    bkt_probability: probability,
    // Level is derived state; always recomputed, never trusted from disk
    level: bkt::level_for(probability, practice_count),
    practice_count,
    correct_count: row.get(4)?,
    last_practiced: parse_opt_time(last_practiced),
    best_response_ms: row.get(6)?,
    review_count: row.get(7)?,
    interval_days: row.get(8)?,
    easiness: row.get(9)?,
    next_due: parse_opt_time(next_due),
    fluency_drill_active: row.get::<_, i64>(11)? != 0,
    truly_mastered: row.get::<_, i64>(12)? != 0,
  })
}

fn row_to_response(row: &rusqlite::Row) -> rusqlite::Result<QuestionResponse> {
  let activity: String = row.get(6)?;
  let answered_at: String = row.get(7)?;
  Ok(QuestionResponse {
    student_id: row.get(0)?,
    node_code: row.get(1)?,
    session_id: row.get(2)?,
    question_text: row.get(3)?,
    was_correct: row.get::<_, i64>(4)? != 0,
    response_ms: row.get(5)?,
    activity: ActivityTag::from_str(&activity).unwrap_or(ActivityTag::GuidedPractice),
    answered_at: parse_time(&answered_at),
  })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<LearningSession> {
  let state: String = row.get(3)?;
  let step: u8 = row.get(5)?;
  let started_at: String = row.get(12)?;
  let completed_at: Option<String> = row.get(13)?;
  Ok(LearningSession {
    id: row.get(0)?,
    student_id: row.get(1)?,
    grade_level: row.get(2)?,
    state: SessionState::from_str(&state).unwrap_or(SessionState::Idle),
    current_node: row.get(4)?,
    step_loop: StepLoop::from_parts(step, row.get(6)?, row.get(7)?),
    questions_answered: row.get(8)?,
    questions_correct: row.get(9)?,
    incorrect_streak: row.get(10)?,
    hints_used: row.get(11)?,
    started_at: parse_time(&started_at),
    completed_at: parse_opt_time(completed_at),
  })
}

impl Store for SqliteStore {
  fn get_node(&self, code: &str) -> Result<Option<KnowledgeNode>> {
    let conn = self.lock();
    let mut stmt = conn.prepare(
      r#"
      SELECT code, title, description, subject, grade_level, difficulty, prerequisites, successors
      FROM knowledge_nodes WHERE code = ?1
      "#,
    )?;

    let mut rows = stmt.query(params![code])?;
    if let Some(row) = rows.next()? {
      Ok(Some(row_to_node(row)?))
    } else {
      Ok(None)
    }
  }

  fn put_node(&self, node: &KnowledgeNode) -> Result<()> {
    let conn = self.lock();
    conn.execute(
      r#"
      INSERT OR REPLACE INTO knowledge_nodes
        (code, title, description, subject, grade_level, difficulty, prerequisites, successors)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
      params![
        node.code,
        node.title,
        node.description,
        node.subject,
        node.grade_level,
        node.difficulty,
        codes_to_json(&node.prerequisites),
        codes_to_json(&node.successors),
      ],
    )?;
    Ok(())
  }

  fn all_nodes(&self) -> Result<Vec<KnowledgeNode>> {
    let conn = self.lock();
    let mut stmt = conn.prepare(
      r#"
      SELECT code, title, description, subject, grade_level, difficulty, prerequisites, successors
      FROM knowledge_nodes
      ORDER BY difficulty ASC, code ASC
      "#,
    )?;

    let nodes = stmt
      .query_map([], |row| row_to_node(row))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(nodes)
  }

  fn get_mastery(&self, student_id: &str, node_code: &str) -> Result<Option<MasteryScore>> {
    let conn = self.lock();
    let mut stmt = conn.prepare(
      r#"
      SELECT student_id, node_code, bkt_probability, practice_count, correct_count,
             last_practiced, best_response_ms, review_count, interval_days, easiness,
             next_due, fluency_drill_active, truly_mastered
      FROM mastery_scores WHERE student_id = ?1 AND node_code = ?2
      "#,
    )?;

    let mut rows = stmt.query(params![student_id, node_code])?;
    if let Some(row) = rows.next()? {
      Ok(Some(row_to_score(row)?))
    } else {
      Ok(None)
    }
  }

  fn put_mastery(&self, score: &MasteryScore) -> Result<()> {
    let conn = self.lock();
    conn.execute(
      r#"
      INSERT OR REPLACE INTO mastery_scores
        (student_id, node_code, bkt_probability, practice_count, correct_count,
         last_practiced, best_response_ms, review_count, interval_days, easiness,
         next_due, fluency_drill_active, truly_mastered)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
      "#,
      params![
        score.student_id,
        score.node_code,
        score.bkt_probability,
        score.practice_count,
        score.correct_count,
        score.last_practiced.map(|t| t.to_rfc3339()),
        score.best_response_ms,
        score.review_count,
        score.interval_days,
        score.easiness,
        score.next_due.map(|t| t.to_rfc3339()),
        score.fluency_drill_active as i64,
        score.truly_mastered as i64,
      ],
    )?;
    Ok(())
  }

  fn mastery_for_student(&self, student_id: &str) -> Result<Vec<MasteryScore>> {
    let conn = self.lock();
    let mut stmt = conn.prepare(
      r#"
      SELECT student_id, node_code, bkt_probability, practice_count, correct_count,
             last_practiced, best_response_ms, review_count, interval_days, easiness,
             next_due, fluency_drill_active, truly_mastered
      FROM mastery_scores WHERE student_id = ?1
      ORDER BY node_code ASC
      "#,
    )?;

    let scores = stmt
      .query_map(params![student_id], |row| row_to_score(row))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(scores)
  }

  fn append_response(&self, response: &QuestionResponse) -> Result<()> {
    let conn = self.lock();
    conn.execute(
      r#"
      INSERT INTO question_responses
        (student_id, node_code, session_id, question_text, was_correct, response_ms, activity, answered_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
      "#,
      params![
        response.student_id,
        response.node_code,
        response.session_id,
        response.question_text,
        response.was_correct as i64,
        response.response_ms,
        response.activity.as_str(),
        response.answered_at.to_rfc3339(),
      ],
    )?;
    Ok(())
  }

  fn responses_for_node(&self, student_id: &str, node_code: &str) -> Result<Vec<QuestionResponse>> {
    let conn = self.lock();
    let mut stmt = conn.prepare(
      r#"
      SELECT student_id, node_code, session_id, question_text, was_correct, response_ms, activity, answered_at
      FROM question_responses
      WHERE student_id = ?1 AND node_code = ?2
      ORDER BY answered_at ASC, id ASC
      "#,
    )?;

    let responses = stmt
      .query_map(params![student_id, node_code], |row| row_to_response(row))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(responses)
  }

  fn get_session(&self, id: &str) -> Result<Option<LearningSession>> {
    let conn = self.lock();
    let mut stmt = conn.prepare(
      r#"
      SELECT id, student_id, grade_level, state, current_node, step, step_correct, step_total,
             questions_answered, questions_correct, incorrect_streak, hints_used,
             started_at, completed_at
      FROM learning_sessions WHERE id = ?1
      "#,
    )?;

    let mut rows = stmt.query(params![id])?;
    if let Some(row) = rows.next()? {
      Ok(Some(row_to_session(row)?))
    } else {
      Ok(None)
    }
  }

  fn put_session(&self, session: &LearningSession) -> Result<()> {
    let conn = self.lock();
    conn.execute(
      r#"
      INSERT OR REPLACE INTO learning_sessions
        (id, student_id, grade_level, state, current_node, step, step_correct, step_total,
         questions_answered, questions_correct, incorrect_streak, hints_used,
         started_at, completed_at)
      VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
      "#,
      params![
        session.id,
        session.student_id,
        session.grade_level,
        session.state.as_str(),
        session.current_node,
        session.step_loop.step(),
        session.step_loop.correct(),
        session.step_loop.total(),
        session.questions_answered,
        session.questions_correct,
        session.incorrect_streak,
        session.hints_used,
        session.started_at.to_rfc3339(),
        session.completed_at.map(|t| t.to_rfc3339()),
      ],
    )?;
    Ok(())
  }
}
