//! Engine orchestration.
//!
//! Composes the separately-kept pieces (the outer session state machine,
//! the nested practice loop, the tracing model, the gate, the diagnostic,
//! the scheduler) into the flows a caller actually drives. All work is synchronous; persistence goes through the
//! store collaborator, notifications are fire-and-forget.
//!
//! Callers are expected to serialize access per session (one answer at a
//! time per session id); mastery writes are whole-record puts so updates
//! for the same (student, node) pair never interleave field-by-field.

use std::collections::HashMap;

use chrono::Utc;

use crate::bkt;
use crate::config::{self, EngineConfig};
use crate::content::{self, ContentSource, Explanation, GeneratedQuestion, StudentContext};
use crate::diagnostic::{self, DiagnosticState, DiagnosticStore, PlacementResult};
use crate::domain::{ActivityTag, LearningSession, MasteryScore, QuestionResponse};
use crate::error::{EngineError, Result};
use crate::events::{self, EngineEvent, EventSink};
use crate::gate::{self, GateDecision};
use crate::machine::SessionState;
use crate::srs;
use crate::step_loop::StepOutcome;
use crate::store::Store;

/// What the caller should do after submitting a practice answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerOutcome {
  /// Current step needs more questions
  NextQuestion,
  /// Step quota passed; now at the contained step
  StepPassed { step: u8 },
  /// Step quota failed; back at the readiness check
  StepFailed,
  /// The gate granted true mastery; the scheduler owns this node now
  Mastered { next_node: Option<String> },
  /// The gate routed into an untimed fluency drill
  FluencyDrill,
  /// The gate found retention lacking; back at the readiness check
  RetentionReview,
  /// The gate's fail-closed default; back at the readiness check
  KeepPracticing,
  /// Struggle streak hit; session has moved to STRUGGLING
  Intervention,
  /// Boss challenge cleared
  BossCleared,
  /// Boss challenge failed; session has moved to STRUGGLING
  BossFailed,
}

/// Next move in a diagnostic run.
#[derive(Debug, Clone)]
pub enum DiagnosticStep {
  /// Ask a question on this node
  Probe(String),
  /// The run completed; mastery has been bootstrapped
  Placed(PlacementResult),
}

pub struct Engine<S: Store, C: ContentSource, E: EventSink> {
  store: S,
  content: C,
  events: E,
  config: EngineConfig,
  diagnostics: DiagnosticStore,
}

impl<S: Store, C: ContentSource, E: EventSink> Engine<S, C, E> {
  pub fn new(store: S, content: C, events: E, config: EngineConfig) -> Self {
    let diagnostics = DiagnosticStore::new(config.diagnostic_ttl_minutes);
    Self {
      store,
      content,
      events,
      config,
      diagnostics,
    }
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  pub fn events(&self) -> &E {
    &self.events
  }

  // ==================== Session lifecycle ====================

  pub fn start_session(
    &self,
    session_id: &str,
    student_id: &str,
    grade_level: u8,
  ) -> Result<LearningSession> {
    let session = LearningSession::new(session_id, student_id, grade_level);
    self.store.put_session(&session)?;
    tracing::info!(session = session_id, student = student_id, "session started");
    Ok(session)
  }

  pub fn load_session(&self, session_id: &str) -> Result<LearningSession> {
    self
      .store
      .get_session(session_id)?
      .ok_or_else(|| EngineError::not_found("session", session_id))
  }

  pub fn complete_session(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::Completed, "session_complete")?;
    self.store.put_session(session)?;
    events::notify(
      &self.events,
      EngineEvent::SessionCompleted {
        session_id: session.id.clone(),
        questions_answered: session.questions_answered,
      },
    );
    Ok(())
  }

  // ==================== Diagnostic flow ====================

  /// Start a standard diagnostic over the full concept space for the
  /// session's grade.
  pub fn begin_diagnostic(&self, session: &mut LearningSession) -> Result<DiagnosticStep> {
    session.transition_to(SessionState::Diagnostic, "diagnostic_started")?;
    let nodes = self.store.all_nodes()?;
    let state = DiagnosticState::standard(&session.id, &nodes, session.grade_level);
    self.launch_diagnostic(session, state)
  }

  /// Start a goal-aware diagnostic over the prerequisite chain of a goal
  /// node.
  pub fn begin_goal_diagnostic(
    &self,
    session: &mut LearningSession,
    goal_code: &str,
  ) -> Result<DiagnosticStep> {
    session.transition_to(SessionState::Diagnostic, "diagnostic_started")?;
    let nodes = self.store.all_nodes()?;
    let state = DiagnosticState::goal_aware(&session.id, &nodes, goal_code)?;
    self.launch_diagnostic(session, state)
  }

  fn launch_diagnostic(
    &self,
    session: &mut LearningSession,
    state: DiagnosticState,
  ) -> Result<DiagnosticStep> {
    // An empty search space completes on the spot
    let probe = match state.current_probe() {
      Some(code) => code.to_string(),
      None => return self.finish_diagnostic(session, state),
    };
    self.diagnostics.put(state);
    self.store.put_session(session)?;
    Ok(DiagnosticStep::Probe(probe))
  }

  /// Record a diagnostic answer; returns the next probe or the final
  /// placement.
  pub fn submit_diagnostic_answer(
    &self,
    session: &mut LearningSession,
    was_correct: bool,
    response_ms: i64,
  ) -> Result<DiagnosticStep> {
    if session.state != SessionState::Diagnostic {
      return Err(EngineError::Validation(format!(
        "session {} is not running a diagnostic",
        session.id
      )));
    }
    let mut state = self
      .diagnostics
      .get(&session.id)
      .ok_or_else(|| EngineError::not_found("diagnostic", &session.id))?;

    let probe = state
      .current_probe()
      .map(|s| s.to_string())
      .ok_or_else(|| EngineError::Validation("diagnostic has no open probe".to_string()))?;

    self.store.append_response(&QuestionResponse::new(
      &session.student_id,
      &probe,
      &session.id,
      format!("diagnostic probe: {probe}"),
      was_correct,
      response_ms,
      ActivityTag::Diagnostic,
    ))?;
    session.tally_answer(was_correct);

    state.record_answer(was_correct, self.config.diagnostic_question_budget);

    match state.current_probe() {
      Some(next) => {
        let next = next.to_string();
        self.diagnostics.put(state);
        self.store.put_session(session)?;
        Ok(DiagnosticStep::Probe(next))
      }
      None => self.finish_diagnostic(session, state),
    }
  }

  fn finish_diagnostic(
    &self,
    session: &mut LearningSession,
    state: DiagnosticState,
  ) -> Result<DiagnosticStep> {
    let nodes = self.store.all_nodes()?;
    let placement = state.placement(&nodes);

    // Bootstrap per-concept mastery before any teaching occurs
    for score in diagnostic::bootstrap_scores(&session.student_id, &state) {
      self.store.put_mastery(&score)?;
    }
    self.diagnostics.remove(&session.id);

    session.transition_to(SessionState::Teaching, "placement_complete")?;
    let scores = self.score_map(&session.student_id)?;
    session.current_node = bkt::recommend_next_node(&nodes, &scores).map(|n| n.code.clone());
    session.step_loop.enter_step(1);
    self.store.put_session(session)?;

    tracing::info!(
      session = %session.id,
      frontier = placement.frontier.as_deref().unwrap_or("none"),
      questions = placement.questions_used,
      "diagnostic placed"
    );
    events::notify(
      &self.events,
      EngineEvent::PlacementCompleted {
        student_id: session.student_id.clone(),
        frontier: placement.frontier.clone(),
      },
    );
    Ok(DiagnosticStep::Placed(placement))
  }

  // ==================== Teaching and practice ====================

  /// Move the session into TEACHING for the given node and hand back the
  /// lesson payload.
  pub fn start_teaching(
    &self,
    session: &mut LearningSession,
    node_code: &str,
  ) -> Result<Explanation> {
    let node = self
      .store
      .get_node(node_code)?
      .ok_or_else(|| EngineError::not_found("node", node_code))?;

    session.transition_to(SessionState::Teaching, "lesson_selected")?;
    session.current_node = Some(node.code.clone());
    session.step_loop.enter_step(1);
    self.store.put_session(session)?;

    let ctx = self.student_context(session, node_code)?;
    Ok(content::explanation_or_fallback(&self.content, &node, &ctx))
  }

  /// Leave the introduction: TEACHING -> PRACTICE, step loop at the
  /// readiness check.
  pub fn advance_to_practice(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::Practice, "practice_started")?;
    session.step_loop.advance_from_introduction();
    self.store.put_session(session)
  }

  /// Fetch the question to present next, validated with fallback.
  pub fn next_question(&self, session: &LearningSession) -> Result<GeneratedQuestion> {
    let node_code = session
      .current_node
      .as_deref()
      .ok_or_else(|| EngineError::Validation("session has no active node".to_string()))?;
    let node = self
      .store
      .get_node(node_code)?
      .ok_or_else(|| EngineError::not_found("node", node_code))?;
    let ctx = self.student_context(session, node_code)?;
    Ok(content::question_or_fallback(&self.content, &node, &ctx))
  }

  /// Submit one practice answer and drive the step loop, the tracing
  /// model, struggle detection, and (on a correct mastery proof) the
  /// gate.
  pub fn submit_answer(
    &self,
    session: &mut LearningSession,
    question_text: &str,
    was_correct: bool,
    response_ms: i64,
  ) -> Result<AnswerOutcome> {
    if session.state != SessionState::Practice {
      return Err(EngineError::Validation(format!(
        "session {} is not practicing (state {})",
        session.id,
        session.state.as_str()
      )));
    }
    let node_code = session
      .current_node
      .clone()
      .ok_or_else(|| EngineError::Validation("session has no active node".to_string()))?;
    let step = session.step_loop.step();
    let mut score = self.load_or_create_score(&session.student_id, &node_code)?;
    let activity = match ActivityTag::for_step(step) {
      // A proof attempt during an active drill is the drill itself
      Some(ActivityTag::MasteryProof) if score.fluency_drill_active => ActivityTag::FluencyDrill,
      Some(tag) => tag,
      None => {
        return Err(EngineError::Validation(
          "the introduction step asks no questions".to_string(),
        ));
      }
    };

    self.store.append_response(&QuestionResponse::new(
      &session.student_id,
      &node_code,
      &session.id,
      question_text,
      was_correct,
      response_ms,
      activity,
    ))?;
    session.tally_answer(was_correct);

    let now = Utc::now();
    if session.step_loop.updates_mastery() {
      score.apply_answer(was_correct, response_ms, now);
      self.store.put_mastery(&score)?;
    }

    let outcome = session.step_loop.record_answer(was_correct);

    // Struggle detection wins over whatever the step decided
    if !was_correct && session.incorrect_streak >= config::STRUGGLE_STREAK {
      session.transition_to(SessionState::Struggling, "struggle_streak")?;
      self.store.put_session(session)?;
      events::notify(
        &self.events,
        EngineEvent::StruggleDetected {
          student_id: session.student_id.clone(),
          node_code,
        },
      );
      return Ok(AnswerOutcome::Intervention);
    }

    let result = match outcome {
      StepOutcome::InProgress => AnswerOutcome::NextQuestion,
      StepOutcome::SentBack => AnswerOutcome::StepFailed,
      StepOutcome::Advanced(step) => {
        // Reaching independent practice or the proof is worth a moment
        if step >= 4 {
          session.transition_to(SessionState::Celebrating, "step_passed")?;
        }
        AnswerOutcome::StepPassed { step }
      }
      StepOutcome::GateEligible => self.run_gate(session, &node_code, &mut score)?,
    };

    self.store.put_session(session)?;
    Ok(result)
  }

  fn run_gate(
    &self,
    session: &mut LearningSession,
    node_code: &str,
    score: &mut MasteryScore,
  ) -> Result<AnswerOutcome> {
    let history = self.store.responses_for_node(&session.student_id, node_code)?;
    let decision = gate::evaluate_or_practice(score, &history, session.grade_level);
    tracing::info!(
      session = %session.id,
      node = node_code,
      decision = decision.as_str(),
      "mastery gate decision"
    );

    match decision {
      GateDecision::Advance => {
        score.truly_mastered = true;
        score.fluency_drill_active = false;
        // Hand the node to the scheduler: first review due tomorrow
        let schedule = srs::next_review(score.interval_days, score.easiness, 0, true, Utc::now());
        score.interval_days = schedule.interval_days;
        score.easiness = schedule.easiness;
        score.review_count = schedule.review_count;
        score.next_due = Some(schedule.due);
        self.store.put_mastery(score)?;

        session.transition_to(SessionState::Celebrating, "node_mastered")?;
        events::notify(
          &self.events,
          EngineEvent::NodeMastered {
            student_id: session.student_id.clone(),
            node_code: node_code.to_string(),
          },
        );

        let nodes = self.store.all_nodes()?;
        let scores = self.score_map(&session.student_id)?;
        let next_node = bkt::recommend_next_node(&nodes, &scores).map(|n| n.code.clone());
        Ok(AnswerOutcome::Mastered { next_node })
      }
      GateDecision::FluencyDrill => {
        score.fluency_drill_active = true;
        self.store.put_mastery(score)?;
        events::notify(
          &self.events,
          EngineEvent::FluencyDrillStarted {
            student_id: session.student_id.clone(),
            node_code: node_code.to_string(),
          },
        );
        // Stay at the proof step; the drill re-proves under time pressure
        Ok(AnswerOutcome::FluencyDrill)
      }
      GateDecision::RetentionReview => {
        session.step_loop.enter_step(2);
        Ok(AnswerOutcome::RetentionReview)
      }
      GateDecision::Practice => {
        session.step_loop.enter_step(2);
        Ok(AnswerOutcome::KeepPracticing)
      }
    }
  }

  // ==================== Side flows ====================

  pub fn request_hint(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::HintRequested, "hint_requested")?;
    session.hints_used += 1;
    self.store.put_session(session)
  }

  pub fn resume_after_hint(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::Practice, "hint_consumed")?;
    self.store.put_session(session)
  }

  pub fn continue_after_celebration(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::Practice, "celebration_done")?;
    self.store.put_session(session)
  }

  pub fn begin_boss_challenge(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::BossChallenge, "boss_challenge")?;
    self.store.put_session(session)
  }

  /// Boss answers are scored like mastery proofs: full weight in the
  /// tracing model, celebration or struggle on the outcome.
  pub fn submit_boss_answer(
    &self,
    session: &mut LearningSession,
    question_text: &str,
    was_correct: bool,
    response_ms: i64,
  ) -> Result<AnswerOutcome> {
    if session.state != SessionState::BossChallenge {
      return Err(EngineError::Validation(format!(
        "session {} is not in a boss challenge",
        session.id
      )));
    }
    let node_code = session
      .current_node
      .clone()
      .ok_or_else(|| EngineError::Validation("session has no active node".to_string()))?;

    self.store.append_response(&QuestionResponse::new(
      &session.student_id,
      &node_code,
      &session.id,
      question_text,
      was_correct,
      response_ms,
      ActivityTag::BossChallenge,
    ))?;
    session.tally_answer(was_correct);

    let mut score = self.load_or_create_score(&session.student_id, &node_code)?;
    score.apply_answer(was_correct, response_ms, Utc::now());
    self.store.put_mastery(&score)?;

    let outcome = if was_correct {
      session.transition_to(SessionState::Celebrating, "boss_cleared")?;
      AnswerOutcome::BossCleared
    } else {
      session.transition_to(SessionState::Struggling, "boss_failed")?;
      AnswerOutcome::BossFailed
    };
    self.store.put_session(session)?;
    Ok(outcome)
  }

  pub fn begin_emotional_check(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::EmotionalCheck, "emotional_check")?;
    self.store.put_session(session)
  }

  /// After the check-in the student either returns to the lesson or
  /// steps away for now.
  pub fn resume_after_emotional_check(
    &self,
    session: &mut LearningSession,
    ready_to_continue: bool,
  ) -> Result<()> {
    let target = if ready_to_continue {
      SessionState::Teaching
    } else {
      SessionState::Idle
    };
    session.transition_to(target, "emotional_check_done")?;
    self.store.put_session(session)
  }

  // ==================== Review flow ====================

  /// Assemble today's review set for a student, or None when nothing is
  /// due or going stale.
  pub fn build_review(&self, student_id: &str) -> Result<Option<srs::ReviewSession>> {
    let scores = self.store.mastery_for_student(student_id)?;
    Ok(srs::build_review_session(
      student_id,
      &scores,
      Utc::now(),
      self.config.review_session_limit,
    ))
  }

  /// Enter the in-session review detour (PRACTICE -> REVIEW).
  pub fn begin_review(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::Review, "review_started")?;
    self.store.put_session(session)
  }

  /// Leave the review detour back to practice.
  pub fn resume_after_review(&self, session: &mut LearningSession) -> Result<()> {
    session.transition_to(SessionState::Practice, "review_done")?;
    self.store.put_session(session)
  }

  /// Apply one review answer: same tracing update as practice, then the
  /// scheduler recomputes the due date. One whole-record put keeps the
  /// pair update atomic.
  pub fn submit_review_answer(
    &self,
    student_id: &str,
    node_code: &str,
    session_id: &str,
    question_text: &str,
    was_correct: bool,
    response_ms: i64,
  ) -> Result<srs::ScheduleResult> {
    let mut score = self
      .store
      .get_mastery(student_id, node_code)?
      .ok_or_else(|| EngineError::not_found("mastery", format!("{student_id}/{node_code}")))?;

    self.store.append_response(&QuestionResponse::new(
      student_id,
      node_code,
      session_id,
      question_text,
      was_correct,
      response_ms,
      ActivityTag::Review,
    ))?;

    let result = srs::apply_review_answer(&mut score, was_correct, response_ms, Utc::now());
    self.store.put_mastery(&score)?;

    events::notify(
      &self.events,
      EngineEvent::ReviewCompleted {
        student_id: student_id.to_string(),
        node_code: node_code.to_string(),
        was_correct,
      },
    );
    Ok(result)
  }

  // ==================== Helpers ====================

  fn load_or_create_score(&self, student_id: &str, node_code: &str) -> Result<MasteryScore> {
    Ok(
      self
        .store
        .get_mastery(student_id, node_code)?
        .unwrap_or_else(|| MasteryScore::new(student_id, node_code)),
    )
  }

  fn score_map(&self, student_id: &str) -> Result<HashMap<String, MasteryScore>> {
    Ok(
      self
        .store
        .mastery_for_student(student_id)?
        .into_iter()
        .map(|s| (s.node_code.clone(), s))
        .collect(),
    )
  }

  fn student_context(&self, session: &LearningSession, node_code: &str) -> Result<StudentContext> {
    let level = self
      .store
      .get_mastery(&session.student_id, node_code)?
      .map(|s| s.level)
      .unwrap_or(crate::domain::MasteryLevel::Novice);
    Ok(StudentContext {
      student_id: session.student_id.clone(),
      grade_level: session.grade_level,
      mastery_level: level,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::KnowledgeNode;
  use crate::testing::{linear_graph, TestEngine};

  fn engine() -> TestEngine {
    crate::testing::engine_with_nodes(linear_graph(6))
  }

  fn practicing_session(engine: &TestEngine, node: &str) -> LearningSession {
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();
    engine.start_teaching(&mut session, node).unwrap();
    engine.advance_to_practice(&mut session).unwrap();
    session
  }

  #[test]
  fn test_start_session_persists_idle() {
    let engine = engine();
    let session = engine.start_session("s-1", "student-1", 4).unwrap();
    assert_eq!(session.state, SessionState::Idle);
    assert_eq!(engine.load_session("s-1").unwrap().state, SessionState::Idle);
  }

  #[test]
  fn test_load_missing_session_is_not_found() {
    let engine = engine();
    assert!(matches!(
      engine.load_session("ghost").unwrap_err(),
      EngineError::NotFound { .. }
    ));
  }

  #[test]
  fn test_start_teaching_unknown_node_is_not_found() {
    let engine = engine();
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();
    assert!(matches!(
      engine.start_teaching(&mut session, "ghost").unwrap_err(),
      EngineError::NotFound { .. }
    ));
    // Session state untouched on the failed lookup
    assert_eq!(session.state, SessionState::Idle);
  }

  #[test]
  fn test_teaching_to_practice_enters_readiness_check() {
    let engine = engine();
    let session = practicing_session(&engine, "n0");
    assert_eq!(session.state, SessionState::Practice);
    assert_eq!(session.step_loop.step(), 2);
  }

  #[test]
  fn test_readiness_answer_reads_but_never_updates_mastery() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");

    let outcome = engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    assert_eq!(outcome, AnswerOutcome::StepPassed { step: 3 });

    // Step 2 contributed zero weight: no mastery record was created
    assert!(engine.store().get_mastery("student-1", "n0").unwrap().is_none());
    // But the response was logged
    assert_eq!(engine.store().responses_for_node("student-1", "n0").unwrap().len(), 1);
  }

  #[test]
  fn test_guided_practice_updates_mastery() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");
    engine.submit_answer(&mut session, "q", true, 3000).unwrap();

    engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    let score = engine.store().get_mastery("student-1", "n0").unwrap().unwrap();
    assert_eq!(score.practice_count, 1);
    assert!(score.bkt_probability > bkt::INITIAL_PROBABILITY);
  }

  #[test]
  fn test_step_three_failure_returns_to_readiness() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");
    engine.submit_answer(&mut session, "q", true, 3000).unwrap(); // step 2 -> 3

    engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    let outcome = engine.submit_answer(&mut session, "q", false, 3000).unwrap();

    assert_eq!(outcome, AnswerOutcome::StepFailed);
    assert_eq!(session.step_loop.step(), 2);
    assert_eq!(session.state, SessionState::Practice);
  }

  #[test]
  fn test_struggle_streak_routes_to_struggling() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");
    engine.submit_answer(&mut session, "q", true, 3000).unwrap(); // step 2 -> 3

    engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    let outcome = engine.submit_answer(&mut session, "q", false, 3000).unwrap();

    assert_eq!(outcome, AnswerOutcome::Intervention);
    assert_eq!(session.state, SessionState::Struggling);
    let events = engine.events().recorded();
    assert!(events.iter().any(|e| e.name() == "struggle_detected"));
  }

  #[test]
  fn test_answer_outside_practice_rejected() {
    let engine = engine();
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();
    assert!(matches!(
      engine.submit_answer(&mut session, "q", true, 1000).unwrap_err(),
      EngineError::Validation(_)
    ));
  }

  #[test]
  fn test_hint_detour_roundtrip() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");

    engine.request_hint(&mut session).unwrap();
    assert_eq!(session.state, SessionState::HintRequested);
    assert_eq!(session.hints_used, 1);

    engine.resume_after_hint(&mut session).unwrap();
    assert_eq!(session.state, SessionState::Practice);
  }

  #[test]
  fn test_full_loop_to_mastery() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");

    // Step 2: readiness
    engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    // Step 3: 3 correct
    for _ in 0..2 {
      assert_eq!(
        engine.submit_answer(&mut session, "q", true, 3000).unwrap(),
        AnswerOutcome::NextQuestion
      );
    }
    let outcome = engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    assert_eq!(outcome, AnswerOutcome::StepPassed { step: 4 });
    assert_eq!(session.state, SessionState::Celebrating);
    engine.continue_after_celebration(&mut session).unwrap();

    // Step 4: 5 correct
    for _ in 0..4 {
      engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    }
    let outcome = engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    assert_eq!(outcome, AnswerOutcome::StepPassed { step: 5 });
    engine.continue_after_celebration(&mut session).unwrap();

    // Step 5: the proof, then the gate (single sitting: retention is
    // vacuous, nine straight fast answers pass the rest)
    let outcome = engine.submit_answer(&mut session, "q", true, 3000).unwrap();
    assert_eq!(outcome, AnswerOutcome::Mastered { next_node: Some("n1".to_string()) });
    assert_eq!(session.state, SessionState::Celebrating);

    let score = engine.store().get_mastery("student-1", "n0").unwrap().unwrap();
    assert!(score.truly_mastered);
    assert_eq!(score.review_count, 1);
    assert_eq!(score.interval_days, 1);
    assert!(score.next_due.is_some());

    let events = engine.events().recorded();
    assert!(events.iter().any(|e| e.name() == "node_mastered"));
  }

  #[test]
  fn test_boss_flow() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");

    engine.begin_boss_challenge(&mut session).unwrap();
    let outcome = engine.submit_boss_answer(&mut session, "boss q", true, 2000).unwrap();
    assert_eq!(outcome, AnswerOutcome::BossCleared);
    assert_eq!(session.state, SessionState::Celebrating);
  }

  #[test]
  fn test_boss_failure_routes_to_struggling() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");

    engine.begin_boss_challenge(&mut session).unwrap();
    let outcome = engine.submit_boss_answer(&mut session, "boss q", false, 2000).unwrap();
    assert_eq!(outcome, AnswerOutcome::BossFailed);
    assert_eq!(session.state, SessionState::Struggling);
  }

  #[test]
  fn test_emotional_check_can_end_in_idle() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");
    // Into struggling via the boss path
    engine.begin_boss_challenge(&mut session).unwrap();
    engine.submit_boss_answer(&mut session, "q", false, 2000).unwrap();

    engine.begin_emotional_check(&mut session).unwrap();
    assert_eq!(session.state, SessionState::EmotionalCheck);
    engine.resume_after_emotional_check(&mut session, false).unwrap();
    assert_eq!(session.state, SessionState::Idle);
  }

  #[test]
  fn test_diagnostic_flow_places_and_bootstraps() {
    let engine = engine();
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();

    let mut step = engine.begin_diagnostic(&mut session).unwrap();
    let placement = loop {
      match step {
        DiagnosticStep::Probe(ref code) => {
          // Student knows the easier half (n0..n2)
          let idx: usize = code[1..].parse().unwrap();
          step = engine
            .submit_diagnostic_answer(&mut session, idx <= 2, 4000)
            .unwrap();
        }
        DiagnosticStep::Placed(placement) => break placement,
      }
    };

    assert_eq!(placement.frontier.as_deref(), Some("n2"));
    assert_eq!(session.state, SessionState::Teaching);
    // Bootstrapped mastery exists on both sides of the frontier
    assert!(engine.store().get_mastery("student-1", "n0").unwrap().is_some());
    assert!(engine.store().get_mastery("student-1", "n5").unwrap().is_some());
    // The recommended node is the first gap
    assert_eq!(session.current_node.as_deref(), Some("n3"));

    let events = engine.events().recorded();
    assert!(events.iter().any(|e| e.name() == "placement_completed"));
  }

  #[test]
  fn test_diagnostic_empty_space_completes_immediately() {
    let engine = crate::testing::engine_with_nodes(Vec::<KnowledgeNode>::new());
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();

    match engine.begin_diagnostic(&mut session).unwrap() {
      DiagnosticStep::Placed(placement) => {
        assert!(placement.frontier.is_none());
        assert_eq!(placement.questions_used, 0);
      }
      DiagnosticStep::Probe(_) => panic!("expected immediate placement"),
    }
    assert_eq!(session.state, SessionState::Teaching);
  }

  #[test]
  fn test_diagnostic_answer_without_run_is_not_found() {
    let engine = engine();
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();
    // Force the state without starting a run
    session.transition_to(SessionState::Diagnostic, "test").unwrap();
    assert!(matches!(
      engine.submit_diagnostic_answer(&mut session, true, 100).unwrap_err(),
      EngineError::NotFound { .. }
    ));
  }

  #[test]
  fn test_review_answer_requires_existing_mastery() {
    let engine = engine();
    assert!(matches!(
      engine
        .submit_review_answer("student-1", "n0", "daily", "q", true, 1000)
        .unwrap_err(),
      EngineError::NotFound { .. }
    ));
  }

  #[test]
  fn test_session_completion_emits_event() {
    let engine = engine();
    let mut session = practicing_session(&engine, "n0");
    engine.complete_session(&mut session).unwrap();
    assert!(session.is_terminal());
    let events = engine.events().recorded();
    assert!(events.iter().any(|e| e.name() == "session_completed"));
  }

  #[test]
  fn test_event_sink_failure_never_fails_mastery_update() {
    let engine = crate::testing::engine_with_failing_sink(linear_graph(3));
    let mut session = engine.start_session("s-1", "student-1", 4).unwrap();
    engine.start_teaching(&mut session, "n0").unwrap();
    engine.advance_to_practice(&mut session).unwrap();
    engine.submit_answer(&mut session, "q", true, 3000).unwrap();

    // Struggle streak fires an event into the failing sink; the answer
    // path must still succeed
    engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    let outcome = engine.submit_answer(&mut session, "q", false, 3000).unwrap();
    assert_eq!(outcome, AnswerOutcome::Intervention);

    let score = engine.store().get_mastery("student-1", "n0").unwrap().unwrap();
    assert_eq!(score.practice_count, 3);
  }
}
