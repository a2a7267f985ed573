//! `LearningEngine`: the facade delivery layers talk to.
//!
//! Wires the access ledger, question matcher and content selector over one
//! repository, one clock and one set of learner locks, and owns the review
//! scheduling step and learner profile maintenance.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::config::{AccessPolicy, EngineConfig, ReviewConfig};
use crate::domain::{
  Bucket, ContentId, ContentItem, ExamType, Learner, LearnerId, PlanTier, QuestionId, ResourceKind,
  ReviewScheduleEntry, SubjectId, SubjectPerformance, UsageLedger,
};
use crate::error::EngineError;
use crate::generator::ContentGenerator;
use crate::ledger::{AccessDecision, AccessLedger, UsageSummary};
use crate::matcher::{AnswerFeedback, QuestionMatcher, ResolvedQuestion};
use crate::seeds::FALLBACK_QUESTION_ID;
use crate::selector::{ContentSelector, Selection};
use crate::sm2::{compute_review_from, QualityMapping, ReviewState};
use crate::store::{LearnerLocks, Repository};

/// Declared study profile set during onboarding.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct OnboardingProfile {
  #[serde(default)] pub exam_target: Option<ExamType>,
  #[serde(default)] pub weak_subjects: Vec<SubjectId>,
  #[serde(default)] pub strong_subjects: Vec<SubjectId>,
  #[serde(default)] pub utc_offset_minutes: Option<i32>,
}

/// Result of `submit_answer`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmitOutcome {
  pub feedback: AnswerFeedback,
  pub quality: Option<u8>,
  /// None when nothing was scheduled (fallback question).
  pub review: Option<ReviewScheduleEntry>,
}

pub struct LearningEngine {
  repo: Arc<dyn Repository>,
  clock: Arc<dyn Clock>,
  locks: LearnerLocks,
  ledger: AccessLedger,
  matcher: QuestionMatcher,
  selector: ContentSelector,
  review: ReviewConfig,
}

impl LearningEngine {
  pub fn new(
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    config: &EngineConfig,
    generator: Option<Arc<dyn ContentGenerator>>,
  ) -> Self {
    let locks = LearnerLocks::new();
    let ledger = AccessLedger::new(repo.clone(), locks.clone(), clock.clone(), config.access.clone());
    let matcher = QuestionMatcher::new(repo.clone(), generator, clock.clone(), config.generation.timeout());
    let selector = ContentSelector::new(repo.clone(), locks.clone(), clock.clone());
    info!(
      target: "prepcore",
      generator = matcher.has_generator(),
      trial_questions = config.access.trial_questions,
      "Learning engine ready"
    );
    Self { repo, clock, locks, ledger, matcher, selector, review: config.review }
  }

  pub fn quality_mapping(&self) -> QualityMapping {
    self.review.quality_mapping()
  }

  // --- selection ---

  pub async fn select_next_content(&self, learner_id: &LearnerId) -> Result<Selection, EngineError> {
    self.selector.select_next_content(learner_id).await
  }

  pub async fn oldest_seen(&self, learner_id: &LearnerId) -> Result<Option<ContentItem>, EngineError> {
    self.selector.oldest_seen(learner_id).await
  }

  // --- access ---

  pub async fn check_access(&self, learner_id: &LearnerId, kind: ResourceKind) -> Result<AccessDecision, EngineError> {
    self.ledger.check_access(learner_id, kind).await
  }

  pub async fn consume_access(
    &self,
    learner_id: &LearnerId,
    kind: ResourceKind,
    bucket: Bucket,
    expected_version: u64,
  ) -> Result<UsageLedger, EngineError> {
    self.ledger.consume_access(learner_id, kind, bucket, expected_version).await
  }

  pub async fn acquire_access(&self, learner_id: &LearnerId, kind: ResourceKind) -> Result<AccessDecision, EngineError> {
    self.ledger.acquire_access(learner_id, kind).await
  }

  pub async fn usage_summary(&self, learner_id: &LearnerId) -> Result<UsageSummary, EngineError> {
    self.ledger.usage_summary(learner_id).await
  }

  pub async fn grant_credits(
    &self,
    learner_id: &LearnerId,
    amount: u32,
    reference: Option<String>,
  ) -> Result<u32, EngineError> {
    self.ledger.grant_credits(learner_id, amount, reference).await
  }

  pub fn access_policy(&self) -> AccessPolicy {
    self.ledger.policy()
  }

  pub fn replace_policy(&self, policy: AccessPolicy) {
    self.ledger.replace_policy(policy)
  }

  // --- questions ---

  pub async fn resolve_question(
    &self,
    content_id: &ContentId,
    exclude: &[QuestionId],
    exam: Option<&ExamType>,
  ) -> Result<ResolvedQuestion, EngineError> {
    self.matcher.resolve_question(content_id, exclude, exam).await
  }

  /// Resolve using the learner's declared exam target as the relevance filter.
  pub async fn resolve_question_for(
    &self,
    learner_id: &LearnerId,
    content_id: &ContentId,
    exclude: &[QuestionId],
  ) -> Result<ResolvedQuestion, EngineError> {
    let learner = self.learner(learner_id).await?;
    self.matcher.resolve_question(content_id, exclude, learner.exam_target.as_ref()).await
  }

  pub async fn record_answer(
    &self,
    learner_id: &LearnerId,
    question_id: &QuestionId,
    submitted: &str,
  ) -> Result<AnswerFeedback, EngineError> {
    self.matcher.record_answer(learner_id, question_id, submitted).await
  }

  // --- review ---

  /// Run one SM2 step for (learner, content) and persist the entry.
  #[instrument(level = "info", skip(self), fields(%learner_id, %content_id))]
  pub async fn record_review_outcome(
    &self,
    learner_id: &LearnerId,
    content_id: &ContentId,
    quality: u8,
  ) -> Result<ReviewScheduleEntry, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    self.active_learner(learner_id).await?;
    self.repo.content(content_id).await?.ok_or_else(|| EngineError::UnknownContent(content_id.clone()))?;

    let previous = self.repo.review_entry(learner_id, content_id).await?;
    let state = previous
      .as_ref()
      .map(|e| ReviewState { easiness: e.easiness, interval_days: e.interval_days, repetitions: e.repetitions })
      .unwrap_or_else(|| ReviewState::initial(self.review.initial_easiness));
    let now = self.clock.now();
    let outcome = compute_review_from(state, quality, now)?;

    let entry = ReviewScheduleEntry {
      learner_id: learner_id.clone(),
      content_id: content_id.clone(),
      easiness: outcome.easiness,
      interval_days: outcome.interval_days,
      repetitions: outcome.repetitions,
      next_due_at: outcome.next_due_at,
      last_quality: quality,
      updated_at: now,
    };
    self.repo.save_review_entry(entry.clone()).await?;
    info!(
      target: "review",
      %learner_id,
      %content_id,
      quality,
      first = previous.is_none(),
      easiness = %format!("{:.2}", entry.easiness),
      interval_days = entry.interval_days,
      due = %entry.next_due_at,
      "Review scheduled"
    );
    Ok(entry)
  }

  /// Record an answer and feed its correctness into the review schedule of
  /// the content it was served for. The question must have been resolvable
  /// for that content (same item, its topic, or its subject); the static
  /// fallback question goes with any content.
  #[instrument(level = "info", skip(self, submitted), fields(%learner_id, %content_id, %question_id))]
  pub async fn submit_answer(
    &self,
    learner_id: &LearnerId,
    content_id: &ContentId,
    question_id: &QuestionId,
    submitted: &str,
  ) -> Result<SubmitOutcome, EngineError> {
    if question_id.as_str() != FALLBACK_QUESTION_ID {
      let question = self.repo.question(question_id).await?.ok_or_else(|| EngineError::UnknownQuestion(question_id.clone()))?;
      let content = self.repo.content(content_id).await?.ok_or_else(|| EngineError::UnknownContent(content_id.clone()))?;
      if !question.scope.covers(&content) {
        warn!(target: "review", %learner_id, %content_id, %question_id, scope = question.scope.tier(), "Answer submitted for unrelated content");
        return Err(EngineError::InvariantViolation(format!("question {question_id} does not belong to content {content_id}")));
      }
    }
    let feedback = self.matcher.record_answer(learner_id, question_id, submitted).await?;
    if !feedback.recorded {
      debug!(target: "review", %learner_id, %content_id, "Fallback answer; schedule untouched");
      return Ok(SubmitOutcome { feedback, quality: None, review: None });
    }
    let quality = self.review.quality_mapping().quality_for(feedback.correct);
    let review = self.record_review_outcome(learner_id, content_id, quality).await?;
    Ok(SubmitOutcome { feedback, quality: Some(quality), review: Some(review) })
  }

  /// Every learner's due entries as of now, oldest first. For host-side
  /// notification sweeps.
  pub async fn due_reviews(&self) -> Result<Vec<ReviewScheduleEntry>, EngineError> {
    Ok(self.repo.all_due_reviews(self.clock.now()).await?)
  }

  pub async fn due_reviews_for(&self, learner_id: &LearnerId) -> Result<Vec<ReviewScheduleEntry>, EngineError> {
    self.learner(learner_id).await?;
    Ok(self.repo.due_reviews(learner_id, self.clock.now()).await?)
  }

  pub async fn subject_performance(&self, learner_id: &LearnerId) -> Result<Vec<SubjectPerformance>, EngineError> {
    self.learner(learner_id).await?;
    Ok(self.repo.subject_performance(learner_id).await?)
  }

  // --- learner profile ---

  pub async fn learner(&self, learner_id: &LearnerId) -> Result<Learner, EngineError> {
    self.repo.learner(learner_id).await?.ok_or_else(|| EngineError::UnknownLearner(learner_id.clone()))
  }

  async fn active_learner(&self, learner_id: &LearnerId) -> Result<Learner, EngineError> {
    let learner = self.learner(learner_id).await?;
    if !learner.active {
      return Err(EngineError::InactiveLearner(learner_id.clone()));
    }
    Ok(learner)
  }

  /// Create a FREE learner. Registering an existing id returns it unchanged.
  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn register_learner(&self, learner_id: &LearnerId, utc_offset_minutes: Option<i32>) -> Result<Learner, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    if let Some(existing) = self.repo.learner(learner_id).await? {
      debug!(target: "prepcore", %learner_id, "Learner already registered");
      return Ok(existing);
    }
    let offset = utc_offset_minutes.unwrap_or_else(|| self.ledger.policy().default_utc_offset_minutes);
    let learner = Learner::new(learner_id.clone(), offset, self.clock.now());
    self.repo.save_learner(learner.clone()).await?;
    info!(target: "prepcore", %learner_id, utc_offset_minutes = offset, "Learner registered");
    Ok(learner)
  }

  /// Set exam target and declared subjects. A subject cannot be both weak
  /// and strong, and every subject must exist in the catalog.
  #[instrument(level = "info", skip(self, profile), fields(%learner_id))]
  pub async fn onboard(&self, learner_id: &LearnerId, profile: OnboardingProfile) -> Result<Learner, EngineError> {
    let weak = dedup(profile.weak_subjects);
    let strong = dedup(profile.strong_subjects);
    if let Some(both) = weak.iter().find(|s| strong.contains(s)) {
      return Err(EngineError::InvariantViolation(format!("subject {both} declared both weak and strong")));
    }
    for s in weak.iter().chain(strong.iter()) {
      if self.repo.subject(s).await?.is_none() {
        return Err(EngineError::InvariantViolation(format!("unknown subject {s}")));
      }
    }

    let _guard = self.locks.lock(learner_id).await;
    let mut learner = self.active_learner(learner_id).await?;
    learner.exam_target = profile.exam_target;
    learner.weak_subjects = weak;
    learner.strong_subjects = strong;
    if let Some(offset) = profile.utc_offset_minutes {
      learner.utc_offset_minutes = offset;
    }
    self.repo.save_learner(learner.clone()).await?;
    info!(
      target: "prepcore",
      %learner_id,
      exam = ?learner.exam_target,
      weak = learner.weak_subjects.len(),
      strong = learner.strong_subjects.len(),
      "Learner onboarded"
    );
    Ok(learner)
  }

  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn set_plan(&self, learner_id: &LearnerId, plan: PlanTier) -> Result<Learner, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    let mut learner = self.learner(learner_id).await?;
    let previous = learner.plan;
    learner.plan = plan;
    self.repo.save_learner(learner.clone()).await?;
    info!(target: "access", %learner_id, ?previous, ?plan, "Plan changed");
    Ok(learner)
  }

  /// Soft-deactivate. Records are kept; consumption and selection are refused.
  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn deactivate(&self, learner_id: &LearnerId) -> Result<Learner, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    let mut learner = self.learner(learner_id).await?;
    if learner.active {
      learner.active = false;
      self.repo.save_learner(learner.clone()).await?;
      info!(target: "prepcore", %learner_id, "Learner deactivated");
    }
    Ok(learner)
  }
}

fn dedup(subjects: Vec<SubjectId>) -> Vec<SubjectId> {
  let mut out: Vec<SubjectId> = Vec::with_capacity(subjects.len());
  for s in subjects {
    if !out.contains(&s) {
      out.push(s);
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::seeds::install_catalog;
  use crate::sm2::MIN_EASINESS;
  use crate::store::MemoryStore;
  use chrono::{Duration, TimeZone, Utc};

  struct Fixture {
    engine: LearningEngine,
    clock: Arc<ManualClock>,
  }

  async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let cfg = EngineConfig::default();
    install_catalog(&store, &cfg).await.unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 15, 0, 0).unwrap()));
    let engine = LearningEngine::new(store, clock.clone(), &cfg, None);
    engine.register_learner(&"l1".into(), Some(0)).await.unwrap();
    Fixture { engine, clock }
  }

  fn l1() -> LearnerId { LearnerId::new("l1") }

  #[tokio::test]
  async fn review_outcome_creates_then_grows_entry() {
    let f = fixture().await;
    let c: ContentId = "cl-self-defense".into();
    let first = f.engine.record_review_outcome(&l1(), &c, 5).await.unwrap();
    assert_eq!((first.interval_days, first.repetitions), (1, 1));
    let second = f.engine.record_review_outcome(&l1(), &c, 5).await.unwrap();
    assert_eq!((second.interval_days, second.repetitions), (6, 2));
    let lapse = f.engine.record_review_outcome(&l1(), &c, 1).await.unwrap();
    assert_eq!((lapse.interval_days, lapse.repetitions), (1, 0));
    assert!(lapse.easiness >= MIN_EASINESS);
  }

  #[tokio::test]
  async fn invalid_quality_is_rejected_without_writing() {
    let f = fixture().await;
    let c: ContentId = "cl-necessity".into();
    let err = f.engine.record_review_outcome(&l1(), &c, 6).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuality(6)));
    f.clock.advance_days(30);
    assert!(f.engine.due_reviews_for(&l1()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn review_for_unknown_content_fails() {
    let f = fixture().await;
    let err = f.engine.record_review_outcome(&l1(), &"ghost".into(), 4).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownContent(_)));
  }

  #[tokio::test]
  async fn submit_answer_maps_correctness_to_quality() {
    let f = fixture().await;
    let c: ContentId = "cl-self-defense".into();
    let q: QuestionId = "q-self-defense-1".into();

    let wrong = f.engine.submit_answer(&l1(), &c, &q, "A").await.unwrap();
    assert!(!wrong.feedback.correct);
    assert_eq!(wrong.quality, Some(2));
    assert_eq!(wrong.review.as_ref().unwrap().repetitions, 0);

    let right = f.engine.submit_answer(&l1(), &c, &q, "B").await.unwrap();
    assert_eq!(right.quality, Some(5));
    assert_eq!(right.review.unwrap().interval_days, 1);
  }

  #[tokio::test]
  async fn submit_answer_rejects_question_from_unrelated_content() {
    let f = fixture().await;
    let err = f
      .engine
      .submit_answer(&l1(), &"cl-self-defense".into(), &"q-const-subject-1".into(), "C")
      .await
      .unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));
    assert!(f.engine.subject_performance(&l1()).await.unwrap().is_empty());
    f.clock.advance_days(30);
    assert!(f.engine.due_reviews_for(&l1()).await.unwrap().is_empty());

    let err = f
      .engine
      .submit_answer(&l1(), &"ghost".into(), &"q-self-defense-1".into(), "B")
      .await
      .unwrap_err();
    assert!(matches!(err, EngineError::UnknownContent(_)));
  }

  #[tokio::test]
  async fn topic_question_schedules_any_content_in_the_topic() {
    let f = fixture().await;
    let out = f
      .engine
      .submit_answer(&l1(), &"cl-necessity".into(), &"q-exclusion-topic-1".into(), "C")
      .await
      .unwrap();
    assert!(out.feedback.correct);
    assert_eq!(out.review.unwrap().content_id.as_str(), "cl-necessity");
  }

  #[tokio::test]
  async fn fallback_submission_leaves_schedule_alone() {
    let f = fixture().await;
    let out = f
      .engine
      .submit_answer(&l1(), &"read-main-idea".into(), &FALLBACK_QUESTION_ID.into(), "B")
      .await
      .unwrap();
    assert!(out.feedback.correct);
    assert!(out.review.is_none());
  }

  #[tokio::test]
  async fn due_reviews_surface_after_interval() {
    let f = fixture().await;
    f.engine.record_review_outcome(&l1(), &"logic-negation".into(), 2).await.unwrap();
    assert!(f.engine.due_reviews().await.unwrap().is_empty());
    f.clock.advance(Duration::days(1));
    let due = f.engine.due_reviews().await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].content_id.as_str(), "logic-negation");
    assert_eq!(f.engine.due_reviews_for(&l1()).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn onboarding_validates_declared_subjects() {
    let f = fixture().await;
    let overlap = OnboardingProfile {
      weak_subjects: vec!["criminal-law".into()],
      strong_subjects: vec!["criminal-law".into()],
      ..Default::default()
    };
    assert!(matches!(f.engine.onboard(&l1(), overlap).await, Err(EngineError::InvariantViolation(_))));

    let unknown = OnboardingProfile { weak_subjects: vec!["astrology".into()], ..Default::default() };
    assert!(matches!(f.engine.onboard(&l1(), unknown).await, Err(EngineError::InvariantViolation(_))));

    let ok = OnboardingProfile {
      exam_target: Some("federal-highway-police".into()),
      weak_subjects: vec!["traffic-law".into(), "traffic-law".into()],
      strong_subjects: vec!["logical-reasoning".into()],
      utc_offset_minutes: None,
    };
    let learner = f.engine.onboard(&l1(), ok).await.unwrap();
    assert_eq!(learner.weak_subjects.len(), 1);

    let first = f.engine.select_next_content(&l1()).await.unwrap();
    assert!(matches!(first, Selection::WeakSubject(ref c) if c.id.as_str() == "traffic-dui"));
  }

  #[tokio::test]
  async fn register_is_idempotent_and_uses_default_offset() {
    let f = fixture().await;
    let again = f.engine.register_learner(&l1(), Some(120)).await.unwrap();
    assert_eq!(again.utc_offset_minutes, 0);
    let fresh = f.engine.register_learner(&"l2".into(), None).await.unwrap();
    assert_eq!(fresh.utc_offset_minutes, -180);
    assert_eq!(fresh.plan, PlanTier::Free);
  }

  #[tokio::test]
  async fn plan_upgrade_opens_daily_allowance() {
    let f = fixture().await;
    for _ in 0..5 {
      assert!(f.engine.acquire_access(&l1(), ResourceKind::Question).await.unwrap().allowed);
    }
    assert!(!f.engine.acquire_access(&l1(), ResourceKind::Question).await.unwrap().allowed);
    f.engine.set_plan(&l1(), PlanTier::Basic).await.unwrap();
    let d = f.engine.acquire_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!(d.bucket(), Some(Bucket::Daily));
  }

  #[tokio::test]
  async fn deactivated_learner_keeps_history_but_is_refused() {
    let f = fixture().await;
    f.engine.record_review_outcome(&l1(), &"cl-necessity".into(), 4).await.unwrap();
    let learner = f.engine.deactivate(&l1()).await.unwrap();
    assert!(!learner.active);
    assert!(matches!(f.engine.select_next_content(&l1()).await, Err(EngineError::InactiveLearner(_))));
    assert!(matches!(f.engine.check_access(&l1(), ResourceKind::Essay).await, Err(EngineError::InactiveLearner(_))));
    assert!(matches!(
      f.engine.record_review_outcome(&l1(), &"cl-necessity".into(), 4).await,
      Err(EngineError::InactiveLearner(_))
    ));
    assert_eq!(f.engine.learner(&l1()).await.unwrap().id, l1());
  }
}
