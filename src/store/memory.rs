//! In-memory store backed by `tokio::sync::RwLock` maps.
//!
//! Owns:
//!   - the catalog (subjects, topics, content, questions by id and by scope)
//!   - learners, usage ledgers (versioned) and the consumption log
//!   - seen history, review entries, attempts and subject tallies

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{Catalog, LearnerStore, ProgressStore, StoreResult};
use crate::domain::{
  AttemptRecord, ConsumptionEvent, ContentId, ContentItem, Learner, LearnerId, Question, QuestionId,
  QuestionScope, ReviewScheduleEntry, Subject, SubjectId, SubjectPerformance, Topic, TopicId, UsageLedger,
};
use crate::error::StoreError;

#[derive(Default)]
struct SeenLog {
  order: Vec<ContentId>,
  set: HashSet<ContentId>,
}

#[derive(Default)]
pub struct MemoryStore {
  subjects: RwLock<HashMap<SubjectId, Subject>>,
  topics: RwLock<HashMap<TopicId, Topic>>,
  content: RwLock<HashMap<ContentId, ContentItem>>,
  questions: RwLock<HashMap<QuestionId, Question>>,
  by_scope: RwLock<HashMap<QuestionScope, Vec<QuestionId>>>,

  learners: RwLock<HashMap<LearnerId, Learner>>,
  usage: RwLock<HashMap<LearnerId, UsageLedger>>,
  consumption: RwLock<Vec<ConsumptionEvent>>,

  seen: RwLock<HashMap<LearnerId, SeenLog>>,
  reviews: RwLock<HashMap<(LearnerId, ContentId), ReviewScheduleEntry>>,
  attempts: RwLock<Vec<AttemptRecord>>,
  performance: RwLock<HashMap<LearnerId, Vec<SubjectPerformance>>>,

  offline: AtomicBool,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  /// Simulate an outage: every call fails with `StoreError::Unavailable`.
  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  fn online(&self) -> StoreResult<()> {
    if self.offline.load(Ordering::SeqCst) {
      Err(StoreError::Unavailable("memory store offline".into()))
    } else {
      Ok(())
    }
  }

  // --- catalog loading (authoring side, not part of the engine traits) ---

  pub async fn insert_subject(&self, s: Subject) {
    self.subjects.write().await.insert(s.id.clone(), s);
  }

  pub async fn insert_topic(&self, t: Topic) {
    self.topics.write().await.insert(t.id.clone(), t);
  }

  pub async fn insert_content(&self, c: ContentItem) {
    self.content.write().await.insert(c.id.clone(), c);
  }

  /// Insert only if the id is not taken. Used when layering seeds under a bank.
  pub async fn insert_content_if_absent(&self, c: ContentItem) -> bool {
    let mut map = self.content.write().await;
    if map.contains_key(&c.id) { return false; }
    map.insert(c.id.clone(), c);
    true
  }

  pub async fn inventory(&self) -> (usize, usize, usize, usize) {
    (
      self.subjects.read().await.len(),
      self.topics.read().await.len(),
      self.content.read().await.len(),
      self.questions.read().await.len(),
    )
  }
}

#[async_trait]
impl Catalog for MemoryStore {
  async fn subject(&self, id: &SubjectId) -> StoreResult<Option<Subject>> {
    self.online()?;
    Ok(self.subjects.read().await.get(id).cloned())
  }

  async fn topic(&self, id: &TopicId) -> StoreResult<Option<Topic>> {
    self.online()?;
    Ok(self.topics.read().await.get(id).cloned())
  }

  async fn content(&self, id: &ContentId) -> StoreResult<Option<ContentItem>> {
    self.online()?;
    Ok(self.content.read().await.get(id).cloned())
  }

  async fn content_by_subjects(&self, subjects: Option<&[SubjectId]>) -> StoreResult<Vec<ContentItem>> {
    self.online()?;
    let map = self.content.read().await;
    let mut items: Vec<ContentItem> = map
      .values()
      .filter(|c| subjects.map_or(true, |s| s.contains(&c.subject_id)))
      .cloned()
      .collect();
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(items)
  }

  async fn question(&self, id: &QuestionId) -> StoreResult<Option<Question>> {
    self.online()?;
    Ok(self.questions.read().await.get(id).cloned())
  }

  async fn questions_for(&self, scope: &QuestionScope) -> StoreResult<Vec<Question>> {
    self.online()?;
    let ids = { self.by_scope.read().await.get(scope).cloned().unwrap_or_default() };
    let questions = self.questions.read().await;
    Ok(ids.iter().filter_map(|id| questions.get(id).cloned()).collect())
  }

  #[instrument(level = "debug", skip(self, question), fields(id = %question.id, tier = question.scope.tier()))]
  async fn insert_question(&self, question: Question) -> StoreResult<()> {
    self.online()?;
    let mut questions = self.questions.write().await;
    let mut by_scope = self.by_scope.write().await;
    // Questions are immutable: a repeated id keeps the original.
    if questions.contains_key(&question.id) {
      debug!(target: "questions", id = %question.id, "question id already stored; keeping original");
      return Ok(());
    }
    by_scope.entry(question.scope.clone()).or_default().push(question.id.clone());
    questions.insert(question.id.clone(), question);
    Ok(())
  }
}

#[async_trait]
impl LearnerStore for MemoryStore {
  async fn learner(&self, id: &LearnerId) -> StoreResult<Option<Learner>> {
    self.online()?;
    Ok(self.learners.read().await.get(id).cloned())
  }

  async fn save_learner(&self, learner: Learner) -> StoreResult<()> {
    self.online()?;
    self.learners.write().await.insert(learner.id.clone(), learner);
    Ok(())
  }

  async fn usage(&self, id: &LearnerId) -> StoreResult<UsageLedger> {
    self.online()?;
    Ok(self.usage.read().await.get(id).cloned().unwrap_or_else(|| UsageLedger::new(id.clone())))
  }

  async fn save_usage(&self, ledger: &UsageLedger) -> StoreResult<u64> {
    self.online()?;
    let mut map = self.usage.write().await;
    let found = map.get(&ledger.learner_id).map(|l| l.version).unwrap_or(0);
    if found != ledger.version {
      return Err(StoreError::Conflict { learner: ledger.learner_id.clone(), expected: ledger.version, found });
    }
    let mut next = ledger.clone();
    next.version = found + 1;
    map.insert(next.learner_id.clone(), next);
    Ok(found + 1)
  }

  async fn append_consumption(&self, event: ConsumptionEvent) -> StoreResult<()> {
    self.online()?;
    self.consumption.write().await.push(event);
    Ok(())
  }

  async fn consumption_log(&self, id: &LearnerId) -> StoreResult<Vec<ConsumptionEvent>> {
    self.online()?;
    Ok(self.consumption.read().await.iter().filter(|e| &e.learner_id == id).cloned().collect())
  }
}

#[async_trait]
impl ProgressStore for MemoryStore {
  async fn seen_history(&self, id: &LearnerId) -> StoreResult<Vec<ContentId>> {
    self.online()?;
    Ok(self.seen.read().await.get(id).map(|s| s.order.clone()).unwrap_or_default())
  }

  async fn mark_seen(&self, id: &LearnerId, content: &ContentId, _at: DateTime<Utc>) -> StoreResult<bool> {
    self.online()?;
    let mut seen = self.seen.write().await;
    let log = seen.entry(id.clone()).or_default();
    if !log.set.insert(content.clone()) {
      return Ok(false);
    }
    log.order.push(content.clone());
    Ok(true)
  }

  async fn review_entry(&self, id: &LearnerId, content: &ContentId) -> StoreResult<Option<ReviewScheduleEntry>> {
    self.online()?;
    Ok(self.reviews.read().await.get(&(id.clone(), content.clone())).cloned())
  }

  async fn save_review_entry(&self, entry: ReviewScheduleEntry) -> StoreResult<()> {
    self.online()?;
    self.reviews.write().await.insert((entry.learner_id.clone(), entry.content_id.clone()), entry);
    Ok(())
  }

  async fn due_reviews(&self, id: &LearnerId, now: DateTime<Utc>) -> StoreResult<Vec<ReviewScheduleEntry>> {
    self.online()?;
    let mut due: Vec<ReviewScheduleEntry> = self
      .reviews
      .read()
      .await
      .values()
      .filter(|e| &e.learner_id == id && e.next_due_at <= now)
      .cloned()
      .collect();
    due.sort_by(|a, b| a.next_due_at.cmp(&b.next_due_at).then_with(|| a.content_id.cmp(&b.content_id)));
    Ok(due)
  }

  async fn all_due_reviews(&self, now: DateTime<Utc>) -> StoreResult<Vec<ReviewScheduleEntry>> {
    self.online()?;
    let mut due: Vec<ReviewScheduleEntry> =
      self.reviews.read().await.values().filter(|e| e.next_due_at <= now).cloned().collect();
    due.sort_by(|a, b| {
      a.next_due_at
        .cmp(&b.next_due_at)
        .then_with(|| a.learner_id.cmp(&b.learner_id))
        .then_with(|| a.content_id.cmp(&b.content_id))
    });
    Ok(due)
  }

  async fn append_attempt(&self, attempt: AttemptRecord) -> StoreResult<()> {
    self.online()?;
    self.attempts.write().await.push(attempt);
    Ok(())
  }

  async fn attempts(&self, id: &LearnerId) -> StoreResult<Vec<AttemptRecord>> {
    self.online()?;
    Ok(self.attempts.read().await.iter().filter(|a| &a.learner_id == id).cloned().collect())
  }

  async fn record_subject_result(&self, id: &LearnerId, subject: &SubjectId, correct: bool) -> StoreResult<()> {
    self.online()?;
    let mut perf = self.performance.write().await;
    let rows = perf.entry(id.clone()).or_default();
    let row = match rows.iter_mut().position(|r| &r.subject_id == subject) {
      Some(i) => &mut rows[i],
      None => {
        rows.push(SubjectPerformance { subject_id: subject.clone(), attempts: 0, correct: 0 });
        let last = rows.len() - 1;
        &mut rows[last]
      }
    };
    row.attempts += 1;
    if correct { row.correct += 1; }
    Ok(())
  }

  async fn subject_performance(&self, id: &LearnerId) -> StoreResult<Vec<SubjectPerformance>> {
    self.online()?;
    Ok(self.performance.read().await.get(id).cloned().unwrap_or_default())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[tokio::test]
  async fn stale_usage_write_is_rejected() {
    let store = MemoryStore::new();
    let id = LearnerId::new("l1");
    let a = store.usage(&id).await.unwrap();
    let b = store.usage(&id).await.unwrap();
    assert_eq!(store.save_usage(&a).await.unwrap(), 1);
    let err = store.save_usage(&b).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict { expected: 0, found: 1, .. }));
  }

  #[tokio::test]
  async fn seen_history_keeps_first_seen_order_without_duplicates() {
    let store = MemoryStore::new();
    let id = LearnerId::new("l1");
    let now = Utc::now();
    assert!(store.mark_seen(&id, &"c2".into(), now).await.unwrap());
    assert!(store.mark_seen(&id, &"c1".into(), now).await.unwrap());
    assert!(!store.mark_seen(&id, &"c2".into(), now).await.unwrap());
    assert_eq!(store.seen_history(&id).await.unwrap(), vec![ContentId::new("c2"), ContentId::new("c1")]);
  }

  #[tokio::test]
  async fn due_reviews_are_oldest_first_and_scoped() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let entry = |learner: &str, content: &str, due_in: i64| ReviewScheduleEntry {
      learner_id: learner.into(),
      content_id: content.into(),
      easiness: 2.5,
      interval_days: 1,
      repetitions: 1,
      next_due_at: now + Duration::hours(due_in),
      last_quality: 5,
      updated_at: now,
    };
    store.save_review_entry(entry("l1", "late", -1)).await.unwrap();
    store.save_review_entry(entry("l1", "oldest", -48)).await.unwrap();
    store.save_review_entry(entry("l1", "future", 5)).await.unwrap();
    store.save_review_entry(entry("l2", "other", -2)).await.unwrap();

    let due = store.due_reviews(&"l1".into(), now).await.unwrap();
    let ids: Vec<_> = due.iter().map(|e| e.content_id.as_str()).collect();
    assert_eq!(ids, vec!["oldest", "late"]);
    assert_eq!(store.all_due_reviews(now).await.unwrap().len(), 3);
  }

  #[tokio::test]
  async fn offline_store_reports_unavailable() {
    let store = MemoryStore::new();
    store.set_offline(true);
    let err = store.learner(&"l1".into()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
  }
}
