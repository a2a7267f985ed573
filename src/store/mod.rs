//! Narrow repository interface the engine reads and writes through.
//!
//! Three seams, one per concern:
//!   - `Catalog`: subjects, topics, content items (read-only) and questions
//!   - `LearnerStore`: learner profiles, usage ledgers, consumption log
//!   - `ProgressStore`: seen history, review schedule, attempts, per-subject tallies
//!
//! `MemoryStore` implements all three for tests and single-node hosting.
//! Atomicity per learner is provided by `LearnerLocks`, held by the engine
//! components around each read-modify-write, plus the version check on
//! `save_usage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
  AttemptRecord, ConsumptionEvent, ContentId, ContentItem, Learner, LearnerId, Question, QuestionId,
  QuestionScope, ReviewScheduleEntry, Subject, SubjectId, SubjectPerformance, Topic, TopicId, UsageLedger,
};
use crate::error::StoreError;

pub mod locks;
pub mod memory;

pub use locks::LearnerLocks;
pub use memory::MemoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Catalog: Send + Sync {
  async fn subject(&self, id: &SubjectId) -> StoreResult<Option<Subject>>;
  async fn topic(&self, id: &TopicId) -> StoreResult<Option<Topic>>;
  async fn content(&self, id: &ContentId) -> StoreResult<Option<ContentItem>>;
  /// Content in the given subjects (all subjects when `None`), in creation
  /// order with ties broken by id.
  async fn content_by_subjects(&self, subjects: Option<&[SubjectId]>) -> StoreResult<Vec<ContentItem>>;

  async fn question(&self, id: &QuestionId) -> StoreResult<Option<Question>>;
  /// Questions linked exactly at `scope`, in creation order.
  async fn questions_for(&self, scope: &QuestionScope) -> StoreResult<Vec<Question>>;
  async fn insert_question(&self, question: Question) -> StoreResult<()>;
}

#[async_trait]
pub trait LearnerStore: Send + Sync {
  async fn learner(&self, id: &LearnerId) -> StoreResult<Option<Learner>>;
  async fn save_learner(&self, learner: Learner) -> StoreResult<()>;

  /// Ledger for the learner; a fresh zeroed ledger (version 0) when none exists.
  async fn usage(&self, id: &LearnerId) -> StoreResult<UsageLedger>;
  /// Write `ledger` if the stored version still equals `ledger.version`;
  /// returns the new version. Mismatch yields `StoreError::Conflict`.
  async fn save_usage(&self, ledger: &UsageLedger) -> StoreResult<u64>;

  async fn append_consumption(&self, event: ConsumptionEvent) -> StoreResult<()>;
  async fn consumption_log(&self, id: &LearnerId) -> StoreResult<Vec<ConsumptionEvent>>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
  /// Seen content ids in first-seen order.
  async fn seen_history(&self, id: &LearnerId) -> StoreResult<Vec<ContentId>>;
  /// Append unless already present. Returns whether it was appended.
  async fn mark_seen(&self, id: &LearnerId, content: &ContentId, at: DateTime<Utc>) -> StoreResult<bool>;

  async fn review_entry(&self, id: &LearnerId, content: &ContentId) -> StoreResult<Option<ReviewScheduleEntry>>;
  async fn save_review_entry(&self, entry: ReviewScheduleEntry) -> StoreResult<()>;
  /// Entries with `next_due_at <= now`, oldest due first.
  async fn due_reviews(&self, id: &LearnerId, now: DateTime<Utc>) -> StoreResult<Vec<ReviewScheduleEntry>>;
  /// Same across every learner, for host-side notification sweeps.
  async fn all_due_reviews(&self, now: DateTime<Utc>) -> StoreResult<Vec<ReviewScheduleEntry>>;

  async fn append_attempt(&self, attempt: AttemptRecord) -> StoreResult<()>;
  async fn attempts(&self, id: &LearnerId) -> StoreResult<Vec<AttemptRecord>>;
  async fn record_subject_result(&self, id: &LearnerId, subject: &SubjectId, correct: bool) -> StoreResult<()>;
  async fn subject_performance(&self, id: &LearnerId) -> StoreResult<Vec<SubjectPerformance>>;
}

/// Everything the engine needs from storage.
pub trait Repository: Catalog + LearnerStore + ProgressStore {}

impl<T: Catalog + LearnerStore + ProgressStore> Repository for T {}
