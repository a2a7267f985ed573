//! Domain models used by the engine: learners and their usage ledger, the
//! read-only catalog (subjects, topics, content items), questions and their
//! scope, review schedule entries, and the append-only event rows.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(pub String);

    impl $name {
      pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
      pub fn as_str(&self) -> &str { &self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self { Self(s.to_string()) }
    }
  };
}

string_id!(
  /// Stable learner identity as issued by the host application.
  LearnerId
);
string_id!(
  /// Stable subject identifier. Weak/strong declarations match on this exactly.
  SubjectId
);
string_id!(TopicId);
string_id!(ContentId);
string_id!(QuestionId);
string_id!(
  /// Exam target, e.g. "federal-highway-police".
  ExamType
);

/// Plan tier purchased by the learner. Limits per tier are configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
  #[default]
  Free,
  Basic,
  Premium,
}

/// Kind of consumable resource tracked by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
  #[default]
  Question,
  Essay,
}

/// Source debited for a consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bucket {
  Trial,
  Daily,
  Credit,
}

impl fmt::Display for Bucket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Bucket::Trial => "TRIAL",
      Bucket::Daily => "DAILY",
      Bucket::Credit => "CREDIT",
    })
  }
}

/// Learner profile. Usage counters live in `UsageLedger`, not here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Learner {
  pub id: LearnerId,
  #[serde(default)] pub exam_target: Option<ExamType>,
  #[serde(default)] pub weak_subjects: Vec<SubjectId>,
  #[serde(default)] pub strong_subjects: Vec<SubjectId>,
  #[serde(default)] pub plan: PlanTier,
  /// Offset used to decide when the learner's calendar day rolls over.
  pub utc_offset_minutes: i32,
  pub active: bool,
  pub created_at: DateTime<Utc>,
}

impl Learner {
  pub fn new(id: LearnerId, utc_offset_minutes: i32, now: DateTime<Utc>) -> Self {
    Self {
      id,
      exam_target: None,
      weak_subjects: Vec::new(),
      strong_subjects: Vec::new(),
      plan: PlanTier::Free,
      utc_offset_minutes,
      active: true,
      created_at: now,
    }
  }

  /// Calendar date of `at` in the learner's cutover offset.
  pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
    // Out-of-range offsets degrade to UTC.
    let offset = FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
      .unwrap_or_else(|| Utc.fix());
    at.with_timezone(&offset).date_naive()
  }
}

/// Per-resource counters inside the usage ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
  pub trial_used: u32,
  pub daily_used: u32,
  /// Local date the daily counter was last zeroed. `None` until first check.
  pub last_reset: Option<NaiveDate>,
}

impl ResourceUsage {
  /// Zero the daily counter if `today` differs from the last reset date.
  /// Returns true when a reset happened. Idempotent within a day.
  pub fn roll_over(&mut self, today: NaiveDate) -> bool {
    if self.last_reset == Some(today) {
      return false;
    }
    self.daily_used = 0;
    self.last_reset = Some(today);
    true
  }
}

/// Explicit consumption state for one learner. `version` is the optimistic
/// concurrency token checked by the store on every write.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
  pub learner_id: LearnerId,
  pub questions: ResourceUsage,
  pub essays: ResourceUsage,
  pub credits: u32,
  pub version: u64,
}

impl UsageLedger {
  pub fn new(learner_id: LearnerId) -> Self {
    Self { learner_id, ..Default::default() }
  }

  pub fn usage(&self, kind: ResourceKind) -> &ResourceUsage {
    match kind {
      ResourceKind::Question => &self.questions,
      ResourceKind::Essay => &self.essays,
    }
  }

  pub fn usage_mut(&mut self, kind: ResourceKind) -> &mut ResourceUsage {
    match kind {
      ResourceKind::Question => &mut self.questions,
      ResourceKind::Essay => &mut self.essays,
    }
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Subject {
  pub id: SubjectId,
  pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Topic {
  pub id: TopicId,
  pub subject_id: SubjectId,
  pub name: String,
}

/// Editorial state of a content item. Only `Approved` items are served.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
  Draft,
  PendingReview,
  #[default]
  Approved,
  Rejected,
}

/// Study material. Read-only to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentItem {
  pub id: ContentId,
  pub subject_id: SubjectId,
  #[serde(default)] pub topic_id: Option<TopicId>,
  pub title: String,
  pub body: String,
  /// Empty means relevant to every exam.
  #[serde(default)] pub exam_types: Vec<ExamType>,
  #[serde(default = "default_true")] pub active: bool,
  #[serde(default)] pub status: ModerationStatus,
  pub created_at: DateTime<Utc>,
}

fn default_true() -> bool { true }

impl ContentItem {
  pub fn is_servable(&self) -> bool {
    self.active && self.status == ModerationStatus::Approved
  }

  pub fn relevant_to(&self, exam: Option<&ExamType>) -> bool {
    exam_matches(&self.exam_types, exam)
  }
}

/// Empty tag lists and absent exam targets both match.
pub fn exam_matches(tags: &[ExamType], exam: Option<&ExamType>) -> bool {
  match exam {
    None => true,
    Some(e) => tags.is_empty() || tags.contains(e),
  }
}

/// Where a question is linked. Tier search walks these from most to least
/// specific.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "snake_case")]
pub enum QuestionScope {
  Content(ContentId),
  Topic(TopicId),
  Subject(SubjectId),
}

impl QuestionScope {
  pub fn tier(&self) -> &'static str {
    match self {
      QuestionScope::Content(_) => "content",
      QuestionScope::Topic(_) => "topic",
      QuestionScope::Subject(_) => "subject",
    }
  }

  /// Whether a question at this scope may be asked about `content`.
  pub fn covers(&self, content: &ContentItem) -> bool {
    match self {
      QuestionScope::Content(id) => id == &content.id,
      QuestionScope::Topic(topic) => content.topic_id.as_ref() == Some(topic),
      QuestionScope::Subject(subject) => subject == &content.subject_id,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuestionOrigin {
  #[default]
  Authored,
  Generated,
  /// Static stand-in served when nothing else is available. Never persisted.
  Fallback,
}

/// Multiple-choice question. Immutable once stored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Question {
  pub id: QuestionId,
  pub scope: QuestionScope,
  pub prompt: String,
  /// Options in display order; labelled A, B, C... by position.
  pub options: Vec<String>,
  /// Option label of the correct answer, e.g. "C".
  pub answer_key: String,
  #[serde(default)] pub explanation: String,
  #[serde(default)] pub exam_types: Vec<ExamType>,
  #[serde(default)] pub origin: QuestionOrigin,
  pub created_at: DateTime<Utc>,
}

impl Question {
  /// Fallback questions must not be recorded as durable content.
  pub fn is_durable(&self) -> bool {
    self.origin != QuestionOrigin::Fallback
  }
}

/// SM2 state for one (learner, content) pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewScheduleEntry {
  pub learner_id: LearnerId,
  pub content_id: ContentId,
  pub easiness: f64,
  pub interval_days: u32,
  pub repetitions: u32,
  pub next_due_at: DateTime<Utc>,
  pub last_quality: u8,
  pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionOutcome {
  Debited,
  Denied,
  /// Credits added by a purchase.
  Granted,
}

/// Immutable audit row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsumptionEvent {
  pub id: String,
  pub learner_id: LearnerId,
  /// `None` for credit grants: the purchased balance is shared by every kind.
  #[serde(default)] pub resource: Option<ResourceKind>,
  #[serde(default)] pub bucket: Option<Bucket>,
  pub outcome: ConsumptionOutcome,
  /// Units moved; 1 for debits, the purchased amount for grants.
  pub amount: u32,
  #[serde(default)] pub reference: Option<String>,
  pub at: DateTime<Utc>,
}

/// One answered question.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttemptRecord {
  pub id: String,
  pub learner_id: LearnerId,
  pub question_id: QuestionId,
  pub submitted: String,
  pub correct: bool,
  pub at: DateTime<Utc>,
}

/// Running tally of answers per subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubjectPerformance {
  pub subject_id: SubjectId,
  pub attempts: u32,
  pub correct: u32,
}

impl SubjectPerformance {
  pub fn accuracy(&self) -> f64 {
    if self.attempts == 0 { 0.0 } else { self.correct as f64 / self.attempts as f64 }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn local_date_uses_learner_offset() {
    let mut learner = Learner::new("l1".into(), -180, Utc::now());
    // 01:30 UTC is still the previous evening at UTC-3.
    let at = Utc.with_ymd_and_hms(2026, 3, 10, 1, 30, 0).unwrap();
    assert_eq!(learner.local_date(at), NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    learner.utc_offset_minutes = 0;
    assert_eq!(learner.local_date(at), NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
  }

  #[test]
  fn roll_over_is_idempotent_within_a_day() {
    let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let mut usage = ResourceUsage { trial_used: 2, daily_used: 7, last_reset: NaiveDate::from_ymd_opt(2026, 3, 9) };
    assert!(usage.roll_over(today));
    assert_eq!(usage.daily_used, 0);
    usage.daily_used = 3;
    assert!(!usage.roll_over(today));
    assert_eq!(usage.daily_used, 3);
    assert_eq!(usage.trial_used, 2);
  }

  #[test]
  fn fresh_ledger_starts_empty() {
    let ledger = UsageLedger::new("l1".into());
    assert_eq!(ledger, UsageLedger { learner_id: LearnerId::new("l1"), ..UsageLedger::default() });
    assert_eq!(UsageLedger::default().learner_id, LearnerId::default());
    assert_eq!((ledger.version, ledger.credits), (0, 0));
    assert_eq!(ledger.questions.last_reset, None);
  }

  #[test]
  fn scope_covers_content_its_topic_and_subject() {
    let content = ContentItem {
      id: "cl-necessity".into(),
      subject_id: "criminal-law".into(),
      topic_id: Some("exclusion-of-unlawfulness".into()),
      title: "State of necessity".into(),
      body: String::new(),
      exam_types: vec![],
      active: true,
      status: ModerationStatus::Approved,
      created_at: Utc::now(),
    };
    assert!(QuestionScope::Content("cl-necessity".into()).covers(&content));
    assert!(!QuestionScope::Content("cl-self-defense".into()).covers(&content));
    assert!(QuestionScope::Topic("exclusion-of-unlawfulness".into()).covers(&content));
    assert!(QuestionScope::Subject("criminal-law".into()).covers(&content));
    assert!(!QuestionScope::Subject("constitutional-law".into()).covers(&content));

    let untopical = ContentItem { topic_id: None, ..content };
    assert!(!QuestionScope::Topic("exclusion-of-unlawfulness".into()).covers(&untopical));
  }

  #[test]
  fn exam_tags_filter() {
    let pf = ExamType::new("pf");
    assert!(exam_matches(&[], Some(&pf)));
    assert!(exam_matches(&[pf.clone()], Some(&pf)));
    assert!(!exam_matches(&[ExamType::new("prf")], Some(&pf)));
    assert!(exam_matches(&[ExamType::new("prf")], None));
  }
}
