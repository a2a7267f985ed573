//! Error taxonomy. Policy denials and empty results are not errors and never
//! appear here; see `AccessDecision` and `Selection`.

use std::time::Duration;

use thiserror::Error;

use crate::domain::{ContentId, LearnerId, QuestionId};

/// Failures reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
  /// Backing store could not be reached. Callers may retry.
  #[error("store unavailable: {0}")]
  Unavailable(String),
  /// Optimistic version check failed on a usage ledger write.
  #[error("usage ledger for {learner} changed concurrently (expected v{expected}, found v{found})")]
  Conflict { learner: LearnerId, expected: u64, found: u64 },
  #[error("missing record: {0}")]
  Missing(String),
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("quality {0} is outside 0..=5")]
  InvalidQuality(u8),
  #[error("unknown learner {0}")]
  UnknownLearner(LearnerId),
  #[error("learner {0} is deactivated")]
  InactiveLearner(LearnerId),
  #[error("unknown content {0}")]
  UnknownContent(ContentId),
  #[error("unknown question {0}")]
  UnknownQuestion(QuestionId),
  #[error("invariant violated: {0}")]
  InvariantViolation(String),
  #[error("concurrent modification detected: {0}")]
  ConcurrentModification(String),
  #[error(transparent)]
  Storage(StoreError),
}

impl From<StoreError> for EngineError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::Conflict { .. } => EngineError::ConcurrentModification(e.to_string()),
      other => EngineError::Storage(other),
    }
  }
}

impl EngineError {
  /// Only storage outages are worth retrying; everything else is a caller bug
  /// or a missing record.
  pub fn is_retryable(&self) -> bool {
    matches!(self, EngineError::Storage(StoreError::Unavailable(_)))
  }
}

/// Why the content generator could not produce a question.
#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("generation timed out after {0:?}")]
  Timeout(Duration),
  #[error("generation request failed: {0}")]
  Http(String),
  #[error("generated question rejected: {0}")]
  Malformed(String),
  #[error("no content generator configured")]
  Disabled,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read {path}: {source}")]
  Read { path: String, #[source] source: std::io::Error },
  #[error("failed to parse {path}: {source}")]
  Parse { path: String, #[source] source: toml::de::Error },
  #[error("invalid configuration: {0}")]
  Invalid(String),
}
