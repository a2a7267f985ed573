//! SM-2 (SuperMemo 2) spaced repetition scheduling.
//!
//! - Quality grades 0-2 reset the repetition count and bring the item back
//!   the next day.
//! - Quality grades 3-5 grow the interval: 1 day, then 6 days, then the
//!   previous interval multiplied by the updated easiness factor.
//! - The easiness factor is updated on every review and never drops below 1.3.
//!
//! Pure computation: no clock, no storage.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

pub const MIN_EASINESS: f64 = 1.3;
pub const DEFAULT_EASINESS: f64 = 2.5;
pub const MAX_QUALITY: u8 = 5;
/// Lowest grade that counts as "remembered".
pub const PASSING_QUALITY: u8 = 3;

/// Scheduling state carried between reviews.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewState {
  pub easiness: f64,
  pub interval_days: u32,
  pub repetitions: u32,
}

impl ReviewState {
  /// State of an item that has never been reviewed.
  pub fn initial(easiness: f64) -> Self {
    Self { easiness: easiness.max(MIN_EASINESS), interval_days: 0, repetitions: 0 }
  }
}

/// Result of one review.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
  pub easiness: f64,
  pub interval_days: u32,
  pub repetitions: u32,
  pub next_due_at: DateTime<Utc>,
}

impl ReviewOutcome {
  pub fn state(&self) -> ReviewState {
    ReviewState { easiness: self.easiness, interval_days: self.interval_days, repetitions: self.repetitions }
  }
}

/// Compute the next schedule from the previous state (or `None` for a first
/// encounter, which starts from `DEFAULT_EASINESS`).
pub fn compute_review(
  previous: Option<ReviewState>,
  quality: u8,
  now: DateTime<Utc>,
) -> Result<ReviewOutcome, EngineError> {
  compute_review_from(previous.unwrap_or_else(|| ReviewState::initial(DEFAULT_EASINESS)), quality, now)
}

/// Same as `compute_review` with an explicit starting state.
pub fn compute_review_from(
  previous: ReviewState,
  quality: u8,
  now: DateTime<Utc>,
) -> Result<ReviewOutcome, EngineError> {
  if quality > MAX_QUALITY {
    return Err(EngineError::InvalidQuality(quality));
  }

  // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
  let miss = (MAX_QUALITY - quality) as f64;
  let easiness = (previous.easiness + (0.1 - miss * (0.08 + miss * 0.02))).max(MIN_EASINESS);

  let (interval_days, repetitions) = if quality < PASSING_QUALITY {
    (1, 0)
  } else {
    let reps = previous.repetitions.saturating_add(1);
    let interval = match reps {
      1 => 1,
      2 => 6,
      _ => ((previous.interval_days as f64) * easiness).round().max(1.0) as u32,
    };
    (interval, reps)
  };

  Ok(ReviewOutcome {
    easiness,
    interval_days,
    repetitions,
    next_due_at: now + Duration::days(interval_days as i64),
  })
}

/// Binary correctness → quality mapping. Wrong answers always land below
/// `PASSING_QUALITY` even if misconfigured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityMapping {
  pub correct: u8,
  pub incorrect: u8,
}

impl Default for QualityMapping {
  fn default() -> Self { Self { correct: 5, incorrect: 2 } }
}

impl QualityMapping {
  pub fn quality_for(&self, correct: bool) -> u8 {
    if correct {
      self.correct.min(MAX_QUALITY)
    } else {
      self.incorrect.min(PASSING_QUALITY - 1)
    }
  }
}
