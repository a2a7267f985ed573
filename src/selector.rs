//! Content selector: picks the next item for a learner.
//!
//! Priority cascade, first hit wins:
//!   1) review due (oldest overdue first, ignores seen history)
//!   2) unseen content in declared weak subjects
//!   3) unseen content in declared strong subjects
//!   4) any unseen content
//!   5) exhausted
//!
//! Selection and the seen-history append run under the learner lock.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::domain::{ContentId, ContentItem, Learner, LearnerId, SubjectId};
use crate::error::EngineError;
use crate::store::{LearnerLocks, Repository};

/// Outcome of one selection. `Exhausted` is a normal result.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "reason", content = "content", rename_all = "snake_case")]
pub enum Selection {
  Review(ContentItem),
  WeakSubject(ContentItem),
  StrongSubject(ContentItem),
  General(ContentItem),
  Exhausted,
}

impl Selection {
  pub fn content(&self) -> Option<&ContentItem> {
    match self {
      Selection::Review(c) | Selection::WeakSubject(c) | Selection::StrongSubject(c) | Selection::General(c) => Some(c),
      Selection::Exhausted => None,
    }
  }

  pub fn into_content(self) -> Option<ContentItem> {
    match self {
      Selection::Review(c) | Selection::WeakSubject(c) | Selection::StrongSubject(c) | Selection::General(c) => Some(c),
      Selection::Exhausted => None,
    }
  }

  pub fn label(&self) -> &'static str {
    match self {
      Selection::Review(_) => "review",
      Selection::WeakSubject(_) => "weak_subject",
      Selection::StrongSubject(_) => "strong_subject",
      Selection::General(_) => "general",
      Selection::Exhausted => "exhausted",
    }
  }
}

pub struct ContentSelector {
  repo: Arc<dyn Repository>,
  locks: LearnerLocks,
  clock: Arc<dyn Clock>,
}

impl ContentSelector {
  pub fn new(repo: Arc<dyn Repository>, locks: LearnerLocks, clock: Arc<dyn Clock>) -> Self {
    Self { repo, locks, clock }
  }

  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn select_next_content(&self, learner_id: &LearnerId) -> Result<Selection, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    let learner = self.repo.learner(learner_id).await?.ok_or_else(|| EngineError::UnknownLearner(learner_id.clone()))?;
    if !learner.active {
      return Err(EngineError::InactiveLearner(learner_id.clone()));
    }

    let selection = self.pick(&learner).await?;
    if let Some(item) = selection.content() {
      let appended = self.repo.mark_seen(learner_id, &item.id, self.clock.now()).await?;
      info!(target: "selection", %learner_id, content = %item.id, reason = selection.label(), first_view = appended, "Content selected");
    } else {
      info!(target: "selection", %learner_id, "No unseen content left");
    }
    Ok(selection)
  }

  async fn pick(&self, learner: &Learner) -> Result<Selection, EngineError> {
    let now = self.clock.now();
    for entry in self.repo.due_reviews(&learner.id, now).await? {
      match self.repo.content(&entry.content_id).await? {
        Some(item) if item.is_servable() => {
          debug!(target: "selection", learner = %learner.id, content = %item.id, due = %entry.next_due_at, "Review due");
          return Ok(Selection::Review(item));
        }
        _ => warn!(target: "selection", learner = %learner.id, content = %entry.content_id, "Due review points at unservable content; skipped"),
      }
    }

    let seen: HashSet<ContentId> = self.repo.seen_history(&learner.id).await?.into_iter().collect();

    if let Some(item) = self.first_unseen(learner, Some(learner.weak_subjects.as_slice()), &seen).await? {
      return Ok(Selection::WeakSubject(item));
    }
    if let Some(item) = self.first_unseen(learner, Some(learner.strong_subjects.as_slice()), &seen).await? {
      return Ok(Selection::StrongSubject(item));
    }
    if let Some(item) = self.first_unseen(learner, None, &seen).await? {
      return Ok(Selection::General(item));
    }
    Ok(Selection::Exhausted)
  }

  /// First servable, exam-relevant, unseen item in creation order.
  async fn first_unseen(
    &self,
    learner: &Learner,
    subjects: Option<&[SubjectId]>,
    seen: &HashSet<ContentId>,
  ) -> Result<Option<ContentItem>, EngineError> {
    if subjects.is_some_and(|s| s.is_empty()) {
      return Ok(None);
    }
    Ok(
      self
        .repo
        .content_by_subjects(subjects)
        .await?
        .into_iter()
        .find(|c| c.is_servable() && c.relevant_to(learner.exam_target.as_ref()) && !seen.contains(&c.id)),
    )
  }

  /// Earliest item in seen history that can still be served, for hosts that
  /// recycle once the selector is exhausted.
  #[instrument(level = "debug", skip(self), fields(%learner_id))]
  pub async fn oldest_seen(&self, learner_id: &LearnerId) -> Result<Option<ContentItem>, EngineError> {
    self.repo.learner(learner_id).await?.ok_or_else(|| EngineError::UnknownLearner(learner_id.clone()))?;
    for id in self.repo.seen_history(learner_id).await? {
      if let Some(item) = self.repo.content(&id).await? {
        if item.is_servable() {
          return Ok(Some(item));
        }
      }
    }
    Ok(None)
  }
}
