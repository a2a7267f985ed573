//! Per-learner async mutexes. Requests for different learners never contend;
//! requests for the same learner are serialised.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::domain::LearnerId;

/// Idle entries are pruned once the map grows past this size.
const PRUNE_THRESHOLD: usize = 4096;

#[derive(Clone, Default)]
pub struct LearnerLocks {
  inner: Arc<Mutex<HashMap<LearnerId, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one learner-scoped transaction.
pub struct LearnerGuard {
  _guard: OwnedMutexGuard<()>,
}

impl LearnerLocks {
  pub fn new() -> Self { Self::default() }

  pub async fn lock(&self, learner: &LearnerId) -> LearnerGuard {
    let slot = {
      let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
      if map.len() > PRUNE_THRESHOLD {
        // Only the map holds a reference to idle slots.
        map.retain(|_, m| Arc::strong_count(m) > 1);
      }
      map.entry(learner.clone()).or_default().clone()
    };
    trace!(target: "prepcore", learner = %learner, "acquiring learner lock");
    LearnerGuard { _guard: slot.lock_owned().await }
  }

  #[cfg(test)]
  fn len(&self) -> usize {
    self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn same_learner_is_serialised() {
    let locks = LearnerLocks::new();
    let id = LearnerId::new("a");
    let held = locks.lock(&id).await;

    let locks2 = locks.clone();
    let id2 = id.clone();
    let waiter = tokio::spawn(async move {
      let _g = locks2.lock(&id2).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    drop(held);
    waiter.await.unwrap();
  }

  #[tokio::test]
  async fn different_learners_do_not_block() {
    let locks = LearnerLocks::new();
    let _a = locks.lock(&LearnerId::new("a")).await;
    let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(&LearnerId::new("b"))).await;
    assert!(b.is_ok());
    assert_eq!(locks.len(), 2);
  }
}
