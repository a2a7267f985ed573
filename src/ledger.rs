//! Access ledger: decides whether a learner may consume one more question or
//! essay right now, and debits the bucket that granted it.
//!
//! Evaluation order per resource kind:
//!   1) trial allowance (lifetime)
//!   2) plan daily allowance, after the lazy day-rollover check
//!   3) purchased credits
//!   4) denied
//!
//! Every read-modify-write runs under the learner's lock, and ledger writes
//! carry the optimistic version token as a second line of defence.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AccessPolicy;
use crate::domain::{Bucket, ConsumptionEvent, ConsumptionOutcome, Learner, LearnerId, ResourceKind, UsageLedger};
use crate::error::EngineError;
use crate::store::{LearnerLocks, Repository};

/// Why access was granted, or that it was not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessReason {
  Trial,
  Daily,
  Credit,
  Denied,
}

impl AccessReason {
  pub fn bucket(self) -> Option<Bucket> {
    match self {
      AccessReason::Trial => Some(Bucket::Trial),
      AccessReason::Daily => Some(Bucket::Daily),
      AccessReason::Credit => Some(Bucket::Credit),
      AccessReason::Denied => None,
    }
  }
}

/// Outcome of an access check. A denial is a normal value, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessDecision {
  pub resource: ResourceKind,
  pub allowed: bool,
  pub reason: AccessReason,
  /// Units left in the granting bucket, counting the one about to be used.
  /// `None` when denied.
  pub remaining: Option<u32>,
  /// Ledger version the decision was taken against. `consume_access` must be
  /// handed this back and refuses to debit once the ledger has moved on.
  pub version: u64,
}

impl AccessDecision {
  pub fn bucket(&self) -> Option<Bucket> { self.reason.bucket() }
}

/// Remaining figures for one resource kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSummary {
  pub trial_remaining: u32,
  pub daily_remaining: u32,
  pub daily_limit: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
  pub learner_id: LearnerId,
  pub questions: ResourceSummary,
  pub essays: ResourceSummary,
  pub credits: u32,
}

/// Pure decision over a ledger whose daily counters are already rolled over.
pub fn decide(policy: &AccessPolicy, learner: &Learner, ledger: &UsageLedger, kind: ResourceKind) -> AccessDecision {
  let usage = ledger.usage(kind);
  let version = ledger.version;
  let trial_limit = policy.trial_limit(kind);
  if usage.trial_used < trial_limit {
    return AccessDecision {
      resource: kind,
      allowed: true,
      reason: AccessReason::Trial,
      remaining: Some(trial_limit - usage.trial_used),
      version,
    };
  }
  let daily_limit = policy.daily_limit(learner.plan, kind);
  if usage.daily_used < daily_limit {
    return AccessDecision {
      resource: kind,
      allowed: true,
      reason: AccessReason::Daily,
      remaining: Some(daily_limit - usage.daily_used),
      version,
    };
  }
  if ledger.credits > 0 {
    return AccessDecision { resource: kind, allowed: true, reason: AccessReason::Credit, remaining: Some(ledger.credits), version };
  }
  AccessDecision { resource: kind, allowed: false, reason: AccessReason::Denied, remaining: None, version }
}

/// Apply one debit to `ledger`. Does not re-check limits; only rejects
/// debits that would drive a counter negative or overflow.
pub fn debit(ledger: &mut UsageLedger, kind: ResourceKind, bucket: Bucket) -> Result<(), EngineError> {
  match bucket {
    Bucket::Trial => {
      let usage = ledger.usage_mut(kind);
      usage.trial_used = usage.trial_used.checked_add(1)
        .ok_or_else(|| EngineError::InvariantViolation("trial counter overflow".into()))?;
    }
    Bucket::Daily => {
      let usage = ledger.usage_mut(kind);
      usage.daily_used = usage.daily_used.checked_add(1)
        .ok_or_else(|| EngineError::InvariantViolation("daily counter overflow".into()))?;
    }
    Bucket::Credit => {
      ledger.credits = ledger.credits.checked_sub(1).ok_or_else(|| {
        EngineError::InvariantViolation(format!("credit debit for {} with zero balance", ledger.learner_id))
      })?;
    }
  }
  Ok(())
}

pub struct AccessLedger {
  repo: Arc<dyn Repository>,
  locks: LearnerLocks,
  clock: Arc<dyn Clock>,
  policy: RwLock<AccessPolicy>,
}

impl AccessLedger {
  pub fn new(repo: Arc<dyn Repository>, locks: LearnerLocks, clock: Arc<dyn Clock>, policy: AccessPolicy) -> Self {
    Self { repo, locks, clock, policy: RwLock::new(policy) }
  }

  pub fn policy(&self) -> AccessPolicy {
    self.policy.read().unwrap_or_else(|p| p.into_inner()).clone()
  }

  /// Swap the limits table. Takes effect on the next check.
  pub fn replace_policy(&self, policy: AccessPolicy) {
    info!(target: "access", trial_questions = policy.trial_questions, tiers = policy.plans.len(), "Access policy replaced");
    *self.policy.write().unwrap_or_else(|p| p.into_inner()) = policy;
  }

  async fn active_learner(&self, id: &LearnerId) -> Result<Learner, EngineError> {
    let learner = self.repo.learner(id).await?.ok_or_else(|| EngineError::UnknownLearner(id.clone()))?;
    if !learner.active {
      return Err(EngineError::InactiveLearner(id.clone()));
    }
    Ok(learner)
  }

  /// Load the ledger and apply the lazy daily rollover for `kind`, persisting
  /// it when a reset happened. Caller must hold the learner lock.
  async fn load_rolled(&self, learner: &Learner, kind: ResourceKind) -> Result<UsageLedger, EngineError> {
    let mut ledger = self.repo.usage(&learner.id).await?;
    let today = learner.local_date(self.clock.now());
    if ledger.usage_mut(kind).roll_over(today) {
      ledger.version = self.repo.save_usage(&ledger).await?;
      debug!(target: "access", learner = %learner.id, ?kind, %today, "Daily counter reset");
    }
    Ok(ledger)
  }

  /// May the learner consume one unit of `kind` right now?
  /// Only side effect: the lazy daily reset.
  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn check_access(&self, learner_id: &LearnerId, kind: ResourceKind) -> Result<AccessDecision, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    let learner = self.active_learner(learner_id).await?;
    let ledger = self.load_rolled(&learner, kind).await?;
    let decision = decide(&self.policy(), &learner, &ledger, kind);
    debug!(target: "access", learner = %learner_id, ?kind, reason = ?decision.reason, remaining = ?decision.remaining, "Access checked");
    Ok(decision)
  }

  /// Debit `bucket` as returned by a prior `check_access`, whose `version`
  /// must be passed as `expected_version`. Does not re-derive the bucket; any
  /// write to the ledger since the check (another debit, a credit grant)
  /// fails with `ConcurrentModification` and the caller has to check again.
  /// A daily reset applied here, after the check, is not counted as a change.
  #[instrument(level = "info", skip(self), fields(%learner_id, %bucket, expected_version))]
  pub async fn consume_access(
    &self,
    learner_id: &LearnerId,
    kind: ResourceKind,
    bucket: Bucket,
    expected_version: u64,
  ) -> Result<UsageLedger, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    let learner = self.active_learner(learner_id).await?;
    let found = self.repo.usage(learner_id).await?.version;
    if found != expected_version {
      warn!(target: "access", learner = %learner_id, ?kind, %bucket, expected_version, found, "Stale access decision");
      return Err(EngineError::ConcurrentModification(format!(
        "usage ledger for {learner_id} is at version {found}, decision was taken at {expected_version}"
      )));
    }
    let ledger = self.load_rolled(&learner, kind).await?;
    self.debit_and_log(ledger, kind, bucket).await
  }

  /// Check and consume in one learner transaction. Preferred entry point for
  /// delivery channels.
  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn acquire_access(&self, learner_id: &LearnerId, kind: ResourceKind) -> Result<AccessDecision, EngineError> {
    let _guard = self.locks.lock(learner_id).await;
    let learner = self.active_learner(learner_id).await?;
    let ledger = self.load_rolled(&learner, kind).await?;
    let decision = decide(&self.policy(), &learner, &ledger, kind);

    match decision.bucket() {
      Some(bucket) => {
        self.debit_and_log(ledger, kind, bucket).await?;
        info!(target: "access", learner = %learner_id, ?kind, %bucket, remaining = ?decision.remaining, "Access granted and debited");
      }
      None => {
        self.repo.append_consumption(self.event(learner_id, Some(kind), None, ConsumptionOutcome::Denied, 0, None)).await?;
        info!(target: "access", learner = %learner_id, ?kind, "Access denied: all buckets exhausted");
      }
    }
    Ok(decision)
  }

  async fn debit_and_log(&self, mut ledger: UsageLedger, kind: ResourceKind, bucket: Bucket) -> Result<UsageLedger, EngineError> {
    let learner_id = ledger.learner_id.clone();
    if let Err(e) = debit(&mut ledger, kind, bucket) {
      warn!(target: "access", learner = %learner_id, ?kind, %bucket, error = %e, "Debit rejected");
      return Err(e);
    }
    ledger.version = self.repo.save_usage(&ledger).await?;
    self.repo.append_consumption(self.event(&learner_id, Some(kind), Some(bucket), ConsumptionOutcome::Debited, 1, None)).await?;
    Ok(ledger)
  }

  /// Remaining figures per resource kind. Read-only: a pending daily reset
  /// is reflected but not written.
  #[instrument(level = "debug", skip(self), fields(%learner_id))]
  pub async fn usage_summary(&self, learner_id: &LearnerId) -> Result<UsageSummary, EngineError> {
    let learner = self.repo.learner(learner_id).await?.ok_or_else(|| EngineError::UnknownLearner(learner_id.clone()))?;
    let mut ledger = self.repo.usage(learner_id).await?;
    let today = learner.local_date(self.clock.now());
    ledger.questions.roll_over(today);
    ledger.essays.roll_over(today);

    let policy = self.policy();
    let summarize = |kind: ResourceKind| {
      let usage = ledger.usage(kind);
      let daily_limit = policy.daily_limit(learner.plan, kind);
      ResourceSummary {
        trial_remaining: policy.trial_limit(kind).saturating_sub(usage.trial_used),
        daily_remaining: daily_limit.saturating_sub(usage.daily_used),
        daily_limit,
      }
    };
    Ok(UsageSummary {
      learner_id: learner_id.clone(),
      questions: summarize(ResourceKind::Question),
      essays: summarize(ResourceKind::Essay),
      credits: ledger.credits,
    })
  }

  /// Add purchased credits. Returns the new balance.
  #[instrument(level = "info", skip(self), fields(%learner_id))]
  pub async fn grant_credits(&self, learner_id: &LearnerId, amount: u32, reference: Option<String>) -> Result<u32, EngineError> {
    if amount == 0 {
      return Err(EngineError::InvariantViolation("credit grant of zero".into()));
    }
    let _guard = self.locks.lock(learner_id).await;
    self.repo.learner(learner_id).await?.ok_or_else(|| EngineError::UnknownLearner(learner_id.clone()))?;
    let mut ledger = self.repo.usage(learner_id).await?;
    ledger.credits = ledger.credits.checked_add(amount)
      .ok_or_else(|| EngineError::InvariantViolation("credit balance overflow".into()))?;
    self.repo.save_usage(&ledger).await?;
    self.repo
      .append_consumption(self.event(learner_id, None, Some(Bucket::Credit), ConsumptionOutcome::Granted, amount, reference))
      .await?;
    info!(target: "access", learner = %learner_id, amount, balance = ledger.credits, "Credits granted");
    Ok(ledger.credits)
  }

  fn event(
    &self,
    learner_id: &LearnerId,
    resource: Option<ResourceKind>,
    bucket: Option<Bucket>,
    outcome: ConsumptionOutcome,
    amount: u32,
    reference: Option<String>,
  ) -> ConsumptionEvent {
    ConsumptionEvent {
      id: Uuid::new_v4().to_string(),
      learner_id: learner_id.clone(),
      resource,
      bucket,
      outcome,
      amount,
      reference,
      at: self.clock.now(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::clock::ManualClock;
  use crate::config::PlanLimits;
  use crate::domain::PlanTier;
  use crate::store::{LearnerStore, MemoryStore};
  use chrono::{TimeZone, Utc};
  use std::collections::HashMap;

  struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    ledger: Arc<AccessLedger>,
  }

  fn policy(trial: u32, basic_daily: u32) -> AccessPolicy {
    AccessPolicy {
      trial_questions: trial,
      trial_essays: 1,
      default_utc_offset_minutes: 0,
      plans: HashMap::from([
        (PlanTier::Free, PlanLimits { daily_questions: 0, daily_essays: 0 }),
        (PlanTier::Basic, PlanLimits { daily_questions: basic_daily, daily_essays: 1 }),
      ]),
    }
  }

  async fn fixture(plan: PlanTier, policy: AccessPolicy) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    // 10:00 UTC, well away from midnight.
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()));
    let mut learner = Learner::new("l1".into(), 0, clock.now());
    learner.plan = plan;
    store.save_learner(learner).await.unwrap();
    let ledger = Arc::new(AccessLedger::new(store.clone(), LearnerLocks::new(), clock.clone(), policy));
    Fixture { store, clock, ledger }
  }

  fn l1() -> LearnerId { LearnerId::new("l1") }

  async fn check_then_consume(f: &Fixture) -> AccessDecision {
    let d = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    if let Some(b) = d.bucket() {
      f.ledger.consume_access(&l1(), ResourceKind::Question, b, d.version).await.unwrap();
    }
    d
  }

  #[tokio::test]
  async fn trial_then_denied_on_free_plan() {
    let f = fixture(PlanTier::Free, policy(5, 3)).await;
    for i in 0..5 {
      let d = check_then_consume(&f).await;
      assert_eq!(d.reason, AccessReason::Trial, "call {i}");
      assert_eq!(d.remaining, Some(5 - i));
    }
    let d = check_then_consume(&f).await;
    assert!(!d.allowed);
    assert_eq!(d.reason, AccessReason::Denied);
    assert_eq!(d.remaining, None);
  }

  #[tokio::test]
  async fn trial_then_daily_then_credit_on_basic_plan() {
    let f = fixture(PlanTier::Basic, policy(5, 2)).await;
    f.ledger.grant_credits(&l1(), 1, Some("order-1".into())).await.unwrap();
    let reasons: Vec<_> = {
      let mut v = Vec::new();
      for _ in 0..9 { v.push(check_then_consume(&f).await.reason); }
      v
    };
    use AccessReason::*;
    assert_eq!(reasons, vec![Trial, Trial, Trial, Trial, Trial, Daily, Daily, Credit, Denied]);
    assert_eq!(f.store.usage(&l1()).await.unwrap().credits, 0);
  }

  #[tokio::test]
  async fn repeated_checks_do_not_change_remaining() {
    let f = fixture(PlanTier::Basic, policy(2, 2)).await;
    let first = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    for _ in 0..5 {
      assert_eq!(f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap(), first);
    }
    assert!(f.store.consumption_log(&l1()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn daily_counter_resets_on_next_day_before_comparison() {
    let f = fixture(PlanTier::Basic, policy(0, 2)).await;
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Daily);
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Daily);
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Denied);
    assert_eq!(f.store.usage(&l1()).await.unwrap().questions.daily_used, 2);

    f.clock.advance_days(1);
    let d = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!(d.reason, AccessReason::Daily);
    assert_eq!(d.remaining, Some(2));
    assert_eq!(f.store.usage(&l1()).await.unwrap().questions.daily_used, 0);

    // A second check the same day must not reset again.
    f.ledger.consume_access(&l1(), ResourceKind::Question, Bucket::Daily, d.version).await.unwrap();
    f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!(f.store.usage(&l1()).await.unwrap().questions.daily_used, 1);
  }

  #[tokio::test]
  async fn reset_follows_learner_cutover_not_utc() {
    let f = fixture(PlanTier::Basic, policy(0, 1)).await;
    let mut learner = f.store.learner(&l1()).await.unwrap().unwrap();
    learner.utc_offset_minutes = -180;
    f.store.save_learner(learner).await.unwrap();

    // 23:00 local on April 1st.
    f.clock.set(Utc.with_ymd_and_hms(2026, 4, 2, 2, 0, 0).unwrap());
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Daily);
    // 23:30 local, still April 1st.
    f.clock.set(Utc.with_ymd_and_hms(2026, 4, 2, 2, 30, 0).unwrap());
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Denied);
    // 00:05 local April 2nd.
    f.clock.set(Utc.with_ymd_and_hms(2026, 4, 2, 3, 5, 0).unwrap());
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Daily);
  }

  #[tokio::test]
  async fn essays_are_tracked_independently() {
    let f = fixture(PlanTier::Basic, policy(0, 1)).await;
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Daily);
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Denied);
    // trial_essays = 1, then daily_essays = 1.
    let e1 = f.ledger.acquire_access(&l1(), ResourceKind::Essay).await.unwrap();
    let e2 = f.ledger.acquire_access(&l1(), ResourceKind::Essay).await.unwrap();
    let e3 = f.ledger.acquire_access(&l1(), ResourceKind::Essay).await.unwrap();
    assert_eq!((e1.reason, e2.reason, e3.reason), (AccessReason::Trial, AccessReason::Daily, AccessReason::Denied));
  }

  #[tokio::test]
  async fn credit_debit_without_balance_is_an_invariant_violation() {
    let f = fixture(PlanTier::Free, policy(0, 0)).await;
    let err = f.ledger.consume_access(&l1(), ResourceKind::Question, Bucket::Credit, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::InvariantViolation(_)));
    assert!(f.store.consumption_log(&l1()).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn consume_with_stale_decision_is_rejected() {
    let f = fixture(PlanTier::Basic, policy(0, 1)).await;
    let a = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    let b = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!((a.reason, b.reason), (AccessReason::Daily, AccessReason::Daily));
    assert_eq!(a.version, b.version);

    f.ledger.consume_access(&l1(), ResourceKind::Question, Bucket::Daily, a.version).await.unwrap();
    let err = f.ledger.consume_access(&l1(), ResourceKind::Question, Bucket::Daily, b.version).await.unwrap_err();
    assert!(matches!(err, EngineError::ConcurrentModification(_)));

    let ledger = f.store.usage(&l1()).await.unwrap();
    assert_eq!(ledger.questions.daily_used, 1);
    let debits = f.store.consumption_log(&l1()).await.unwrap()
      .into_iter().filter(|e| e.outcome == ConsumptionOutcome::Debited).count();
    assert_eq!(debits, 1);

    // A fresh check sees the spent slot.
    let again = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!(again.reason, AccessReason::Denied);
  }

  #[tokio::test]
  async fn credit_grant_invalidates_pending_decision() {
    let f = fixture(PlanTier::Free, policy(1, 0)).await;
    let d = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    f.ledger.grant_credits(&l1(), 2, None).await.unwrap();
    let err = f.ledger.consume_access(&l1(), ResourceKind::Question, Bucket::Trial, d.version).await.unwrap_err();
    assert!(matches!(err, EngineError::ConcurrentModification(_)));
  }

  #[tokio::test]
  async fn day_change_between_check_and_consume_still_debits() {
    let f = fixture(PlanTier::Basic, policy(0, 2)).await;
    check_then_consume(&f).await;
    let d = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    f.clock.advance_days(1);
    let ledger = f.ledger.consume_access(&l1(), ResourceKind::Question, Bucket::Daily, d.version).await.unwrap();
    assert_eq!(ledger.questions.daily_used, 1);
    assert_eq!(ledger.version, d.version + 2);
  }

  #[tokio::test]
  async fn credit_grants_are_not_tied_to_a_resource_kind() {
    let f = fixture(PlanTier::Free, policy(0, 0)).await;
    f.ledger.grant_credits(&l1(), 3, Some("order-9".into())).await.unwrap();
    let d = f.ledger.acquire_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!(d.reason, AccessReason::Credit);
    let log = f.store.consumption_log(&l1()).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!((log[0].outcome, log[0].resource, log[0].amount), (ConsumptionOutcome::Granted, None, 3));
    assert_eq!((log[1].outcome, log[1].resource), (ConsumptionOutcome::Debited, Some(ResourceKind::Question)));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn racing_acquires_for_last_slot_grant_exactly_one() {
    let f = fixture(PlanTier::Basic, policy(0, 1)).await;
    let mut handles = Vec::new();
    for _ in 0..8 {
      let ledger = f.ledger.clone();
      handles.push(tokio::spawn(async move { ledger.acquire_access(&l1(), ResourceKind::Question).await }));
    }
    let mut granted = 0;
    let mut denied = 0;
    for h in handles {
      let d = h.await.unwrap().unwrap();
      if d.allowed { granted += 1 } else { denied += 1 }
    }
    assert_eq!((granted, denied), (1, 7));
    let ledger = f.store.usage(&l1()).await.unwrap();
    assert_eq!(ledger.questions.daily_used, 1);
    let debits = f.store.consumption_log(&l1()).await.unwrap()
      .into_iter().filter(|e| e.outcome == ConsumptionOutcome::Debited).count();
    assert_eq!(debits, 1);
  }

  #[tokio::test]
  async fn usage_summary_reflects_pending_reset_without_writing() {
    let f = fixture(PlanTier::Basic, policy(1, 3)).await;
    check_then_consume(&f).await;
    check_then_consume(&f).await;
    f.clock.advance_days(1);
    let before = f.store.usage(&l1()).await.unwrap();
    let s = f.ledger.usage_summary(&l1()).await.unwrap();
    assert_eq!(s.questions.trial_remaining, 0);
    assert_eq!(s.questions.daily_remaining, 3);
    assert_eq!(f.store.usage(&l1()).await.unwrap(), before);
  }

  #[tokio::test]
  async fn replaced_policy_applies_to_next_check() {
    let f = fixture(PlanTier::Basic, policy(0, 1)).await;
    check_then_consume(&f).await;
    assert_eq!(check_then_consume(&f).await.reason, AccessReason::Denied);
    f.ledger.replace_policy(policy(0, 5));
    let d = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap();
    assert_eq!((d.reason, d.remaining), (AccessReason::Daily, Some(4)));
  }

  #[tokio::test]
  async fn deactivated_learner_is_rejected() {
    let f = fixture(PlanTier::Premium, policy(5, 5)).await;
    let mut learner = f.store.learner(&l1()).await.unwrap().unwrap();
    learner.active = false;
    f.store.save_learner(learner).await.unwrap();
    let err = f.ledger.check_access(&l1(), ResourceKind::Question).await.unwrap_err();
    assert!(matches!(err, EngineError::InactiveLearner(_)));
  }
}
