//! HTTP endpoint handlers. These are thin wrappers that forward to the engine.
//! Each handler is instrumented and logs the ids involved and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::domain::{Learner, LearnerId, ReviewScheduleEntry, SubjectPerformance, UsageLedger};
use crate::engine::{OnboardingProfile, SubmitOutcome};
use crate::error::EngineError;
use crate::ledger::{AccessDecision, UsageSummary};
use crate::protocol::*;
use crate::state::AppState;

/// `EngineError` rendered as `{ "error": ..., "retryable": ... }`.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self { Self(e) }
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match &self.0 {
      EngineError::UnknownLearner(_) | EngineError::UnknownContent(_) | EngineError::UnknownQuestion(_) => StatusCode::NOT_FOUND,
      EngineError::InactiveLearner(_) => StatusCode::FORBIDDEN,
      EngineError::InvalidQuality(_) | EngineError::InvariantViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
      EngineError::ConcurrentModification(_) => StatusCode::CONFLICT,
      EngineError::Storage(_) if self.0.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
      EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      warn!(target: "prepcore", %status, error = %self.0, "Request failed");
    }
    (status, Json(ErrorOut { error: self.0.to_string(), retryable: self.0.is_retryable() })).into_response()
  }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, generator: state.generator.is_some() })
}

// --- learners ---

#[instrument(level = "info", skip(state, body), fields(learner_id = %body.learner_id))]
pub async fn http_register(State(state): State<Arc<AppState>>, Json(body): Json<RegisterIn>) -> ApiResult<Learner> {
  let learner = state.engine.register_learner(&LearnerId::new(body.learner_id), body.utc_offset_minutes).await?;
  Ok(Json(learner))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_learner(State(state): State<Arc<AppState>>, Path(id): Path<LearnerId>) -> ApiResult<Learner> {
  Ok(Json(state.engine.learner(&id).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_put_profile(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<OnboardingProfile>,
) -> ApiResult<Learner> {
  Ok(Json(state.engine.onboard(&id, body).await?))
}

#[instrument(level = "info", skip(state), fields(plan = ?body.plan))]
pub async fn http_put_plan(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<PlanIn>,
) -> ApiResult<Learner> {
  Ok(Json(state.engine.set_plan(&id, body.plan).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_deactivate(State(state): State<Arc<AppState>>, Path(id): Path<LearnerId>) -> ApiResult<Learner> {
  Ok(Json(state.engine.deactivate(&id).await?))
}

// --- content ---

#[instrument(level = "info", skip(state))]
pub async fn http_next_content(State(state): State<Arc<AppState>>, Path(id): Path<LearnerId>) -> ApiResult<NextContentOut> {
  let selection = state.engine.select_next_content(&id).await?;
  info!(target: "selection", learner = %id, reason = selection.label(), "HTTP next content served");
  Ok(Json(NextContentOut::from(&selection)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_oldest_seen(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
) -> ApiResult<Option<ContentOut>> {
  let item = state.engine.oldest_seen(&id).await?;
  Ok(Json(item.as_ref().map(ContentOut::from)))
}

// --- access ---

#[instrument(level = "info", skip(state), fields(kind = ?q.kind))]
pub async fn http_check_access(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Query(q): Query<AccessQuery>,
) -> ApiResult<AccessDecision> {
  Ok(Json(state.engine.check_access(&id, q.kind).await?))
}

#[instrument(level = "info", skip(state), fields(kind = ?body.kind, bucket = %body.bucket, version = body.version))]
pub async fn http_consume_access(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<ConsumeIn>,
) -> ApiResult<UsageLedger> {
  Ok(Json(state.engine.consume_access(&id, body.kind, body.bucket, body.version).await?))
}

#[instrument(level = "info", skip(state), fields(kind = ?body.kind))]
pub async fn http_acquire_access(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<AccessQuery>,
) -> ApiResult<AccessDecision> {
  Ok(Json(state.engine.acquire_access(&id, body.kind).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_usage(State(state): State<Arc<AppState>>, Path(id): Path<LearnerId>) -> ApiResult<UsageSummary> {
  Ok(Json(state.engine.usage_summary(&id).await?))
}

#[instrument(level = "info", skip(state, body), fields(amount = body.amount))]
pub async fn http_grant_credits(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<CreditsIn>,
) -> ApiResult<CreditsOut> {
  let balance = state.engine.grant_credits(&id, body.amount, body.reference).await?;
  Ok(Json(CreditsOut { balance }))
}

// --- questions and answers ---

#[instrument(level = "info", skip(state, body), fields(content_id = %body.content_id, excluded = body.exclude.len()))]
pub async fn http_resolve_question(State(state): State<Arc<AppState>>, Json(body): Json<ResolveIn>) -> ApiResult<QuestionOut> {
  let resolved = match (&body.exam_type, &body.learner_id) {
    (None, Some(learner)) => {
      state.engine.resolve_question_for(&LearnerId::new(learner.as_str()), &body.content_id, &body.exclude).await?
    }
    (exam, _) => state.engine.resolve_question(&body.content_id, &body.exclude, exam.as_ref()).await?,
  };
  info!(target: "questions", content_id = %body.content_id, id = %resolved.question.id, "HTTP question served");
  Ok(Json(to_out(&resolved)))
}

#[instrument(level = "info", skip(state, body), fields(question_id = %body.question_id, answer_len = body.answer.len()))]
pub async fn http_post_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<AnswerIn>,
) -> ApiResult<SubmitOutcome> {
  let outcome = match &body.content_id {
    Some(content_id) => state.engine.submit_answer(&id, content_id, &body.question_id, &body.answer).await?,
    None => {
      let feedback = state.engine.record_answer(&id, &body.question_id, &body.answer).await?;
      SubmitOutcome { feedback, quality: None, review: None }
    }
  };
  info!(target: "questions", learner = %id, question = %body.question_id, correct = outcome.feedback.correct, "HTTP answer evaluated");
  Ok(Json(outcome))
}

#[instrument(level = "info", skip(state), fields(content_id = %body.content_id, quality = body.quality))]
pub async fn http_post_review(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
  Json(body): Json<ReviewIn>,
) -> ApiResult<ReviewScheduleEntry> {
  Ok(Json(state.engine.record_review_outcome(&id, &body.content_id, body.quality).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_learner_due_reviews(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
) -> ApiResult<Vec<ReviewScheduleEntry>> {
  Ok(Json(state.engine.due_reviews_for(&id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_all_due_reviews(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ReviewScheduleEntry>> {
  let due = state.engine.due_reviews().await?;
  info!(target: "review", count = due.len(), "HTTP due-review sweep");
  Ok(Json(due))
}

#[instrument(level = "info", skip(state))]
pub async fn http_performance(
  State(state): State<Arc<AppState>>,
  Path(id): Path<LearnerId>,
) -> ApiResult<Vec<SubjectPerformance>> {
  Ok(Json(state.engine.subject_performance(&id).await?))
}
