//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - learner, access, question and review endpoints under `/api/v1/...`
/// - CORS (allow any origin/method/headers); tighten in front of production
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // Learner profile
        .route("/api/v1/learners", post(http::http_register))
        .route("/api/v1/learners/:id", get(http::http_get_learner))
        .route("/api/v1/learners/:id/profile", put(http::http_put_profile))
        .route("/api/v1/learners/:id/plan", put(http::http_put_plan))
        .route("/api/v1/learners/:id/deactivate", post(http::http_deactivate))
        // Selection
        .route("/api/v1/learners/:id/next", get(http::http_next_content))
        .route("/api/v1/learners/:id/oldest-seen", get(http::http_oldest_seen))
        // Access ledger
        .route("/api/v1/learners/:id/access", get(http::http_check_access))
        .route("/api/v1/learners/:id/access/consume", post(http::http_consume_access))
        .route("/api/v1/learners/:id/access/acquire", post(http::http_acquire_access))
        .route("/api/v1/learners/:id/usage", get(http::http_usage))
        .route("/api/v1/learners/:id/credits", post(http::http_grant_credits))
        // Questions, answers, reviews
        .route("/api/v1/questions/resolve", post(http::http_resolve_question))
        .route("/api/v1/learners/:id/answers", post(http::http_post_answer))
        .route("/api/v1/learners/:id/reviews", post(http::http_post_review))
        .route("/api/v1/learners/:id/reviews/due", get(http::http_learner_due_reviews))
        .route("/api/v1/learners/:id/performance", get(http::http_performance))
        .route("/api/v1/reviews/due", get(http::http_all_due_reviews))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}
