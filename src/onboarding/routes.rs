//! REST endpoints driving one onboarding session.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;

use crate::error::NavigationError;

use super::model::{COMPLETED_KEY, SessionData};
use super::session::OnboardingSession;

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub session: Arc<OnboardingSession>,
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// GET /api/onboarding/status
///
/// Snapshot plus what the UI needs to render the wizard chrome.
async fn get_status(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    let session = &state.session;
    Json(json!({
        "session": session.snapshot(),
        "steps": session.steps(),
        "nav_state": session.nav_state(),
        "active": session.is_active(),
        "can_advance": session.can_advance(),
        "missing_fields": session.missing_fields(),
        "redirect": session.redirected_to(),
    }))
}

/// PATCH /api/onboarding/data
///
/// Merge-patch the answers with a JSON object.
async fn patch_data(
    State(state): State<OnboardingRouteState>,
    Json(body): Json<Value>,
) -> Response {
    let Some(partial) = SessionData::from_value(body) else {
        return error_response(StatusCode::BAD_REQUEST, "Body must be a JSON object");
    };
    if partial.get(COMPLETED_KEY).is_some() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "`completed` is set by finishing the last step",
        );
    }
    if !state.session.update(partial) {
        return error_response(StatusCode::CONFLICT, "Session has ended");
    }
    Json(state.session.snapshot()).into_response()
}

/// POST /api/onboarding/next
async fn post_next(State(state): State<OnboardingRouteState>) -> Response {
    match state.session.next().await {
        Ok(outcome) => Json(json!({
            "result": outcome,
            "current_step": state.session.snapshot().current_step,
        }))
        .into_response(),
        Err(e) => navigation_error(e),
    }
}

/// POST /api/onboarding/previous
async fn post_previous(State(state): State<OnboardingRouteState>) -> Response {
    match state.session.previous() {
        Ok(step) => Json(json!({"current_step": step})).into_response(),
        Err(e) => navigation_error(e),
    }
}

/// POST /api/onboarding/steps/{index}
async fn post_step(
    State(state): State<OnboardingRouteState>,
    Path(index): Path<usize>,
) -> Response {
    match state.session.go_to(index) {
        Ok(step) => Json(json!({"current_step": step})).into_response(),
        Err(e) => navigation_error(e),
    }
}

/// DELETE /api/onboarding/session
async fn delete_session(State(state): State<OnboardingRouteState>) -> impl IntoResponse {
    let ended = state.session.end();
    Json(json!({"ended": ended}))
}

fn navigation_error(e: NavigationError) -> Response {
    let status = match &e {
        NavigationError::SaveFailed { .. } | NavigationError::CompletionFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        NavigationError::AtFirstStep
        | NavigationError::StepOutOfRange { .. }
        | NavigationError::ForwardJump { .. }
        | NavigationError::SessionEnded
        | NavigationError::Busy => StatusCode::CONFLICT,
    };
    error_response(status, &e.to_string())
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"error": message}))).into_response()
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/status", get(get_status))
        .route("/api/onboarding/data", patch(patch_data))
        .route("/api/onboarding/next", post(post_next))
        .route("/api/onboarding/previous", post(post_previous))
        .route("/api/onboarding/steps/{index}", post(post_step))
        .route("/api/onboarding/session", delete(delete_session))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
