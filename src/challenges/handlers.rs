use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{CompleteChallengeRequest, CompletionResult, HistoryResponse},
    services::{self, CompleteChallengeInput},
};
use crate::{
    auth::extractors::CurrentUser,
    error::AppResult,
    extract::{AppJson, AppQuery},
    levels::{progress_info, ProgressInfo},
    response::{ApiResponse, PageQuery, Pagination},
    state::AppState,
};

pub fn challenge_routes() -> Router<AppState> {
    Router::new()
        .route("/challenges/complete", post(complete))
        .route("/challenges/progress", get(progress))
        .route("/challenges/history", get(history))
}

#[instrument(skip(state, user, payload))]
pub async fn complete(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<CompleteChallengeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CompletionResult>>)> {
    let result = services::complete(
        &state,
        user.id,
        CompleteChallengeInput {
            name: payload.name,
            level: payload.level,
            objective: payload.objective,
        },
    )
    .await?;
    let message = if result.level_changed {
        format!("Level up! You reached {}", result.current_level_label)
    } else {
        "Challenge completed".to_string()
    };
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(message, result))))
}

#[instrument(skip(user))]
pub async fn progress(CurrentUser(user): CurrentUser) -> Json<ApiResponse<ProgressInfo>> {
    Json(ApiResponse::ok(
        "Progress retrieved",
        progress_info(user.stoic_points),
    ))
}

#[instrument(skip(state, user))]
pub async fn history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<HistoryResponse>>> {
    let (page, per_page) = query.clamped();
    let result = services::history(&state, user.id, page, per_page).await?;
    Ok(Json(ApiResponse::ok(
        "History retrieved",
        HistoryResponse {
            completions: result.items,
            pagination: Pagination::new(page, per_page, result.total),
        },
    )))
}
