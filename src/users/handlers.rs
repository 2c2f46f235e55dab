use axum::{
    extract::State,
    routing::{get, patch},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{MeResponse, QuizInfoRequest, UserListResponse},
    model::User,
    services,
};
use crate::{
    auth::extractors::{AdminUser, CurrentUser},
    error::AppResult,
    extract::{AppJson, AppPath, AppQuery},
    levels::progress_info,
    response::{ApiResponse, PageQuery, Pagination},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/me", get(get_me))
        .route("/users/me/quiz", patch(update_quiz))
        .route("/users/:id", get(get_user).delete(delete_user))
}

#[instrument(skip(state, user))]
pub async fn get_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<ApiResponse<MeResponse>>> {
    let subscription = state.subscriptions.summary(user.id).await?;
    let progress = progress_info(user.stoic_points);
    Ok(Json(ApiResponse::ok(
        "Current user",
        MeResponse {
            user,
            progress,
            subscription,
        },
    )))
}

#[instrument(skip(state, user, payload))]
pub async fn update_quiz(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    AppJson(payload): AppJson<QuizInfoRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let updated = services::update_quiz_info(&state, user.id, &payload.stoic_level).await?;
    Ok(Json(ApiResponse::ok("Quiz info updated", updated)))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    AppQuery(query): AppQuery<PageQuery>,
) -> AppResult<Json<ApiResponse<UserListResponse>>> {
    let (page, per_page) = query.clamped();
    let result = services::list_users(&state, page, per_page).await?;
    Ok(Json(ApiResponse::ok(
        "Users retrieved",
        UserListResponse {
            users: result.items,
            pagination: Pagination::new(page, per_page, result.total),
        },
    )))
}

#[instrument(skip(state, requester))]
pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = services::get_user(&state, &requester, id).await?;
    Ok(Json(ApiResponse::ok("User retrieved", user)))
}

#[instrument(skip(state, _admin))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<ApiResponse<()>>> {
    services::delete_user(&state, id).await?;
    Ok(Json(ApiResponse::message("User deleted")))
}
