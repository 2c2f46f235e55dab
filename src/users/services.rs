use tracing::{info, warn};
use uuid::Uuid;

use super::model::{User, UserPatch};
use crate::{
    error::{AppError, AppResult},
    levels::StoicLevel,
    response::Page,
    state::AppState,
};

/// Admins may read anyone; everybody else only themselves.
pub async fn get_user(state: &AppState, requester: &User, id: Uuid) -> AppResult<User> {
    if !requester.is_admin && requester.id != id {
        warn!(requester = %requester.id, target = %id, "user lookup denied");
        return Err(AppError::Forbidden);
    }
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or(AppError::UserNotFound)
}

pub async fn list_users(state: &AppState, page: i64, page_size: i64) -> AppResult<Page<User>> {
    state.users.list_page(page, page_size).await
}

pub async fn delete_user(state: &AppState, id: Uuid) -> AppResult<()> {
    if !state.users.delete(id).await? {
        return Err(AppError::UserNotFound);
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

/// Stores the quiz result and flags the quiz as done.
pub async fn update_quiz_info(state: &AppState, user_id: Uuid, level: &str) -> AppResult<User> {
    let level: StoicLevel = level
        .trim()
        .parse()
        .map_err(|e| AppError::validation(format!("{e}")))?;
    state.challenges.upsert_quiz_level(user_id, level).await?;
    let user = state
        .users
        .update(
            user_id,
            UserPatch {
                quiz_completed: Some(true),
                ..Default::default()
            },
        )
        .await?
        .ok_or(AppError::UserNotFound)?;
    info!(user_id = %user_id, level = %level, "quiz info updated");
    Ok(user)
}
