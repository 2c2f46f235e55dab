use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::CompletionResult,
    model::{ChallengeCompletion, NewCompletion},
};
use crate::{
    auth::validation::MAX_FIELD_LEN,
    error::{AppError, AppResult},
    levels::{calculate_level, progress_info, StoicLevel},
    response::Page,
    state::AppState,
};

#[derive(Debug, Clone, Default)]
pub struct CompleteChallengeInput {
    pub name: String,
    pub level: String,
    pub objective: String,
}

fn validate(user_id: Uuid, input: CompleteChallengeInput) -> AppResult<NewCompletion> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Challenge name is required"));
    }
    if name.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::validation(format!(
            "Challenge name must be at most {MAX_FIELD_LEN} characters"
        )));
    }
    if input.level.trim().is_empty() {
        return Err(AppError::validation("Challenge level is required"));
    }
    let level: StoicLevel = input.level.trim().parse().map_err(|_| {
        AppError::validation(
            "Level must be one of: principiante, basico_intermedio, intermedio, \
             intermedio_avanzado, avanzado",
        )
    })?;
    let objective = input.objective.trim();
    if objective.is_empty() {
        return Err(AppError::validation("Challenge objective is required"));
    }
    Ok(NewCompletion {
        user_id,
        name: name.to_string(),
        level,
        objective: objective.to_string(),
    })
}

/// Records a challenge as done, awards its points and reports whether the
/// user crossed into a new tier.
pub async fn complete(
    state: &AppState,
    user_id: Uuid,
    input: CompleteChallengeInput,
) -> AppResult<CompletionResult> {
    let new_completion = validate(user_id, input)?;

    if state
        .challenges
        .has_completed(user_id, &new_completion.name)
        .await?
    {
        warn!(user_id = %user_id, name = %new_completion.name, "challenge already completed");
        return Err(AppError::DuplicateCompletion);
    }

    let recorded = state.challenges.record_completion(new_completion).await?;
    let total_points = recorded.total_points;
    let current_level = calculate_level(total_points);

    let previous_level = match state
        .challenges
        .sync_quiz_level(user_id, current_level)
        .await?
    {
        Some(stored) => stored,
        None => calculate_level(total_points - i64::from(recorded.completion.points)),
    };
    let level_changed = previous_level != current_level;

    info!(
        user_id = %user_id,
        total_points,
        level = %current_level,
        level_changed,
        "challenge completed"
    );
    Ok(CompletionResult {
        completion: recorded.completion,
        total_points,
        level_changed,
        current_level,
        current_level_label: current_level.label(),
        progress: progress_info(total_points),
    })
}

pub async fn history(
    state: &AppState,
    user_id: Uuid,
    page: i64,
    page_size: i64,
) -> AppResult<Page<ChallengeCompletion>> {
    state.challenges.history(user_id, page, page_size).await
}
