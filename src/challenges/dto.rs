use serde::{Deserialize, Serialize};

use super::model::ChallengeCompletion;
use crate::{
    levels::{ProgressInfo, StoicLevel},
    response::Pagination,
};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CompleteChallengeRequest {
    pub name: String,
    pub level: String,
    pub objective: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionResult {
    pub completion: ChallengeCompletion,
    pub total_points: i64,
    pub level_changed: bool,
    pub current_level: StoicLevel,
    pub current_level_label: &'static str,
    pub progress: ProgressInfo,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub completions: Vec<ChallengeCompletion>,
    pub pagination: Pagination,
}
