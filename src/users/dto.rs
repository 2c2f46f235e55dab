use serde::{Deserialize, Serialize};

use super::model::User;
use crate::{levels::ProgressInfo, response::Pagination, subscriptions::SubscriptionSummary};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub progress: ProgressInfo,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuizInfoRequest {
    pub stoic_level: String,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}
