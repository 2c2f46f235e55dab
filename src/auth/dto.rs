use serde::{Deserialize, Serialize};

use crate::{subscriptions::SubscriptionSummary, users::model::User};

// Missing fields deserialize as empty so the services report them as
// validation errors inside the normal envelope.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GoogleTokenRequest {
    pub id_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyCodeRequest {
    pub user_id: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: User,
    pub verification_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Serialize)]
pub struct OAuthLoginResponse {
    pub token: String,
    pub user: User,
    pub is_new_user: bool,
}
