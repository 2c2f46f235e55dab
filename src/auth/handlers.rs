use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tracing::instrument;

use super::{
    dto::{
        GoogleTokenRequest, LoginRequest, LoginResponse, OAuthLoginResponse, RegisterRequest,
        RegisterResponse, VerifyCodeRequest, VerifyEmailRequest,
    },
    services::{self, RegisterInput},
};
use crate::{error::AppResult, extract::AppJson, response::ApiResponse, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google/token", post(google_token))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/verify-email/code", post(verify_email_code))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<RegisterResponse>>)> {
    let registered = services::register_local(
        &state,
        RegisterInput {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            password: payload.password,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(
            "User registered, check your email for the verification code",
            RegisterResponse {
                user: registered.user,
                verification_token: registered.verification_token,
            },
        )),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let login = services::login_local(&state, &payload.email, &payload.password).await?;
    Ok(Json(ApiResponse::ok(
        "Login successful",
        LoginResponse {
            token: login.token,
            user: login.user,
            subscription: login.subscription,
        },
    )))
}

#[instrument(skip(state, payload))]
pub async fn google_token(
    State(state): State<AppState>,
    AppJson(payload): AppJson<GoogleTokenRequest>,
) -> AppResult<Json<ApiResponse<OAuthLoginResponse>>> {
    let login = services::login_with_google_token(&state, &payload.id_token).await?;
    let message = if login.is_new_user {
        "Account created with Google"
    } else {
        "Login with Google successful"
    };
    Ok(Json(ApiResponse::ok(
        message,
        OAuthLoginResponse {
            token: login.token,
            user: login.user,
            is_new_user: login.is_new_user,
        },
    )))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let outcome = services::verify_email_token(&state, &payload.token).await?;
    Ok(Json(ApiResponse::message(outcome.message())))
}

#[instrument(skip(state, payload))]
pub async fn verify_email_code(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyCodeRequest>,
) -> AppResult<Json<ApiResponse<()>>> {
    let outcome =
        services::verify_email_with_code(&state, &payload.user_id, &payload.code).await?;
    Ok(Json(ApiResponse::message(outcome.message())))
}
