//! Identity resolution: who is this caller, and which stored user do they map to.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    claims::SessionIdentity,
    google::OAuthProfile,
    password::{hash_password, verify_password, MIN_PASSWORD_LEN},
    validation::{
        is_valid_email, normalize_email, sanitize_avatar, split_display_name, MAX_FIELD_LEN,
    },
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    subscriptions::SubscriptionSummary,
    users::{
        directory::SaveOutcome,
        model::{AuthProvider, User, UserPatch},
    },
    verification::is_valid_code_format,
};

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Registered {
    pub user: User,
    pub verification_token: String,
}

#[derive(Debug, Clone)]
pub struct LocalLogin {
    pub token: String,
    pub user: User,
    pub subscription: SubscriptionSummary,
}

#[derive(Debug, Clone)]
pub struct OAuthLogin {
    pub token: String,
    pub user: User,
    pub is_new_user: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

impl VerifyOutcome {
    pub fn message(self) -> &'static str {
        match self {
            Self::Verified => "Email verified successfully",
            Self::AlreadyVerified => "Email was already verified",
        }
    }
}

fn required<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(AppError::validation(format!(
            "{field} must be at most {MAX_FIELD_LEN} characters"
        )));
    }
    Ok(value)
}

fn issue_for(state: &AppState, user: &User) -> AppResult<String> {
    state.jwt.issue(&SessionIdentity {
        user_id: user.id,
        email: user.email.clone(),
    })
}

/// Creates (or re-registers an unverified) local account and issues both an
/// email verification code and a verification link token.
pub async fn register_local(state: &AppState, input: RegisterInput) -> AppResult<Registered> {
    let first_name = required(&input.first_name, "first_name")?;
    let last_name = required(&input.last_name, "last_name")?;
    let email = normalize_email(required(&input.email, "email")?);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let hash = hash_password(&input.password)
        .map_err(|e| AppError::Internal(format!("hash password: {e}")))?;
    let saved = state
        .users
        .save(User::new_local(first_name, last_name, &email, hash))
        .await?;

    let code = state.codes.create_code(saved.user.id).await?;
    // delivery is handled outside this service
    debug!(user_id = %saved.user.id, code = %code, "verification code issued");
    let verification_token = state.jwt.issue_email_verification(&SessionIdentity {
        user_id: saved.user.id,
        email: saved.user.email.clone(),
    })?;
    info!(user_id = %saved.user.id, outcome = ?saved.outcome, "user registered");
    Ok(Registered {
        user: saved.user,
        verification_token,
    })
}

pub async fn login_local(state: &AppState, email: &str, password: &str) -> AppResult<LocalLogin> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::InvalidCredentials);
    };
    if !user.email_verified {
        warn!(user_id = %user.id, "login with unverified email");
        return Err(AppError::EmailNotVerified);
    }

    let Some(hash) = user.password_hash.as_deref() else {
        warn!(user_id = %user.id, "password login on oauth-only account");
        return Err(AppError::InvalidCredentials);
    };
    let ok = verify_password(password, hash).unwrap_or_else(|e| {
        error!(error = %e, user_id = %user.id, "stored password hash unreadable");
        false
    });
    if !ok {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let token = issue_for(state, &user)?;
    let subscription = state.subscriptions.summary(user.id).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(LocalLogin {
        token,
        user,
        subscription,
    })
}

/// Maps a provider-asserted identity onto a stored user, creating or linking
/// as needed, and issues a session token.
pub async fn login_oauth(state: &AppState, profile: OAuthProfile) -> AppResult<OAuthLogin> {
    let external_id = required(&profile.provider_user_id, "provider_user_id")?.to_string();
    let email = normalize_email(required(&profile.email, "email")?);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email from provider");
        return Err(AppError::validation("Invalid email"));
    }
    let avatar_url = sanitize_avatar(profile.avatar_url.as_deref());

    if let Some(user) = state.users.find_by_external_id(&external_id).await? {
        let token = issue_for(state, &user)?;
        info!(user_id = %user.id, "oauth login");
        return Ok(OAuthLogin {
            token,
            user,
            is_new_user: false,
        });
    }

    let (user, is_new_user) =
        resolve_oauth_account(state, external_id, &email, profile.display_name, avatar_url)
            .await
            .map_err(|e| {
                error!(error = %e, email = %email, "account creation failed");
                account_creation_failed(e)
            })?;

    let token = issue_for(state, &user)?;
    info!(user_id = %user.id, is_new_user, "oauth login");
    Ok(OAuthLogin {
        token,
        user,
        is_new_user,
    })
}

fn account_creation_failed(e: AppError) -> AppError {
    match e {
        AppError::StorageFailure(ctx) => {
            AppError::StorageFailure(format!("account creation failed: {ctx}"))
        }
        other => other,
    }
}

async fn resolve_oauth_account(
    state: &AppState,
    external_id: String,
    email: &str,
    display_name: Option<String>,
    avatar_url: Option<String>,
) -> AppResult<(User, bool)> {
    if let Some(existing) = state.users.find_by_email(email).await? {
        // a pending local signup proved nothing about who owns the address
        let password_hash = if existing.email_verified {
            None
        } else {
            warn!(user_id = %existing.id, "discarding password of unverified account on oauth link");
            Some(None)
        };
        let patch = UserPatch {
            password_hash,
            external_id: Some(external_id),
            avatar_url: avatar_url.map(Some),
            auth_provider: Some(AuthProvider::Google),
            email_verified: Some(true),
            ..Default::default()
        };
        let linked = state
            .users
            .update(existing.id, patch)
            .await?
            .ok_or(AppError::UserNotFound)?;
        info!(user_id = %linked.id, "oauth identity linked by email");
        return Ok((linked, false));
    }

    let (first_name, last_name) = split_display_name(display_name.as_deref());
    let saved = state
        .users
        .save(User::new_google(first_name, last_name, email, &external_id, avatar_url))
        .await?;
    Ok((saved.user, saved.outcome == SaveOutcome::Created))
}

pub async fn login_with_google_token(state: &AppState, id_token: &str) -> AppResult<OAuthLogin> {
    let Some(client) = state.oauth.as_ref() else {
        return Err(AppError::validation("Google login is not configured"));
    };
    if id_token.trim().is_empty() {
        return Err(AppError::validation("id_token is required"));
    }
    let profile = client.fetch_profile(id_token.trim()).await?;
    login_oauth(state, profile).await
}

async fn mark_verified(state: &AppState, user_id: Uuid) -> AppResult<()> {
    state
        .users
        .update(
            user_id,
            UserPatch {
                email_verified: Some(true),
                ..Default::default()
            },
        )
        .await?
        .ok_or(AppError::UserNotFound)?;
    info!(user_id = %user_id, "email verified");
    Ok(())
}

pub async fn verify_email_token(state: &AppState, token: &str) -> AppResult<VerifyOutcome> {
    if token.trim().is_empty() {
        return Err(AppError::validation("Verification token is required"));
    }
    let claims = state.jwt.verify_email_verification(token.trim())?;
    let user = state
        .users
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::UserNotFound)?;
    if user.email != claims.email {
        warn!(user_id = %user.id, "verification token for a previous email");
        return Err(AppError::TokenInvalid);
    }
    if user.email_verified {
        return Ok(VerifyOutcome::AlreadyVerified);
    }
    mark_verified(state, user.id).await?;
    Ok(VerifyOutcome::Verified)
}

pub async fn verify_email_with_code(
    state: &AppState,
    user_id: &str,
    code: &str,
) -> AppResult<VerifyOutcome> {
    if user_id.trim().is_empty() {
        return Err(AppError::validation("user_id is required"));
    }
    if code.trim().is_empty() {
        return Err(AppError::validation("Verification code is required"));
    }
    if !is_valid_code_format(code) {
        return Err(AppError::validation("Code must be exactly 6 digits"));
    }
    let user_id: Uuid = user_id
        .trim()
        .parse()
        .map_err(|_| AppError::validation("Invalid user id"))?;

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;
    if user.email_verified {
        return Ok(VerifyOutcome::AlreadyVerified);
    }

    let Some(code_id) = state.codes.find_valid_code(user_id, code).await? else {
        warn!(user_id = %user_id, "invalid or expired verification code");
        return Err(AppError::validation("Invalid or expired verification code"));
    };
    state.codes.mark_used(code_id).await?;
    mark_verified(state, user_id).await?;
    Ok(VerifyOutcome::Verified)
}
