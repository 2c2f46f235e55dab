use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use super::model::{User, UserPatch};
use crate::{
    error::{AppError, AppResult},
    response::Page,
};

/// Persistence boundary for identity records.
///
/// Emails are expected to be trimmed and lower-cased by the caller.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn find_by_external_id(&self, external_id: &str) -> AppResult<Option<User>>;

    /// Create-or-merge, see [`plan_save`].
    async fn save(&self, user: User) -> AppResult<Saved>;

    async fn update(&self, id: Uuid, patch: UserPatch) -> AppResult<Option<User>>;
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
    async fn exists_by_email(&self, email: &str) -> AppResult<bool>;

    /// Newest first. `page` starts at 1; callers clamp both arguments.
    async fn list_page(&self, page: i64, page_size: i64) -> AppResult<Page<User>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Created,
    LinkedByExternalId,
    LinkedByEmail,
    Updated,
}

#[derive(Debug, Clone)]
pub struct Saved {
    pub user: User,
    pub outcome: SaveOutcome,
}

/// Which stored row a candidate maps onto.
#[derive(Debug, Clone, PartialEq)]
pub enum SavePlan {
    Update(User),
    LinkByExternalId(User),
    LinkByEmail(User),
    Create,
}

/// Decides how `candidate` is persisted given the rows that currently match
/// its id, external id and email.
///
/// Stored ids are never rewritten, and a verified email is never taken over.
pub fn plan_save(
    candidate: &User,
    by_id: Option<&User>,
    by_external_id: Option<&User>,
    by_email: Option<&User>,
) -> AppResult<SavePlan> {
    let plan = if let Some(existing) = by_id {
        SavePlan::Update(existing.clone())
    } else if let Some(existing) = by_external_id.filter(|_| candidate.external_id.is_some()) {
        SavePlan::LinkByExternalId(existing.clone())
    } else if let Some(existing) = by_email {
        if existing.email_verified {
            return Err(AppError::EmailAlreadyRegistered);
        }
        SavePlan::LinkByEmail(existing.clone())
    } else {
        return Ok(SavePlan::Create);
    };

    // the target row keeps the email; another row holding it is a conflict
    if let (Some(target), Some(holder)) = (plan.target(), by_email) {
        if target.id != holder.id {
            return Err(AppError::EmailAlreadyRegistered);
        }
    }
    Ok(plan)
}

impl SavePlan {
    fn target(&self) -> Option<&User> {
        match self {
            Self::Update(u) | Self::LinkByExternalId(u) | Self::LinkByEmail(u) => Some(u),
            Self::Create => None,
        }
    }

    /// Row to write and the outcome to report.
    pub fn resolve(self, candidate: User) -> (User, SaveOutcome) {
        match self {
            Self::Create => (
                User {
                    stoic_points: 0,
                    ..candidate
                },
                SaveOutcome::Created,
            ),
            Self::Update(existing) => (
                User {
                    id: existing.id,
                    stoic_points: existing.stoic_points,
                    created_at: existing.created_at,
                    ..candidate
                },
                SaveOutcome::Updated,
            ),
            Self::LinkByExternalId(existing) => (
                User {
                    first_name: candidate.first_name,
                    last_name: candidate.last_name,
                    email: candidate.email,
                    avatar_url: candidate.avatar_url,
                    auth_provider: candidate.auth_provider,
                    email_verified: existing.email_verified || candidate.email_verified,
                    password_hash: candidate.password_hash.or(existing.password_hash),
                    ..existing
                },
                SaveOutcome::LinkedByExternalId,
            ),
            Self::LinkByEmail(existing) => (
                User {
                    first_name: candidate.first_name,
                    last_name: candidate.last_name,
                    // the pending row's password never proved control of the email
                    password_hash: candidate.password_hash,
                    email_verified: candidate.email_verified,
                    quiz_completed: existing.quiz_completed || candidate.quiz_completed,
                    external_id: candidate.external_id.or(existing.external_id),
                    avatar_url: candidate.avatar_url.or(existing.avatar_url),
                    auth_provider: candidate.auth_provider,
                    ..existing
                },
                SaveOutcome::LinkedByEmail,
            ),
        }
    }
}
