//! In-process store used by tests and database-less local runs.
//!
//! Every trait method takes the single mutex for its whole duration, which
//! gives the same per-operation atomicity the Postgres transactions provide.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    challenges::model::{ChallengeCompletion, ChallengeStore, NewCompletion, RecordedCompletion},
    error::{AppError, AppResult},
    levels::StoicLevel,
    response::{page_offset, Page},
    subscriptions::{SubscriptionProvider, SubscriptionSummary},
    users::{
        directory::{plan_save, Saved, UserDirectory},
        model::{User, UserPatch},
    },
    verification::{generate_code, VerificationCodeStore, CODE_TTL},
};

#[derive(Debug, Clone)]
struct StoredCode {
    id: Uuid,
    user_id: Uuid,
    code: String,
    expires_at: OffsetDateTime,
    used: bool,
}

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    completions: Vec<ChallengeCompletion>,
    quiz_levels: HashMap<Uuid, StoicLevel>,
    codes: Vec<StoredCode>,
    subscriptions: HashMap<Uuid, SubscriptionSummary>,
}

impl Inner {
    fn find_by<F: Fn(&User) -> bool>(&self, pred: F) -> Option<User> {
        self.users.values().find(|u| pred(u)).cloned()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a code with an explicit expiry.
    pub async fn insert_code(&self, user_id: Uuid, code: &str, expires_at: OffsetDateTime) {
        self.inner.lock().await.codes.push(StoredCode {
            id: Uuid::new_v4(),
            user_id,
            code: code.to_string(),
            expires_at,
            used: false,
        });
    }

    pub async fn set_subscription(&self, user_id: Uuid, summary: SubscriptionSummary) {
        self.inner.lock().await.subscriptions.insert(user_id, summary);
    }

    pub async fn set_points(&self, user_id: Uuid, points: i64) {
        if let Some(user) = self.inner.lock().await.users.get_mut(&user_id) {
            user.stoic_points = points;
        }
    }

    pub async fn user_count(&self) -> usize {
        self.inner.lock().await.users.len()
    }

    pub async fn quiz_level(&self, user_id: Uuid) -> Option<StoicLevel> {
        self.inner.lock().await.quiz_levels.get(&user_id).copied()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.inner.lock().await.find_by(|u| u.email == email))
    }

    async fn find_by_external_id(&self, external_id: &str) -> AppResult<Option<User>> {
        Ok(self
            .inner
            .lock()
            .await
            .find_by(|u| u.external_id.as_deref() == Some(external_id)))
    }

    async fn save(&self, candidate: User) -> AppResult<Saved> {
        let mut inner = self.inner.lock().await;
        let by_id = inner.users.get(&candidate.id).cloned();
        let by_external_id = match candidate.external_id.as_deref() {
            Some(ext) => inner.find_by(|u| u.external_id.as_deref() == Some(ext)),
            None => None,
        };
        let by_email = inner.find_by(|u| u.email == candidate.email);

        let plan = plan_save(
            &candidate,
            by_id.as_ref(),
            by_external_id.as_ref(),
            by_email.as_ref(),
        )?;
        let (row, outcome) = plan.resolve(candidate);
        inner.users.insert(row.id, row.clone());
        Ok(Saved { user: row, outcome })
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> AppResult<Option<User>> {
        let mut inner = self.inner.lock().await;
        if let Some(ext) = patch.external_id.as_deref() {
            let taken = inner
                .users
                .values()
                .any(|u| u.id != id && u.external_id.as_deref() == Some(ext));
            if taken {
                return Err(AppError::EmailAlreadyRegistered);
            }
        }
        Ok(inner.users.get_mut(&id).map(|user| {
            patch.apply(user);
            user.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut inner = self.inner.lock().await;
        let removed = inner.users.remove(&id).is_some();
        if removed {
            inner.completions.retain(|c| c.user_id != id);
            inner.quiz_levels.remove(&id);
            inner.codes.retain(|c| c.user_id != id);
        }
        Ok(removed)
    }

    async fn exists_by_email(&self, email: &str) -> AppResult<bool> {
        Ok(self.inner.lock().await.users.values().any(|u| u.email == email))
    }

    async fn list_page(&self, page: i64, page_size: i64) -> AppResult<Page<User>> {
        let inner = self.inner.lock().await;
        let mut users: Vec<User> = inner.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = users.len() as i64;
        let items = users
            .into_iter()
            .skip(usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX))
            .take(page_size.max(0) as usize)
            .collect();
        Ok(Page { items, total })
    }
}

#[async_trait]
impl ChallengeStore for MemoryStore {
    async fn has_completed(&self, user_id: Uuid, name: &str) -> AppResult<bool> {
        Ok(self
            .inner
            .lock()
            .await
            .completions
            .iter()
            .any(|c| c.user_id == user_id && c.name == name))
    }

    async fn record_completion(&self, completion: NewCompletion) -> AppResult<RecordedCompletion> {
        let mut inner = self.inner.lock().await;
        let record = completion.into_record();
        if inner
            .completions
            .iter()
            .any(|c| c.user_id == record.user_id && c.name == record.name)
        {
            return Err(AppError::DuplicateCompletion);
        }
        let user = inner
            .users
            .get_mut(&record.user_id)
            .ok_or(AppError::UserNotFound)?;
        user.stoic_points += i64::from(record.points);
        let total_points = user.stoic_points;
        inner.completions.push(record.clone());
        Ok(RecordedCompletion {
            completion: record,
            total_points,
        })
    }

    async fn sync_quiz_level(
        &self,
        user_id: Uuid,
        level: StoicLevel,
    ) -> AppResult<Option<StoicLevel>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .quiz_levels
            .get_mut(&user_id)
            .map(|stored| std::mem::replace(stored, level)))
    }

    async fn upsert_quiz_level(&self, user_id: Uuid, level: StoicLevel) -> AppResult<()> {
        self.inner.lock().await.quiz_levels.insert(user_id, level);
        Ok(())
    }

    async fn history(
        &self,
        user_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> AppResult<Page<ChallengeCompletion>> {
        let inner = self.inner.lock().await;
        let mut mine: Vec<ChallengeCompletion> = inner
            .completions
            .iter()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        let total = mine.len() as i64;
        let items = mine
            .into_iter()
            .skip(usize::try_from(page_offset(page, page_size)).unwrap_or(usize::MAX))
            .take(page_size.max(0) as usize)
            .collect();
        Ok(Page { items, total })
    }
}

#[async_trait]
impl VerificationCodeStore for MemoryStore {
    async fn create_code(&self, user_id: Uuid) -> AppResult<String> {
        let code = generate_code();
        self.insert_code(user_id, &code, OffsetDateTime::now_utc() + CODE_TTL)
            .await;
        Ok(code)
    }

    async fn find_valid_code(&self, user_id: Uuid, code: &str) -> AppResult<Option<Uuid>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .inner
            .lock()
            .await
            .codes
            .iter()
            .find(|c| c.user_id == user_id && c.code == code && !c.used && c.expires_at > now)
            .map(|c| c.id))
    }

    async fn mark_used(&self, code_id: Uuid) -> AppResult<()> {
        if let Some(c) = self
            .inner
            .lock()
            .await
            .codes
            .iter_mut()
            .find(|c| c.id == code_id)
        {
            c.used = true;
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionProvider for MemoryStore {
    async fn summary(&self, user_id: Uuid) -> AppResult<SubscriptionSummary> {
        Ok(self
            .inner
            .lock()
            .await
            .subscriptions
            .get(&user_id)
            .cloned()
            .unwrap_or_else(SubscriptionSummary::inactive))
    }
}
