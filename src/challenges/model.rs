use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::AppResult,
    levels::{StoicLevel, UnknownLevel},
    response::Page,
};

/// Points awarded for any completed challenge.
pub const POINTS_PER_CHALLENGE: i32 = 1;

/// Append-only record of a completed challenge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChallengeCompletion {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub level: StoicLevel,
    pub objective: String,
    pub points: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

#[derive(Debug, FromRow)]
pub struct CompletionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub level: String,
    pub objective: String,
    pub points: i32,
    pub completed_at: OffsetDateTime,
}

impl TryFrom<CompletionRow> for ChallengeCompletion {
    type Error = UnknownLevel;

    fn try_from(r: CompletionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            level: r.level.parse()?,
            objective: r.objective,
            points: r.points,
            completed_at: r.completed_at,
        })
    }
}

/// Validated completion request.
#[derive(Debug, Clone)]
pub struct NewCompletion {
    pub user_id: Uuid,
    pub name: String,
    pub level: StoicLevel,
    pub objective: String,
}

impl NewCompletion {
    pub fn into_record(self) -> ChallengeCompletion {
        ChallengeCompletion {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            name: self.name,
            level: self.level,
            objective: self.objective,
            points: POINTS_PER_CHALLENGE,
            completed_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCompletion {
    pub completion: ChallengeCompletion,
    /// Point balance right after the increment.
    pub total_points: i64,
}

/// Storage for completions, the user point balance and the quiz-profile level.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn has_completed(&self, user_id: Uuid, name: &str) -> AppResult<bool>;

    /// Inserts the completion and increments the owner's points in one atomic step.
    /// Fails with `DuplicateCompletion` or `UserNotFound` without side effects.
    async fn record_completion(&self, completion: NewCompletion) -> AppResult<RecordedCompletion>;

    /// Overwrites the stored quiz-profile level if the user has one and
    /// returns the previous value.
    async fn sync_quiz_level(&self, user_id: Uuid, level: StoicLevel)
        -> AppResult<Option<StoicLevel>>;

    /// Creates or replaces the user's quiz profile.
    async fn upsert_quiz_level(&self, user_id: Uuid, level: StoicLevel) -> AppResult<()>;

    /// Newest first.
    async fn history(
        &self,
        user_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> AppResult<Page<ChallengeCompletion>>;
}
