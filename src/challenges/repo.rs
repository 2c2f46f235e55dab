use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::model::{
    ChallengeCompletion, ChallengeStore, CompletionRow, NewCompletion, RecordedCompletion,
};
use crate::{
    db::PgStore,
    error::{is_unique_violation, storage_error, AppError, AppResult},
    levels::StoicLevel,
    response::{page_offset, Page},
};

impl PgStore {
    async fn record_once(&self, record: &ChallengeCompletion) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_challenge_completions
                (id, user_id, name, level, objective, points, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.name)
        .bind(record.level.as_str())
        .bind(&record.objective)
        .bind(record.points)
        .bind(record.completed_at)
        .execute(&mut *tx)
        .await?;

        // single statement increment: concurrent completions never lose an update
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE users
               SET stoic_points = stoic_points + $2
             WHERE id = $1
            RETURNING stoic_points
            "#,
        )
        .bind(record.user_id)
        .bind(i64::from(record.points))
        .fetch_optional(&mut *tx)
        .await?;

        if total.is_some() {
            tx.commit().await?;
        }
        Ok(total)
    }
}

#[async_trait]
impl ChallengeStore for PgStore {
    async fn has_completed(&self, user_id: Uuid, name: &str) -> AppResult<bool> {
        self.bounded("check completion", async {
            sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM user_challenge_completions
                     WHERE user_id = $1 AND name = $2
                )
                "#,
            )
            .bind(user_id)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("check completion"))
        })
        .await
    }

    async fn record_completion(&self, completion: NewCompletion) -> AppResult<RecordedCompletion> {
        let record = completion.into_record();
        self.bounded("record completion", async {
            match self.record_once(&record).await {
                Ok(Some(total_points)) => {
                    debug!(user_id = %record.user_id, total_points, "completion recorded");
                    Ok(RecordedCompletion {
                        completion: record.clone(),
                        total_points,
                    })
                }
                Ok(None) => Err(AppError::UserNotFound),
                Err(e) if is_unique_violation(&e) => Err(AppError::DuplicateCompletion),
                // missing owner row trips the foreign key
                Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                    Err(AppError::UserNotFound)
                }
                Err(e) => Err(storage_error("record completion")(e)),
            }
        })
        .await
    }

    async fn sync_quiz_level(
        &self,
        user_id: Uuid,
        level: StoicLevel,
    ) -> AppResult<Option<StoicLevel>> {
        self.bounded("sync quiz level", async {
            // the CTE reads the pre-update value under the row lock
            let previous = sqlx::query_scalar::<_, String>(
                r#"
                WITH old AS (
                    SELECT user_id, stoic_level FROM user_quiz_responses
                     WHERE user_id = $1
                     FOR UPDATE
                )
                UPDATE user_quiz_responses q
                   SET stoic_level = $2, updated_at = now()
                  FROM old
                 WHERE q.user_id = old.user_id
                RETURNING old.stoic_level
                "#,
            )
            .bind(user_id)
            .bind(level.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("sync quiz level"))?;

            Ok(previous.and_then(|tag| tag.parse().ok()))
        })
        .await
    }

    async fn upsert_quiz_level(&self, user_id: Uuid, level: StoicLevel) -> AppResult<()> {
        self.bounded("upsert quiz level", async {
            sqlx::query(
                r#"
                INSERT INTO user_quiz_responses (user_id, stoic_level)
                VALUES ($1, $2)
                ON CONFLICT (user_id)
                DO UPDATE SET stoic_level = EXCLUDED.stoic_level, updated_at = now()
                "#,
            )
            .bind(user_id)
            .bind(level.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error("upsert quiz level"))?;
            Ok(())
        })
        .await
    }

    async fn history(
        &self,
        user_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> AppResult<Page<ChallengeCompletion>> {
        self.bounded("completion history", async {
            let total = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM user_challenge_completions WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error("count completions"))?;

            let rows = sqlx::query_as::<_, CompletionRow>(
                r#"
                SELECT id, user_id, name, level, objective, points, completed_at
                  FROM user_challenge_completions
                 WHERE user_id = $1
                 ORDER BY completed_at DESC
                 LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(page_size)
            .bind(page_offset(page, page_size))
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error("list completions"))?;

            let items = rows
                .into_iter()
                .map(ChallengeCompletion::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::StorageFailure(e.to_string()))?;
            Ok(Page { items, total })
        })
        .await
    }
}
