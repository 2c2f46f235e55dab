use std::future::Future;

use async_trait::async_trait;
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    directory::{plan_save, SaveOutcome, Saved, UserDirectory},
    model::{User, UserPatch, UserRow},
};
use crate::{
    db::PgStore,
    error::{is_unique_violation, storage_error, AppError, AppResult},
    response::{page_offset, Page},
};

const SELECT_USER: &str = r#"
    SELECT id, first_name, last_name, email, password_hash, email_verified, quiz_completed,
           external_id, avatar_url, auth_provider, is_admin, stoic_points, created_at
    FROM users
"#;

fn into_user(row: UserRow) -> Result<User, sqlx::Error> {
    User::try_from(row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

async fn fetch_where(
    conn: &mut PgConnection,
    predicate: &str,
    value: &str,
    lock: bool,
) -> Result<Option<User>, sqlx::Error> {
    let sql = format!(
        "{SELECT_USER} WHERE {predicate} = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(value)
        .fetch_optional(conn)
        .await?;
    row.map(into_user).transpose()
}

async fn fetch_by_id(
    conn: &mut PgConnection,
    id: Uuid,
    lock: bool,
) -> Result<Option<User>, sqlx::Error> {
    let sql = format!(
        "{SELECT_USER} WHERE id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    row.map(into_user).transpose()
}

async fn insert_user(tx: &mut Transaction<'_, Postgres>, u: &User) -> Result<User, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, first_name, last_name, email, password_hash, email_verified,
                           quiz_completed, external_id, avatar_url, auth_provider, is_admin,
                           stoic_points, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, $12)
        RETURNING id, first_name, last_name, email, password_hash, email_verified, quiz_completed,
                  external_id, avatar_url, auth_provider, is_admin, stoic_points, created_at
        "#,
    )
    .bind(u.id)
    .bind(&u.first_name)
    .bind(&u.last_name)
    .bind(&u.email)
    .bind(&u.password_hash)
    .bind(u.email_verified)
    .bind(u.quiz_completed)
    .bind(&u.external_id)
    .bind(&u.avatar_url)
    .bind(u.auth_provider.as_str())
    .bind(u.is_admin)
    .bind(u.created_at)
    .fetch_one(&mut **tx)
    .await?;
    into_user(row)
}

/// Writes every mutable column except `stoic_points`, which only moves by increment.
async fn write_user(tx: &mut Transaction<'_, Postgres>, u: &User) -> Result<User, sqlx::Error> {
    let row = sqlx::query_as::<_, UserRow>(
        r#"
        UPDATE users
           SET first_name = $2, last_name = $3, email = $4, password_hash = $5,
               email_verified = $6, quiz_completed = $7, external_id = $8, avatar_url = $9,
               auth_provider = $10, is_admin = $11, updated_at = now()
         WHERE id = $1
        RETURNING id, first_name, last_name, email, password_hash, email_verified, quiz_completed,
                  external_id, avatar_url, auth_provider, is_admin, stoic_points, created_at
        "#,
    )
    .bind(u.id)
    .bind(&u.first_name)
    .bind(&u.last_name)
    .bind(&u.email)
    .bind(&u.password_hash)
    .bind(u.email_verified)
    .bind(u.quiz_completed)
    .bind(&u.external_id)
    .bind(&u.avatar_url)
    .bind(u.auth_provider.as_str())
    .bind(u.is_admin)
    .fetch_one(&mut **tx)
    .await?;
    into_user(row)
}

/// Runs `attempt` and re-runs it once if the first pass hit a unique
/// violation. A second violation is reported as `StorageFailure`.
async fn retry_on_unique_violation<T, F, Fut>(context: &'static str, mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<AppResult<T>, sqlx::Error>>,
{
    match attempt().await {
        Ok(result) => result,
        Err(e) if is_unique_violation(&e) => {
            // a concurrent writer inserted the same email or external id first
            warn!(context, "unique violation; retrying once");
            attempt().await.map_err(storage_error(context))?
        }
        Err(e) => Err(storage_error(context)(e)),
    }
}

impl PgStore {
    /// One pass of the save decision inside a transaction. The outer `Result`
    /// carries driver errors (including unique violations); the inner one
    /// carries domain rejections.
    async fn save_once(&self, candidate: &User) -> Result<AppResult<Saved>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let by_id = fetch_by_id(&mut tx, candidate.id, true).await?;
        let by_external_id = match candidate.external_id.as_deref() {
            Some(ext) => fetch_where(&mut tx, "external_id", ext, true).await?,
            None => None,
        };
        let by_email = fetch_where(&mut tx, "email", &candidate.email, true).await?;

        let plan = match plan_save(
            candidate,
            by_id.as_ref(),
            by_external_id.as_ref(),
            by_email.as_ref(),
        ) {
            Ok(plan) => plan,
            Err(rejected) => return Ok(Err(rejected)),
        };

        let (row, outcome) = plan.resolve(candidate.clone());
        let user = match outcome {
            SaveOutcome::Created => insert_user(&mut tx, &row).await?,
            _ => write_user(&mut tx, &row).await?,
        };
        tx.commit().await?;

        debug!(user_id = %user.id, ?outcome, "user saved");
        Ok(Ok(Saved { user, outcome }))
    }

    async fn update_once(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let Some(mut user) = fetch_by_id(&mut tx, id, true).await? else {
            return Ok(None);
        };
        patch.apply(&mut user);
        let user = write_user(&mut tx, &user).await?;
        tx.commit().await?;
        Ok(Some(user))
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        self.bounded("find user by id", async {
            let mut conn = self.pool.acquire().await.map_err(storage_error("acquire connection"))?;
            fetch_by_id(&mut conn, id, false)
                .await
                .map_err(storage_error("find user by id"))
        })
        .await
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.bounded("find user by email", async {
            let mut conn = self.pool.acquire().await.map_err(storage_error("acquire connection"))?;
            fetch_where(&mut conn, "email", email, false)
                .await
                .map_err(storage_error("find user by email"))
        })
        .await
    }

    async fn find_by_external_id(&self, external_id: &str) -> AppResult<Option<User>> {
        self.bounded("find user by external id", async {
            let mut conn = self.pool.acquire().await.map_err(storage_error("acquire connection"))?;
            fetch_where(&mut conn, "external_id", external_id, false)
                .await
                .map_err(storage_error("find user by external id"))
        })
        .await
    }

    async fn save(&self, user: User) -> AppResult<Saved> {
        let candidate = &user;
        self.bounded(
            "save user",
            retry_on_unique_violation("save user", move || self.save_once(candidate)),
        )
        .await
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> AppResult<Option<User>> {
        self.bounded("update user", async {
            match self.update_once(id, patch).await {
                Ok(user) => Ok(user),
                // the patch attached an external id that another row already holds
                Err(e) if is_unique_violation(&e) => Err(AppError::EmailAlreadyRegistered),
                Err(e) => Err(storage_error("update user")(e)),
            }
        })
        .await
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        self.bounded("delete user", async {
            let res = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(storage_error("delete user"))?;
            Ok(res.rows_affected() > 0)
        })
        .await
    }

    async fn exists_by_email(&self, email: &str) -> AppResult<bool> {
        self.bounded("user exists by email", async {
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error("user exists by email"))
        })
        .await
    }

    async fn list_page(&self, page: i64, page_size: i64) -> AppResult<Page<User>> {
        self.bounded("list users", async {
            let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error("count users"))?;

            let sql = format!("{SELECT_USER} ORDER BY created_at DESC LIMIT $1 OFFSET $2");
            let rows = sqlx::query_as::<_, UserRow>(&sql)
                .bind(page_size)
                .bind(page_offset(page, page_size))
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error("list users"))?;

            let items = rows
                .into_iter()
                .map(into_user)
                .collect::<Result<Vec<_>, _>>()
                .map_err(storage_error("decode users"))?;
            Ok(Page { items, total })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        borrow::Cow,
        error::Error as StdError,
        fmt,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use sqlx::error::{DatabaseError, ErrorKind};

    use super::*;

    #[derive(Debug)]
    struct FakeDbError(ErrorKind);

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message())
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            match self.0 {
                ErrorKind::UniqueViolation => "duplicate key value violates unique constraint",
                _ => "connection reset",
            }
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            match self.0 {
                ErrorKind::UniqueViolation => Some(Cow::Borrowed("23505")),
                _ => None,
            }
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                ErrorKind::UniqueViolation => ErrorKind::UniqueViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn unique_violation() -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError(ErrorKind::UniqueViolation)))
    }

    fn other_db_error() -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError(ErrorKind::Other)))
    }

    #[tokio::test]
    async fn second_pass_runs_after_a_unique_violation() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result = retry_on_unique_violation("save user", move || async move {
            match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(unique_violation()),
                _ => Ok(Ok(7)),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn two_unique_violations_become_storage_failure() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_on_unique_violation("save user", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(unique_violation())
        })
        .await;
        assert!(matches!(result, Err(AppError::StorageFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_and_rejections_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_on_unique_violation("save user", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(other_db_error())
        })
        .await;
        assert!(matches!(result, Err(AppError::StorageFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let result: AppResult<()> = retry_on_unique_violation("save user", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Err(AppError::EmailAlreadyRegistered))
        })
        .await;
        assert!(matches!(result, Err(AppError::EmailAlreadyRegistered)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
