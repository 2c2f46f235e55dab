use async_trait::async_trait;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    db::PgStore,
    error::{storage_error, AppResult},
};

/// How long an emailed code stays valid.
pub const CODE_TTL: Duration = Duration::minutes(15);

pub fn is_valid_code_format(code: &str) -> bool {
    lazy_static! {
        static ref CODE_RE: Regex = Regex::new(r"^[0-9]{6}$").unwrap();
    }
    CODE_RE.is_match(code)
}

pub fn generate_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

/// Six-digit email verification codes.
#[async_trait]
pub trait VerificationCodeStore: Send + Sync {
    /// Stores a fresh code for `user_id` and returns it.
    async fn create_code(&self, user_id: Uuid) -> AppResult<String>;

    /// Id of an unused, unexpired code matching `code`.
    async fn find_valid_code(&self, user_id: Uuid, code: &str) -> AppResult<Option<Uuid>>;

    async fn mark_used(&self, code_id: Uuid) -> AppResult<()>;
}

#[async_trait]
impl VerificationCodeStore for PgStore {
    async fn create_code(&self, user_id: Uuid) -> AppResult<String> {
        let code = generate_code();
        self.bounded("create verification code", async {
            sqlx::query(
                r#"
                INSERT INTO verification_codes (id, user_id, code, expires_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&code)
            .bind(OffsetDateTime::now_utc() + CODE_TTL)
            .execute(&self.pool)
            .await
            .map_err(storage_error("create verification code"))?;
            Ok(code.clone())
        })
        .await
    }

    async fn find_valid_code(&self, user_id: Uuid, code: &str) -> AppResult<Option<Uuid>> {
        self.bounded("find verification code", async {
            sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT id
                  FROM verification_codes
                 WHERE user_id = $1 AND code = $2
                   AND used_at IS NULL AND expires_at > now()
                 ORDER BY expires_at DESC
                 LIMIT 1
                "#,
            )
            .bind(user_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("find verification code"))
        })
        .await
    }

    async fn mark_used(&self, code_id: Uuid) -> AppResult<()> {
        self.bounded("mark verification code used", async {
            sqlx::query("UPDATE verification_codes SET used_at = now() WHERE id = $1")
                .bind(code_id)
                .execute(&self.pool)
                .await
                .map_err(storage_error("mark verification code used"))?;
            Ok(())
        })
        .await
    }
}
