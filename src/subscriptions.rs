use async_trait::async_trait;
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    db::PgStore,
    error::{storage_error, AppResult},
};

/// Read-only view of the billing state attached to a login response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub has_active_subscription: bool,
    pub status: String,
    pub plan_name: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<OffsetDateTime>,
    pub on_trial: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_end: Option<OffsetDateTime>,
}

impl SubscriptionSummary {
    pub fn inactive() -> Self {
        Self {
            has_active_subscription: false,
            status: "inactive".into(),
            plan_name: None,
            current_period_end: None,
            on_trial: false,
            trial_end: None,
        }
    }
}

#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn summary(&self, user_id: Uuid) -> AppResult<SubscriptionSummary>;
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    status: String,
    plan_name: Option<String>,
    current_period_end: Option<OffsetDateTime>,
    trial_end: Option<OffsetDateTime>,
}

impl From<SubscriptionRow> for SubscriptionSummary {
    fn from(r: SubscriptionRow) -> Self {
        let now = OffsetDateTime::now_utc();
        let on_trial = r.status == "trial" && r.trial_end.is_some_and(|end| end > now);
        Self {
            has_active_subscription: true,
            status: r.status,
            plan_name: r.plan_name,
            current_period_end: r.current_period_end,
            on_trial,
            trial_end: r.trial_end,
        }
    }
}

#[async_trait]
impl SubscriptionProvider for PgStore {
    async fn summary(&self, user_id: Uuid) -> AppResult<SubscriptionSummary> {
        self.bounded("subscription summary", async {
            let row = sqlx::query_as::<_, SubscriptionRow>(
                r#"
                SELECT status, plan_name, current_period_end, trial_end
                  FROM subscriptions
                 WHERE user_id = $1
                   AND status IN ('active', 'trial')
                   AND (ends_at IS NULL OR ends_at > now())
                 ORDER BY created_at DESC
                 LIMIT 1
                "#,
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error("subscription summary"))?;

            Ok(row.map(SubscriptionSummary::from).unwrap_or_else(SubscriptionSummary::inactive))
        })
        .await
    }
}
