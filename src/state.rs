use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    auth::{
        google::{GoogleTokenInfoClient, OAuthProviderClient},
        jwt::JwtKeys,
    },
    challenges::model::ChallengeStore,
    config::AppConfig,
    db::PgStore,
    memory::MemoryStore,
    subscriptions::SubscriptionProvider,
    users::directory::UserDirectory,
    verification::VerificationCodeStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub jwt: JwtKeys,
    pub users: Arc<dyn UserDirectory>,
    pub challenges: Arc<dyn ChallengeStore>,
    pub codes: Arc<dyn VerificationCodeStore>,
    pub subscriptions: Arc<dyn SubscriptionProvider>,
    /// `None` when no Google client id is configured.
    pub oauth: Option<Arc<dyn OAuthProviderClient>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = PgStore::connect(&config).await?;

        if let Err(e) = store.migrate().await {
            warn!(error = %e, "migrations folder not found or migration failed; continuing");
        }

        let oauth = match config.google_client_id.as_deref() {
            Some(client_id) => {
                Some(Arc::new(GoogleTokenInfoClient::new(client_id)) as Arc<dyn OAuthProviderClient>)
            }
            None => {
                info!("GOOGLE_CLIENT_ID not set; google login disabled");
                None
            }
        };

        let store = Arc::new(store);
        Ok(Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config,
            users: store.clone(),
            challenges: store.clone(),
            codes: store.clone(),
            subscriptions: store,
            oauth,
        })
    }

    /// State backed by a `MemoryStore`, with test configuration.
    pub fn in_memory(store: Arc<MemoryStore>, oauth: Option<Arc<dyn OAuthProviderClient>>) -> Self {
        let config = Arc::new(AppConfig::for_tests());
        Self {
            jwt: JwtKeys::from_config(&config.jwt),
            config,
            users: store.clone(),
            challenges: store.clone(),
            codes: store.clone(),
            subscriptions: store,
            oauth,
        }
    }
}
