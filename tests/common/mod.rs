#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use stoicpath::{
    app::build_app,
    auth::google::{OAuthProfile, OAuthProviderClient},
    error::{AppError, AppResult},
    memory::MemoryStore,
    state::AppState,
    users::{directory::UserDirectory, model::User},
};
use tower::ServiceExt;

/// Maps opaque test tokens onto canned profiles.
#[derive(Default)]
pub struct FakeGoogle {
    profiles: HashMap<String, OAuthProfile>,
}

impl FakeGoogle {
    pub fn with(mut self, token: &str, sub: &str, email: &str, name: &str) -> Self {
        self.profiles.insert(
            token.to_string(),
            OAuthProfile {
                provider_user_id: sub.to_string(),
                email: email.to_string(),
                display_name: Some(name.to_string()),
                avatar_url: Some(format!("https://img.example.com/{sub}.png")),
            },
        );
        self
    }
}

#[async_trait]
impl OAuthProviderClient for FakeGoogle {
    async fn fetch_profile(&self, id_token: &str) -> AppResult<OAuthProfile> {
        self.profiles.get(id_token).cloned().ok_or(AppError::TokenInvalid)
    }
}

pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_google(FakeGoogle::default())
    }

    pub fn with_google(google: FakeGoogle) -> Self {
        let store = Arc::new(MemoryStore::new());
        let oauth: Arc<dyn OAuthProviderClient> = Arc::new(google);
        let state = AppState::in_memory(store.clone(), Some(oauth));
        let router = build_app(state.clone());
        Self {
            store,
            state,
            router,
        }
    }

    /// Verified local user with password `correct-horse`.
    pub async fn verified_user(&self, email: &str) -> User {
        let hash = stoicpath::auth::password::hash_password("correct-horse").unwrap();
        let mut user = User::new_local("Lucio", "Anneo", email, hash);
        user.email_verified = true;
        self.store.save(user).await.unwrap().user
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state
            .jwt
            .issue(&stoicpath::auth::claims::SessionIdentity {
                user_id: user.id,
                email: user.email.clone(),
            })
            .unwrap()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        let req = match body {
            Some(json) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        self.dispatch(req).await
    }

    /// Sends a body verbatim, for inputs `send` cannot express.
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        content_type: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type);
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        self.dispatch(req.body(Body::from(body.to_string())).unwrap())
            .await
    }

    async fn dispatch(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
