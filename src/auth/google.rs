use async_trait::async_trait;
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::error::{AppError, AppResult};

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Identity asserted by an external provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProfile {
    pub provider_user_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait OAuthProviderClient: Send + Sync {
    /// Validates a provider-issued ID token and returns the profile it carries.
    async fn fetch_profile(&self, id_token: &str) -> AppResult<OAuthProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    sub: String,
    email: Option<String>,
    // tokeninfo encodes booleans and numbers as strings
    email_verified: Option<String>,
    exp: String,
    name: Option<String>,
    picture: Option<String>,
}

impl TokenInfo {
    fn into_profile(self, client_id: &str, now: i64) -> AppResult<OAuthProfile> {
        if self.aud != client_id {
            warn!(aud = %self.aud, "google token audience mismatch");
            return Err(AppError::TokenInvalid);
        }
        let exp: i64 = self.exp.parse().map_err(|_| AppError::TokenInvalid)?;
        if now > exp {
            return Err(AppError::TokenInvalid);
        }
        if self.email_verified.as_deref() != Some("true") {
            warn!(sub = %self.sub, "google email not verified");
            return Err(AppError::TokenInvalid);
        }
        let email = self.email.ok_or(AppError::TokenInvalid)?;
        Ok(OAuthProfile {
            provider_user_id: self.sub,
            email,
            display_name: self.name,
            avatar_url: self.picture,
        })
    }
}

/// Verifies Google ID tokens against the public tokeninfo endpoint.
pub struct GoogleTokenInfoClient {
    http: reqwest::Client,
    client_id: String,
    endpoint: String,
}

impl GoogleTokenInfoClient {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            endpoint: TOKENINFO_URL.to_string(),
        }
    }
}

#[async_trait]
impl OAuthProviderClient for GoogleTokenInfoClient {
    async fn fetch_profile(&self, id_token: &str) -> AppResult<OAuthProfile> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "google tokeninfo request failed");
                AppError::Upstream("google tokeninfo request".into())
            })?;

        if response.status().is_client_error() {
            debug!(status = %response.status(), "google rejected id token");
            return Err(AppError::TokenInvalid);
        }
        if !response.status().is_success() {
            error!(status = %response.status(), "google tokeninfo unavailable");
            return Err(AppError::Upstream("google tokeninfo status".into()));
        }

        let info: TokenInfo = response.json().await.map_err(|e| {
            error!(error = %e, "google tokeninfo body unreadable");
            AppError::Upstream("google tokeninfo body".into())
        })?;
        info.into_profile(&self.client_id, OffsetDateTime::now_utc().unix_timestamp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(aud: &str, exp: i64, verified: &str) -> TokenInfo {
        TokenInfo {
            aud: aud.into(),
            sub: "10769150350006150715113082367".into(),
            email: Some("cato@example.com".into()),
            email_verified: Some(verified.into()),
            exp: exp.to_string(),
            name: Some("Cato Uticensis".into()),
            picture: None,
        }
    }

    #[test]
    fn accepts_matching_unexpired_token() {
        let profile = info("client-1", 2_000, "true").into_profile("client-1", 1_000).unwrap();
        assert_eq!(profile.email, "cato@example.com");
        assert_eq!(profile.display_name.as_deref(), Some("Cato Uticensis"));
    }

    #[test]
    fn rejects_foreign_audience() {
        let err = info("client-2", 2_000, "true").into_profile("client-1", 1_000);
        assert!(matches!(err, Err(AppError::TokenInvalid)));
    }

    #[test]
    fn rejects_expired_token() {
        let err = info("client-1", 999, "true").into_profile("client-1", 1_000);
        assert!(matches!(err, Err(AppError::TokenInvalid)));
    }

    #[test]
    fn rejects_unverified_email() {
        let err = info("client-1", 2_000, "false").into_profile("client-1", 1_000);
        assert!(matches!(err, Err(AppError::TokenInvalid)));
    }
}
