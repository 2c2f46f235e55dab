use std::{sync::Arc, time::Duration};

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error};

use super::claims::{SessionClaims, SessionIdentity, TokenKind};
use crate::{
    config::JwtConfig,
    error::{AppError, AppResult},
    state::AppState,
};

/// Lifetime of the link token handed out at registration.
pub const VERIFICATION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct KeyMaterial {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

/// Signing and verification keys, built once at startup and shared.
#[derive(Clone)]
pub struct JwtKeys {
    inner: Arc<KeyMaterial>,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            inner: Arc::new(KeyMaterial {
                encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
                decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
                issuer: cfg.issuer.clone(),
                audience: cfg.audience.clone(),
                ttl: Duration::from_secs((cfg.ttl_minutes.max(1) as u64) * 60),
            }),
        }
    }

    pub fn issue(&self, identity: &SessionIdentity) -> AppResult<String> {
        self.sign(identity, TokenKind::Session, self.inner.ttl)
    }

    pub fn issue_email_verification(&self, identity: &SessionIdentity) -> AppResult<String> {
        self.sign(identity, TokenKind::EmailVerification, VERIFICATION_TTL)
    }

    /// Accepts session tokens only.
    pub fn verify(&self, token: &str) -> AppResult<SessionClaims> {
        self.decode_kind(token, TokenKind::Session)
    }

    pub fn verify_email_verification(&self, token: &str) -> AppResult<SessionClaims> {
        self.decode_kind(token, TokenKind::EmailVerification)
    }

    fn sign(&self, identity: &SessionIdentity, kind: TokenKind, ttl: Duration) -> AppResult<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = SessionClaims {
            sub: identity.user_id,
            email: identity.email.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.inner.issuer.clone(),
            aud: self.inner.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.inner.encoding).map_err(|e| {
            error!(error = %e, "jwt encode failed");
            AppError::Internal("jwt encode".into())
        })?;
        debug!(user_id = %identity.user_id, ?kind, "jwt signed");
        Ok(token)
    }

    /// Signature, expiry, issuer, audience and kind failures all collapse
    /// into `TokenInvalid`.
    fn decode_kind(&self, token: &str, expected: TokenKind) -> AppResult<SessionClaims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.inner.audience));
        validation.set_issuer(std::slice::from_ref(&self.inner.issuer));
        let data = decode::<SessionClaims>(token, &self.inner.decoding, &validation).map_err(|e| {
            debug!(error = %e, "jwt rejected");
            AppError::TokenInvalid
        })?;
        if data.claims.kind != expected {
            debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt of wrong kind");
            return Err(AppError::TokenInvalid);
        }
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}
