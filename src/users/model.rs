use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Local,
    Google,
}

impl AuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Google => "google",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown auth provider `{}`", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for AuthProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "google" => Ok(Self::Google),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Identity record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // argon2 PHC string, absent for OAuth-only accounts
    pub email_verified: bool,
    pub quiz_completed: bool,
    pub external_id: Option<String>,
    pub avatar_url: Option<String>,
    pub auth_provider: AuthProvider,
    pub is_admin: bool,
    pub stoic_points: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Unverified account created through email/password registration.
    pub fn new_local(first_name: &str, last_name: &str, email: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: email.trim().to_lowercase(),
            password_hash: Some(password_hash),
            email_verified: false,
            quiz_completed: false,
            external_id: None,
            avatar_url: None,
            auth_provider: AuthProvider::Local,
            is_admin: false,
            stoic_points: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Account created on the first login through an OAuth provider.
    pub fn new_google(
        first_name: String,
        last_name: String,
        email: &str,
        external_id: &str,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            first_name,
            last_name,
            email: email.trim().to_lowercase(),
            password_hash: None,
            email_verified: true,
            quiz_completed: false,
            external_id: Some(external_id.to_string()),
            avatar_url,
            auth_provider: AuthProvider::Google,
            is_admin: false,
            stoic_points: 0,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Row shape in the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub quiz_completed: bool,
    pub external_id: Option<String>,
    pub avatar_url: Option<String>,
    pub auth_provider: String,
    pub is_admin: bool,
    pub stoic_points: i64,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = UnknownProvider;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            password_hash: r.password_hash,
            email_verified: r.email_verified,
            quiz_completed: r.quiz_completed,
            external_id: r.external_id,
            avatar_url: r.avatar_url,
            auth_provider: r.auth_provider.parse()?,
            is_admin: r.is_admin,
            stoic_points: r.stoic_points,
            created_at: r.created_at,
        })
    }
}

/// Partial update. `Some(None)` on a nullable column clears it.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password_hash: Option<Option<String>>,
    pub email_verified: Option<bool>,
    pub quiz_completed: Option<bool>,
    pub external_id: Option<String>,
    pub avatar_url: Option<Option<String>>,
    pub auth_provider: Option<AuthProvider>,
}

impl UserPatch {
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.first_name {
            user.first_name = v;
        }
        if let Some(v) = self.last_name {
            user.last_name = v;
        }
        if let Some(v) = self.password_hash {
            user.password_hash = v;
        }
        if let Some(v) = self.email_verified {
            user.email_verified = v;
        }
        if let Some(v) = self.quiz_completed {
            user.quiz_completed = v;
        }
        if let Some(v) = self.external_id {
            user.external_id = Some(v);
        }
        if let Some(v) = self.avatar_url {
            user.avatar_url = v;
        }
        if let Some(v) = self.auth_provider {
            user.auth_provider = v;
        }
    }
}
