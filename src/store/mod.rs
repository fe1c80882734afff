/// Storage Adapters
///
/// Narrow interfaces over the relational store. The auth core only needs
/// row-level uniqueness, atomic upsert and conditional delete; everything
/// else is business-record plumbing.
///
/// Two implementations are provided:
/// - [`PgStore`]: Postgres through `sqlx`, upserts via `ON CONFLICT`
/// - [`MemoryStore`]: process-local maps, used by tests and local runs

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// User credential record. `email` is always stored normalized.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: String,
}

/// At most one row per user; rotation overwrites it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LoginAttemptRecord {
    pub email: String,
    pub attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub initial_capital: Option<i64>,
    pub monthly_revenue: Option<i64>,
    pub monthly_expenses: Option<i64>,
    pub employee_count: Option<i32>,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field values for a business record; `None` on update leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct BusinessFields {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub initial_capital: Option<i64>,
    pub monthly_revenue: Option<i64>,
    pub monthly_expenses: Option<i64>,
    pub employee_count: Option<i32>,
    pub location: Option<String>,
}

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Insert-or-replace keyed by `user_id`.
    async fn upsert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Idempotent.
    async fn delete_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError>;

    /// Deletes the user's row only if it holds `token_hash` and has not expired at `now`.
    /// Returns whether a row was removed.
    async fn delete_refresh_token_if_current(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn find_login_attempt(&self, email: &str) -> Result<Option<LoginAttemptRecord>, StoreError>;

    /// Atomically adds one failure (creating the row at 1) and returns the updated row.
    async fn increment_login_attempts(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginAttemptRecord, StoreError>;

    async fn lock_login_attempts(&self, email: &str, until: DateTime<Utc>) -> Result<(), StoreError>;

    async fn delete_login_attempts(&self, email: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BusinessStore: Send + Sync + 'static {
    /// Newest first. Returns the page and the owner's total count.
    async fn list_businesses(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BusinessRecord>, i64), StoreError>;

    async fn insert_business(
        &self,
        user_id: Uuid,
        fields: BusinessFields,
    ) -> Result<BusinessRecord, StoreError>;

    async fn find_business(&self, id: Uuid) -> Result<Option<BusinessRecord>, StoreError>;

    async fn update_business(
        &self,
        id: Uuid,
        fields: BusinessFields,
    ) -> Result<Option<BusinessRecord>, StoreError>;

    async fn delete_business(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Store handles injected into the application at startup
#[derive(Clone)]
pub struct Stores {
    pub credentials: Arc<dyn CredentialStore>,
    pub businesses: Arc<dyn BusinessStore>,
}

impl Stores {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            credentials: store.clone(),
            businesses: store,
        }
    }

    pub fn in_memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            credentials: store.clone(),
            businesses: store,
        }
    }
}

/// Emails compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
