use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    normalize_email, BusinessFields, BusinessRecord, BusinessStore, CredentialStore,
    LoginAttemptRecord, NewUser, RefreshTokenRecord, UserRecord,
};
use crate::error::StoreError;

/// In-process store with the same uniqueness and upsert semantics as the
/// Postgres schema. Each map sits behind its own lock; a write holds the lock
/// for the whole read-modify-write so increments and conditional deletes are atomic.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, UserRecord>>,
    refresh_tokens: RwLock<HashMap<Uuid, RefreshTokenRecord>>,
    login_attempts: RwLock<HashMap<String, LoginAttemptRecord>>,
    businesses: RwLock<HashMap<Uuid, BusinessRecord>>,
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let email = normalize_email(email);
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let email = normalize_email(&user.email);
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            email,
            name: user.name,
            password_hash: user.password_hash,
            created_at: Utc::now(),
            last_login: None,
        };
        users.insert(record.id, record.clone());
        Ok(record)
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        if let Some(user) = self.users.write().await.get_mut(&id) {
            user.last_login = Some(at);
        }
        Ok(())
    }

    async fn upsert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        self.refresh_tokens
            .write()
            .await
            .insert(record.user_id, record);
        Ok(())
    }

    async fn find_refresh_token(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.refresh_tokens.read().await.get(&user_id).cloned())
    }

    async fn delete_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError> {
        self.refresh_tokens.write().await.remove(&user_id);
        Ok(())
    }

    async fn delete_refresh_token_if_current(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tokens = self.refresh_tokens.write().await;
        let current = tokens
            .get(&user_id)
            .map(|row| row.token_hash == token_hash && row.expires_at > now)
            .unwrap_or(false);
        if current {
            tokens.remove(&user_id);
        }
        Ok(current)
    }

    async fn find_login_attempt(&self, email: &str) -> Result<Option<LoginAttemptRecord>, StoreError> {
        let email = normalize_email(email);
        Ok(self.login_attempts.read().await.get(&email).cloned())
    }

    async fn increment_login_attempts(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginAttemptRecord, StoreError> {
        let email = normalize_email(email);
        let mut attempts = self.login_attempts.write().await;
        let row = attempts
            .entry(email.clone())
            .or_insert_with(|| LoginAttemptRecord {
                email,
                attempts: 0,
                locked_until: None,
                updated_at: now,
            });
        row.attempts += 1;
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn lock_login_attempts(&self, email: &str, until: DateTime<Utc>) -> Result<(), StoreError> {
        let email = normalize_email(email);
        if let Some(row) = self.login_attempts.write().await.get_mut(&email) {
            row.locked_until = Some(until);
        }
        Ok(())
    }

    async fn delete_login_attempts(&self, email: &str) -> Result<(), StoreError> {
        let email = normalize_email(email);
        self.login_attempts.write().await.remove(&email);
        Ok(())
    }
}

#[async_trait]
impl BusinessStore for MemoryStore {
    async fn list_businesses(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BusinessRecord>, i64), StoreError> {
        let businesses = self.businesses.read().await;
        let mut owned: Vec<BusinessRecord> = businesses
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_business(
        &self,
        user_id: Uuid,
        fields: BusinessFields,
    ) -> Result<BusinessRecord, StoreError> {
        let now = Utc::now();
        let record = BusinessRecord {
            id: Uuid::new_v4(),
            user_id,
            name: fields.name.unwrap_or_default(),
            category: fields.category.unwrap_or_default(),
            description: fields.description,
            initial_capital: fields.initial_capital,
            monthly_revenue: fields.monthly_revenue,
            monthly_expenses: fields.monthly_expenses,
            employee_count: fields.employee_count,
            location: fields.location,
            created_at: now,
            updated_at: now,
        };
        self.businesses
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_business(&self, id: Uuid) -> Result<Option<BusinessRecord>, StoreError> {
        Ok(self.businesses.read().await.get(&id).cloned())
    }

    async fn update_business(
        &self,
        id: Uuid,
        fields: BusinessFields,
    ) -> Result<Option<BusinessRecord>, StoreError> {
        let mut businesses = self.businesses.write().await;
        let Some(record) = businesses.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = fields.name {
            record.name = name;
        }
        if let Some(category) = fields.category {
            record.category = category;
        }
        if fields.description.is_some() {
            record.description = fields.description;
        }
        if fields.initial_capital.is_some() {
            record.initial_capital = fields.initial_capital;
        }
        if fields.monthly_revenue.is_some() {
            record.monthly_revenue = fields.monthly_revenue;
        }
        if fields.monthly_expenses.is_some() {
            record.monthly_expenses = fields.monthly_expenses;
        }
        if fields.employee_count.is_some() {
            record.employee_count = fields.employee_count;
        }
        if fields.location.is_some() {
            record.location = fields.location;
        }
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn delete_business(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.businesses.write().await.remove(&id).is_some())
    }
}
