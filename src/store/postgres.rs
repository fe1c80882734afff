use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    normalize_email, BusinessFields, BusinessRecord, BusinessStore, CredentialStore,
    LoginAttemptRecord, NewUser, RefreshTokenRecord, UserRecord,
};
use crate::error::StoreError;

/// Postgres-backed store. Schema lives in `migrations/`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, name, password_hash, created_at, last_login";
const BUSINESS_COLUMNS: &str = "id, user_id, name, category, description, initial_capital, \
     monthly_revenue, monthly_expenses, employee_count, location, created_at, updated_at";

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let record = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (id, email, name, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(normalize_email(&user.email))
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_refresh_token(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (user_id, token_hash, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET token_hash = EXCLUDED.token_hash,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT user_id, token_hash, expires_at, created_at FROM refresh_tokens WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete_refresh_token(&self, user_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_refresh_token_if_current(
        &self,
        user_id: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND token_hash = $2 AND expires_at > $3
            "#,
        )
        .bind(user_id)
        .bind(token_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_login_attempt(&self, email: &str) -> Result<Option<LoginAttemptRecord>, StoreError> {
        let row = sqlx::query_as::<_, LoginAttemptRecord>(
            "SELECT email, attempts, locked_until, updated_at FROM login_attempts WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn increment_login_attempts(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginAttemptRecord, StoreError> {
        let row = sqlx::query_as::<_, LoginAttemptRecord>(
            r#"
            INSERT INTO login_attempts (email, attempts, locked_until, updated_at)
            VALUES ($1, 1, NULL, $2)
            ON CONFLICT (email) DO UPDATE
            SET attempts = login_attempts.attempts + 1,
                updated_at = EXCLUDED.updated_at
            RETURNING email, attempts, locked_until, updated_at
            "#,
        )
        .bind(normalize_email(email))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn lock_login_attempts(&self, email: &str, until: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE login_attempts SET locked_until = $1 WHERE email = $2")
            .bind(until)
            .bind(normalize_email(email))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_login_attempts(&self, email: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM login_attempts WHERE email = $1")
            .bind(normalize_email(email))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl BusinessStore for PgStore {
    async fn list_businesses(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<BusinessRecord>, i64), StoreError> {
        let rows = sqlx::query_as::<_, BusinessRecord>(&format!(
            r#"
            SELECT {} FROM businesses
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            BUSINESS_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM businesses WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok((rows, total))
    }

    async fn insert_business(
        &self,
        user_id: Uuid,
        fields: BusinessFields,
    ) -> Result<BusinessRecord, StoreError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, BusinessRecord>(&format!(
            r#"
            INSERT INTO businesses (id, user_id, name, category, description, initial_capital,
                monthly_revenue, monthly_expenses, employee_count, location, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            RETURNING {}
            "#,
            BUSINESS_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(fields.name.unwrap_or_default())
        .bind(fields.category.unwrap_or_default())
        .bind(fields.description)
        .bind(fields.initial_capital)
        .bind(fields.monthly_revenue)
        .bind(fields.monthly_expenses)
        .bind(fields.employee_count)
        .bind(fields.location)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_business(&self, id: Uuid) -> Result<Option<BusinessRecord>, StoreError> {
        let record = sqlx::query_as::<_, BusinessRecord>(&format!(
            "SELECT {} FROM businesses WHERE id = $1",
            BUSINESS_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_business(
        &self,
        id: Uuid,
        fields: BusinessFields,
    ) -> Result<Option<BusinessRecord>, StoreError> {
        let record = sqlx::query_as::<_, BusinessRecord>(&format!(
            r#"
            UPDATE businesses SET
                name = COALESCE($2, name),
                category = COALESCE($3, category),
                description = COALESCE($4, description),
                initial_capital = COALESCE($5, initial_capital),
                monthly_revenue = COALESCE($6, monthly_revenue),
                monthly_expenses = COALESCE($7, monthly_expenses),
                employee_count = COALESCE($8, employee_count),
                location = COALESCE($9, location),
                updated_at = $10
            WHERE id = $1
            RETURNING {}
            "#,
            BUSINESS_COLUMNS
        ))
        .bind(id)
        .bind(fields.name)
        .bind(fields.category)
        .bind(fields.description)
        .bind(fields.initial_capital)
        .bind(fields.monthly_revenue)
        .bind(fields.monthly_expenses)
        .bind(fields.employee_count)
        .bind(fields.location)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn delete_business(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM businesses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
