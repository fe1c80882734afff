/// Refresh Token Registry
///
/// Keeps exactly one refresh-token row per user:
/// - Issuing a pair upserts the row, so a new login replaces prior sessions
/// - Only the SHA-256 hash of the token is stored (never plaintext)
/// - Rotation consumes the current row with a conditional delete, then issues
///   a fresh pair; a token that is not the current row is refused
/// - Logout deletes the row

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::codec::TokenCodec;
use crate::error::AppError;
use crate::store::{CredentialStore, RefreshTokenRecord};

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Hash a refresh token using SHA-256
pub(crate) fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct RefreshTokenRegistry {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
}

impl RefreshTokenRegistry {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    pub async fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<TokenPair, AppError> {
        self.issue_pair_at(user_id, email, Utc::now()).await
    }

    /// Mint an access/refresh pair and upsert the refresh hash for `user_id`.
    pub async fn issue_pair_at(
        &self,
        user_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AppError> {
        let access_token = self.codec.issue_at(TokenKind::Access, user_id, email, now)?;
        let refresh_token = self.codec.issue_at(TokenKind::Refresh, user_id, email, now)?;

        self.store
            .upsert_refresh_token(RefreshTokenRecord {
                user_id,
                token_hash: hash_token(&refresh_token),
                expires_at: now + self.codec.lifetime(TokenKind::Refresh),
                created_at: now,
            })
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Delete the user's row. Revoking an absent row is not an error.
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), AppError> {
        self.store.delete_refresh_token(user_id).await?;
        tracing::info!(user_id = %user_id, "Refresh token revoked");
        Ok(())
    }

    pub async fn rotate(&self, presented: &str) -> Result<Option<(Claims, TokenPair)>, AppError> {
        self.rotate_at(presented, Utc::now()).await
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Returns `Ok(None)` without touching the registry when the token fails
    /// verification or is not the user's current row.
    pub async fn rotate_at(
        &self,
        presented: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(Claims, TokenPair)>, AppError> {
        let Some(claims) = self.codec.verify_at(TokenKind::Refresh, presented, now) else {
            return Ok(None);
        };
        let Some(user_id) = claims.user_id() else {
            return Ok(None);
        };

        let consumed = self
            .store
            .delete_refresh_token_if_current(user_id, &hash_token(presented), now)
            .await?;
        if !consumed {
            tracing::warn!(user_id = %user_id, "Refresh token is not the current session token");
            return Ok(None);
        }

        let pair = self.issue_pair_at(user_id, &claims.email, now).await?;
        tracing::info!(user_id = %user_id, "Refresh token rotated");
        Ok(Some((claims, pair)))
    }
}
