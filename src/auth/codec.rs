/// Token Codec
///
/// Signs and verifies the two token kinds. Each kind has its own HS256
/// secret, so a leaked access key cannot mint refresh tokens and the other
/// way around. Verification never errors: every failure collapses to `None`.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::AppError;

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime: Duration,
}

impl KeyPair {
    fn new(secret: &str, lifetime_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime: Duration::seconds(lifetime_secs),
        }
    }
}

pub struct TokenCodec {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
}

impl TokenCodec {
    pub fn new(config: &JwtSettings, issuer: impl Into<String>) -> Self {
        Self {
            access: KeyPair::new(&config.access_secret, config.access_token_expiry),
            refresh: KeyPair::new(&config.refresh_secret, config.refresh_token_expiry),
            issuer: issuer.into(),
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    pub fn lifetime(&self, kind: TokenKind) -> Duration {
        self.keys(kind).lifetime
    }

    pub fn issue(&self, kind: TokenKind, user_id: Uuid, email: &str) -> Result<String, AppError> {
        self.issue_at(kind, user_id, email, Utc::now())
    }

    pub fn issue_at(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let keys = self.keys(kind);
        let claims = Claims::new(kind, user_id, email, &self.issuer, now, keys.lifetime);

        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    pub fn verify(&self, kind: TokenKind, token: &str) -> Option<Claims> {
        self.verify_at(kind, token, Utc::now())
    }

    /// Rejects malformed tokens, bad signatures, wrong issuer, wrong kind and
    /// tokens whose `exp` is not after `now`.
    pub fn verify_at(&self, kind: TokenKind, token: &str, now: DateTime<Utc>) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        // expiry is checked against `now` below
        validation.validate_exp = false;

        let claims = match decode::<Claims>(token, &self.keys(kind).decoding, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                tracing::debug!(kind = kind.as_str(), reason = %e, "Token rejected");
                return None;
            }
        };

        if claims.kind != kind {
            tracing::debug!(kind = kind.as_str(), "Token rejected: kind mismatch");
            return None;
        }
        if claims.is_expired_at(now) {
            tracing::debug!(kind = kind.as_str(), "Token rejected: expired");
            return None;
        }
        claims.user_id()?;

        Some(claims)
    }
}
