use config::ConfigError;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub security: SecuritySettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    /// Application name, also pinned as the token issuer
    pub name: String,
    /// Marks cookies `Secure`
    pub production: bool,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    pub max_connections: u32,
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// JWT signing settings. Access and refresh tokens use independent secrets.
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_token_expiry: i64,   // seconds (900 = 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (604800 = 7 days)
}

impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("access_secret", &"[redacted]")
            .field("refresh_secret", &"[redacted]")
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .finish()
    }
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct SecuritySettings {
    pub bcrypt_cost: u32,
    pub max_login_attempts: u32,
    pub lockout_duration_secs: i64,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct RateLimitSettings {
    pub window_ms: u64,
    /// Maximum number of tracked (class, client) keys
    pub capacity: u64,
    pub default_limit: u32,
    pub auth_limit: u32,
    pub chat_limit: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_ms: 60_000,
            capacity: 10_000,
            default_limit: 60,
            auth_limit: 5,
            chat_limit: 25,
        }
    }
}

impl Settings {
    /// Reject settings the auth core cannot run safely with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let jwt = &self.jwt;
        if jwt.access_secret.len() < MIN_SECRET_LENGTH || jwt.refresh_secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "jwt secrets must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }
        if jwt.access_secret == jwt.refresh_secret {
            return Err(ConfigError::Message(
                "jwt access and refresh secrets must differ".to_string(),
            ));
        }
        if jwt.access_token_expiry <= 0 || jwt.refresh_token_expiry <= 0 {
            return Err(ConfigError::Message("token lifetimes must be positive".to_string()));
        }
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::Message(format!(
                "bcrypt cost must be within {}..={}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }
        if self.security.max_login_attempts == 0 {
            return Err(ConfigError::Message("max_login_attempts must be at least 1".to_string()));
        }
        if self.rate_limit.window_ms == 0 || self.rate_limit.capacity == 0 {
            return Err(ConfigError::Message("rate limit window and capacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// Load settings: defaults, then `configuration.yaml`, then `APP_*` environment variables
/// (`APP_JWT__ACCESS_SECRET=...`).
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let settings = config::Config::builder()
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8080)?
        .set_default("application.name", "UMKM Consultant AI")?
        .set_default("application.production", false)?
        .set_default("database.username", "postgres")?
        .set_default("database.password", "password")?
        .set_default("database.host", "localhost")?
        .set_default("database.port", 5432)?
        .set_default("database.database_name", "umkm_consultant")?
        .set_default("database.max_connections", 5)?
        .set_default("jwt.access_secret", "")?
        .set_default("jwt.refresh_secret", "")?
        .set_default("jwt.access_token_expiry", 900)?
        .set_default("jwt.refresh_token_expiry", 604_800)?
        .set_default("security.bcrypt_cost", 13)?
        .set_default("security.max_login_attempts", 5)?
        .set_default("security.lockout_duration_secs", 900)?
        .set_default("rate_limit.window_ms", 60_000)?
        .set_default("rate_limit.capacity", 10_000)?
        .set_default("rate_limit.default_limit", 60)?
        .set_default("rate_limit.auth_limit", 5)?
        .set_default("rate_limit.chat_limit", 25)?
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
