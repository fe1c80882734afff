use actix_web::dev::Server;
use actix_web::{error::InternalError, middleware::Logger, web, App, HttpResponse, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{AuthCookies, LoginAttemptTracker, PasswordHasher, RefreshTokenRegistry, TokenCodec};
use crate::configuration::Settings;
use crate::error::AppError;
use crate::middleware::{RequestGate, RequestLogger};
use crate::response::ApiResponse;
use crate::routes::{
    business_analytics, create_business, csrf_token, delete_business, get_business,
    get_current_user, health_check, list_businesses, login, logout, refresh, register,
    update_business,
};
use crate::security::RateLimiter;
use crate::store::{BusinessStore, CredentialStore, Stores};

/// Everything a handler needs, built once at startup
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub businesses: Arc<dyn BusinessStore>,
    pub codec: Arc<TokenCodec>,
    pub registry: RefreshTokenRegistry,
    pub attempts: LoginAttemptTracker,
    pub hasher: Arc<PasswordHasher>,
    pub cookies: AuthCookies,
}

impl AppState {
    pub fn new(stores: Stores, settings: &Settings) -> Result<Self, AppError> {
        let codec = Arc::new(TokenCodec::new(&settings.jwt, settings.application.name.clone()));
        Ok(Self {
            registry: RefreshTokenRegistry::new(stores.credentials.clone(), codec.clone()),
            attempts: LoginAttemptTracker::from_settings(stores.credentials.clone(), &settings.security),
            hasher: Arc::new(PasswordHasher::new(settings.security.bcrypt_cost)?),
            cookies: AuthCookies::from_settings(settings),
            credentials: stores.credentials,
            businesses: stores.businesses,
            codec,
        })
    }
}

/// Malformed JSON bodies are a 400 in the standard envelope
fn json_error_handler(err: actix_web::error::JsonPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::debug!(error = %err, "Rejected JSON payload");
    let response = HttpResponse::BadRequest().json(ApiResponse::failure("Invalid request body", None));
    InternalError::from_response(err, response).into()
}

pub fn run(listener: TcpListener, stores: Stores, settings: Settings) -> Result<Server, std::io::Error> {
    let state = AppState::new(stores, &settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let codec = state.codec.clone();
    let state = web::Data::new(state);
    // one limiter shared by every worker
    let limiter = Arc::new(RateLimiter::new(&settings.rate_limit));

    let server = HttpServer::new(move || {
        App::new()
            // Last registered wraps outermost, so the loggers see gate rejections
            .wrap(RequestGate::new(limiter.clone(), codec.clone()))
            .wrap(RequestLogger)
            .wrap(Logger::default())

            .app_data(state.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))

            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    .route("/me", web::get().to(get_current_user))
                    .route("/csrf", web::get().to(csrf_token)),
            )
            .service(
                web::scope("/api/business")
                    .route("", web::get().to(list_businesses))
                    .route("", web::post().to(create_business))
                    .route("/{id}", web::get().to(get_business))
                    .route("/{id}", web::put().to(update_business))
                    .route("/{id}", web::delete().to(delete_business)),
            )
            .route("/api/analytics", web::get().to(business_analytics))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
