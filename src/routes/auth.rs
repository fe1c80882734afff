/// Authentication Routes
///
/// Registration, login, token refresh, logout, current user and the CSRF
/// token endpoint. Tokens travel in HttpOnly cookies; the access token is
/// also returned in the body for clients that prefer the header.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{
    csrf_cookie, generate_csrf_token, AuthUser, TokenKind, REFRESH_COOKIE,
};
use crate::error::{AppError, ErrorContext, StoreError};
use crate::response::ApiResponse;
use crate::startup::AppState;
use crate::store::{NewUser, UserRecord};
use crate::validators::{validate_email, validate_name, validate_password, Validator};

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const EMAIL_TAKEN: &str = "Email is already registered";

/// User registration request
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub name: String,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// User information response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub user: UserResponse,
    pub access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Serialize)]
pub struct CurrentUserResponse {
    pub user: UserResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfResponse {
    pub csrf_token: String,
}

/// POST /auth/register
///
/// # Errors
/// - 422: Invalid email, weak password, bad name or mismatched confirmation
/// - 400: Email already registered
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");
    let form = form.into_inner();

    let mut validator = Validator::new();
    let email = validator.check(validate_email(&form.email));
    let name = validator.check(validate_name(&form.name));
    validator.check(validate_password(&form.password));
    if form.confirm_password != form.password {
        validator.push("confirmPassword", "Password confirmation does not match");
    }
    validator.finish()?;
    let (email, name) = (email.unwrap_or_default(), name.unwrap_or_default());

    if state.credentials.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest(EMAIL_TAKEN.to_string()));
    }

    let hasher = state.hasher.clone();
    let password = form.password;
    let password_hash = web::block(move || hasher.hash(&password)).await??;

    let user = match state
        .credentials
        .insert_user(NewUser {
            email,
            name,
            password_hash,
        })
        .await
    {
        Ok(user) => user,
        // lost a race with a concurrent registration
        Err(StoreError::Conflict(_)) => return Err(AppError::BadRequest(EMAIL_TAKEN.to_string())),
        Err(e) => return Err(e.into()),
    };

    let pair = state.registry.issue_pair(user.id, &user.email).await?;

    tracing::info!(
        request_id = %context.request_id,
        operation = context.operation,
        user_id = %user.id,
        "User registered successfully"
    );

    let mut builder = HttpResponse::Created();
    state.cookies.set_pair(&mut builder, &pair);
    Ok(builder.json(
        ApiResponse::success(SessionResponse {
            user: user.into(),
            access_token: pair.access_token,
        })
        .with_message("Registration successful"),
    ))
}

/// POST /auth/login
///
/// # Errors
/// - 422: Malformed email or empty password
/// - 401: Unknown email or wrong password (same message for both)
/// - 429: Too many failed attempts for this email
/// - 500: Internal server error
pub async fn login(
    form: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");
    let form = form.into_inner();

    let mut validator = Validator::new();
    let email = validator.check(validate_email(&form.email));
    if form.password.is_empty() {
        validator.push("password", "Password is required");
    }
    validator.finish()?;
    let email = email.unwrap_or_default();

    let check = state.attempts.check(&email).await?;
    if !check.allowed {
        tracing::warn!(
            request_id = %context.request_id,
            operation = context.operation,
            email = %email,
            max_attempts = state.attempts.max_attempts(),
            "Login refused: account locked"
        );
        return Err(AppError::Locked(format!(
            "Too many failed login attempts. Please try again in {} minutes.",
            state.attempts.lockout().num_minutes()
        )));
    }

    let user = state.credentials.find_user_by_email(&email).await?;

    // unknown emails still pay for one bcrypt comparison
    let hasher = state.hasher.clone();
    let password = form.password;
    let stored_hash = user.as_ref().map(|u| u.password_hash.clone());
    let password_valid = web::block(move || match stored_hash {
        Some(hash) => hasher.verify(&password, &hash),
        None => Ok(hasher.verify_dummy(&password)),
    })
    .await??;

    let user = match user {
        Some(user) if password_valid => user,
        _ => {
            state.attempts.record_failure(&email).await?;
            let remaining = check.remaining_attempts.saturating_sub(1);
            tracing::info!(
                request_id = %context.request_id,
                operation = context.operation,
                email = %email,
                remaining = remaining,
                "Login failed"
            );
            return Err(AppError::unauthorized(format!(
                "{}. {} attempts remaining.",
                INVALID_CREDENTIALS, remaining
            )));
        }
    };

    state.attempts.clear(&email).await?;
    let pair = state.registry.issue_pair(user.id, &user.email).await?;

    let now = Utc::now();
    state.credentials.touch_last_login(user.id, now).await?;
    let mut profile = UserResponse::from(user);
    profile.last_login = Some(now);

    tracing::info!(
        request_id = %context.request_id,
        operation = context.operation,
        user_id = %profile.id,
        "User logged in successfully"
    );

    let mut builder = HttpResponse::Ok();
    state.cookies.set_pair(&mut builder, &pair);
    Ok(builder.json(
        ApiResponse::success(SessionResponse {
            user: profile,
            access_token: pair.access_token,
        })
        .with_message("Login successful"),
    ))
}

/// POST /auth/refresh
///
/// Exchanges the refresh-token cookie for a new pair. The presented token
/// must be the user's current registry row; it is consumed on success.
///
/// # Errors
/// - 401: Cookie missing, token invalid, expired, or already rotated
/// - 500: Internal server error
pub async fn refresh(req: HttpRequest, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let presented = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::unauthorized("Refresh token not found"))?;

    let Some((claims, pair)) = state.registry.rotate(&presented).await? else {
        tracing::info!(request_id = %context.request_id, operation = context.operation, "Refresh token rejected");
        return Err(AppError::unauthorized("Invalid refresh token"));
    };

    tracing::info!(
        request_id = %context.request_id,
        operation = context.operation,
        user_id = %claims.sub,
        "Token refreshed successfully"
    );

    let mut builder = HttpResponse::Ok();
    state.cookies.set_pair(&mut builder, &pair);
    Ok(builder.json(
        ApiResponse::success(AccessTokenResponse {
            access_token: pair.access_token,
        })
        .with_message("Token refreshed"),
    ))
}

/// POST /auth/logout
///
/// Always succeeds. Revokes the caller's refresh token when the caller can
/// be identified from the access token or, failing that, the refresh cookie.
pub async fn logout(
    req: HttpRequest,
    user: Option<AuthUser>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let context = ErrorContext::new("user_logout");

    let user_id = user.map(|u| u.user_id).or_else(|| {
        req.cookie(REFRESH_COOKIE)
            .and_then(|c| state.codec.verify(TokenKind::Refresh, c.value()))
            .and_then(|claims| claims.user_id())
    });

    if let Some(user_id) = user_id {
        if let Err(e) = state.registry.revoke(user_id).await {
            tracing::error!(
                request_id = %context.request_id,
                operation = context.operation,
                user_id = %user_id,
                error = %e,
                "Failed to revoke refresh token during logout"
            );
        }
    }

    let mut builder = HttpResponse::Ok();
    state.cookies.clear(&mut builder);
    builder.json(ApiResponse::message_only("Logout successful"))
}

/// GET /auth/me
///
/// # Errors
/// - 401: Missing or invalid access token, or the user no longer exists
/// - 500: Internal server error
pub async fn get_current_user(
    user: AuthUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let record = state
        .credentials
        .find_user_by_id(user.user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CurrentUserResponse {
        user: record.into(),
    })))
}

/// GET /auth/csrf
///
/// Issues a fresh double-submit token as a cookie and in the body.
pub async fn csrf_token(state: web::Data<AppState>) -> HttpResponse {
    let token = generate_csrf_token();
    HttpResponse::Ok()
        .cookie(csrf_cookie(token.clone(), state.cookies.is_secure()))
        .json(ApiResponse::success(CsrfResponse { csrf_token: token }))
}
