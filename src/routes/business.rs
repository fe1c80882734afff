/// Business Record Routes
///
/// CRUD over the caller's own business records. Reads need an access token;
/// writes additionally need a valid CSRF pair. Records owned by another user
/// answer 403, unknown ids 404.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_csrf, AuthUser};
use crate::error::{AppError, FieldError};
use crate::response::ApiResponse;
use crate::startup::AppState;
use crate::store::{BusinessFields, BusinessRecord};
use crate::validators::{validate_amount, validate_optional_text, validate_text, Validator};

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const MAX_MONEY: i64 = 999_999_999;
const MAX_EXPENSES: i64 = 9_999_999_999;
const MAX_EMPLOYEES: i32 = 10_000;

const NOT_FOUND: &str = "Business not found";
const NOT_OWNER: &str = "You do not have access to this business";

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPayload {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub initial_capital: Option<i64>,
    pub monthly_revenue: Option<i64>,
    pub monthly_expenses: Option<i64>,
    pub employee_count: Option<i32>,
    pub location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Serialize)]
pub struct BusinessList {
    pub businesses: Vec<BusinessRecord>,
    pub pagination: Pagination,
}

fn parse_bounded(field: &str, raw: Option<&str>, default: i64, max: i64) -> Result<i64, FieldError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(default);
    };
    match raw.parse::<i64>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(FieldError::new(field, format!("{} must be an integer between 1 and {}", field, max))),
    }
}

fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::field("id", "Invalid id"))
}

/// Validate a payload. On create, `name` and `category` are required.
fn validate_payload(payload: BusinessPayload, creating: bool) -> Result<BusinessFields, AppError> {
    let mut v = Validator::new();

    let name = match payload.name {
        Some(name) => v.check(validate_text("name", &name, 2, 200)),
        None if creating => {
            v.push("name", "name is required");
            None
        }
        None => None,
    };
    let category = match payload.category {
        Some(category) => v.check(validate_text("category", &category, 2, 100)),
        None if creating => {
            v.push("category", "category is required");
            None
        }
        None => None,
    };

    let fields = BusinessFields {
        name,
        category,
        description: v.check(validate_optional_text("description", payload.description, 2000)).flatten(),
        initial_capital: v.check(validate_amount("initialCapital", payload.initial_capital, MAX_MONEY)).flatten(),
        monthly_revenue: v.check(validate_amount("monthlyRevenue", payload.monthly_revenue, MAX_MONEY)).flatten(),
        monthly_expenses: v
            .check(validate_amount("monthlyExpenses", payload.monthly_expenses, MAX_EXPENSES))
            .flatten(),
        employee_count: v
            .check(validate_amount("employeeCount", payload.employee_count, MAX_EMPLOYEES))
            .flatten(),
        location: v.check(validate_optional_text("location", payload.location, 255)).flatten(),
    };

    v.finish()?;
    Ok(fields)
}

/// Load a record and check the caller owns it
pub(crate) async fn owned_business(state: &AppState, id: Uuid, user: &AuthUser) -> Result<BusinessRecord, AppError> {
    let record = state
        .businesses
        .find_business(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;

    if record.user_id != user.user_id {
        tracing::warn!(user_id = %user.user_id, business_id = %id, "Business access denied");
        return Err(AppError::Forbidden(NOT_OWNER.to_string()));
    }
    Ok(record)
}

/// GET /api/business?page=&limit=
pub async fn list_businesses(
    user: AuthUser,
    query: web::Query<PageQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let mut v = Validator::new();
    let page = v.check(parse_bounded("page", query.page.as_deref(), 1, i64::from(u32::MAX)));
    let limit = v.check(parse_bounded("limit", query.limit.as_deref(), DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE));
    v.finish()?;
    let (page, limit) = (page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_SIZE));

    let (businesses, total) = state
        .businesses
        .list_businesses(user.user_id, limit, (page - 1) * limit)
        .await?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BusinessList {
        businesses,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        },
    })))
}

/// POST /api/business
pub async fn create_business(
    req: HttpRequest,
    user: AuthUser,
    payload: web::Json<BusinessPayload>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_csrf(&req)?;
    let fields = validate_payload(payload.into_inner(), true)?;

    let record = state.businesses.insert_business(user.user_id, fields).await?;
    tracing::info!(user_id = %user.user_id, business_id = %record.id, "Business created");

    Ok(HttpResponse::Created().json(ApiResponse::success(record).with_message("Business created")))
}

/// GET /api/business/{id}
pub async fn get_business(
    user: AuthUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = parse_id(&path)?;
    let record = owned_business(&state, id, &user).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(record)))
}

/// PUT /api/business/{id}
pub async fn update_business(
    req: HttpRequest,
    user: AuthUser,
    path: web::Path<String>,
    payload: web::Json<BusinessPayload>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_csrf(&req)?;
    let id = parse_id(&path)?;
    owned_business(&state, id, &user).await?;
    let fields = validate_payload(payload.into_inner(), false)?;

    let record = state
        .businesses
        .update_business(id, fields)
        .await?
        .ok_or_else(|| AppError::NotFound(NOT_FOUND.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(record).with_message("Business updated")))
}

/// DELETE /api/business/{id}
pub async fn delete_business(
    req: HttpRequest,
    user: AuthUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    require_csrf(&req)?;
    let id = parse_id(&path)?;
    owned_business(&state, id, &user).await?;

    if !state.businesses.delete_business(id).await? {
        return Err(AppError::NotFound(NOT_FOUND.to_string()));
    }
    tracing::info!(user_id = %user.user_id, business_id = %id, "Business deleted");

    Ok(HttpResponse::Ok().json(ApiResponse::message_only("Business deleted")))
}
