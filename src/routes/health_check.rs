use actix_web::HttpResponse;

use crate::response::ApiResponse;

/// GET /health_check
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::message_only("OK"))
}
