mod analytics;
mod auth;
mod business;
mod health_check;

pub use analytics::business_analytics;
pub use auth::{csrf_token, get_current_user, login, logout, refresh, register};
pub use business::{create_business, delete_business, get_business, list_businesses, update_business};
pub use health_check::health_check;
