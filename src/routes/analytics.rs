/// Business Analytics Route
///
/// Financial health summary for one of the caller's business records:
/// profit, margin, burn rate, runway, operating-expense ratio and revenue
/// per employee, plus risk flags and plain-language recommendations.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::response::ApiResponse;
use crate::routes::business::owned_business;
use crate::startup::AppState;
use crate::store::BusinessRecord;

const RUNWAY_WARNING_MONTHS: f64 = 6.0;
const THIN_MARGIN_PERCENT: f64 = 5.0;
const HEAVY_OPEX_PERCENT: f64 = 80.0;
const LOW_REVENUE_PER_EMPLOYEE: f64 = 10_000_000.0;

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    #[serde(rename = "businessId")]
    pub business_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthPotential {
    High,
    Medium,
    Low,
}

/// Derived monthly figures. Percentages are rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessMetrics {
    pub monthly_revenue: i64,
    pub monthly_expenses: i64,
    pub initial_capital: i64,
    pub monthly_profit: i64,
    pub profit_margin: f64,
    pub burn_rate: i64,
    /// `None` while the business is not burning capital
    pub runway_months: Option<f64>,
    pub opex_ratio: f64,
    /// `None` without a positive employee count
    pub revenue_per_employee: Option<f64>,
    pub growth_potential: GrowthPotential,
}

#[derive(Serialize)]
pub struct BusinessSummary {
    pub name: String,
    pub category: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub analytics: BusinessMetrics,
    pub insights: Vec<String>,
    pub risk_flags: Vec<String>,
    pub recommendations: Vec<String>,
    pub business: BusinessSummary,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of revenue, zero when there is no revenue
fn percent_of_revenue(amount: i64, revenue: i64) -> f64 {
    if revenue > 0 {
        amount as f64 / revenue as f64 * 100.0
    } else {
        0.0
    }
}

pub fn compute_metrics(record: &BusinessRecord) -> BusinessMetrics {
    let revenue = record.monthly_revenue.unwrap_or(0);
    let expenses = record.monthly_expenses.unwrap_or(0);
    let capital = record.initial_capital.unwrap_or(0);

    let profit = revenue - expenses;
    let margin = percent_of_revenue(profit, revenue);
    let burn_rate = (expenses - revenue).max(0);
    let runway_months = (burn_rate > 0).then(|| (capital as f64 / burn_rate as f64).max(0.0));
    let revenue_per_employee = record
        .employee_count
        .filter(|&n| n > 0)
        .map(|n| revenue as f64 / f64::from(n));

    let growth_potential = if margin > 25.0 && profit > 0 {
        GrowthPotential::High
    } else if margin > 10.0 {
        GrowthPotential::Medium
    } else {
        GrowthPotential::Low
    };

    BusinessMetrics {
        monthly_revenue: revenue,
        monthly_expenses: expenses,
        initial_capital: capital,
        monthly_profit: profit,
        profit_margin: round2(margin),
        burn_rate,
        runway_months: runway_months.map(round2),
        opex_ratio: round2(percent_of_revenue(expenses, revenue)),
        revenue_per_employee,
        growth_potential,
    }
}

pub fn risk_flags(m: &BusinessMetrics) -> Vec<String> {
    let mut flags = Vec::new();
    if m.burn_rate > 0 && m.runway_months.unwrap_or(0.0) < RUNWAY_WARNING_MONTHS {
        flags.push("Runway under 6 months".to_string());
    }
    if m.profit_margin < THIN_MARGIN_PERCENT && m.monthly_revenue > 0 {
        flags.push("Thin margin (<5%)".to_string());
    }
    if m.opex_ratio > HEAVY_OPEX_PERCENT {
        flags.push("Operating expenses above 80% of revenue".to_string());
    }
    flags
}

fn insights(m: &BusinessMetrics) -> Vec<String> {
    let burn = if m.burn_rate > 0 {
        let runway = m
            .runway_months
            .map(|r| format!("{:.1}", r))
            .unwrap_or_else(|| "-".to_string());
        format!("Burn rate: {}/month, runway {} months.", m.burn_rate, runway)
    } else {
        "Burn rate is safe (expenses do not exceed revenue).".to_string()
    };
    let per_employee = match m.revenue_per_employee {
        Some(v) if v > 0.0 => format!("Revenue per employee: Rp {}", v.round() as i64),
        _ => "No employee data yet.".to_string(),
    };

    vec![
        format!(
            "Monthly profit is {}.",
            if m.monthly_profit >= 0 { "positive" } else { "negative" }
        ),
        format!("Profit margin: {:.1}%.", m.profit_margin),
        burn,
        format!("Operating expense ratio: {:.1}%.", m.opex_ratio),
        per_employee,
    ]
}

fn recommendations(m: &BusinessMetrics) -> Vec<String> {
    let costs = if m.monthly_profit < 0 {
        "Review the cost structure to reduce the burn rate."
    } else {
        "Keep the profit and explore new acquisition channels you can measure."
    };
    let opex = if m.opex_ratio > HEAVY_OPEX_PERCENT {
        "Bring operating expenses below 70% of revenue."
    } else {
        "Keep operations lean so expenses stay low."
    };
    let team = match m.revenue_per_employee {
        Some(v) if v > 0.0 && v < LOW_REVENUE_PER_EMPLOYEE => {
            "Raise productivity per employee through automation and training."
        }
        _ => "Grow the team carefully with per-employee productivity targets.",
    };
    let runway = if m.runway_months.unwrap_or(12.0) < RUNWAY_WARNING_MONTHS {
        "Secure funding or cut the burn to extend the runway."
    } else {
        "Runway is healthy; focus on sustainable growth."
    };

    [costs, opex, team, runway].iter().map(|s| s.to_string()).collect()
}

/// GET /api/analytics?businessId=
///
/// # Errors
/// - 422: Missing or malformed `businessId`
/// - 403: Record belongs to another user
/// - 404: Unknown record
pub async fn business_analytics(
    user: AuthUser,
    query: web::Query<AnalyticsQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let id = query
        .business_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| AppError::field("businessId", "Invalid business id"))?;

    let record = owned_business(&state, id, &user).await?;
    let metrics = compute_metrics(&record);

    Ok(HttpResponse::Ok().json(ApiResponse::success(AnalyticsReport {
        insights: insights(&metrics),
        risk_flags: risk_flags(&metrics),
        recommendations: recommendations(&metrics),
        analytics: metrics,
        business: BusinessSummary {
            name: record.name,
            category: record.category,
        },
    })))
}
