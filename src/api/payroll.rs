use std::collections::BTreeMap;

use actix_web::error::InternalError;
use actix_web::{HttpResponse, Responder, ResponseError, http::StatusCode, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::model::payroll::{PayrollFilter, PayrollStatus};
use crate::payroll::generator::ItemInput;
use crate::payroll::lifecycle::CreatePayrollInput;
use crate::payroll::{PayrollError, PayrollManager};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePayroll {
    #[schema(example = "2024-10-01", value_type = String, format = "date")]
    pub period_start: NaiveDate,

    #[schema(example = "2024-10-15", value_type = String, format = "date")]
    pub period_end: NaiveDate,

    /// Omit to cover every department
    #[schema(example = 2)]
    pub department_id: Option<u64>,

    #[schema(example = "First half of October")]
    pub description: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateItem {
    #[schema(example = 1)]
    pub employee_id: u64,

    #[schema(example = 7500.0)]
    pub gross_amount: f64,

    /// Extra deductions; `igss` or `isr` here are added to the statutory amount
    #[serde(default)]
    #[schema(example = json!({"loan": 250.0}))]
    pub deductions: BTreeMap<String, f64>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct GeneratePayroll {
    /// Omit (or send an empty list) to pay every active employee in scope
    pub items: Option<Vec<GenerateItem>>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayrollListQuery {
    /// Only periods starting on or after this date
    #[schema(example = "2024-01-01", value_type = String, format = "date")]
    pub start_date: Option<NaiveDate>,

    /// Only periods ending on or before this date (defaults to today with startDate)
    #[schema(example = "2024-12-31", value_type = String, format = "date")]
    pub end_date: Option<NaiveDate>,

    #[schema(example = 2)]
    pub department: Option<u64>,

    pub status: Option<PayrollStatus>,

    #[schema(example = 1)]
    pub page: Option<u32>,

    #[schema(example = 10)]
    pub page_size: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct DeletePayrollResponse {
    #[schema(example = true)]
    pub success: bool,
    #[schema(example = "Payroll deleted successfully")]
    pub message: String,
}

impl ResponseError for PayrollError {
    fn status_code(&self) -> StatusCode {
        match self {
            PayrollError::OverlappingPeriod { .. } => StatusCode::CONFLICT,

            PayrollError::DepartmentNotFound(_)
            | PayrollError::PayrollNotFound(_)
            | PayrollError::EmployeeNotFound(_) => StatusCode::NOT_FOUND,

            PayrollError::InvalidDateRange
            | PayrollError::InvalidGrossAmount { .. }
            | PayrollError::InvalidDescription { .. }
            | PayrollError::PayrollNotEditable(_)
            | PayrollError::PayrollAlreadyFinalized(_)
            | PayrollError::PayrollNotDeletable(_)
            | PayrollError::PayrollNotPayable(_)
            | PayrollError::NoPayrollItems(_)
            | PayrollError::NoEmployeesFound => StatusCode::UNPROCESSABLE_ENTITY,

            PayrollError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            PayrollError::Storage(e) => {
                tracing::error!(error = %e, "Payroll storage failure");
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "code": self.code(),
                "message": message,
                "retryable": self.is_retryable(),
            }
        }))
    }
}

/// Rejection rendered in the same envelope as `PayrollError`.
fn bad_request(code: &'static str, cause: impl std::fmt::Display) -> actix_web::Error {
    let message = cause.to_string();
    let response = HttpResponse::BadRequest().json(json!({
        "error": {
            "code": code,
            "message": message,
            "retryable": false,
        }
    }));
    InternalError::from_response(message, response).into()
}

pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _| bad_request("INVALID_REQUEST_BODY", err))
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _| bad_request("INVALID_REQUEST_PARAMS", err))
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _| bad_request("INVALID_REQUEST_PARAMS", err))
}

#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = CreatePayroll,
    responses(
        (status = 201, description = "Payroll created in DRAFT", body = crate::model::payroll::Payroll),
        (status = 401),
        (status = 403),
        (status = 404, description = "DEPARTMENT_NOT_FOUND"),
        (status = 409, description = "OVERLAPPING_PERIOD"),
        (status = 422, description = "INVALID_DATE_RANGE or INVALID_DESCRIPTION")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_payroll(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    payload: web::Json<CreatePayroll>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let payload = payload.into_inner();
    info!(user_id = auth.user_id, username = %auth.username, "Create payroll requested");
    let payroll = manager
        .create_payroll(CreatePayrollInput {
            period_start: payload.period_start,
            period_end: payload.period_end,
            department_id: payload.department_id,
            description: payload.description,
        })
        .await?;

    Ok(HttpResponse::Created().json(payroll))
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PayrollListQuery),
    responses(
        (status = 200, body = crate::model::payroll::PayrollPage),
        (status = 401),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    query: web::Query<PayrollListQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let query = query.into_inner();
    let defaults = PayrollFilter::default();
    let page = manager
        .list_payrolls(PayrollFilter {
            start_date: query.start_date,
            end_date: query.end_date,
            department_id: query.department,
            status: query.status,
            page: query.page.unwrap_or(defaults.page),
            page_size: query.page_size.unwrap_or(defaults.page_size),
        })
        .await?;

    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    get,
    path = "/api/payroll/stats",
    responses(
        (status = 200, body = crate::model::payroll::PayrollStats),
        (status = 401),
        (status = 403)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn payroll_stats(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    Ok(HttpResponse::Ok().json(manager.payroll_stats().await?))
}

#[utoipa::path(
    get,
    path = "/api/payroll/{payroll_id}",
    params(
        ("payroll_id" = u64, Path, description = "Payroll ID")
    ),
    responses(
        (status = 200, body = crate::model::payroll::PayrollDetail),
        (status = 404, description = "PAYROLL_NOT_FOUND")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let detail = manager.get_payroll_by_id(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/payroll/{payroll_id}/generate",
    request_body = GeneratePayroll,
    params(
        ("payroll_id" = u64, Path, description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Items regenerated", body = crate::model::payroll::PayrollDetail),
        (status = 404, description = "PAYROLL_NOT_FOUND or EMPLOYEE_NOT_FOUND"),
        (status = 422, description = "PAYROLL_NOT_EDITABLE, NO_EMPLOYEES_FOUND or INVALID_GROSS_AMOUNT")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn generate_items(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    path: web::Path<u64>,
    body: web::Bytes,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    // An empty body means "auto-generate".
    let request: GeneratePayroll = if body.iter().all(u8::is_ascii_whitespace) {
        GeneratePayroll::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| bad_request("INVALID_REQUEST_BODY", e))?
    };

    let items = request.items.map(|items| {
        items
            .into_iter()
            .map(|i| ItemInput {
                employee_id: i.employee_id,
                gross_amount: i.gross_amount,
                deductions: i.deductions,
            })
            .collect()
    });

    let payroll_id = path.into_inner();
    info!(user_id = auth.user_id, username = %auth.username, payroll_id, "Generate items requested");
    let detail = manager.generate_payroll_items(payroll_id, items).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/payroll/{payroll_id}/finalize",
    params(
        ("payroll_id" = u64, Path, description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Payroll finalized", body = crate::model::payroll::PayrollDetail),
        (status = 404, description = "PAYROLL_NOT_FOUND"),
        (status = 422, description = "PAYROLL_ALREADY_FINALIZED or NO_PAYROLL_ITEMS")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn finalize_payroll(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let payroll_id = path.into_inner();
    info!(user_id = auth.user_id, username = %auth.username, payroll_id, "Finalize requested");

    let detail = manager.finalize_payroll(payroll_id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    post,
    path = "/api/payroll/{payroll_id}/pay",
    params(
        ("payroll_id" = u64, Path, description = "Payroll ID")
    ),
    responses(
        (status = 200, description = "Payroll marked paid", body = crate::model::payroll::PayrollDetail),
        (status = 404, description = "PAYROLL_NOT_FOUND"),
        (status = 422, description = "PAYROLL_NOT_PAYABLE")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn mark_paid(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payroll_id = path.into_inner();
    info!(user_id = auth.user_id, username = %auth.username, payroll_id, "Payment requested");

    let detail = manager.mark_paid(payroll_id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    delete,
    path = "/api/payroll/{payroll_id}",
    params(
        ("payroll_id" = u64, Path, description = "Payroll ID")
    ),
    responses(
        (status = 200, body = DeletePayrollResponse),
        (status = 404, description = "PAYROLL_NOT_FOUND"),
        (status = 422, description = "PAYROLL_NOT_DELETABLE")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn delete_payroll(
    auth: AuthUser,
    manager: web::Data<PayrollManager>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;

    let payroll_id = path.into_inner();
    info!(user_id = auth.user_id, username = %auth.username, payroll_id, "Delete requested");

    let outcome = manager.delete_payroll(payroll_id).await?;
    Ok(HttpResponse::Ok().json(DeletePayrollResponse {
        success: outcome.success,
        message: outcome.message,
    }))
}
