use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::employee::EmployeeSummary;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum PayrollStatus {
    Draft,
    Finalized,
    Paid,
}

impl PayrollStatus {
    /// Statuses that take part in the no-overlap invariant.
    pub fn is_active(self) -> bool {
        matches!(self, PayrollStatus::Draft | PayrollStatus::Finalized)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": 1,
    "periodStart": "2024-10-01",
    "periodEnd": "2024-10-15",
    "departmentId": 2,
    "description": "First half of October",
    "status": "DRAFT",
    "createdAt": "2024-10-16T09:00:00Z",
    "updatedAt": "2024-10-16T09:00:00Z"
}))]
pub struct Payroll {
    pub id: u64,

    #[schema(value_type = String, format = "date")]
    pub period_start: NaiveDate,

    #[schema(value_type = String, format = "date")]
    pub period_end: NaiveDate,

    #[schema(nullable = true)]
    pub department_id: Option<u64>,

    #[schema(nullable = true)]
    pub description: Option<String>,

    pub status: PayrollStatus,

    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayroll {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub department_id: Option<u64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayrollItem {
    pub id: u64,
    pub payroll_id: u64,
    pub employee_id: u64,
    #[schema(example = 7500.0)]
    pub gross_amount: f64,
    #[schema(example = json!({"igss": 362.25, "isr": 0.0}))]
    pub deductions: BTreeMap<String, f64>,
    #[schema(example = 7137.75)]
    pub net_amount: f64,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
}

/// A computed line ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayrollItem {
    pub employee_id: u64,
    pub gross_amount: f64,
    pub deductions: BTreeMap<String, f64>,
    pub net_amount: f64,
}

/// A stored item together with the identity of its employee.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayrollLine {
    #[serde(flatten)]
    pub item: PayrollItem,
    #[schema(nullable = true)]
    pub employee: Option<EmployeeSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayrollTotals {
    pub total_gross: f64,
    pub total_net: f64,
    pub total_deductions: f64,
}

impl PayrollTotals {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a PayrollItem>) -> Self {
        let sums = items.into_iter().fold(Self::default(), |acc, item| Self {
            total_gross: acc.total_gross + item.gross_amount,
            total_net: acc.total_net + item.net_amount,
            total_deductions: acc.total_deductions + (item.gross_amount - item.net_amount),
        });

        Self {
            total_gross: round2(sums.total_gross),
            total_net: round2(sums.total_net),
            total_deductions: round2(sums.total_deductions),
        }
    }
}

/// A payroll with its lines and freshly computed totals.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PayrollDetail {
    #[serde(flatten)]
    pub payroll: Payroll,
    pub items: Vec<PayrollLine>,
    pub totals: PayrollTotals,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayrollSummary {
    #[serde(flatten)]
    pub payroll: Payroll,
    pub item_count: u64,
}

/// Listing filter. `page` is 1-based.
#[derive(Debug, Clone)]
pub struct PayrollFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub department_id: Option<u64>,
    pub status: Option<PayrollStatus>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for PayrollFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            department_id: None,
            status: None,
            page: 1,
            page_size: 10,
        }
    }
}

impl PayrollFilter {
    pub const MAX_PAGE_SIZE: u32 = 100;

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayrollPage {
    pub data: Vec<PayrollSummary>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

/// Raw counters produced by the store; department names are joined in later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PayrollAggregates {
    pub total: u64,
    pub finalized: u64,
    pub total_gross: f64,
    /// department id -> (payroll count, gross sum)
    pub by_department: BTreeMap<u64, (u64, f64)>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentPayrollStats {
    #[schema(example = "Finance")]
    pub department: String,
    pub count: u64,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayrollStats {
    pub total: u64,
    pub finalized: u64,
    pub total_amount: f64,
    pub by_department: Vec<DepartmentPayrollStats>,
}

/// Rounds half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
