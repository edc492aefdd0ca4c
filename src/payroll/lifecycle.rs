use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::model::payroll::{
    DepartmentPayrollStats, NewPayroll, Payroll, PayrollDetail, PayrollFilter, PayrollLine,
    PayrollPage, PayrollStats, PayrollStatus, PayrollTotals,
};
use crate::payroll::error::PayrollError;
use crate::payroll::generator::{ItemGenerator, ItemInput};
use crate::payroll::store::{
    DepartmentDirectory, EmployeeDirectory, Guarded, PayrollStore, SalaryPolicy, StatusTransition,
};
use crate::payroll::validator::PeriodValidator;

pub const MAX_DESCRIPTION_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct CreatePayrollInput {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub department_id: Option<u64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub success: bool,
    pub message: String,
}

/// Drives a payroll through DRAFT -> FINALIZED -> PAID.
///
/// Every mutation is re-guarded by the store inside its own transaction, so
/// the status pre-checks here only pick the error reported to the caller.
#[derive(Clone)]
pub struct PayrollManager {
    payrolls: Arc<dyn PayrollStore>,
    employees: Arc<dyn EmployeeDirectory>,
    departments: Arc<dyn DepartmentDirectory>,
    salary: Arc<dyn SalaryPolicy>,
}

impl PayrollManager {
    pub fn new(
        payrolls: Arc<dyn PayrollStore>,
        employees: Arc<dyn EmployeeDirectory>,
        departments: Arc<dyn DepartmentDirectory>,
        salary: Arc<dyn SalaryPolicy>,
    ) -> Self {
        Self {
            payrolls,
            employees,
            departments,
            salary,
        }
    }

    #[instrument(skip(self, input), fields(start = %input.period_start, end = %input.period_end))]
    pub async fn create_payroll(&self, input: CreatePayrollInput) -> Result<Payroll, PayrollError> {
        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        if description
            .as_deref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(PayrollError::InvalidDescription {
                max: MAX_DESCRIPTION_LEN,
            });
        }

        PeriodValidator::new(self.payrolls.as_ref(), self.departments.as_ref())
            .validate(input.period_start, input.period_end, input.department_id)
            .await?;

        let payroll = self
            .payrolls
            .insert_unless_overlapping(NewPayroll {
                period_start: input.period_start,
                period_end: input.period_end,
                department_id: input.department_id,
                description,
            })
            .await?
            .map_err(|existing_id| {
                warn!(existing_id, "Overlapping payroll created concurrently");
                PayrollError::OverlappingPeriod { existing_id }
            })?;

        info!(payroll_id = payroll.id, "Payroll created");
        Ok(payroll)
    }

    pub async fn get_payroll_by_id(&self, id: u64) -> Result<PayrollDetail, PayrollError> {
        let payroll = self.require(id).await?;
        self.detail(payroll).await
    }

    pub async fn list_payrolls(&self, filter: PayrollFilter) -> Result<PayrollPage, PayrollError> {
        let mut filter = filter;
        filter.page = filter.page.max(1);
        filter.page_size = filter.page_size.clamp(1, PayrollFilter::MAX_PAGE_SIZE);
        if filter.start_date.is_some() && filter.end_date.is_none() {
            filter.end_date = Some(Utc::now().date_naive());
        }

        let (data, total) = self.payrolls.list_payrolls(&filter).await?;

        Ok(PayrollPage {
            data,
            page: filter.page,
            page_size: filter.page_size,
            total,
            total_pages: total.div_ceil(u64::from(filter.page_size)),
        })
    }

    pub async fn payroll_stats(&self) -> Result<PayrollStats, PayrollError> {
        let aggregates = self.payrolls.aggregates().await?;
        let departments = self.departments.find_all().await?;

        let by_department = departments
            .into_iter()
            .map(|department| {
                let (count, amount) = aggregates
                    .by_department
                    .get(&department.id)
                    .copied()
                    .unwrap_or((0, 0.0));
                DepartmentPayrollStats {
                    department: department.name,
                    count,
                    amount,
                }
            })
            .collect();

        Ok(PayrollStats {
            total: aggregates.total,
            finalized: aggregates.finalized,
            total_amount: aggregates.total_gross,
            by_department,
        })
    }

    #[instrument(skip(self, items), fields(explicit = items.as_ref().map_or(0, Vec::len)))]
    pub async fn generate_payroll_items(
        &self,
        id: u64,
        items: Option<Vec<ItemInput>>,
    ) -> Result<PayrollDetail, PayrollError> {
        let payroll = self.require(id).await?;
        if payroll.status != PayrollStatus::Draft {
            return Err(PayrollError::PayrollNotEditable(id));
        }

        let new_items = ItemGenerator::new(self.employees.as_ref(), self.salary.as_ref())
            .generate(&payroll, items)
            .await?;
        let count = new_items.len();

        match self.payrolls.replace_items(id, new_items).await? {
            Guarded::Applied => {}
            Guarded::Missing => return Err(PayrollError::PayrollNotFound(id)),
            Guarded::Rejected(status) => {
                warn!(payroll_id = id, %status, "Payroll left draft during generation");
                return Err(PayrollError::PayrollNotEditable(id));
            }
            Guarded::Empty => return Err(PayrollError::PayrollNotEditable(id)),
        }

        info!(payroll_id = id, count, "Payroll items generated");
        self.get_payroll_by_id(id).await
    }

    #[instrument(skip(self))]
    pub async fn finalize_payroll(&self, id: u64) -> Result<PayrollDetail, PayrollError> {
        let payroll = self.require(id).await?;
        if payroll.status != PayrollStatus::Draft {
            return Err(PayrollError::PayrollAlreadyFinalized(id));
        }

        match self.payrolls.transition(id, StatusTransition::FINALIZE).await? {
            Guarded::Applied => {}
            Guarded::Missing => return Err(PayrollError::PayrollNotFound(id)),
            Guarded::Rejected(_) => return Err(PayrollError::PayrollAlreadyFinalized(id)),
            Guarded::Empty => return Err(PayrollError::NoPayrollItems(id)),
        }

        info!(payroll_id = id, "Payroll finalized");
        self.get_payroll_by_id(id).await
    }

    /// Settlement hook: records that a finalized payroll has been paid.
    #[instrument(skip(self))]
    pub async fn mark_paid(&self, id: u64) -> Result<PayrollDetail, PayrollError> {
        let payroll = self.require(id).await?;
        if payroll.status != PayrollStatus::Finalized {
            return Err(PayrollError::PayrollNotPayable(id));
        }

        match self.payrolls.transition(id, StatusTransition::PAY).await? {
            Guarded::Applied => {}
            Guarded::Missing => return Err(PayrollError::PayrollNotFound(id)),
            Guarded::Rejected(_) => return Err(PayrollError::PayrollNotPayable(id)),
            Guarded::Empty => return Err(PayrollError::NoPayrollItems(id)),
        }

        info!(payroll_id = id, "Payroll marked paid");
        self.get_payroll_by_id(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_payroll(&self, id: u64) -> Result<DeleteOutcome, PayrollError> {
        let payroll = self.require(id).await?;
        if payroll.status != PayrollStatus::Draft {
            return Err(PayrollError::PayrollNotDeletable(id));
        }

        match self.payrolls.delete_payroll(id).await? {
            Guarded::Applied => {}
            Guarded::Missing => return Err(PayrollError::PayrollNotFound(id)),
            Guarded::Rejected(_) | Guarded::Empty => {
                return Err(PayrollError::PayrollNotDeletable(id));
            }
        }

        info!(payroll_id = id, "Payroll deleted");
        Ok(DeleteOutcome {
            success: true,
            message: "Payroll deleted successfully".to_string(),
        })
    }

    async fn require(&self, id: u64) -> Result<Payroll, PayrollError> {
        self.payrolls
            .find_payroll(id)
            .await?
            .ok_or(PayrollError::PayrollNotFound(id))
    }

    async fn detail(&self, payroll: Payroll) -> Result<PayrollDetail, PayrollError> {
        let items = self.payrolls.find_items(payroll.id).await?;
        let totals = PayrollTotals::from_items(&items);

        let ids: Vec<u64> = items.iter().map(|i| i.employee_id).collect();
        let employees: HashMap<u64, _> = self
            .employees
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|e| (e.id, e.summary()))
            .collect();

        let mut lines: Vec<PayrollLine> = items
            .into_iter()
            .map(|item| PayrollLine {
                employee: employees.get(&item.employee_id).cloned(),
                item,
            })
            .collect();
        // Unresolved employees go last.
        lines.sort_by(|a, b| match (&a.employee, &b.employee) {
            (Some(x), Some(y)) => {
                (&x.first_name, &x.last_name).cmp(&(&y.first_name, &y.last_name))
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        Ok(PayrollDetail {
            payroll,
            items: lines,
            totals,
        })
    }
}
