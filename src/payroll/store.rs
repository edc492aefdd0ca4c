//! Ports consumed by the lifecycle manager.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::department::Department;
use crate::model::employee::{Employee, EmployeeFilter};
use crate::model::payroll::{
    NewPayroll, NewPayrollItem, Payroll, PayrollAggregates, PayrollFilter, PayrollItem,
    PayrollStatus, PayrollSummary,
};
use crate::payroll::error::StoreError;

/// Result of a mutation whose status guard is evaluated inside the store's
/// transaction, with the payroll row locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guarded {
    Applied,
    Missing,
    /// The payroll was found in this status, which the guard does not accept.
    Rejected(PayrollStatus),
    /// The transition requires items and the payroll has none.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: PayrollStatus,
    pub to: PayrollStatus,
    pub require_items: bool,
}

impl StatusTransition {
    pub const FINALIZE: Self = Self {
        from: PayrollStatus::Draft,
        to: PayrollStatus::Finalized,
        require_items: true,
    };

    pub const PAY: Self = Self {
        from: PayrollStatus::Finalized,
        to: PayrollStatus::Paid,
        require_items: true,
    };
}

#[async_trait]
pub trait PayrollStore: Send + Sync {
    /// Inserts a DRAFT payroll unless an active one overlaps its period.
    /// Concurrent calls are serialized, so the check always sees committed
    /// payrolls; `Err` carries the id of the overlapping payroll.
    async fn insert_unless_overlapping(
        &self,
        new: NewPayroll,
    ) -> Result<Result<Payroll, u64>, StoreError>;

    async fn find_payroll(&self, id: u64) -> Result<Option<Payroll>, StoreError>;

    async fn find_items(&self, payroll_id: u64) -> Result<Vec<PayrollItem>, StoreError>;

    /// First DRAFT or FINALIZED payroll whose closed period overlaps `[start, end]`.
    async fn find_overlapping(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Payroll>, StoreError>;

    /// One page of payrolls plus the total count matching the filter.
    async fn list_payrolls(
        &self,
        filter: &PayrollFilter,
    ) -> Result<(Vec<PayrollSummary>, u64), StoreError>;

    async fn aggregates(&self) -> Result<PayrollAggregates, StoreError>;

    /// Replaces every item of a DRAFT payroll in one transaction.
    async fn replace_items(
        &self,
        payroll_id: u64,
        items: Vec<NewPayrollItem>,
    ) -> Result<Guarded, StoreError>;

    async fn transition(
        &self,
        payroll_id: u64,
        transition: StatusTransition,
    ) -> Result<Guarded, StoreError>;

    /// Deletes a DRAFT payroll and its items in one transaction.
    async fn delete_payroll(&self, payroll_id: u64) -> Result<Guarded, StoreError>;
}

#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn find_many(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, StoreError>;

    /// Employees among `ids`; unknown ids are omitted.
    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<Employee>, StoreError>;
}

#[async_trait]
pub trait DepartmentDirectory: Send + Sync {
    async fn find_by_id(&self, id: u64) -> Result<Option<Department>, StoreError>;

    async fn find_all(&self) -> Result<Vec<Department>, StoreError>;
}

/// Supplies the gross amount of employees picked by auto-generation.
pub trait SalaryPolicy: Send + Sync {
    fn gross_for(&self, employee: &Employee) -> f64;
}

/// Same gross amount for everybody.
#[derive(Debug, Clone, Copy)]
pub struct FlatSalary(pub f64);

impl SalaryPolicy for FlatSalary {
    fn gross_for(&self, _employee: &Employee) -> f64 {
        self.0
    }
}
