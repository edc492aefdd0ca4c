use thiserror::Error;

/// Failures raised by storage adapters.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt {entity} row {id}: {reason}")]
    Corrupt {
        entity: &'static str,
        id: u64,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    StateConflict,
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("period start must be before period end")]
    InvalidDateRange,

    #[error("period overlaps payroll {existing_id}")]
    OverlappingPeriod { existing_id: u64 },

    #[error("department {0} not found")]
    DepartmentNotFound(u64),

    #[error("gross amount {amount} for employee {employee_id} must be a positive number")]
    InvalidGrossAmount { employee_id: u64, amount: f64 },

    #[error("description exceeds {max} characters")]
    InvalidDescription { max: usize },

    #[error("payroll {0} not found")]
    PayrollNotFound(u64),

    #[error("employee {0} not found")]
    EmployeeNotFound(u64),

    #[error("payroll {0} is not in draft and cannot be edited")]
    PayrollNotEditable(u64),

    #[error("payroll {0} is already finalized")]
    PayrollAlreadyFinalized(u64),

    #[error("payroll {0} is not in draft and cannot be deleted")]
    PayrollNotDeletable(u64),

    #[error("payroll {0} must be finalized before it is paid")]
    PayrollNotPayable(u64),

    #[error("payroll {0} has no items")]
    NoPayrollItems(u64),

    #[error("no active employees match the payroll scope")]
    NoEmployeesFound,

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl PayrollError {
    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            PayrollError::InvalidDateRange => "INVALID_DATE_RANGE",
            PayrollError::OverlappingPeriod { .. } => "OVERLAPPING_PERIOD",
            PayrollError::DepartmentNotFound(_) => "DEPARTMENT_NOT_FOUND",
            PayrollError::InvalidGrossAmount { .. } => "INVALID_GROSS_AMOUNT",
            PayrollError::InvalidDescription { .. } => "INVALID_DESCRIPTION",
            PayrollError::PayrollNotFound(_) => "PAYROLL_NOT_FOUND",
            PayrollError::EmployeeNotFound(_) => "EMPLOYEE_NOT_FOUND",
            PayrollError::PayrollNotEditable(_) => "PAYROLL_NOT_EDITABLE",
            PayrollError::PayrollAlreadyFinalized(_) => "PAYROLL_ALREADY_FINALIZED",
            PayrollError::PayrollNotDeletable(_) => "PAYROLL_NOT_DELETABLE",
            PayrollError::PayrollNotPayable(_) => "PAYROLL_NOT_PAYABLE",
            PayrollError::NoPayrollItems(_) => "NO_PAYROLL_ITEMS",
            PayrollError::NoEmployeesFound => "NO_EMPLOYEES_FOUND",
            PayrollError::Storage(_) => "STORAGE_ERROR",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            PayrollError::InvalidDateRange
            | PayrollError::OverlappingPeriod { .. }
            | PayrollError::DepartmentNotFound(_)
            | PayrollError::InvalidGrossAmount { .. }
            | PayrollError::InvalidDescription { .. } => ErrorClass::Validation,

            PayrollError::PayrollNotFound(_) | PayrollError::EmployeeNotFound(_) => {
                ErrorClass::NotFound
            }

            PayrollError::PayrollNotEditable(_)
            | PayrollError::PayrollAlreadyFinalized(_)
            | PayrollError::PayrollNotDeletable(_)
            | PayrollError::PayrollNotPayable(_)
            | PayrollError::NoPayrollItems(_)
            | PayrollError::NoEmployeesFound => ErrorClass::StateConflict,

            PayrollError::Storage(_) => ErrorClass::Infrastructure,
        }
    }

    /// Only infrastructure failures are worth a transparent retry.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Infrastructure
    }
}
