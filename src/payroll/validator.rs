use chrono::NaiveDate;
use tracing::debug;

use crate::payroll::error::PayrollError;
use crate::payroll::store::{DepartmentDirectory, PayrollStore};

/// Closed-interval overlap between an existing period and a candidate one.
pub fn overlaps(
    existing_start: NaiveDate,
    existing_end: NaiveDate,
    start: NaiveDate,
    end: NaiveDate,
) -> bool {
    let starts_inside = existing_start >= start && existing_start <= end;
    let ends_inside = existing_end >= start && existing_end <= end;
    let contains = existing_start <= start && existing_end >= end;

    starts_inside || ends_inside || contains
}

pub struct PeriodValidator<'a> {
    payrolls: &'a dyn PayrollStore,
    departments: &'a dyn DepartmentDirectory,
}

impl<'a> PeriodValidator<'a> {
    pub fn new(payrolls: &'a dyn PayrollStore, departments: &'a dyn DepartmentDirectory) -> Self {
        Self {
            payrolls,
            departments,
        }
    }

    pub async fn validate(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        department_id: Option<u64>,
    ) -> Result<(), PayrollError> {
        if start >= end {
            return Err(PayrollError::InvalidDateRange);
        }

        if let Some(existing) = self.payrolls.find_overlapping(start, end).await? {
            debug!(existing_id = existing.id, %start, %end, "Period overlaps");
            return Err(PayrollError::OverlappingPeriod {
                existing_id: existing.id,
            });
        }

        if let Some(department_id) = department_id {
            if self.departments.find_by_id(department_id).await?.is_none() {
                return Err(PayrollError::DepartmentNotFound(department_id));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{InMemoryDepartmentDirectory, InMemoryPayrollStore};
    use crate::model::department::Department;
    use crate::model::payroll::NewPayroll;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn departments() -> InMemoryDepartmentDirectory {
        InMemoryDepartmentDirectory::new(vec![Department {
            id: 2,
            name: "Finance".into(),
        }])
    }

    async fn store_with(start: &str, end: &str) -> InMemoryPayrollStore {
        let store = InMemoryPayrollStore::default();
        store
            .insert_unless_overlapping(NewPayroll {
                period_start: date(start),
                period_end: date(end),
                department_id: None,
                description: None,
            })
            .await
            .unwrap()
            .unwrap();
        store
    }

    #[test]
    fn overlap_covers_all_three_cases() {
        let (a, b) = (date("2024-10-01"), date("2024-10-15"));

        // candidate end falls inside the existing range
        assert!(overlaps(a, b, date("2024-09-25"), date("2024-10-05")));
        // candidate start falls inside the existing range
        assert!(overlaps(a, b, date("2024-10-10"), date("2024-10-20")));
        // candidate contains existing
        assert!(overlaps(a, b, date("2024-09-01"), date("2024-11-01")));
        // existing contains candidate
        assert!(overlaps(a, b, date("2024-10-05"), date("2024-10-06")));
        // shared endpoint
        assert!(overlaps(a, b, date("2024-10-15"), date("2024-10-31")));

        assert!(!overlaps(a, b, date("2024-10-16"), date("2024-10-25")));
        assert!(!overlaps(a, b, date("2024-09-01"), date("2024-09-30")));
    }

    #[actix_web::test]
    async fn rejects_inverted_and_empty_ranges() {
        let store = InMemoryPayrollStore::default();
        let departments = departments();
        let validator = PeriodValidator::new(&store, &departments);

        let err = validator
            .validate(date("2024-10-15"), date("2024-10-01"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE_RANGE");

        let err = validator
            .validate(date("2024-10-15"), date("2024-10-15"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_DATE_RANGE");
    }

    #[actix_web::test]
    async fn rejects_overlap_with_active_payroll() {
        let store = store_with("2024-10-01", "2024-10-15").await;
        let departments = departments();
        let validator = PeriodValidator::new(&store, &departments);

        let err = validator
            .validate(date("2024-10-10"), date("2024-10-20"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PayrollError::OverlappingPeriod { existing_id: 1 }));

        validator
            .validate(date("2024-10-16"), date("2024-10-25"), None)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn paid_payrolls_do_not_block_new_periods() {
        let store = store_with("2024-10-01", "2024-10-15").await;
        store.force_status(1, crate::model::payroll::PayrollStatus::Paid);
        let departments = departments();
        let validator = PeriodValidator::new(&store, &departments);

        validator
            .validate(date("2024-10-01"), date("2024-10-15"), None)
            .await
            .unwrap();
    }

    #[actix_web::test]
    async fn unknown_department_is_rejected() {
        let store = InMemoryPayrollStore::default();
        let departments = departments();
        let validator = PeriodValidator::new(&store, &departments);

        let err = validator
            .validate(date("2024-10-01"), date("2024-10-15"), Some(99))
            .await
            .unwrap_err();
        assert!(matches!(err, PayrollError::DepartmentNotFound(99)));

        validator
            .validate(date("2024-10-01"), date("2024-10-15"), Some(2))
            .await
            .unwrap();
    }
}
