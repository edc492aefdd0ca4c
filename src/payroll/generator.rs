use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::model::employee::{EmployeeFilter, EmployeeStatus};
use crate::model::payroll::{NewPayrollItem, Payroll};
use crate::payroll::deductions::{compute_deductions, net_amount};
use crate::payroll::error::PayrollError;
use crate::payroll::store::{EmployeeDirectory, SalaryPolicy};

/// Largest gross amount accepted for a single item.
pub const MAX_GROSS_AMOUNT: f64 = 1_000_000.0;

/// Caller-supplied line: who is paid, how much, and extra deductions.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemInput {
    pub employee_id: u64,
    pub gross_amount: f64,
    pub deductions: BTreeMap<String, f64>,
}

/// Builds the full item set of a payroll without touching storage.
pub struct ItemGenerator<'a> {
    employees: &'a dyn EmployeeDirectory,
    salary: &'a dyn SalaryPolicy,
}

impl<'a> ItemGenerator<'a> {
    pub fn new(employees: &'a dyn EmployeeDirectory, salary: &'a dyn SalaryPolicy) -> Self {
        Self { employees, salary }
    }

    /// Explicit items are used as given when non-empty; otherwise every ACTIVE
    /// employee in the payroll's scope is paid according to the salary policy.
    pub async fn generate(
        &self,
        payroll: &Payroll,
        explicit: Option<Vec<ItemInput>>,
    ) -> Result<Vec<NewPayrollItem>, PayrollError> {
        let inputs = match explicit {
            Some(items) if !items.is_empty() => items,
            _ => self.select_active(payroll).await?,
        };

        let ids: Vec<u64> = inputs.iter().map(|i| i.employee_id).collect();
        let known: HashSet<u64> = self
            .employees
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|e| e.id)
            .collect();

        inputs
            .into_iter()
            .map(|input| {
                if !known.contains(&input.employee_id) {
                    return Err(PayrollError::EmployeeNotFound(input.employee_id));
                }
                price(input)
            })
            .collect()
    }

    async fn select_active(&self, payroll: &Payroll) -> Result<Vec<ItemInput>, PayrollError> {
        let filter = EmployeeFilter {
            status: Some(EmployeeStatus::Active),
            department_id: payroll.department_id,
        };

        let employees = self.employees.find_many(&filter).await?;
        if employees.is_empty() {
            return Err(PayrollError::NoEmployeesFound);
        }

        debug!(
            payroll_id = payroll.id,
            count = employees.len(),
            "Auto-selected employees"
        );

        Ok(employees
            .iter()
            .map(|employee| ItemInput {
                employee_id: employee.id,
                gross_amount: self.salary.gross_for(employee),
                deductions: BTreeMap::new(),
            })
            .collect())
    }
}

fn price(input: ItemInput) -> Result<NewPayrollItem, PayrollError> {
    if !input.gross_amount.is_finite()
        || input.gross_amount <= 0.0
        || input.gross_amount > MAX_GROSS_AMOUNT
    {
        return Err(PayrollError::InvalidGrossAmount {
            employee_id: input.employee_id,
            amount: input.gross_amount,
        });
    }

    let deductions = compute_deductions(input.gross_amount, &input.deductions);
    let net_amount = net_amount(input.gross_amount, &deductions);

    Ok(NewPayrollItem {
        employee_id: input.employee_id,
        gross_amount: input.gross_amount,
        deductions,
        net_amount,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::db::memory::InMemoryEmployeeDirectory;
    use crate::model::employee::Employee;
    use crate::model::payroll::PayrollStatus;
    use crate::payroll::store::FlatSalary;

    fn employee(id: u64, department_id: u64, status: EmployeeStatus) -> Employee {
        Employee {
            id,
            employee_code: format!("EMP-{id:03}"),
            first_name: format!("First{id}"),
            last_name: "Doe".into(),
            department_id,
            status,
        }
    }

    fn payroll(department_id: Option<u64>) -> Payroll {
        Payroll {
            id: 1,
            period_start: NaiveDate::from_ymd_opt(2024, 10, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 10, 15).unwrap(),
            department_id,
            description: None,
            status: PayrollStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn directory() -> InMemoryEmployeeDirectory {
        InMemoryEmployeeDirectory::new(vec![
            employee(1, 2, EmployeeStatus::Active),
            employee(2, 2, EmployeeStatus::Vacation),
            employee(3, 3, EmployeeStatus::Active),
            employee(4, 2, EmployeeStatus::Active),
        ])
    }

    #[actix_web::test]
    async fn explicit_items_are_priced_verbatim() {
        let employees = directory();
        let generator = ItemGenerator::new(&employees, &FlatSalary(5000.0));

        let items = generator
            .generate(
                &payroll(None),
                Some(vec![ItemInput {
                    employee_id: 2,
                    gross_amount: 60_000.0,
                    deductions: BTreeMap::from([("loan".to_string(), 500.0)]),
                }]),
            )
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.employee_id, 2);
        assert_eq!(item.deductions["igss"], 2898.0);
        assert_eq!(item.deductions["isr"], 6000.0);
        assert_eq!(item.deductions["loan"], 500.0);
        assert_eq!(item.net_amount, 50_602.0);
    }

    #[actix_web::test]
    async fn auto_selection_takes_active_employees_in_scope() {
        let employees = directory();
        let generator = ItemGenerator::new(&employees, &FlatSalary(5000.0));

        let items = generator.generate(&payroll(Some(2)), None).await.unwrap();
        let ids: Vec<u64> = items.iter().map(|i| i.employee_id).collect();
        assert_eq!(ids, vec![1, 4]);
        assert!(items.iter().all(|i| i.gross_amount == 5000.0));

        let items = generator.generate(&payroll(None), Some(vec![])).await.unwrap();
        assert_eq!(items.len(), 3);
    }

    #[actix_web::test]
    async fn empty_selection_fails() {
        let employees = directory();
        let generator = ItemGenerator::new(&employees, &FlatSalary(5000.0));

        let err = generator.generate(&payroll(Some(7)), None).await.unwrap_err();
        assert!(matches!(err, PayrollError::NoEmployeesFound));
    }

    #[actix_web::test]
    async fn explicit_items_still_need_known_employees() {
        let employees = directory();
        let generator = ItemGenerator::new(&employees, &FlatSalary(5000.0));

        let err = generator
            .generate(
                &payroll(None),
                Some(vec![
                    ItemInput {
                        employee_id: 1,
                        gross_amount: 1000.0,
                        deductions: BTreeMap::new(),
                    },
                    ItemInput {
                        employee_id: 77,
                        gross_amount: 1000.0,
                        deductions: BTreeMap::new(),
                    },
                ]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PayrollError::EmployeeNotFound(77)));
    }

    #[actix_web::test]
    async fn non_positive_gross_is_rejected() {
        let employees = directory();
        let generator = ItemGenerator::new(&employees, &FlatSalary(0.0));

        let err = generator.generate(&payroll(Some(3)), None).await.unwrap_err();
        assert!(matches!(
            err,
            PayrollError::InvalidGrossAmount { employee_id: 3, .. }
        ));
    }

    #[actix_web::test]
    async fn gross_above_cap_is_rejected() {
        let employees = directory();
        let generator = ItemGenerator::new(&employees, &FlatSalary(5000.0));
        let item = |gross_amount| ItemInput {
            employee_id: 1,
            gross_amount,
            deductions: BTreeMap::new(),
        };

        let items = generator
            .generate(&payroll(None), Some(vec![item(MAX_GROSS_AMOUNT)]))
            .await
            .unwrap();
        assert_eq!(items[0].gross_amount, MAX_GROSS_AMOUNT);

        let err = generator
            .generate(&payroll(None), Some(vec![item(MAX_GROSS_AMOUNT + 0.01)]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_GROSS_AMOUNT");
    }
}
