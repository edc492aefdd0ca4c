//! In-memory adapters used by tests. Each store operation runs under one
//! mutex, which gives the same all-or-nothing behaviour as a transaction.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use crate::model::department::Department;
use crate::model::employee::{Employee, EmployeeFilter};
use crate::model::payroll::{
    NewPayroll, NewPayrollItem, Payroll, PayrollAggregates, PayrollFilter, PayrollItem,
    PayrollStatus, PayrollSummary,
};
use crate::payroll::error::StoreError;
use crate::payroll::store::{
    DepartmentDirectory, EmployeeDirectory, Guarded, PayrollStore, StatusTransition,
};
use crate::payroll::validator::overlaps;

#[derive(Default)]
struct State {
    last_payroll_id: u64,
    last_item_id: u64,
    payrolls: BTreeMap<u64, Payroll>,
    items: BTreeMap<u64, Vec<PayrollItem>>,
}

#[derive(Default)]
pub struct InMemoryPayrollStore {
    state: Mutex<State>,
}

impl InMemoryPayrollStore {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().expect("payroll store poisoned");
        f(&mut state)
    }

    /// Sets a status directly, bypassing lifecycle guards.
    pub fn force_status(&self, id: u64, status: PayrollStatus) {
        self.with_state(|state| {
            if let Some(payroll) = state.payrolls.get_mut(&id) {
                payroll.status = status;
            }
        });
    }
}

impl State {
    fn overlapping(&self, start: NaiveDate, end: NaiveDate) -> Option<&Payroll> {
        self.payrolls
            .values()
            .find(|p| p.status.is_active() && overlaps(p.period_start, p.period_end, start, end))
    }
}

/// Looks up the payroll and checks that its status is `expected`.
fn guard(state: &State, id: u64, expected: PayrollStatus) -> Option<Guarded> {
    match state.payrolls.get(&id) {
        None => Some(Guarded::Missing),
        Some(p) if p.status != expected => Some(Guarded::Rejected(p.status)),
        Some(_) => None,
    }
}

#[async_trait]
impl PayrollStore for InMemoryPayrollStore {
    async fn insert_unless_overlapping(
        &self,
        new: NewPayroll,
    ) -> Result<Result<Payroll, u64>, StoreError> {
        Ok(self.with_state(|state| {
            if let Some(existing) = state.overlapping(new.period_start, new.period_end) {
                return Err(existing.id);
            }

            state.last_payroll_id += 1;
            let now = Utc::now();
            let payroll = Payroll {
                id: state.last_payroll_id,
                period_start: new.period_start,
                period_end: new.period_end,
                department_id: new.department_id,
                description: new.description,
                status: PayrollStatus::Draft,
                created_at: now,
                updated_at: now,
            };
            state.payrolls.insert(payroll.id, payroll.clone());
            Ok(payroll)
        }))
    }

    async fn find_payroll(&self, id: u64) -> Result<Option<Payroll>, StoreError> {
        Ok(self.with_state(|state| state.payrolls.get(&id).cloned()))
    }

    async fn find_items(&self, payroll_id: u64) -> Result<Vec<PayrollItem>, StoreError> {
        Ok(self.with_state(|state| state.items.get(&payroll_id).cloned().unwrap_or_default()))
    }

    async fn find_overlapping(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Payroll>, StoreError> {
        Ok(self.with_state(|state| state.overlapping(start, end).cloned()))
    }

    async fn list_payrolls(
        &self,
        filter: &PayrollFilter,
    ) -> Result<(Vec<PayrollSummary>, u64), StoreError> {
        Ok(self.with_state(|state| {
            let mut matching: Vec<&Payroll> = state
                .payrolls
                .values()
                .filter(|p| filter.start_date.is_none_or(|d| p.period_start >= d))
                .filter(|p| filter.end_date.is_none_or(|d| p.period_end <= d))
                .filter(|p| filter.department_id.is_none_or(|d| p.department_id == Some(d)))
                .filter(|p| filter.status.is_none_or(|s| p.status == s))
                .collect();
            matching.sort_by(|a, b| b.period_start.cmp(&a.period_start));

            let total = matching.len() as u64;
            let page = matching
                .into_iter()
                .skip(filter.offset() as usize)
                .take(filter.page_size as usize)
                .map(|p| PayrollSummary {
                    payroll: p.clone(),
                    item_count: state.items.get(&p.id).map_or(0, |i| i.len() as u64),
                })
                .collect();
            (page, total)
        }))
    }

    async fn aggregates(&self) -> Result<PayrollAggregates, StoreError> {
        Ok(self.with_state(|state| {
            let mut aggregates = PayrollAggregates {
                total: state.payrolls.len() as u64,
                ..PayrollAggregates::default()
            };

            for payroll in state.payrolls.values() {
                if payroll.status == PayrollStatus::Finalized {
                    aggregates.finalized += 1;
                }
                let gross: f64 = state
                    .items
                    .get(&payroll.id)
                    .map_or(0.0, |items| items.iter().map(|i| i.gross_amount).sum());
                aggregates.total_gross += gross;

                if let Some(department_id) = payroll.department_id {
                    let entry = aggregates
                        .by_department
                        .entry(department_id)
                        .or_insert((0, 0.0));
                    entry.0 += 1;
                    entry.1 += gross;
                }
            }
            aggregates
        }))
    }

    async fn replace_items(
        &self,
        payroll_id: u64,
        items: Vec<NewPayrollItem>,
    ) -> Result<Guarded, StoreError> {
        Ok(self.with_state(|state| {
            if let Some(rejected) = guard(state, payroll_id, PayrollStatus::Draft) {
                return rejected;
            }

            let now = Utc::now();
            let mut stored = Vec::with_capacity(items.len());
            for item in items {
                state.last_item_id += 1;
                stored.push(PayrollItem {
                    id: state.last_item_id,
                    payroll_id,
                    employee_id: item.employee_id,
                    gross_amount: item.gross_amount,
                    deductions: item.deductions,
                    net_amount: item.net_amount,
                    created_at: now,
                });
            }
            state.items.insert(payroll_id, stored);
            if let Some(payroll) = state.payrolls.get_mut(&payroll_id) {
                payroll.updated_at = now;
            }
            Guarded::Applied
        }))
    }

    async fn transition(
        &self,
        payroll_id: u64,
        transition: StatusTransition,
    ) -> Result<Guarded, StoreError> {
        Ok(self.with_state(|state| {
            if let Some(rejected) = guard(state, payroll_id, transition.from) {
                return rejected;
            }
            let has_items = state.items.get(&payroll_id).is_some_and(|i| !i.is_empty());
            if transition.require_items && !has_items {
                return Guarded::Empty;
            }

            if let Some(payroll) = state.payrolls.get_mut(&payroll_id) {
                payroll.status = transition.to;
                payroll.updated_at = Utc::now();
            }
            Guarded::Applied
        }))
    }

    async fn delete_payroll(&self, payroll_id: u64) -> Result<Guarded, StoreError> {
        Ok(self.with_state(|state| {
            if let Some(rejected) = guard(state, payroll_id, PayrollStatus::Draft) {
                return rejected;
            }
            state.items.remove(&payroll_id);
            state.payrolls.remove(&payroll_id);
            Guarded::Applied
        }))
    }
}

pub struct InMemoryEmployeeDirectory {
    employees: Vec<Employee>,
}

impl InMemoryEmployeeDirectory {
    pub fn new(employees: Vec<Employee>) -> Self {
        Self { employees }
    }
}

#[async_trait]
impl EmployeeDirectory for InMemoryEmployeeDirectory {
    async fn find_many(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, StoreError> {
        Ok(self
            .employees
            .iter()
            .filter(|e| {
                filter.status.is_none_or(|s| e.status == s)
                    && filter.department_id.is_none_or(|d| e.department_id == d)
            })
            .cloned()
            .collect())
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<Employee>, StoreError> {
        Ok(self
            .employees
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }
}

pub struct InMemoryDepartmentDirectory {
    departments: Vec<Department>,
}

impl InMemoryDepartmentDirectory {
    pub fn new(departments: Vec<Department>) -> Self {
        Self { departments }
    }
}

#[async_trait]
impl DepartmentDirectory for InMemoryDepartmentDirectory {
    async fn find_by_id(&self, id: u64) -> Result<Option<Department>, StoreError> {
        Ok(self.departments.iter().find(|d| d.id == id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Department>, StoreError> {
        Ok(self.departments.clone())
    }
}
