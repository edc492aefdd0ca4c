//! MySQL adapters for the payroll ports.
//!
//! Guarded mutations lock the payroll row with `SELECT ... FOR UPDATE` and
//! evaluate the status guard inside the same transaction, so concurrent
//! requests on one payroll are serialized by the database. Creation locks
//! the single `payroll_period_lock` row instead, so overlap checks never race.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, MySql, MySqlPool, QueryBuilder, Transaction};
use tracing::debug;

use crate::model::department::Department;
use crate::model::employee::{Employee, EmployeeFilter, EmployeeStatus};
use crate::model::payroll::{
    NewPayroll, NewPayrollItem, Payroll, PayrollAggregates, PayrollFilter, PayrollItem,
    PayrollStatus, PayrollSummary,
};
use crate::payroll::error::StoreError;
use crate::payroll::store::{
    DepartmentDirectory, EmployeeDirectory, Guarded, PayrollStore, StatusTransition,
};

const PAYROLL_COLUMNS: &str =
    "id, period_start, period_end, department_id, description, status, created_at, updated_at";

#[derive(FromRow)]
struct PayrollRow {
    id: u64,
    period_start: NaiveDate,
    period_end: NaiveDate,
    department_id: Option<u64>,
    description: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PayrollRow> for Payroll {
    type Error = StoreError;

    fn try_from(row: PayrollRow) -> Result<Self, Self::Error> {
        Ok(Payroll {
            status: parse_payroll_status(row.id, &row.status)?,
            id: row.id,
            period_start: row.period_start,
            period_end: row.period_end,
            department_id: row.department_id,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PayrollSummaryRow {
    #[sqlx(flatten)]
    payroll: PayrollRow,
    item_count: i64,
}

#[derive(FromRow)]
struct PayrollItemRow {
    id: u64,
    payroll_id: u64,
    employee_id: u64,
    gross_amount: f64,
    deductions: Json<BTreeMap<String, f64>>,
    net_amount: f64,
    created_at: DateTime<Utc>,
}

impl From<PayrollItemRow> for PayrollItem {
    fn from(row: PayrollItemRow) -> Self {
        PayrollItem {
            id: row.id,
            payroll_id: row.payroll_id,
            employee_id: row.employee_id,
            gross_amount: row.gross_amount,
            deductions: row.deductions.0,
            net_amount: row.net_amount,
            created_at: row.created_at,
        }
    }
}

fn parse_payroll_status(id: u64, raw: &str) -> Result<PayrollStatus, StoreError> {
    raw.parse().map_err(|_| StoreError::Corrupt {
        entity: "payroll",
        id,
        reason: format!("unknown status {raw:?}"),
    })
}

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    Date(NaiveDate),
    Str(String),
}

#[derive(Clone)]
pub struct MySqlPayrollStore {
    pool: MySqlPool,
}

impl MySqlPayrollStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Locks the payroll row and checks its status against `expected`.
    /// `None` means the guard passed and the lock is held by `tx`.
    async fn lock_guard(
        tx: &mut Transaction<'_, MySql>,
        payroll_id: u64,
        expected: PayrollStatus,
    ) -> Result<Option<Guarded>, StoreError> {
        let status = sqlx::query_scalar::<_, String>(
            "SELECT status FROM payrolls WHERE id = ? FOR UPDATE",
        )
        .bind(payroll_id)
        .fetch_optional(&mut **tx)
        .await?;

        let Some(raw) = status else {
            return Ok(Some(Guarded::Missing));
        };

        let status = parse_payroll_status(payroll_id, &raw)?;
        if status != expected {
            return Ok(Some(Guarded::Rejected(status)));
        }
        Ok(None)
    }

    async fn overlapping<'e, E>(
        executor: E,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Payroll>, StoreError>
    where
        E: Executor<'e, Database = MySql>,
    {
        let sql = format!(
            r#"
            SELECT {PAYROLL_COLUMNS}
            FROM payrolls
            WHERE status IN (?, ?)
              AND (
                    (period_start >= ? AND period_start <= ?)
                 OR (period_end >= ? AND period_end <= ?)
                 OR (period_start <= ? AND period_end >= ?)
              )
            ORDER BY period_start
            LIMIT 1
            "#
        );

        sqlx::query_as::<_, PayrollRow>(&sql)
            .bind(PayrollStatus::Draft.as_ref())
            .bind(PayrollStatus::Finalized.as_ref())
            .bind(start)
            .bind(end)
            .bind(start)
            .bind(end)
            .bind(start)
            .bind(end)
            .fetch_optional(executor)
            .await?
            .map(Payroll::try_from)
            .transpose()
    }
}

#[async_trait]
impl PayrollStore for MySqlPayrollStore {
    async fn insert_unless_overlapping(
        &self,
        new: NewPayroll,
    ) -> Result<Result<Payroll, u64>, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM payroll_period_lock WHERE id = 1 FOR UPDATE")
            .execute(&mut *tx)
            .await?;

        let existing = Self::overlapping(&mut *tx, new.period_start, new.period_end).await?;
        if let Some(existing) = existing {
            tx.rollback().await?;
            return Ok(Err(existing.id));
        }

        let result = sqlx::query(
            r#"
            INSERT INTO payrolls (period_start, period_end, department_id, description, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(new.period_start)
        .bind(new.period_end)
        .bind(new.department_id)
        .bind(&new.description)
        .bind(PayrollStatus::Draft.as_ref())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_id();
        let payroll = self.find_payroll(id).await?.ok_or(StoreError::Corrupt {
            entity: "payroll",
            id,
            reason: "inserted row could not be read back".to_string(),
        })?;
        Ok(Ok(payroll))
    }

    async fn find_payroll(&self, id: u64) -> Result<Option<Payroll>, StoreError> {
        let sql = format!("SELECT {PAYROLL_COLUMNS} FROM payrolls WHERE id = ?");
        sqlx::query_as::<_, PayrollRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Payroll::try_from)
            .transpose()
    }

    async fn find_items(&self, payroll_id: u64) -> Result<Vec<PayrollItem>, StoreError> {
        let rows = sqlx::query_as::<_, PayrollItemRow>(
            r#"
            SELECT id, payroll_id, employee_id, gross_amount, deductions, net_amount, created_at
            FROM payroll_items
            WHERE payroll_id = ?
            ORDER BY id
            "#,
        )
        .bind(payroll_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PayrollItem::from).collect())
    }

    async fn find_overlapping(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Payroll>, StoreError> {
        Self::overlapping(&self.pool, start, end).await
    }

    async fn list_payrolls(
        &self,
        filter: &PayrollFilter,
    ) -> Result<(Vec<PayrollSummary>, u64), StoreError> {
        let mut where_sql = String::from(" WHERE 1=1");
        let mut args: Vec<FilterValue> = Vec::new();

        if let Some(start) = filter.start_date {
            where_sql.push_str(" AND p.period_start >= ?");
            args.push(FilterValue::Date(start));
        }
        if let Some(end) = filter.end_date {
            where_sql.push_str(" AND p.period_end <= ?");
            args.push(FilterValue::Date(end));
        }
        if let Some(department_id) = filter.department_id {
            where_sql.push_str(" AND p.department_id = ?");
            args.push(FilterValue::U64(department_id));
        }
        if let Some(status) = filter.status {
            where_sql.push_str(" AND p.status = ?");
            args.push(FilterValue::Str(status.to_string()));
        }

        let count_sql = format!("SELECT COUNT(*) FROM payrolls p{where_sql}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Date(d) => count_q.bind(*d),
                FilterValue::Str(s) => count_q.bind(s.as_str()),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            r#"
            SELECT p.id, p.period_start, p.period_end, p.department_id, p.description,
                   p.status, p.created_at, p.updated_at,
                   (SELECT COUNT(*) FROM payroll_items i WHERE i.payroll_id = p.id) AS item_count
            FROM payrolls p
            {where_sql}
            ORDER BY p.period_start DESC
            LIMIT ? OFFSET ?
            "#
        );
        let mut data_q = sqlx::query_as::<_, PayrollSummaryRow>(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Date(d) => data_q.bind(d),
                FilterValue::Str(s) => data_q.bind(s),
            };
        }

        let rows = data_q
            .bind(u64::from(filter.page_size))
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        let data = rows
            .into_iter()
            .map(|row| {
                Ok(PayrollSummary {
                    item_count: row.item_count.max(0) as u64,
                    payroll: Payroll::try_from(row.payroll)?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok((data, total.max(0) as u64))
    }

    async fn aggregates(&self) -> Result<PayrollAggregates, StoreError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payrolls")
            .fetch_one(&self.pool)
            .await?;

        let finalized =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM payrolls WHERE status = ?")
                .bind(PayrollStatus::Finalized.as_ref())
                .fetch_one(&self.pool)
                .await?;

        let total_gross =
            sqlx::query_scalar::<_, Option<f64>>("SELECT SUM(gross_amount) FROM payroll_items")
                .fetch_one(&self.pool)
                .await?
                .unwrap_or(0.0);

        let rows = sqlx::query_as::<_, (u64, i64, Option<f64>)>(
            r#"
            SELECT p.department_id, COUNT(DISTINCT p.id), SUM(i.gross_amount)
            FROM payrolls p
            LEFT JOIN payroll_items i ON i.payroll_id = p.id
            WHERE p.department_id IS NOT NULL
            GROUP BY p.department_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(PayrollAggregates {
            total: total.max(0) as u64,
            finalized: finalized.max(0) as u64,
            total_gross,
            by_department: rows
                .into_iter()
                .map(|(department_id, count, gross)| {
                    (department_id, (count.max(0) as u64, gross.unwrap_or(0.0)))
                })
                .collect(),
        })
    }

    async fn replace_items(
        &self,
        payroll_id: u64,
        items: Vec<NewPayrollItem>,
    ) -> Result<Guarded, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(rejected) = Self::lock_guard(&mut tx, payroll_id, PayrollStatus::Draft).await? {
            tx.rollback().await?;
            return Ok(rejected);
        }

        let removed = sqlx::query("DELETE FROM payroll_items WHERE payroll_id = ?")
            .bind(payroll_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let inserted = items.len();
        if !items.is_empty() {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(
                "INSERT INTO payroll_items (payroll_id, employee_id, gross_amount, deductions, net_amount) ",
            );
            builder.push_values(items, |mut row, item| {
                row.push_bind(payroll_id)
                    .push_bind(item.employee_id)
                    .push_bind(item.gross_amount)
                    .push_bind(Json(item.deductions))
                    .push_bind(item.net_amount);
            });
            builder.build().execute(&mut *tx).await?;
        }

        sqlx::query("UPDATE payrolls SET updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(payroll_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(payroll_id, removed, inserted, "Payroll items replaced");
        Ok(Guarded::Applied)
    }

    async fn transition(
        &self,
        payroll_id: u64,
        transition: StatusTransition,
    ) -> Result<Guarded, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(rejected) = Self::lock_guard(&mut tx, payroll_id, transition.from).await? {
            tx.rollback().await?;
            return Ok(rejected);
        }

        if transition.require_items {
            let items = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM payroll_items WHERE payroll_id = ?",
            )
            .bind(payroll_id)
            .fetch_one(&mut *tx)
            .await?;

            if items == 0 {
                tx.rollback().await?;
                return Ok(Guarded::Empty);
            }
        }

        sqlx::query("UPDATE payrolls SET status = ? WHERE id = ?")
            .bind(transition.to.as_ref())
            .bind(payroll_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(payroll_id, from = %transition.from, to = %transition.to, "Payroll status changed");
        Ok(Guarded::Applied)
    }

    async fn delete_payroll(&self, payroll_id: u64) -> Result<Guarded, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(rejected) = Self::lock_guard(&mut tx, payroll_id, PayrollStatus::Draft).await? {
            tx.rollback().await?;
            return Ok(rejected);
        }

        sqlx::query("DELETE FROM payroll_items WHERE payroll_id = ?")
            .bind(payroll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM payrolls WHERE id = ?")
            .bind(payroll_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Guarded::Applied)
    }
}

#[derive(FromRow)]
struct EmployeeRow {
    id: u64,
    employee_code: String,
    first_name: String,
    last_name: String,
    department_id: u64,
    status: String,
}

impl TryFrom<EmployeeRow> for Employee {
    type Error = StoreError;

    fn try_from(row: EmployeeRow) -> Result<Self, Self::Error> {
        let status: EmployeeStatus = row.status.parse().map_err(|_| StoreError::Corrupt {
            entity: "employee",
            id: row.id,
            reason: format!("unknown status {:?}", row.status),
        })?;

        Ok(Employee {
            id: row.id,
            employee_code: row.employee_code,
            first_name: row.first_name,
            last_name: row.last_name,
            department_id: row.department_id,
            status,
        })
    }
}

const EMPLOYEE_SELECT: &str =
    "SELECT id, employee_code, first_name, last_name, department_id, status FROM employees";

fn into_employees(rows: Vec<EmployeeRow>) -> Result<Vec<Employee>, StoreError> {
    rows.into_iter().map(Employee::try_from).collect()
}

#[derive(Clone)]
pub struct MySqlEmployeeDirectory {
    pool: MySqlPool,
}

impl MySqlEmployeeDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EmployeeDirectory for MySqlEmployeeDirectory {
    async fn find_many(&self, filter: &EmployeeFilter) -> Result<Vec<Employee>, StoreError> {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(EMPLOYEE_SELECT);
        builder.push(" WHERE 1=1");
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.to_string());
        }
        if let Some(department_id) = filter.department_id {
            builder.push(" AND department_id = ").push_bind(department_id);
        }
        builder.push(" ORDER BY id");

        let rows = builder
            .build_query_as::<EmployeeRow>()
            .fetch_all(&self.pool)
            .await?;
        into_employees(rows)
    }

    async fn find_by_ids(&self, ids: &[u64]) -> Result<Vec<Employee>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(EMPLOYEE_SELECT);
        builder.push(" WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder
            .build_query_as::<EmployeeRow>()
            .fetch_all(&self.pool)
            .await?;
        into_employees(rows)
    }
}

#[derive(Clone)]
pub struct MySqlDepartmentDirectory {
    pool: MySqlPool,
}

impl MySqlDepartmentDirectory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DepartmentDirectory for MySqlDepartmentDirectory {
    async fn find_by_id(&self, id: u64) -> Result<Option<Department>, StoreError> {
        Ok(
            sqlx::query_as::<_, Department>("SELECT id, name FROM departments WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_all(&self) -> Result<Vec<Department>, StoreError> {
        Ok(
            sqlx::query_as::<_, Department>("SELECT id, name FROM departments ORDER BY id")
                .fetch_all(&self.pool)
                .await?,
        )
    }
}
