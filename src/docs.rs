use crate::api::payroll::{
    CreatePayroll, DeletePayrollResponse, GenerateItem, GeneratePayroll, PayrollListQuery,
};
use crate::model::employee::EmployeeSummary;
use crate::model::payroll::{
    DepartmentPayrollStats, Payroll, PayrollDetail, PayrollItem, PayrollLine, PayrollPage,
    PayrollStats, PayrollStatus, PayrollSummary, PayrollTotals,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Payroll API",
        version = "1.0.0",
        description = r#"
## Payroll lifecycle

Payroll periods move through a fixed set of states:

- **DRAFT**: created with `POST /payroll`; items can be (re)generated any number of times
- **FINALIZED**: reached with `/finalize`; items are frozen and the payroll can no longer be deleted
- **PAID**: reached with `/pay` once settlement has happened

Active periods (DRAFT or FINALIZED) never overlap. Every item carries the statutory
deductions `igss` (4.83%) and `isr` (0%, 5%, 10% or 15% of the whole gross amount) plus any
custom deductions, and its net amount is always recomputed from them.

### 🔐 Security
Every endpoint requires a **JWT Bearer** access token. HR and Admin users manage payrolls;
only Admin users may mark them paid or delete them.

### ⚠️ Errors
Failures are returned as `{"error": {"code": "...", "message": "..."}}` with a stable `code`
such as `OVERLAPPING_PERIOD` or `PAYROLL_NOT_EDITABLE`.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::payroll::create_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::payroll_stats,
        crate::api::payroll::get_payroll,
        crate::api::payroll::generate_items,
        crate::api::payroll::finalize_payroll,
        crate::api::payroll::mark_paid,
        crate::api::payroll::delete_payroll
    ),
    components(
        schemas(
            CreatePayroll,
            GenerateItem,
            GeneratePayroll,
            PayrollListQuery,
            DeletePayrollResponse,
            EmployeeSummary,
            Payroll,
            PayrollStatus,
            PayrollItem,
            PayrollLine,
            PayrollTotals,
            PayrollDetail,
            PayrollSummary,
            PayrollPage,
            DepartmentPayrollStats,
            PayrollStats
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payroll", description = "Payroll lifecycle APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
