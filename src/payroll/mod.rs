//! Payroll lifecycle engine.
//!
//! [`lifecycle::PayrollManager`] is the entry point. It validates new periods
//! ([`validator`]), builds line items ([`generator`], which prices each line
//! through [`deductions`]) and drives the DRAFT -> FINALIZED -> PAID status
//! machine against the ports declared in [`store`].

pub mod deductions;
pub mod error;
pub mod generator;
pub mod lifecycle;
pub mod store;
pub mod validator;

pub use error::PayrollError;
pub use lifecycle::PayrollManager;
