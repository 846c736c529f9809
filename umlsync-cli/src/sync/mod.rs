//! Reconciliation of a model partition into an external repository

mod diff;
mod engine;
mod export;
mod mapping;
mod options;
mod report;
mod tags;
mod version;

pub use diff::{FieldChange, diff_fields};
pub use engine::{reconcile, reconcile_repository};
pub use export::{export_report_csv, write_report_csv};
pub use mapping::ExternalMapping;
pub use options::{ReconcileOptions, TagStrategy, VersionStep};
pub use report::{Action, BatchFailure, ReconciliationReport, ReportEntry};
pub use tags::plan_tags;
pub use version::{INITIAL_VERSION, bump};
