pub mod config;
pub mod diagnostics;

pub use config::{DEFAULT_COST_SCHEDULE, StorageConfig, parse_cost_schedule};
pub use diagnostics::{CompleteDiagnostic, DiagnosticPass, DiagnosticVoucher, Severity};
