use std::fmt;

use common::diagnostics::{
    CompleteDiagnostic, DiagnosticPass, DiagnosticVoucher, ErrorCode, Severity,
};
use mir::ValueId;

/// Errors that can happen while emitting Yul.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YulError {
    /// Raised when an operation reads a value that is not in scope.
    UndefinedValue { function: String, value: ValueId },
    /// Raised for operation shapes the Yul backend does not support.
    Unsupported(String),
}

impl fmt::Display for YulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YulError::UndefinedValue { function, value } => {
                write!(f, "`{value}` is used before it is defined in `{function}`")
            }
            YulError::Unsupported(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for YulError {}

impl DiagnosticVoucher for YulError {
    fn to_complete(&self) -> CompleteDiagnostic {
        let local_code = match self {
            YulError::UndefinedValue { .. } => 1,
            YulError::Unsupported(_) => 2,
        };
        CompleteDiagnostic::new(
            Severity::Error,
            self.to_string(),
            None,
            ErrorCode::new(DiagnosticPass::YulEmit, local_code),
        )
    }
}
