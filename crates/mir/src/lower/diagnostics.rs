use common::diagnostics::{
    CompleteDiagnostic, DiagnosticPass, DiagnosticVoucher, ErrorCode, Severity,
};

use super::{AccessorError, AccessorErrorKind, StorageError};

impl DiagnosticVoucher for AccessorError {
    fn to_complete(&self) -> CompleteDiagnostic {
        let local_code = match self.reason {
            AccessorErrorKind::UnknownField => 1,
            AccessorErrorKind::UnknownMember(_) => 2,
            AccessorErrorKind::StepMismatch { .. } => 3,
            AccessorErrorKind::KindMismatch { .. } => 4,
            AccessorErrorKind::DuplicateName(_) => 5,
        };
        CompleteDiagnostic::new(
            Severity::Error,
            self.to_string(),
            self.location.clone(),
            ErrorCode::new(DiagnosticPass::AccessorGen, local_code),
        )
    }
}

impl DiagnosticVoucher for StorageError {
    fn to_complete(&self) -> CompleteDiagnostic {
        match self {
            StorageError::Layout(err) => err.to_complete(),
            StorageError::Accessor(err) => err.to_complete(),
        }
    }
}
