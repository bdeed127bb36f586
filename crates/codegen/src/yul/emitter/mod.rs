use std::fmt;

use common::diagnostics::{CompleteDiagnostic, DiagnosticVoucher};

use crate::yul::errors::YulError;

pub use module::{emit_accessors_yul, emit_program_yul, emit_storage_object};

mod function;
mod module;
mod statements;

#[derive(Debug)]
pub enum EmitModuleError {
    Storage(mir::StorageError),
    Yul(YulError),
}

impl fmt::Display for EmitModuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitModuleError::Storage(err) => write!(f, "{err}"),
            EmitModuleError::Yul(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for EmitModuleError {}

impl DiagnosticVoucher for EmitModuleError {
    fn to_complete(&self) -> CompleteDiagnostic {
        match self {
            EmitModuleError::Storage(err) => err.to_complete(),
            EmitModuleError::Yul(err) => err.to_complete(),
        }
    }
}
