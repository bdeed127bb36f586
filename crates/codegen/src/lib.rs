//! Yul rendering of storage accessors.

mod yul;

pub use yul::{EmitModuleError, YulError, emit_accessors_yul, emit_program_yul, emit_storage_object};
