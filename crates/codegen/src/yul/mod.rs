mod doc;
mod emitter;
mod errors;
mod state;

pub use emitter::{EmitModuleError, emit_accessors_yul, emit_program_yul, emit_storage_object};
pub use errors::YulError;
