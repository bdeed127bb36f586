//! Module-level Yul emission helpers (functions + panic helpers + object).

use std::collections::BTreeSet;

use mir::{Accessor, FieldDecl, lower_program};

use crate::yul::doc::{YulDoc, join_lines, render_docs};

use super::{EmitModuleError, YulError, function::FunctionEmitter, statements::panic_helper_name};

/// Selector of `Panic(uint256)`.
const PANIC_SELECTOR: &str = "0x4e487b71";

/// Emits Yul for every accessor, followed by the panic helpers they call.
///
/// * `accessors` - Lowered accessors, emitted in order.
///
/// Returns the Yul function definitions separated by blank lines, or the
/// first [`YulError`] raised while rendering.
pub fn emit_accessors_yul(accessors: &[Accessor]) -> Result<String, YulError> {
    let docs = accessor_docs(accessors)?;
    let mut lines = Vec::new();
    render_docs(&docs, 0, &mut lines);
    Ok(join_lines(lines))
}

/// Wraps the accessors of a storage layout into a Yul `object` named `name`.
pub fn emit_storage_object(name: &str, accessors: &[Accessor]) -> Result<String, YulError> {
    let code = YulDoc::block("code ", accessor_docs(accessors)?);
    let object = YulDoc::block(format!("object \"{name}\" "), vec![code]);
    let mut lines = Vec::new();
    render_docs(&[object], 0, &mut lines);
    Ok(join_lines(lines))
}

/// Allocates `fields`, lowers the complete accessor set and emits it as a
/// Yul object.
pub fn emit_program_yul(name: &str, fields: &[FieldDecl]) -> Result<String, EmitModuleError> {
    let program = lower_program(fields).map_err(EmitModuleError::Storage)?;
    tracing::debug!(
        target: "yul",
        object = name,
        accessors = program.accessors.len(),
        "emitting storage object"
    );
    emit_storage_object(name, &program.accessors).map_err(EmitModuleError::Yul)
}

fn accessor_docs(accessors: &[Accessor]) -> Result<Vec<YulDoc>, YulError> {
    let mut docs = Vec::new();
    let mut panic_codes = BTreeSet::new();
    for accessor in accessors {
        let (doc, codes) = FunctionEmitter::new(accessor).emit_doc()?;
        docs.push(doc);
        docs.push(YulDoc::line(""));
        panic_codes.extend(codes);
    }
    for code in panic_codes {
        docs.push(panic_helper(code));
        docs.push(YulDoc::line(""));
    }
    // Trailing separator.
    docs.pop();
    Ok(docs)
}

fn panic_helper(code: u8) -> YulDoc {
    YulDoc::block(
        format!("function {}() ", panic_helper_name(code)),
        vec![
            YulDoc::line(format!("mstore(0, shl(224, {PANIC_SELECTOR}))")),
            YulDoc::line(format!("mstore(4, {code:#04x})")),
            YulDoc::line("revert(0, 0x24)"),
        ],
    )
}

#[cfg(test)]
mod tests {
    use mir::{AccessPath, AccessorKind, allocate, lower_accessor, parse_field_decls};

    use super::*;

    #[test]
    fn helpers_follow_the_functions_that_raise() {
        let layouts = allocate(&parse_field_decls("m.fe", "uint256[3] row\n").unwrap()).unwrap();
        let read =
            lower_accessor(&layouts, &AccessPath::root("row").index(), AccessorKind::Read).unwrap();
        let yul = emit_accessors_yul(&[read]).unwrap();
        assert_eq!(
            yul,
            "function read_row$i(v0) -> ret0 {\n\
             \x20 let v1 := lt(v0, 3)\n\
             \x20 if iszero(v1) {\n\
             \x20   panic_error_0x32()\n\
             \x20 }\n\
             \x20 let v2 := sload(v0)\n\
             \x20 ret0 := v2\n\
             }\n\
             \n\
             function panic_error_0x32() {\n\
             \x20 mstore(0, shl(224, 0x4e487b71))\n\
             \x20 mstore(4, 0x32)\n\
             \x20 revert(0, 0x24)\n\
             }"
        );
    }

    #[test]
    fn layout_errors_surface_from_program_emission() {
        let fields = parse_field_decls("m.fe", "uint256 a\nuint256 a\n").unwrap();
        assert!(matches!(
            emit_program_yul("S", &fields),
            Err(EmitModuleError::Storage(_))
        ));
    }
}
