//! Accessor pretty-printing utilities.

use std::fmt::Write;

use crate::ir::{Accessor, Operand, ParamKind, StorageOp};
use crate::layout::ScalarLayout;

/// Format a list of accessors as a human-readable string.
pub fn format_accessors(accessors: &[Accessor]) -> String {
    let mut out = String::new();
    for accessor in accessors {
        out.push_str(&format_accessor(accessor));
        out.push('\n');
    }
    out
}

/// Format a single accessor.
pub fn format_accessor(accessor: &Accessor) -> String {
    let params: Vec<String> = accessor
        .params
        .iter()
        .map(|param| format!("{}: {}", param.value, format_param_kind(&param.kind)))
        .collect();
    let mut out = format!("fn {}({}):\n", accessor.name, params.join(", "));
    format_ops(&mut out, &accessor.body, 1);

    let returns = format_operands(&accessor.returns);
    if returns.is_empty() {
        out.push_str("  ret\n");
    } else {
        let _ = writeln!(out, "  ret {returns}");
    }
    out
}

fn format_ops(out: &mut String, ops: &[StorageOp], depth: usize) {
    for op in ops {
        let indent = "  ".repeat(depth);
        let _ = match op {
            StorageOp::Sload { dest, slot } => writeln!(out, "{indent}{dest} = sload {slot}"),
            StorageOp::Sstore { slot, value } => writeln!(out, "{indent}sstore {slot}, {value}"),
            StorageOp::Keccak { dest, words } => {
                writeln!(out, "{indent}{dest} = keccak256({})", format_operands(words))
            }
            StorageOp::Bin { dest, op, lhs, rhs } => {
                writeln!(out, "{indent}{dest} = {} {lhs}, {rhs}", op.as_str())
            }
            StorageOp::Un { dest, op, arg } => {
                writeln!(out, "{indent}{dest} = {} {arg}", op.as_str())
            }
            StorageOp::SignExtend { dest, byte, arg } => {
                writeln!(out, "{indent}{dest} = signextend {byte}, {arg}")
            }
            StorageOp::Check { cond, failure } => writeln!(
                out,
                "{indent}check {cond} else panic({:#04x})",
                failure.panic_code()
            ),
            StorageOp::Loop { index, count, body } => {
                let _ = writeln!(out, "{indent}loop {index} < {count}:");
                format_ops(out, body, depth + 1);
                Ok(())
            }
        };
    }
}

fn format_operands(operands: &[Operand]) -> String {
    operands
        .iter()
        .map(Operand::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_param_kind(kind: &ParamKind) -> String {
    match kind {
        ParamKind::Index => "index".into(),
        ParamKind::Key(scalar) => format!("key {}", format_scalar(*scalar)),
        ParamKind::Value(scalar) => format!("value {}", format_scalar(*scalar)),
    }
}

fn format_scalar(scalar: ScalarLayout) -> String {
    let prefix = if scalar.signed { "int" } else { "uint" };
    format!("{prefix}{}", scalar.width_bytes as u32 * 8)
}
