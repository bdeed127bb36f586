//! Helpers for lowering storage operations into Yul docs.
//!
//! Each operation that defines a value becomes a `let` binding; nothing is
//! inlined, so the output mirrors the operation sequence one to one.

use mir::{BinOp, StorageOp};

use crate::yul::{doc::YulDoc, state::BlockState};

use super::{YulError, function::FunctionEmitter};

/// Scratch memory used for hashing: two words at `0x00` and `0x20`.
const SCRATCH_WORDS: usize = 2;

impl FunctionEmitter<'_> {
    /// Lowers a sequence of storage operations into Yul docs.
    ///
    /// * `ops` - Operations of the current block.
    /// * `state` - Values in scope; extended with every value defined here.
    ///
    /// Returns all emitted Yul statements.
    pub(super) fn render_ops(
        &mut self,
        ops: &[StorageOp],
        state: &mut BlockState,
    ) -> Result<Vec<YulDoc>, YulError> {
        let mut docs = Vec::new();
        for op in ops {
            self.emit_op(&mut docs, op, state)?;
        }
        Ok(docs)
    }

    fn emit_op(
        &mut self,
        docs: &mut Vec<YulDoc>,
        op: &StorageOp,
        state: &mut BlockState,
    ) -> Result<(), YulError> {
        match op {
            StorageOp::Sload { dest, slot } => {
                let slot = self.operand(*slot, state)?;
                let dest = state.define(*dest);
                docs.push(YulDoc::line(format!("let {dest} := sload({slot})")));
            }
            StorageOp::Sstore { slot, value } => {
                let slot = self.operand(*slot, state)?;
                let value = self.operand(*value, state)?;
                docs.push(YulDoc::line(format!("sstore({slot}, {value})")));
            }
            StorageOp::Keccak { dest, words } => {
                if words.len() > SCRATCH_WORDS {
                    return Err(YulError::Unsupported(format!(
                        "cannot hash {} words in scratch space",
                        words.len()
                    )));
                }
                for (idx, word) in words.iter().enumerate() {
                    let word = self.operand(*word, state)?;
                    docs.push(YulDoc::line(format!("mstore({:#04x}, {word})", idx * 32)));
                }
                let dest = state.define(*dest);
                docs.push(YulDoc::line(format!(
                    "let {dest} := keccak256(0x00, {:#04x})",
                    words.len() * 32
                )));
            }
            StorageOp::Bin { dest, op, lhs, rhs } => {
                let lhs = self.operand(*lhs, state)?;
                let rhs = self.operand(*rhs, state)?;
                let dest = state.define(*dest);
                // Yul shifts take the shift amount first.
                let expr = match op {
                    BinOp::Shl | BinOp::Shr => format!("{}({rhs}, {lhs})", op.as_str()),
                    _ => format!("{}({lhs}, {rhs})", op.as_str()),
                };
                docs.push(YulDoc::line(format!("let {dest} := {expr}")));
            }
            StorageOp::Un { dest, op, arg } => {
                let arg = self.operand(*arg, state)?;
                let dest = state.define(*dest);
                docs.push(YulDoc::line(format!("let {dest} := {}({arg})", op.as_str())));
            }
            StorageOp::SignExtend { dest, byte, arg } => {
                let arg = self.operand(*arg, state)?;
                let dest = state.define(*dest);
                docs.push(YulDoc::line(format!("let {dest} := signextend({byte}, {arg})")));
            }
            StorageOp::Check { cond, failure } => {
                let cond = self.operand(*cond, state)?;
                let code = failure.panic_code();
                self.panic_codes.insert(code);
                docs.push(YulDoc::block(
                    format!("if iszero({cond}) "),
                    vec![YulDoc::line(format!("{}()", panic_helper_name(code)))],
                ));
            }
            StorageOp::Loop { index, count, body } => {
                let count = self.operand(*count, state)?;
                let mut body_state = state.clone();
                let index = body_state.define(*index);
                let body = self.render_ops(body, &mut body_state)?;
                let header = format!(
                    "for {{ let {index} := 0 }} lt({index}, {count}) \
                     {{ {index} := add({index}, 1) }} "
                );
                docs.push(YulDoc::block(header, body));
            }
        }
        Ok(())
    }
}

pub(super) fn panic_helper_name(code: u8) -> String {
    format!("panic_error_{code:#04x}")
}
