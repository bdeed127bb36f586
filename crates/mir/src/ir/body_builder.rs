use alloy_primitives::U256;

use super::{
    Accessor, AccessorKind, BinOp, Operand, Param, ParamKind, RuntimeFailure, StorageOp, UnOp,
    ValueId, sign_extend,
};
use crate::layout::StorageLayout;
use crate::pack::WordOps;

/// Incrementally builds the body of one accessor.
///
/// Arithmetic on constant operands is folded instead of emitted.
#[derive(Debug)]
pub struct BodyBuilder {
    next_value: u32,
    params: Vec<Param>,
    // Innermost open loop body last; the accessor body is at index 0.
    scopes: Vec<Vec<StorageOp>>,
}

impl BodyBuilder {
    pub fn new() -> Self {
        Self {
            next_value: 0,
            params: Vec::new(),
            scopes: vec![Vec::new()],
        }
    }

    pub fn param(&mut self, kind: ParamKind) -> Operand {
        let value = self.fresh();
        self.params.push(Param { value, kind });
        Operand::Value(value)
    }

    fn fresh(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    fn push(&mut self, op: StorageOp) {
        self.scopes
            .last_mut()
            .expect("builder always has an open scope")
            .push(op);
    }

    pub fn sload(&mut self, slot: Operand) -> Operand {
        let dest = self.fresh();
        self.push(StorageOp::Sload { dest, slot });
        Operand::Value(dest)
    }

    pub fn sstore(&mut self, slot: Operand, value: Operand) {
        self.push(StorageOp::Sstore { slot, value });
    }

    pub fn keccak(&mut self, words: Vec<Operand>) -> Operand {
        let dest = self.fresh();
        self.push(StorageOp::Keccak { dest, words });
        Operand::Value(dest)
    }

    /// Halts with `failure` unless `cond` is nonzero. Checks on a constant
    /// nonzero condition are dropped.
    pub fn check(&mut self, cond: Operand, failure: RuntimeFailure) {
        if matches!(cond, Operand::Const(value) if !value.is_zero()) {
            return;
        }
        self.push(StorageOp::Check { cond, failure });
    }

    /// Emits a loop running `body` for every index in `0..count`.
    pub fn repeat(&mut self, count: Operand, body: impl FnOnce(&mut Self, Operand)) {
        match count {
            Operand::Const(n) if n.is_zero() => {}
            Operand::Const(n) if n == U256::from(1) => body(self, Operand::Const(U256::ZERO)),
            _ => {
                let index = self.fresh();
                self.scopes.push(Vec::new());
                body(self, Operand::Value(index));
                let ops = self.scopes.pop().expect("loop scope was pushed above");
                self.push(StorageOp::Loop {
                    index,
                    count,
                    body: ops,
                });
            }
        }
    }

    pub fn add(&mut self, lhs: Operand, rhs: Operand) -> Operand {
        self.bin(BinOp::Add, lhs, rhs)
    }

    pub fn finish(
        mut self,
        name: String,
        kind: AccessorKind,
        returns: Vec<Operand>,
        result_layout: Option<StorageLayout>,
    ) -> Accessor {
        debug_assert_eq!(self.scopes.len(), 1, "unterminated loop scope");
        let body = self.scopes.swap_remove(0);
        Accessor {
            name,
            kind,
            params: self.params,
            body,
            returns,
            result_layout,
            value_count: self.next_value,
        }
    }
}

impl Default for BodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WordOps for BodyBuilder {
    type Word = Operand;

    fn constant(&mut self, value: U256) -> Operand {
        Operand::Const(value)
    }

    fn bin(&mut self, op: BinOp, lhs: Operand, rhs: Operand) -> Operand {
        if let (Operand::Const(lhs), Operand::Const(rhs)) = (lhs, rhs) {
            return Operand::Const(op.apply(lhs, rhs));
        }
        let zero = Operand::Const(U256::ZERO);
        let one = Operand::Const(U256::from(1));
        match op {
            BinOp::Add | BinOp::Or if rhs == zero => return lhs,
            BinOp::Add | BinOp::Or if lhs == zero => return rhs,
            BinOp::Sub | BinOp::Shl | BinOp::Shr if rhs == zero => return lhs,
            BinOp::Mul | BinOp::Div if rhs == one => return lhs,
            BinOp::Mul if lhs == one => return rhs,
            BinOp::Mul | BinOp::And if lhs == zero || rhs == zero => return zero,
            BinOp::Shl | BinOp::Shr | BinOp::Div | BinOp::Mod if lhs == zero => return zero,
            BinOp::And if rhs == Operand::Const(U256::MAX) => return lhs,
            _ => {}
        }
        let dest = self.fresh();
        self.push(StorageOp::Bin { dest, op, lhs, rhs });
        Operand::Value(dest)
    }

    fn un(&mut self, op: UnOp, arg: Operand) -> Operand {
        if let Operand::Const(arg) = arg {
            return Operand::Const(op.apply(arg));
        }
        let dest = self.fresh();
        self.push(StorageOp::Un { dest, op, arg });
        Operand::Value(dest)
    }

    fn sign_extend(&mut self, byte: u8, arg: Operand) -> Operand {
        if let Operand::Const(arg) = arg {
            return Operand::Const(sign_extend(byte, arg));
        }
        let dest = self.fresh();
        self.push(StorageOp::SignExtend { dest, byte, arg });
        Operand::Value(dest)
    }
}
