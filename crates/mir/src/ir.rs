use std::fmt;

use alloy_primitives::U256;
use smol_str::SmolStr;

use crate::layout::{ScalarLayout, StorageLayout};

mod body_builder;

pub use body_builder::BodyBuilder;

/// A named storage accessor: a parametrized sequence of storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    pub name: String,
    pub kind: AccessorKind,
    pub params: Vec<Param>,
    pub body: Vec<StorageOp>,
    pub returns: Vec<Operand>,
    /// Layout of the element a `grow` accessor made room for.
    pub result_layout: Option<StorageLayout>,
    pub(crate) value_count: u32,
}

impl Accessor {
    /// Number of distinct values defined by params and operations.
    pub fn value_count(&self) -> u32 {
        self.value_count
    }

    /// Visits every operation, including those nested in loops, in order.
    pub fn walk_ops(&self, f: &mut impl FnMut(&StorageOp)) {
        fn walk(ops: &[StorageOp], f: &mut impl FnMut(&StorageOp)) {
            for op in ops {
                f(op);
                if let StorageOp::Loop { body, .. } = op {
                    walk(body, f);
                }
            }
        }
        walk(&self.body, f);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    Read,
    Write,
    Length,
    Grow,
    Shrink,
    Clear,
}

impl AccessorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessorKind::Read => "read",
            AccessorKind::Write => "write",
            AccessorKind::Length => "length",
            AccessorKind::Grow => "grow",
            AccessorKind::Shrink => "shrink",
            AccessorKind::Clear => "clear",
        }
    }
}

impl fmt::Display for AccessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub value: ValueId,
    pub kind: ParamKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    /// Array index.
    Index,
    /// Mapping key, cleaned to the key type before hashing.
    Key(ScalarLayout),
    /// Value to store.
    Value(ScalarLayout),
}

/// Dense identifier of a value defined inside one accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Value(ValueId),
    Const(U256),
}

impl Operand {
    pub fn as_const(self) -> Option<U256> {
        match self {
            Operand::Const(value) => Some(value),
            Operand::Value(_) => None,
        }
    }
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Operand::Value(value)
    }
}

impl From<U256> for Operand {
    fn from(value: U256) -> Self {
        Operand::Const(value)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(value) => write!(f, "{value}"),
            Operand::Const(value) if *value < U256::from(1u64 << 16) => write!(f, "{value}"),
            Operand::Const(value) => write!(f, "0x{value:x}"),
        }
    }
}

/// Abstract storage-machine operation.
///
/// Operations are not executed here; they are consumed by the Yul renderer,
/// the cost model and the reference interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageOp {
    /// `dest = storage[slot]`
    Sload { dest: ValueId, slot: Operand },
    /// `storage[slot] = value`
    Sstore { slot: Operand, value: Operand },
    /// `dest = keccak256(words[0] ++ words[1] ++ ...)`, each word 32 bytes big-endian.
    Keccak { dest: ValueId, words: Vec<Operand> },
    Bin {
        dest: ValueId,
        op: BinOp,
        lhs: Operand,
        rhs: Operand,
    },
    Un {
        dest: ValueId,
        op: UnOp,
        arg: Operand,
    },
    /// Sign-extends `arg` from its byte `byte` (0 is the least significant).
    SignExtend {
        dest: ValueId,
        byte: u8,
        arg: Operand,
    },
    /// Halts execution with `failure` unless `cond` is nonzero.
    Check {
        cond: Operand,
        failure: RuntimeFailure,
    },
    /// Runs `body` with `index` bound to `0..count`.
    Loop {
        index: ValueId,
        count: Operand,
        body: Vec<StorageOp>,
    },
}

impl StorageOp {
    pub fn dest(&self) -> Option<ValueId> {
        match self {
            StorageOp::Sload { dest, .. }
            | StorageOp::Keccak { dest, .. }
            | StorageOp::Bin { dest, .. }
            | StorageOp::Un { dest, .. }
            | StorageOp::SignExtend { dest, .. } => Some(*dest),
            StorageOp::Loop { index, .. } => Some(*index),
            StorageOp::Sstore { .. } | StorageOp::Check { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    /// `lhs << rhs`
    Shl,
    /// `lhs >> rhs`
    Shr,
    Lt,
}

impl BinOp {
    /// Storage-machine semantics: wrapping arithmetic, division by zero
    /// yields zero, shifts by 256 or more yield zero.
    pub fn apply(self, lhs: U256, rhs: U256) -> U256 {
        match self {
            BinOp::Add => lhs.wrapping_add(rhs),
            BinOp::Sub => lhs.wrapping_sub(rhs),
            BinOp::Mul => lhs.wrapping_mul(rhs),
            BinOp::Div => lhs.checked_div(rhs).unwrap_or(U256::ZERO),
            BinOp::Mod => lhs.checked_rem(rhs).unwrap_or(U256::ZERO),
            BinOp::And => lhs & rhs,
            BinOp::Or => lhs | rhs,
            BinOp::Shl => match shift_amount(rhs) {
                Some(bits) => lhs << bits,
                None => U256::ZERO,
            },
            BinOp::Shr => match shift_amount(rhs) {
                Some(bits) => lhs >> bits,
                None => U256::ZERO,
            },
            BinOp::Lt => U256::from((lhs < rhs) as u8),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Mod => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Shl => "shl",
            BinOp::Shr => "shr",
            BinOp::Lt => "lt",
        }
    }
}

fn shift_amount(bits: U256) -> Option<usize> {
    if bits < U256::from(256) {
        Some(bits.to::<usize>())
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Not,
    IsZero,
}

impl UnOp {
    pub fn apply(self, arg: U256) -> U256 {
        match self {
            UnOp::Not => !arg,
            UnOp::IsZero => U256::from(arg.is_zero() as u8),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UnOp::Not => "not",
            UnOp::IsZero => "iszero",
        }
    }
}

/// `SIGNEXTEND` semantics.
pub fn sign_extend(byte: u8, value: U256) -> U256 {
    if byte >= 31 {
        return value;
    }
    let sign_bit = byte as usize * 8 + 7;
    let low_mask = (U256::from(1) << (sign_bit + 1)) - U256::from(1);
    if value.bit(sign_bit) {
        value | !low_mask
    } else {
        value & low_mask
    }
}

/// Reason a compiled program halts at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFailure {
    /// Index at or past the live length.
    OutOfBounds,
    /// Shrinking an array of length zero.
    EmptyArrayPop,
}

impl RuntimeFailure {
    /// Panic code reported to the caller of the compiled program.
    pub fn panic_code(self) -> u8 {
        match self {
            RuntimeFailure::OutOfBounds => 0x32,
            RuntimeFailure::EmptyArrayPop => 0x31,
        }
    }
}

impl fmt::Display for RuntimeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFailure::OutOfBounds => write!(f, "index out of bounds"),
            RuntimeFailure::EmptyArrayPop => write!(f, "shrink of an empty array"),
        }
    }
}

/// Field name, index or key steps leading from a root field to a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPath {
    pub root: SmolStr,
    pub steps: Vec<PathStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Member(SmolStr),
    Index,
    Key,
}

impl AccessPath {
    pub fn root(name: impl Into<SmolStr>) -> Self {
        Self {
            root: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn member(mut self, name: impl Into<SmolStr>) -> Self {
        self.steps.push(PathStep::Member(name.into()));
        self
    }

    pub fn index(mut self) -> Self {
        self.steps.push(PathStep::Index);
        self
    }

    pub fn key(mut self) -> Self {
        self.steps.push(PathStep::Key);
        self
    }

    /// Yul identifier rendering, e.g. `balances$k.items$i`.
    ///
    /// Members follow a `.` and index/key steps render as `$i`/`$k`. Declared
    /// names never contain either character, so distinct paths never share a
    /// symbol.
    pub fn symbol(&self) -> String {
        let mut out = self.root.to_string();
        for step in &self.steps {
            match step {
                PathStep::Member(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                PathStep::Index => out.push_str("$i"),
                PathStep::Key => out.push_str("$k"),
            }
        }
        out
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                PathStep::Member(name) => write!(f, ".{name}")?,
                PathStep::Index => write!(f, "[i]")?,
                PathStep::Key => write!(f, "[k]")?,
            }
        }
        Ok(())
    }
}
