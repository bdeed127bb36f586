//! Storage layout and storage accessor generation.
//!
//! Fields are laid out by [`allocate`], classified by [`StorageLayout`] and
//! lowered into [`Accessor`]s: parametrized sequences of [`StorageOp`]s that
//! the Yul backend renders and the test harness executes.

pub mod alloc;
pub mod cost;
pub mod fmt;
pub mod hash;
pub mod ir;
pub mod layout;
mod lower;
pub mod pack;
pub mod report;
pub mod ty;

pub use alloc::{FieldLayout, LayoutError, StorageLayoutMap, allocate};
pub use common::config::CURRENT_LAYOUT_VERSION as LAYOUT_VERSION;
pub use cost::{Access, CostModel, SstoreCost};
pub use ir::{
    AccessPath, Accessor, AccessorKind, BinOp, Operand, Param, ParamKind, PathStep,
    RuntimeFailure, StorageOp, UnOp, ValueId,
};
pub use layout::{InvalidInput, ScalarLayout, StorageLayout};
pub use lower::{
    AccessorError, AccessorErrorKind, AccessorResult, StorageError, StorageProgram,
    lower_accessor, lower_program, lower_storage_accessors,
};
pub use report::LayoutReport;
pub use ty::{FieldDecl, StructField, TypeDescriptor, parse_field_decls};
