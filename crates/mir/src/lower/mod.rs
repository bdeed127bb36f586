//! Accessor lowering: turns an access path into a parametrized sequence of
//! storage operations. Address computation and bound checks live in
//! [`place`], whole-value deletion in [`clear`].

use std::{error::Error, fmt};

use common::diagnostics::SourceLocation;
use rustc_hash::FxHashSet;
use smol_str::SmolStr;

use crate::alloc::{LayoutError, StorageLayoutMap, allocate};
use crate::ir::{
    AccessPath, Accessor, AccessorKind, BinOp, BodyBuilder, Operand, ParamKind, PathStep,
    RuntimeFailure,
};
use crate::layout::StorageLayout;
use crate::pack::{self, WordOps};
use crate::ty::FieldDecl;

mod clear;
mod diagnostics;
mod place;

use place::Located;

/// An accessor request that does not match the layout it addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessorError {
    pub path: AccessPath,
    pub reason: AccessorErrorKind,
    /// Declaration of the root field, when it exists.
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessorErrorKind {
    UnknownField,
    UnknownMember(SmolStr),
    StepMismatch {
        step: &'static str,
        found: &'static str,
    },
    KindMismatch {
        kind: AccessorKind,
        found: &'static str,
    },
    /// Two paths of one program render to the same accessor name.
    DuplicateName(String),
}

impl fmt::Display for AccessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            AccessorErrorKind::UnknownField => {
                write!(f, "no stored field named `{}`", self.path.root)
            }
            AccessorErrorKind::UnknownMember(member) => {
                write!(f, "`{}` has no member `{member}`", self.path)
            }
            AccessorErrorKind::StepMismatch { step, found } => {
                write!(f, "cannot {step} a {found} in `{}`", self.path)
            }
            AccessorErrorKind::KindMismatch { kind, found } => {
                write!(f, "no `{kind}` accessor for `{}`: it is a {found}", self.path)
            }
            AccessorErrorKind::DuplicateName(name) => {
                write!(f, "accessor `{name}` for `{}` is already defined", self.path)
            }
        }
    }
}

impl Error for AccessorError {}

pub type AccessorResult<T> = Result<T, AccessorError>;

/// Failure of a whole compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    Layout(LayoutError),
    Accessor(AccessorError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Layout(err) => write!(f, "{err}"),
            StorageError::Accessor(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StorageError {}

impl From<LayoutError> for StorageError {
    fn from(err: LayoutError) -> Self {
        StorageError::Layout(err)
    }
}

impl From<AccessorError> for StorageError {
    fn from(err: AccessorError) -> Self {
        StorageError::Accessor(err)
    }
}

/// Laid out fields of one program and the accessors generated for them.
#[derive(Debug, Clone)]
pub struct StorageProgram {
    pub layouts: StorageLayoutMap,
    pub accessors: Vec<Accessor>,
}

impl StorageProgram {
    pub fn accessor(&self, name: &str) -> Option<&Accessor> {
        self.accessors.iter().find(|accessor| accessor.name == name)
    }
}

/// Lays out `fields` and lowers their complete accessor set. Either every
/// accessor is produced or the unit fails as a whole.
pub fn lower_program(fields: &[FieldDecl]) -> Result<StorageProgram, StorageError> {
    let layouts = allocate(fields)?;
    let accessors = lower_storage_accessors(&layouts)?;
    Ok(StorageProgram { layouts, accessors })
}

/// Lowers one accessor of `kind` for the value reached through `path`.
///
/// Every index step is bound checked against the live length (dynamic arrays)
/// or the static length (fixed arrays) before its element is addressed.
pub fn lower_accessor(
    layouts: &StorageLayoutMap,
    path: &AccessPath,
    kind: AccessorKind,
) -> AccessorResult<Accessor> {
    let field = layouts.get(&path.root).ok_or_else(|| AccessorError {
        path: path.clone(),
        reason: AccessorErrorKind::UnknownField,
        location: None,
    })?;

    let mut lowerer = AccessorLowerer {
        builder: BodyBuilder::new(),
        path,
        location: field.location.clone(),
    };
    let mut target = Located {
        slot: Operand::Const(field.slot),
        offset: Operand::Const(alloy_primitives::U256::from(field.offset)),
        layout: &field.layout,
    };
    for step in &path.steps {
        target = lowerer.step(target, step)?;
    }
    let accessor = lowerer.finish(target, kind)?;

    tracing::debug!(
        target: "accessor",
        name = %accessor.name,
        ops = accessor.body.len(),
        "lowered accessor"
    );
    Ok(accessor)
}

/// Lowers the complete accessor set of every field: `read`/`write` for each
/// reachable scalar, `length`/`grow`/`shrink` for arrays and `clear` for each
/// root that is not a mapping.
///
/// Accessor names must be unique within the set; a clash is an
/// [`AccessorErrorKind::DuplicateName`] on the later path.
pub fn lower_storage_accessors(layouts: &StorageLayoutMap) -> AccessorResult<Vec<Accessor>> {
    let mut requests = Vec::new();
    for field in layouts.iter() {
        let root = AccessPath::root(field.name.clone());
        collect_requests(&field.layout, &root, &mut requests);
        if !matches!(field.layout, StorageLayout::Mapping(_)) {
            requests.push((root, AccessorKind::Clear));
        }
    }

    let mut names = FxHashSet::default();
    let mut accessors = Vec::with_capacity(requests.len());
    for (path, kind) in &requests {
        let accessor = lower_accessor(layouts, path, *kind)?;
        if !names.insert(accessor.name.clone()) {
            return Err(AccessorError {
                path: path.clone(),
                reason: AccessorErrorKind::DuplicateName(accessor.name),
                location: layouts.get(&path.root).and_then(|field| field.location.clone()),
            });
        }
        accessors.push(accessor);
    }
    Ok(accessors)
}

fn collect_requests(
    layout: &StorageLayout,
    path: &AccessPath,
    out: &mut Vec<(AccessPath, AccessorKind)>,
) {
    match layout {
        StorageLayout::Scalar(_) => {
            out.push((path.clone(), AccessorKind::Read));
            out.push((path.clone(), AccessorKind::Write));
        }
        StorageLayout::PackedRow(row) => {
            out.push((path.clone(), AccessorKind::Length));
            collect_requests(&row.element, &path.clone().index(), out);
        }
        StorageLayout::DynamicArray(array) => {
            for kind in [AccessorKind::Length, AccessorKind::Grow, AccessorKind::Shrink] {
                out.push((path.clone(), kind));
            }
            collect_requests(&array.element, &path.clone().index(), out);
        }
        StorageLayout::Mapping(mapping) => {
            collect_requests(&mapping.value, &path.clone().key(), out);
        }
        StorageLayout::Struct(strukt) => {
            for member in &strukt.members {
                collect_requests(&member.layout, &path.clone().member(member.name.clone()), out);
            }
        }
    }
}

struct AccessorLowerer<'a> {
    builder: BodyBuilder,
    path: &'a AccessPath,
    location: Option<SourceLocation>,
}

impl<'a> AccessorLowerer<'a> {
    fn error(&self, reason: AccessorErrorKind) -> AccessorError {
        AccessorError {
            path: self.path.clone(),
            reason,
            location: self.location.clone(),
        }
    }

    fn step<'l>(&mut self, target: Located<'l>, step: &PathStep) -> AccessorResult<Located<'l>> {
        let mismatch = |this: &Self, step: &'static str| {
            this.error(AccessorErrorKind::StepMismatch {
                step,
                found: target.layout.kind_name(),
            })
        };
        match (step, target.layout) {
            (PathStep::Member(name), StorageLayout::Struct(strukt)) => {
                let member = strukt
                    .member(name)
                    .ok_or_else(|| self.error(AccessorErrorKind::UnknownMember(name.clone())))?;
                Ok(self.member(target.slot, member))
            }
            (PathStep::Index, StorageLayout::PackedRow(row)) => {
                let index = self.builder.param(ParamKind::Index);
                Ok(self.row_element(target.slot, row, index))
            }
            (PathStep::Index, StorageLayout::DynamicArray(array)) => {
                let index = self.builder.param(ParamKind::Index);
                let length = self.builder.sload(target.slot);
                Ok(self.array_element(
                    target.slot,
                    array,
                    index,
                    length,
                    RuntimeFailure::OutOfBounds,
                ))
            }
            (PathStep::Key, StorageLayout::Mapping(mapping)) => {
                let key = self.builder.param(ParamKind::Key(mapping.key));
                Ok(self.mapping_value(target.slot, mapping, key))
            }
            (PathStep::Member(_), _) => Err(mismatch(self, "access a member of")),
            (PathStep::Index, _) => Err(mismatch(self, "index")),
            (PathStep::Key, _) => Err(mismatch(self, "look up a key in")),
        }
    }

    fn finish(mut self, target: Located<'_>, kind: AccessorKind) -> AccessorResult<Accessor> {
        let mismatch = |this: &Self| {
            this.error(AccessorErrorKind::KindMismatch {
                kind,
                found: target.layout.kind_name(),
            })
        };
        let mut result_layout = None;
        let returns = match (kind, target.layout) {
            (AccessorKind::Read, StorageLayout::Scalar(scalar)) => {
                let word = self.builder.sload(target.slot);
                vec![pack::extract(&mut self.builder, word, target.offset, *scalar)]
            }
            (AccessorKind::Write, StorageLayout::Scalar(scalar)) => {
                let value = self.builder.param(ParamKind::Value(*scalar));
                self.store_scalar(&target, *scalar, value);
                vec![]
            }
            (AccessorKind::Length, StorageLayout::DynamicArray(_)) => {
                vec![self.builder.sload(target.slot)]
            }
            (AccessorKind::Length, StorageLayout::PackedRow(row)) => {
                vec![Operand::Const(alloy_primitives::U256::from(row.length))]
            }
            (AccessorKind::Grow, StorageLayout::DynamicArray(array)) => {
                let length = self.builder.sload(target.slot);
                let grown = self
                    .builder
                    .add(length, Operand::Const(alloy_primitives::U256::from(1)));
                self.builder.sstore(target.slot, grown);
                let elements = self.builder.keccak(vec![target.slot]);
                let (slot, offset) =
                    place::element_position(&mut self.builder, elements, &array.stride, length);
                result_layout = Some(array.element.as_ref().clone());
                vec![slot, offset]
            }
            (AccessorKind::Shrink, StorageLayout::DynamicArray(array)) => {
                let length = self.builder.sload(target.slot);
                let last = self
                    .builder
                    .bin(BinOp::Sub, length, Operand::Const(alloy_primitives::U256::from(1)));
                let element = self.array_element(
                    target.slot,
                    array,
                    last,
                    length,
                    RuntimeFailure::EmptyArrayPop,
                );
                clear::clear_value(&mut self.builder, element.slot, element.offset, element.layout);
                self.builder.sstore(target.slot, last);
                vec![]
            }
            (AccessorKind::Clear, StorageLayout::Mapping(_)) => return Err(mismatch(&self)),
            (AccessorKind::Clear, layout) => {
                clear::clear_value(&mut self.builder, target.slot, target.offset, layout);
                vec![]
            }
            _ => return Err(mismatch(&self)),
        };

        let name = format!("{}_{}", kind, self.path.symbol());
        Ok(self.builder.finish(name, kind, returns, result_layout))
    }

    fn store_scalar(
        &mut self,
        target: &Located<'_>,
        scalar: crate::layout::ScalarLayout,
        value: Operand,
    ) {
        if scalar.is_full_word() {
            self.builder.sstore(target.slot, value);
            return;
        }
        let word = self.builder.sload(target.slot);
        let merged = pack::insert(&mut self.builder, word, target.offset, scalar, value);
        self.builder.sstore(target.slot, merged);
    }
}
