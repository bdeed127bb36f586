//! Slot allocation for stored fields.
//!
//! Fields are placed strictly in declaration order by a single cursor, which
//! is why allocation of one program cannot be split up or reordered.

use std::fmt;

use alloy_primitives::U256;
use common::diagnostics::{
    CompleteDiagnostic, DiagnosticPass, DiagnosticVoucher, ErrorCode, Severity, SourceLocation,
};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::layout::{InvalidInput, StorageLayout, WORD_SIZE_BYTES};
use crate::ty::{FieldDecl, TypeDescriptor};

/// Allocation cursor shared by top-level fields and struct members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotCursor {
    slot: U256,
    offset: u8,
}

impl Default for SlotCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotCursor {
    pub fn new() -> Self {
        Self {
            slot: U256::ZERO,
            offset: 0,
        }
    }

    /// Returns the `(slot, offset)` assigned to a value of `layout` and
    /// advances past it.
    pub fn place(&mut self, layout: &StorageLayout) -> Result<(U256, u8), InvalidInput> {
        if layout.is_packable() {
            let width = layout.storage_bytes();
            if self.offset + width > WORD_SIZE_BYTES {
                self.close_slot()?;
            }
            let placed = (self.slot, self.offset);
            self.offset += width;
            return Ok(placed);
        }

        // Structs and containers never share a slot with a neighbour.
        if self.offset > 0 {
            self.close_slot()?;
        }
        let placed = (self.slot, 0);
        self.slot = self
            .slot
            .checked_add(layout.slot_count())
            .ok_or(InvalidInput::StorageExhausted)?;
        Ok(placed)
    }

    /// Total number of slots consumed so far, counting a partly used slot.
    pub fn finish(mut self) -> Result<U256, InvalidInput> {
        if self.offset > 0 {
            self.close_slot()?;
        }
        Ok(self.slot)
    }

    fn close_slot(&mut self) -> Result<(), InvalidInput> {
        self.slot = self
            .slot
            .checked_add(U256::from(1))
            .ok_or(InvalidInput::StorageExhausted)?;
        self.offset = 0;
        Ok(())
    }
}

/// The binding of one top-level field to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: SmolStr,
    pub slot: U256,
    pub offset: u8,
    pub ty: TypeDescriptor,
    pub layout: StorageLayout,
    pub location: Option<SourceLocation>,
}

/// Layouts of all stored fields of a program, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageLayoutMap {
    fields: IndexMap<SmolStr, FieldLayout>,
    slots_used: U256,
}

impl StorageLayoutMap {
    pub fn get(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldLayout> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of root slots occupied by the fields.
    pub fn slots_used(&self) -> U256 {
        self.slots_used
    }
}

/// A field whose descriptor cannot be laid out. Fails the whole program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutError {
    pub field: SmolStr,
    pub reason: InvalidInput,
    pub location: Option<SourceLocation>,
    /// Location of the earlier declaration for duplicate names.
    pub previous: Option<SourceLocation>,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid storage layout input for field `{}`: {}",
            self.field, self.reason
        )
    }
}

impl std::error::Error for LayoutError {}

impl DiagnosticVoucher for LayoutError {
    fn to_complete(&self) -> CompleteDiagnostic {
        let local_code = match self.reason {
            InvalidInput::ZeroWidthScalar => 1,
            InvalidInput::OversizedScalar(_) => 2,
            InvalidInput::ZeroLengthArray => 3,
            InvalidInput::EmptyStruct => 4,
            InvalidInput::DuplicateName(_) => 5,
            InvalidInput::NonScalarMappingKey(_) => 6,
            InvalidInput::StorageExhausted => 7,
        };
        let diag = CompleteDiagnostic::new(
            Severity::Error,
            self.to_string(),
            self.location.clone(),
            ErrorCode::new(DiagnosticPass::StorageLayout, local_code),
        );
        match &self.previous {
            Some(previous) => diag.with_note("previously declared here", Some(previous.clone())),
            None => diag,
        }
    }
}

/// Assigns every field a `(slot, offset)` in declaration order.
///
/// Either every field is laid out or the first offending field is reported;
/// no partial layout is ever returned.
pub fn allocate(fields: &[FieldDecl]) -> Result<StorageLayoutMap, LayoutError> {
    let mut cursor = SlotCursor::new();
    let mut placed: IndexMap<SmolStr, FieldLayout> = IndexMap::with_capacity(fields.len());

    for decl in fields {
        let fail = |reason: InvalidInput, previous: Option<SourceLocation>| LayoutError {
            field: decl.name.clone(),
            reason,
            location: decl.location.clone(),
            previous,
        };

        if let Some(existing) = placed.get(&decl.name) {
            return Err(fail(
                InvalidInput::DuplicateName(decl.name.clone()),
                existing.location.clone(),
            ));
        }

        let layout = StorageLayout::from_ty(&decl.ty).map_err(|reason| fail(reason, None))?;
        let (slot, offset) = cursor.place(&layout).map_err(|reason| fail(reason, None))?;
        tracing::debug!(
            target: "storage_layout",
            field = %decl.name,
            %slot,
            offset,
            kind = layout.kind_name(),
            "placed field"
        );

        placed.insert(
            decl.name.clone(),
            FieldLayout {
                name: decl.name.clone(),
                slot,
                offset,
                ty: decl.ty.clone(),
                layout,
                location: decl.location.clone(),
            },
        );
    }

    let slots_used = cursor.finish().map_err(|reason| LayoutError {
        field: placed.keys().last().cloned().unwrap_or_default(),
        reason,
        location: None,
        previous: None,
    })?;

    Ok(StorageLayoutMap {
        fields: placed,
        slots_used,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::parse_field_decls;

    fn layout_of(text: &str) -> StorageLayoutMap {
        allocate(&parse_field_decls("test.fe", text).unwrap()).unwrap()
    }

    fn positions(map: &StorageLayoutMap) -> Vec<(&str, u64, u8)> {
        map.iter()
            .map(|field| (field.name.as_str(), field.slot.to::<u64>(), field.offset))
            .collect()
    }

    #[test]
    fn empty_field_list_uses_no_slots() {
        let map = allocate(&[]).unwrap();
        assert!(map.is_empty());
        assert_eq!(map.slots_used(), U256::ZERO);
    }

    #[test]
    fn scalars_pack_until_the_slot_is_full() {
        let map = layout_of(
            "uint128 a\n\
             uint64 b\n\
             uint64 c\n\
             uint8 d\n\
             uint256 e\n\
             bool f\n",
        );
        assert_eq!(
            positions(&map),
            vec![
                ("a", 0, 0),
                ("b", 0, 16),
                ("c", 0, 24),
                ("d", 1, 0),
                ("e", 2, 0),
                ("f", 3, 0),
            ]
        );
        assert_eq!(map.slots_used(), U256::from(4));
    }

    #[test]
    fn structs_and_containers_start_and_end_fresh_slots() {
        let map = layout_of(
            "uint8 a\n\
             struct { uint8 x; uint8 y; } s\n\
             uint8 b\n\
             uint256[] xs\n\
             uint8 c\n\
             mapping(address => uint256) m\n\
             uint16[3] row\n\
             uint8 d\n",
        );
        assert_eq!(
            positions(&map),
            vec![
                ("a", 0, 0),
                ("s", 1, 0),
                ("b", 2, 0),
                ("xs", 3, 0),
                ("c", 4, 0),
                ("m", 5, 0),
                ("row", 6, 0),
                ("d", 7, 0),
            ]
        );
        assert_eq!(map.slots_used(), U256::from(8));
    }

    #[test]
    fn multi_slot_values_advance_the_cursor() {
        let map = layout_of(
            "struct { uint256 a; uint256 b; uint8 c; } s\n\
             uint8[65] bytes\n\
             uint8 after\n",
        );
        assert_eq!(
            positions(&map),
            vec![("s", 0, 0), ("bytes", 3, 0), ("after", 6, 0)]
        );
    }

    #[test]
    fn layouts_are_a_pure_function_of_the_declarations() {
        let text = "uint8 a\nmapping(uint8 => uint8[]) m\nint16[5] r\n";
        assert_eq!(layout_of(text), layout_of(text));
    }

    #[test]
    fn duplicate_fields_point_at_both_declarations() {
        let decls = parse_field_decls("dup.fe", "uint8 a\nuint16 a\n").unwrap();
        let err = allocate(&decls).unwrap_err();
        assert_eq!(err.reason, InvalidInput::DuplicateName("a".into()));
        let diag = err.to_complete();
        assert_eq!(diag.error_code, ErrorCode::new(DiagnosticPass::StorageLayout, 5));
        assert_eq!(diag.location, Some(SourceLocation::new("dup.fe", 8, 16)));
        assert_eq!(
            diag.sub_diagnostics[0].location,
            Some(SourceLocation::new("dup.fe", 0, 7))
        );
    }

    #[test]
    fn invalid_field_fails_the_whole_unit() {
        let decls = vec![
            FieldDecl::new("ok", TypeDescriptor::uint(8)),
            FieldDecl::new(
                "bad",
                TypeDescriptor::Scalar {
                    width_bytes: 40,
                    signed: false,
                },
            ),
            FieldDecl::new("later", TypeDescriptor::uint(8)),
        ];
        let err = allocate(&decls).unwrap_err();
        assert_eq!(err.field, "bad");
        assert_eq!(err.reason, InvalidInput::OversizedScalar(40));
        assert_eq!(err.to_complete().severity, Severity::Error);
    }
}
