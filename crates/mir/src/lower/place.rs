use alloy_primitives::U256;

use super::AccessorLowerer;
use crate::ir::{BinOp, BodyBuilder, Operand, RuntimeFailure};
use crate::layout::{
    DynamicArrayLayout, ElementStride, MappingLayout, MemberLayout, PackedRowLayout, StorageLayout,
};
use crate::pack::{self, WordOps};

/// A value addressed by an accessor: its first slot, the byte offset within
/// that slot and its layout.
#[derive(Debug, Clone, Copy)]
pub(super) struct Located<'l> {
    pub(super) slot: Operand,
    pub(super) offset: Operand,
    pub(super) layout: &'l StorageLayout,
}

impl AccessorLowerer<'_> {
    pub(super) fn member<'l>(&mut self, base: Operand, member: &'l MemberLayout) -> Located<'l> {
        Located {
            slot: self.builder.add(base, Operand::Const(member.slot)),
            offset: Operand::Const(U256::from(member.offset)),
            layout: &member.layout,
        }
    }

    pub(super) fn row_element<'l>(
        &mut self,
        base: Operand,
        row: &'l PackedRowLayout,
        index: Operand,
    ) -> Located<'l> {
        let length = Operand::Const(U256::from(row.length));
        let in_bounds = self.builder.bin(BinOp::Lt, index, length);
        self.builder.check(in_bounds, RuntimeFailure::OutOfBounds);
        let (slot, offset) = element_position(&mut self.builder, base, &row.stride, index);
        Located {
            slot,
            offset,
            layout: &row.element,
        }
    }

    /// Addresses element `index` of the dynamic array whose length word is at
    /// `header`, halting with `failure` unless `index < length`.
    pub(super) fn array_element<'l>(
        &mut self,
        header: Operand,
        array: &'l DynamicArrayLayout,
        index: Operand,
        length: Operand,
        failure: RuntimeFailure,
    ) -> Located<'l> {
        let in_bounds = self.builder.bin(BinOp::Lt, index, length);
        self.builder.check(in_bounds, failure);
        let elements = self.builder.keccak(vec![header]);
        let (slot, offset) = element_position(&mut self.builder, elements, &array.stride, index);
        Located {
            slot,
            offset,
            layout: &array.element,
        }
    }

    pub(super) fn mapping_value<'l>(
        &mut self,
        header: Operand,
        mapping: &'l MappingLayout,
        key: Operand,
    ) -> Located<'l> {
        let key_word = pack::clean(&mut self.builder, key, mapping.key);
        Located {
            slot: self.builder.keccak(vec![header, key_word]),
            offset: Operand::Const(U256::ZERO),
            layout: &mapping.value,
        }
    }
}

/// Slot and byte offset of element `index` of an array whose elements start
/// at `base`. Performs no bound check.
pub(super) fn element_position(
    builder: &mut BodyBuilder,
    base: Operand,
    stride: &ElementStride,
    index: Operand,
) -> (Operand, Operand) {
    if stride.is_packed() {
        let per_slot = Operand::Const(U256::from(stride.elements_per_slot));
        let row = builder.bin(BinOp::Div, index, per_slot);
        let slot = builder.add(base, row);
        let column = builder.bin(BinOp::Mod, index, per_slot);
        let offset = builder.bin(
            BinOp::Mul,
            column,
            Operand::Const(U256::from(stride.element_bytes)),
        );
        (slot, offset)
    } else {
        let distance = builder.bin(
            BinOp::Mul,
            index,
            Operand::Const(stride.slots_per_element),
        );
        (builder.add(base, distance), Operand::Const(U256::ZERO))
    }
}
