use alloy_primitives::U256;

use super::place::element_position;
use crate::ir::{BinOp, BodyBuilder, Operand};
use crate::layout::{ElementStride, StorageLayout};
use crate::pack::{self, WordOps};

/// Word counts up to this bound are zeroed with straight-line stores.
const UNROLL_LIMIT: u64 = 4;

/// Emits operations resetting the value at `(slot, offset)` to all zeroes.
///
/// Packed scalars are cleared in place without touching their neighbours.
/// Dynamic arrays have each live element cleared before the length word is
/// reset; mapping entries cannot be enumerated and are left as they are.
pub(super) fn clear_value(
    builder: &mut BodyBuilder,
    slot: Operand,
    offset: Operand,
    layout: &StorageLayout,
) {
    let zero = Operand::Const(U256::ZERO);
    match layout {
        StorageLayout::Scalar(scalar) if scalar.is_full_word() => builder.sstore(slot, zero),
        StorageLayout::Scalar(scalar) => {
            let word = builder.sload(slot);
            let cleared = pack::insert(builder, word, offset, *scalar, zero);
            builder.sstore(slot, cleared);
        }
        StorageLayout::Mapping(_) => {}
        StorageLayout::DynamicArray(array) => {
            let length = builder.sload(slot);
            let elements = builder.keccak(vec![slot]);
            clear_elements(builder, elements, &array.element, &array.stride, length);
            builder.sstore(slot, zero);
        }
        StorageLayout::PackedRow(row) => {
            let length = Operand::Const(U256::from(row.length));
            clear_elements(builder, slot, &row.element, &row.stride, length);
        }
        StorageLayout::Struct(strukt) if !layout.needs_deep_clear() => {
            zero_words(builder, slot, Operand::Const(strukt.slots));
        }
        StorageLayout::Struct(strukt) => {
            for member in &strukt.members {
                let member_slot = builder.add(slot, Operand::Const(member.slot));
                let member_offset = Operand::Const(U256::from(member.offset));
                clear_value(builder, member_slot, member_offset, &member.layout);
            }
        }
    }
}

fn clear_elements(
    builder: &mut BodyBuilder,
    base: Operand,
    element: &StorageLayout,
    stride: &ElementStride,
    length: Operand,
) {
    if element.needs_deep_clear() {
        builder.repeat(length, |builder, index| {
            let (slot, offset) = element_position(builder, base, stride, index);
            clear_value(builder, slot, offset, element);
        });
        return;
    }

    let words = if stride.is_packed() {
        let per_slot = stride.elements_per_slot;
        let rounded = builder.add(length, Operand::Const(U256::from(per_slot - 1)));
        builder.bin(BinOp::Div, rounded, Operand::Const(U256::from(per_slot)))
    } else {
        builder.bin(BinOp::Mul, length, Operand::Const(stride.slots_per_element))
    };
    zero_words(builder, base, words);
}

fn zero_words(builder: &mut BodyBuilder, base: Operand, count: Operand) {
    let zero = Operand::Const(U256::ZERO);
    match count.as_const() {
        Some(n) if n <= U256::from(UNROLL_LIMIT) => {
            for i in 0..n.to::<u64>() {
                let slot = builder.add(base, Operand::Const(U256::from(i)));
                builder.sstore(slot, zero);
            }
        }
        _ => builder.repeat(count, |builder, index| {
            let slot = builder.add(base, index);
            builder.sstore(slot, zero);
        }),
    }
}
