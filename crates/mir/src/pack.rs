//! Packed-word extraction and insertion.
//!
//! The routines are written once against [`WordOps`] and used both to compute
//! values directly ([`Eval`]) and to emit operations into an accessor body.
//! Sharing one routine keeps generated code and host-side evaluation in step.

use alloy_primitives::U256;

use crate::ir::{self, BinOp, UnOp};
use crate::layout::{ScalarLayout, WORD_SIZE_BYTES};

/// Word arithmetic over either concrete values or emitted operands.
pub trait WordOps {
    type Word: Clone;

    fn constant(&mut self, value: U256) -> Self::Word;
    fn bin(&mut self, op: BinOp, lhs: Self::Word, rhs: Self::Word) -> Self::Word;
    fn un(&mut self, op: UnOp, arg: Self::Word) -> Self::Word;
    fn sign_extend(&mut self, byte: u8, arg: Self::Word) -> Self::Word;
}

/// Evaluates word operations on concrete values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Eval;

impl WordOps for Eval {
    type Word = U256;

    fn constant(&mut self, value: U256) -> U256 {
        value
    }

    fn bin(&mut self, op: BinOp, lhs: U256, rhs: U256) -> U256 {
        op.apply(lhs, rhs)
    }

    fn un(&mut self, op: UnOp, arg: U256) -> U256 {
        op.apply(arg)
    }

    fn sign_extend(&mut self, byte: u8, arg: U256) -> U256 {
        ir::sign_extend(byte, arg)
    }
}

/// All-ones mask covering the low `width_bytes` bytes.
pub fn mask(width_bytes: u8) -> U256 {
    if width_bytes >= WORD_SIZE_BYTES {
        U256::MAX
    } else {
        (U256::from(1) << (width_bytes as usize * 8)) - U256::from(1)
    }
}

/// Reads the scalar stored at byte `offset` of `word`.
pub fn extract<W: WordOps>(
    w: &mut W,
    word: W::Word,
    offset: W::Word,
    layout: ScalarLayout,
) -> W::Word {
    let eight = w.constant(U256::from(8));
    let bits = w.bin(BinOp::Mul, offset, eight);
    let shifted = w.bin(BinOp::Shr, word, bits);
    clean(w, shifted, layout)
}

/// Returns `word` with the byte range of a `layout` scalar at `offset`
/// replaced by `value`. Bytes outside that range are preserved exactly.
pub fn insert<W: WordOps>(
    w: &mut W,
    word: W::Word,
    offset: W::Word,
    layout: ScalarLayout,
    value: W::Word,
) -> W::Word {
    let eight = w.constant(U256::from(8));
    let bits = w.bin(BinOp::Mul, offset, eight);
    let field_mask = w.constant(mask(layout.width_bytes));
    let placed_mask = w.bin(BinOp::Shl, field_mask.clone(), bits.clone());
    let keep_mask = w.un(UnOp::Not, placed_mask);
    let kept = w.bin(BinOp::And, word, keep_mask);
    let narrowed = w.bin(BinOp::And, value, field_mask);
    let placed = w.bin(BinOp::Shl, narrowed, bits);
    w.bin(BinOp::Or, kept, placed)
}

/// Normalizes `value` to a `layout` scalar: high bits are cleared, or filled
/// with the sign bit for signed scalars.
pub fn clean<W: WordOps>(w: &mut W, value: W::Word, layout: ScalarLayout) -> W::Word {
    if layout.is_full_word() {
        return value;
    }
    if layout.signed {
        w.sign_extend(layout.width_bytes - 1, value)
    } else {
        let field_mask = w.constant(mask(layout.width_bytes));
        w.bin(BinOp::And, value, field_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(width_bytes: u8, signed: bool) -> ScalarLayout {
        ScalarLayout {
            width_bytes,
            signed,
        }
    }

    fn put(word: U256, offset: u8, layout: ScalarLayout, value: U256) -> U256 {
        insert(&mut Eval, word, U256::from(offset), layout, value)
    }

    fn get(word: U256, offset: u8, layout: ScalarLayout) -> U256 {
        extract(&mut Eval, word, U256::from(offset), layout)
    }

    #[test]
    fn insert_preserves_neighbouring_bytes() {
        let uint8 = scalar(1, false);
        let uint16 = scalar(2, false);
        let word = put(U256::MAX, 3, uint16, U256::ZERO);
        assert_eq!(word, U256::MAX ^ (U256::from(0xffff) << 24));
        assert_eq!(get(word, 2, uint8), U256::from(0xff));
        assert_eq!(get(word, 5, uint8), U256::from(0xff));
        assert_eq!(get(word, 3, uint16), U256::ZERO);
    }

    #[test]
    fn oversized_values_are_truncated_on_insert() {
        let uint8 = scalar(1, false);
        let word = put(U256::ZERO, 31, uint8, U256::from(0x1234));
        assert_eq!(word, U256::from(0x34) << 248);
        assert_eq!(get(word, 31, uint8), U256::from(0x34));
    }

    #[test]
    fn signed_values_round_trip_through_a_packed_slot() {
        let int16 = scalar(2, true);
        let minus_two = U256::MAX - U256::from(1);
        let word = put(U256::ZERO, 4, int16, minus_two);
        assert_eq!(word, U256::from(0xfffe) << 32);
        assert_eq!(get(word, 4, int16), minus_two);
    }

    #[test]
    fn full_words_pass_through() {
        let uint256 = scalar(32, false);
        assert_eq!(mask(32), U256::MAX);
        assert_eq!(put(U256::from(9), 0, uint256, U256::MAX), U256::MAX);
        assert_eq!(get(U256::MAX, 0, uint256), U256::MAX);
        assert_eq!(clean(&mut Eval, U256::MAX, scalar(32, true)), U256::MAX);
    }
}
