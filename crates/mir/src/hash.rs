//! Hashed addressing for dynamically sized containers.
//!
//! These formulas decide where existing data lives. They are part of the
//! persistent-data compatibility surface (see `LAYOUT_VERSION`) and must stay
//! bit-for-bit identical for a given layout version.
//!
//! Collisions between unrelated bases are possible in principle and accepted;
//! their probability is bounded by the 256-bit hash width.

use std::fmt;

use alloy_primitives::{U256, keccak256};

use crate::layout::ScalarLayout;

/// Base slot of the elements of a dynamic array whose length word is stored
/// at `parent`.
///
/// The base does not depend on the length, so resizing never moves elements.
pub fn array_element_base(parent: U256) -> U256 {
    U256::from_be_bytes(keccak256(parent.to_be_bytes::<32>()).0)
}

/// Base slot of the value stored under `key` in a mapping whose header is at
/// `parent`. The hashed preimage is the parent slot followed by the key bytes.
pub fn mapping_value_base(parent: U256, key: &[u8]) -> U256 {
    let mut preimage = Vec::with_capacity(32 + key.len());
    preimage.extend_from_slice(&parent.to_be_bytes::<32>());
    preimage.extend_from_slice(key);
    U256::from_be_bytes(keccak256(&preimage).0)
}

/// Encodes a scalar mapping key as the 32-byte word it is hashed as.
///
/// Bits above the key width are cleared, or set for negative signed keys.
pub fn key_word(key: U256, layout: ScalarLayout) -> [u8; 32] {
    let mut eval = crate::pack::Eval;
    crate::pack::clean(&mut eval, key, layout).to_be_bytes::<32>()
}

/// Symbolic form of a container base, as shown in layout reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerBase {
    /// A root slot known at compile time.
    Slot(U256),
    /// `keccak256(parent)`: elements of a dynamic array.
    ArrayElements(Box<ContainerBase>),
    /// `keccak256(parent ++ key)`: the value under a mapping key.
    MappingValue(Box<ContainerBase>),
}

impl ContainerBase {
    /// Resolves the formula when every input is known at compile time.
    pub fn resolve(&self) -> Option<U256> {
        match self {
            ContainerBase::Slot(slot) => Some(*slot),
            ContainerBase::ArrayElements(parent) => parent.resolve().map(array_element_base),
            ContainerBase::MappingValue(_) => None,
        }
    }
}

impl fmt::Display for ContainerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerBase::Slot(slot) => write!(f, "{slot}"),
            ContainerBase::ArrayElements(parent) => write!(f, "keccak256({parent})"),
            ContainerBase::MappingValue(parent) => write!(f, "keccak256({parent} ++ key)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    fn word(hex_str: &str) -> U256 {
        U256::from_be_slice(&hex::decode(hex_str).unwrap())
    }

    #[test]
    fn array_base_matches_published_values() {
        assert_eq!(
            array_element_base(U256::ZERO),
            word("290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563")
        );
        assert_eq!(
            array_element_base(U256::from(1)),
            word("b10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6")
        );
    }

    #[test]
    fn array_base_is_deterministic() {
        for slot in [0u64, 1, 7, u64::MAX] {
            let slot = U256::from(slot);
            assert_eq!(array_element_base(slot), array_element_base(slot));
        }
        assert_ne!(
            array_element_base(U256::from(3)),
            array_element_base(U256::from(4))
        );
    }

    #[test]
    fn mapping_base_hashes_parent_then_key() {
        let zero_key = [0u8; 32];
        assert_eq!(
            mapping_value_base(U256::ZERO, &zero_key),
            word("ad3228b676f7d3cd4284a5443f17f1962b36e491b30a40b2405849e597ba5fb5")
        );
        let key = U256::from(5).to_be_bytes::<32>();
        assert_ne!(
            mapping_value_base(U256::from(1), &key),
            mapping_value_base(U256::from(5), &U256::from(1).to_be_bytes::<32>())
        );
        assert_ne!(
            mapping_value_base(U256::from(1), &key),
            array_element_base(U256::from(1))
        );
    }

    #[test]
    fn signed_keys_are_sign_extended() {
        let int8 = ScalarLayout {
            width_bytes: 1,
            signed: true,
        };
        assert_eq!(key_word(U256::from(0xff), int8), [0xff; 32]);
        let uint8 = ScalarLayout {
            width_bytes: 1,
            signed: false,
        };
        assert_eq!(key_word(U256::from(0x1ff), uint8), U256::from(0xff).to_be_bytes::<32>());
    }

    #[test]
    fn formulas_render_symbolically() {
        let base = ContainerBase::MappingValue(Box::new(ContainerBase::ArrayElements(Box::new(
            ContainerBase::Slot(U256::from(2)),
        ))));
        assert_eq!(base.to_string(), "keccak256(keccak256(2) ++ key)");
        assert_eq!(base.resolve(), None);
        let elements = ContainerBase::ArrayElements(Box::new(ContainerBase::Slot(U256::ZERO)));
        assert_eq!(elements.resolve(), Some(array_element_base(U256::ZERO)));
    }
}
