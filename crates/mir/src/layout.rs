//! Storage layout classification.
//!
//! This module is the canonical source of truth for how a type occupies
//! storage. The slot allocator, the accessor generator and the layout report
//! all read sizes and element positions from here so they cannot disagree.
//!
//! # Storage Model
//!
//! Storage is a map from 256-bit slots to 32-byte words:
//! - Scalars use their natural byte width and may share a slot with other
//!   scalars. A byte offset counts from the least significant byte of the word
//!   and the value is stored big-endian inside its byte range.
//! - Structs and fixed arrays occupy whole slots. Struct members are packed
//!   with the same rules as top-level fields.
//! - Fixed arrays of small scalars pack `32 / width` elements per slot,
//!   row-major, leaving the remainder of each slot unused.
//! - Dynamic arrays and mappings occupy a single header slot. Their contents
//!   live at hashed addresses derived from that slot (see [`crate::hash`]).

use std::fmt;

use alloy_primitives::U256;
use smol_str::SmolStr;

use crate::alloc::SlotCursor;
use crate::ty::TypeDescriptor;

/// Size of a storage word in bytes.
pub const WORD_SIZE_BYTES: u8 = 32;

/// Classified storage shape of a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageLayout {
    Scalar(ScalarLayout),
    PackedRow(PackedRowLayout),
    Struct(StructLayout),
    DynamicArray(DynamicArrayLayout),
    Mapping(MappingLayout),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarLayout {
    pub width_bytes: u8,
    pub signed: bool,
}

impl ScalarLayout {
    /// Scalars that fill a word are written without a prior load.
    pub fn is_full_word(self) -> bool {
        self.width_bytes == WORD_SIZE_BYTES
    }
}

/// How consecutive elements of an array are laid out from the array base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementStride {
    /// Greater than one only for scalars of at most 16 bytes.
    pub elements_per_slot: u64,
    pub slots_per_element: U256,
    pub element_bytes: u8,
}

impl ElementStride {
    pub fn for_element(element: &StorageLayout) -> Self {
        match element {
            StorageLayout::Scalar(scalar) => Self {
                elements_per_slot: (WORD_SIZE_BYTES / scalar.width_bytes) as u64,
                slots_per_element: U256::from(1),
                element_bytes: scalar.width_bytes,
            },
            other => Self {
                elements_per_slot: 1,
                slots_per_element: other.slot_count(),
                element_bytes: WORD_SIZE_BYTES,
            },
        }
    }

    pub fn is_packed(&self) -> bool {
        self.elements_per_slot > 1
    }

    /// Slot distance from the array base and byte offset of element `index`.
    pub fn position(&self, index: U256) -> (U256, u8) {
        if self.is_packed() {
            let per_slot = U256::from(self.elements_per_slot);
            let in_slot = (index % per_slot).to::<u64>() as u8;
            (index / per_slot, in_slot * self.element_bytes)
        } else {
            (index.wrapping_mul(self.slots_per_element), 0)
        }
    }

    /// Number of words needed to hold `length` elements.
    pub fn words_for(&self, length: U256) -> Option<U256> {
        if self.is_packed() {
            let per_slot = U256::from(self.elements_per_slot);
            let full = length / per_slot;
            if (length % per_slot).is_zero() {
                Some(full)
            } else {
                full.checked_add(U256::from(1))
            }
        } else {
            length.checked_mul(self.slots_per_element)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackedRowLayout {
    pub element: Box<StorageLayout>,
    pub length: u64,
    pub stride: ElementStride,
    pub slots: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberLayout {
    pub name: SmolStr,
    /// Slot relative to the start of the struct.
    pub slot: U256,
    pub offset: u8,
    pub layout: StorageLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructLayout {
    pub members: Vec<MemberLayout>,
    pub slots: U256,
}

impl StructLayout {
    pub fn member(&self, name: &str) -> Option<&MemberLayout> {
        self.members.iter().find(|member| member.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicArrayLayout {
    pub element: Box<StorageLayout>,
    pub stride: ElementStride,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingLayout {
    pub key: ScalarLayout,
    pub value: Box<StorageLayout>,
}

/// Reasons a type descriptor cannot be given a storage layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InvalidInput {
    ZeroWidthScalar,
    OversizedScalar(u8),
    ZeroLengthArray,
    EmptyStruct,
    DuplicateName(SmolStr),
    NonScalarMappingKey(String),
    /// The layout does not fit into the 2^256 slot space.
    StorageExhausted,
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidInput::ZeroWidthScalar => write!(f, "scalar of zero width"),
            InvalidInput::OversizedScalar(width) => {
                write!(f, "scalar of {width} bytes does not fit into a storage word")
            }
            InvalidInput::ZeroLengthArray => write!(f, "fixed-size array of length zero"),
            InvalidInput::EmptyStruct => write!(f, "struct without members"),
            InvalidInput::DuplicateName(name) => write!(f, "`{name}` is declared more than once"),
            InvalidInput::NonScalarMappingKey(key) => {
                write!(f, "mapping key `{key}` is not a value type")
            }
            InvalidInput::StorageExhausted => write!(f, "layout exceeds the storage slot space"),
        }
    }
}

impl StorageLayout {
    /// Classifies `ty`, validating the properties layout depends on.
    pub fn from_ty(ty: &TypeDescriptor) -> Result<Self, InvalidInput> {
        match ty {
            TypeDescriptor::Scalar {
                width_bytes,
                signed,
            } => Ok(StorageLayout::Scalar(scalar_layout(*width_bytes, *signed)?)),

            TypeDescriptor::FixedArray { elem, length } => {
                if *length == 0 {
                    return Err(InvalidInput::ZeroLengthArray);
                }
                let element = StorageLayout::from_ty(elem)?;
                let stride = ElementStride::for_element(&element);
                let slots = stride
                    .words_for(U256::from(*length))
                    .ok_or(InvalidInput::StorageExhausted)?;
                Ok(StorageLayout::PackedRow(PackedRowLayout {
                    element: Box::new(element),
                    length: *length,
                    stride,
                    slots,
                }))
            }

            TypeDescriptor::DynamicArray(elem) => {
                let element = StorageLayout::from_ty(elem)?;
                let stride = ElementStride::for_element(&element);
                Ok(StorageLayout::DynamicArray(DynamicArrayLayout {
                    element: Box::new(element),
                    stride,
                }))
            }

            TypeDescriptor::Mapping { key, value } => {
                let TypeDescriptor::Scalar {
                    width_bytes,
                    signed,
                } = key.as_ref()
                else {
                    return Err(InvalidInput::NonScalarMappingKey(key.to_string()));
                };
                Ok(StorageLayout::Mapping(MappingLayout {
                    key: scalar_layout(*width_bytes, *signed)?,
                    value: Box::new(StorageLayout::from_ty(value)?),
                }))
            }

            TypeDescriptor::Struct(fields) => {
                if fields.is_empty() {
                    return Err(InvalidInput::EmptyStruct);
                }
                let mut cursor = SlotCursor::new();
                let mut members: Vec<MemberLayout> = Vec::with_capacity(fields.len());
                for field in fields {
                    if members.iter().any(|member| member.name == field.name) {
                        return Err(InvalidInput::DuplicateName(field.name.clone()));
                    }
                    let layout = StorageLayout::from_ty(&field.ty)?;
                    let (slot, offset) = cursor.place(&layout)?;
                    members.push(MemberLayout {
                        name: field.name.clone(),
                        slot,
                        offset,
                        layout,
                    });
                }
                Ok(StorageLayout::Struct(StructLayout {
                    members,
                    slots: cursor.finish()?,
                }))
            }
        }
    }

    /// Number of consecutive slots the value occupies at its base.
    pub fn slot_count(&self) -> U256 {
        match self {
            StorageLayout::Scalar(_)
            | StorageLayout::DynamicArray(_)
            | StorageLayout::Mapping(_) => U256::from(1),
            StorageLayout::PackedRow(row) => row.slots,
            StorageLayout::Struct(strukt) => strukt.slots,
        }
    }

    /// Bytes the value occupies within its first slot.
    pub fn storage_bytes(&self) -> u8 {
        match self {
            StorageLayout::Scalar(scalar) => scalar.width_bytes,
            _ => WORD_SIZE_BYTES,
        }
    }

    /// Only scalars may share a slot with a neighbour.
    pub fn is_packable(&self) -> bool {
        matches!(self, StorageLayout::Scalar(_))
    }

    /// Whether clearing the value must walk nested dynamic arrays rather than
    /// zeroing its own words.
    pub fn needs_deep_clear(&self) -> bool {
        match self {
            StorageLayout::Scalar(_) | StorageLayout::Mapping(_) => false,
            StorageLayout::DynamicArray(_) => true,
            StorageLayout::PackedRow(row) => row.element.needs_deep_clear(),
            StorageLayout::Struct(strukt) => strukt
                .members
                .iter()
                .any(|member| member.layout.needs_deep_clear()),
        }
    }

    pub fn as_scalar(&self) -> Option<ScalarLayout> {
        match self {
            StorageLayout::Scalar(scalar) => Some(*scalar),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            StorageLayout::Scalar(_) => "scalar",
            StorageLayout::PackedRow(_) => "fixed array",
            StorageLayout::Struct(_) => "struct",
            StorageLayout::DynamicArray(_) => "dynamic array",
            StorageLayout::Mapping(_) => "mapping",
        }
    }
}

fn scalar_layout(width_bytes: u8, signed: bool) -> Result<ScalarLayout, InvalidInput> {
    match width_bytes {
        0 => Err(InvalidInput::ZeroWidthScalar),
        width if width > WORD_SIZE_BYTES => Err(InvalidInput::OversizedScalar(width)),
        width_bytes => Ok(ScalarLayout {
            width_bytes,
            signed,
        }),
    }
}
