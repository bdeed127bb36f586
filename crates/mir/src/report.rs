//! Storage layout report.
//!
//! The JSON shape mirrors the `storageLayout` output of existing contract
//! toolchains: slots are decimal strings, offsets count bytes from the least
//! significant end of the word.

use std::fmt::Write;

use alloy_primitives::U256;
use common::config::CURRENT_LAYOUT_VERSION;
use serde::Serialize;

use crate::alloc::StorageLayoutMap;
use crate::hash::ContainerBase;
use crate::layout::StorageLayout;
use crate::ty::TypeDescriptor;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutReport {
    pub layout_version: u32,
    pub slots_used: String,
    pub storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    pub label: String,
    pub slot: String,
    pub offset: u8,
    #[serde(rename = "type")]
    pub ty: String,
    /// Number of consecutive slots, or bytes for a packed scalar.
    pub size: String,
    /// Where the contents of a dynamic container live.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<StorageEntry>,
}

impl LayoutReport {
    pub fn new(layouts: &StorageLayoutMap) -> Self {
        let storage = layouts
            .iter()
            .map(|field| {
                entry(
                    field.name.to_string(),
                    field.slot,
                    field.offset,
                    &field.ty,
                    &field.layout,
                )
            })
            .collect();
        Self {
            layout_version: CURRENT_LAYOUT_VERSION,
            slots_used: layouts.slots_used().to_string(),
            storage,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_text(&self) -> String {
        let mut out = format!(
            "storage layout v{}, {} slot(s)\n",
            self.layout_version, self.slots_used
        );
        for entry in &self.storage {
            write_entry(&mut out, entry, 0);
        }
        out
    }
}

fn entry(
    label: String,
    slot: U256,
    offset: u8,
    ty: &TypeDescriptor,
    layout: &StorageLayout,
) -> StorageEntry {
    let size = match layout {
        StorageLayout::Scalar(scalar) => format!("{}B", scalar.width_bytes),
        other => format!("{} slot(s)", other.slot_count()),
    };
    let base = match layout {
        StorageLayout::DynamicArray(_) => {
            Some(ContainerBase::ArrayElements(Box::new(ContainerBase::Slot(slot))).to_string())
        }
        StorageLayout::Mapping(_) => {
            Some(ContainerBase::MappingValue(Box::new(ContainerBase::Slot(slot))).to_string())
        }
        _ => None,
    };
    let members = match (layout, ty) {
        (StorageLayout::Struct(strukt), TypeDescriptor::Struct(fields)) => strukt
            .members
            .iter()
            .zip(fields)
            .map(|(member, field)| {
                entry(
                    format!("{label}.{}", member.name),
                    slot + member.slot,
                    member.offset,
                    &field.ty,
                    &member.layout,
                )
            })
            .collect(),
        _ => Vec::new(),
    };
    StorageEntry {
        label,
        slot: slot.to_string(),
        offset,
        ty: ty.to_string(),
        size,
        base,
        members,
    }
}

fn write_entry(out: &mut String, entry: &StorageEntry, depth: usize) {
    let position = format!("{}:{}", entry.slot, entry.offset);
    let _ = write!(
        out,
        "{}{position:<8} {:<12} {} [{}]",
        "  ".repeat(depth),
        entry.label,
        entry.ty,
        entry.size
    );
    if let Some(base) = &entry.base {
        let _ = write!(out, " contents at {base}");
    }
    out.push('\n');
    for member in &entry.members {
        write_entry(out, member, depth + 1);
    }
}
