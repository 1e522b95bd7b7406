//! Selective access descriptors for ProfileGeneric buffers.
//!
//! A range descriptor (access selector 1) restricts a buffer read to rows
//! whose restricting column (normally the clock) falls between two
//! values, optionally projecting a subset of columns. On the wire it is a
//! plain data structure handed to the GET access-selection field.

use alloc::vec::Vec;

use crate::cosem::CosemAttribute;
use crate::data::Data;
use crate::get::AccessSelector;

/// Selector id of the range descriptor.
pub const RANGE_DESCRIPTOR_SELECTOR: u8 = 1;

/// Selector id of the entry descriptor (row index based selection).
pub const ENTRY_DESCRIPTOR_SELECTOR: u8 = 2;

/// One column of a ProfileGeneric capture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CaptureObject {
    pub attribute: CosemAttribute,
    /// Index inside a compound attribute; 0 selects the whole attribute.
    pub data_index: u16,
}

impl CaptureObject {
    pub const fn new(attribute: CosemAttribute, data_index: u16) -> Self {
        Self { attribute, data_index }
    }

    pub fn to_data(&self) -> Data {
        Data::Structure(alloc::vec![
            Data::LongUnsigned(self.attribute.class_id),
            Data::OctetString(self.attribute.instance_id.encode().to_vec()),
            Data::Integer(self.attribute.attribute_id),
            Data::LongUnsigned(self.data_index),
        ])
    }
}

/// Access selector 1: restrict rows by a from/to range on one column.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RangeDescriptor {
    pub restricting_object: CaptureObject,
    pub from_value: Data,
    pub to_value: Data,
    /// Columns to return; empty selects all captured columns.
    pub selected_values: Vec<CaptureObject>,
}

impl RangeDescriptor {
    pub fn to_data(&self) -> Data {
        Data::Structure(alloc::vec![
            self.restricting_object.to_data(),
            self.from_value.clone(),
            self.to_value.clone(),
            Data::Array(self.selected_values.iter().map(CaptureObject::to_data).collect()),
        ])
    }

    /// The access-selection field to attach to a GET.
    pub fn access_selector(&self) -> AccessSelector {
        AccessSelector { selector: RANGE_DESCRIPTOR_SELECTOR, parameters: self.to_data() }
    }
}

/// Access selector 2: restrict rows by entry and column indexes
/// (1-based, inclusive; 0 for `to_entry`/`to_value` means "until the
/// end").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryDescriptor {
    pub from_entry: u32,
    pub to_entry: u32,
    pub from_selected_value: u16,
    pub to_selected_value: u16,
}

impl EntryDescriptor {
    pub fn to_data(&self) -> Data {
        Data::Structure(alloc::vec![
            Data::DoubleLongUnsigned(self.from_entry),
            Data::DoubleLongUnsigned(self.to_entry),
            Data::LongUnsigned(self.from_selected_value),
            Data::LongUnsigned(self.to_selected_value),
        ])
    }

    pub fn access_selector(&self) -> AccessSelector {
        AccessSelector { selector: ENTRY_DESCRIPTOR_SELECTOR, parameters: self.to_data() }
    }
}
