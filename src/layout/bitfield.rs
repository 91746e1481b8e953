//! Bitfield groups: one storage scalar carved into consecutively packed sub-fields.
//!
//! Sub-fields are packed from the least significant bit of the storage word upward
//! in declaration order, so widths `[2, 9, 5]` over `u16` occupy bits `0..2`,
//! `2..11` and `11..16`.

use smallvec::SmallVec;

use super::error::{LayoutError, LayoutResult};
use super::scalar::ScalarType;

/// A single sub-field. The name is metadata and does not take part in equality.
#[derive(Clone, Debug)]
pub struct BitField {
    pub width: u16,
    pub signed: bool,
    pub name: Option<String>,
}

impl BitField {
    pub fn new(width: u16, signed: bool) -> Self {
        Self {
            width,
            signed,
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl PartialEq for BitField {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width && self.signed == other.signed
    }
}

impl Eq for BitField {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitFieldSpec {
    pub storage: ScalarType,
    pub fields: SmallVec<[BitField; 4]>,
}

impl BitFieldSpec {
    pub fn builder(storage: ScalarType) -> BitFieldSpecBuilder {
        BitFieldSpecBuilder::new(storage)
    }

    pub fn total_width(&self) -> u32 {
        self.fields.iter().map(|field| u32::from(field.width)).sum()
    }

    /// Bit offset of sub-field `index` from the storage LSB.
    pub fn offset_of(&self, index: usize) -> Option<u16> {
        if index >= self.fields.len() {
            return None;
        }
        Some(self.fields[..index].iter().map(|field| field.width).sum())
    }

    /// True when the group can only be printed with the `=[...]` member syntax.
    pub fn needs_member_syntax(&self) -> bool {
        let signed = self.storage.is_signed();
        self.fields
            .iter()
            .any(|field| field.name.is_some() || field.signed != signed)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|field| field.name.as_deref() == Some(name))
    }
}

pub struct BitFieldSpecBuilder {
    storage: ScalarType,
    fields: SmallVec<[BitField; 4]>,
}

impl BitFieldSpecBuilder {
    fn new(storage: ScalarType) -> Self {
        Self {
            storage,
            fields: SmallVec::new(),
        }
    }

    /// Appends an anonymous field inheriting the storage signedness.
    pub fn width(mut self, width: u16) -> Self {
        let signed = self.storage.is_signed();
        self.fields.push(BitField::new(width, signed));
        self
    }

    pub fn field(mut self, field: BitField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn finish(self) -> LayoutResult<BitFieldSpec> {
        if !self.storage.is_integer() || self.storage.bits > 64 {
            return Err(LayoutError::invalid(
                "bitfield storage must be an integer of at most 64 bits",
                "",
                0,
            ));
        }
        if self.fields.is_empty() {
            return Err(LayoutError::invalid("not finished bitfields", "", 0));
        }
        if self.fields.iter().any(|field| field.width == 0) {
            return Err(LayoutError::invalid("0 bit is not allowed", "", 0));
        }
        let spec = BitFieldSpec {
            storage: self.storage,
            fields: self.fields,
        };
        if spec.total_width() > u32::from(spec.storage.bits) {
            return Err(LayoutError::invalid(
                format!(
                    "bitfields need {} bits but storage holds {}",
                    spec.total_width(),
                    spec.storage.bits
                ),
                "",
                0,
            ));
        }
        Ok(spec)
    }
}
