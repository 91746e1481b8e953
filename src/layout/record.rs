//! The closed set of type shapes produced by the descriptor parser.

use std::sync::Arc;

use super::aggregate::Container;
use super::bitfield::BitFieldSpec;
use super::callable::FunctionType;
use super::pointer::PointerType;
use super::scalar::ScalarType;
use super::sequence::{ArrayType, SequenceCount};

/// Byte size and alignment of a storable layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutSize {
    pub size: usize,
    pub align: usize,
}

impl LayoutSize {
    pub const EMPTY: Self = Self { size: 0, align: 1 };
    /// Largest size an allocation can request.
    pub const MAX_SIZE: usize = isize::MAX as usize;
}

/// All supported type shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Scalar(ScalarType),
    BitFields(BitFieldSpec),
    Container(Container),
    Array(ArrayType),
    Pointer(PointerType),
    Function(FunctionType),
}

impl Type {
    /// Size and alignment. A layout too large to address saturates to `usize::MAX` bytes;
    /// use [`Type::checked_layout`] to detect that case.
    pub fn layout(&self) -> LayoutSize {
        self.checked_layout().unwrap_or_else(|| LayoutSize {
            size: usize::MAX,
            align: self.align(),
        })
    }

    /// Size and alignment, or `None` when the size does not fit in `isize::MAX` bytes.
    pub fn checked_layout(&self) -> Option<LayoutSize> {
        let layout = match self {
            Type::Scalar(scalar) if scalar.is_void() => LayoutSize::EMPTY,
            Type::Scalar(scalar) => LayoutSize {
                size: scalar.byte_size(),
                align: scalar.align(),
            },
            Type::BitFields(spec) => LayoutSize {
                size: spec.storage.byte_size(),
                align: spec.storage.align(),
            },
            Type::Container(container) => container.layout(),
            Type::Array(array) => {
                let element = array.element.checked_layout()?;
                let size = match array.count {
                    SequenceCount::Static(len) => element.size.checked_mul(len)?,
                    SequenceCount::Wildcard => 0,
                };
                LayoutSize {
                    size,
                    align: element.align,
                }
            }
            Type::Pointer(pointer) => LayoutSize {
                size: pointer.byte_size(),
                align: pointer.storage.align(),
            },
            Type::Function(_) => LayoutSize::EMPTY,
        };
        (layout.size <= LayoutSize::MAX_SIZE).then_some(layout)
    }

    fn align(&self) -> usize {
        match self {
            Type::Array(array) => array.element.align(),
            other => other.checked_layout().map_or(1, |layout| layout.align),
        }
    }

    pub fn size(&self) -> usize {
        self.layout().size
    }

    /// Whether a value of this type can live in memory.
    pub fn is_storable(&self) -> bool {
        match self {
            Type::Scalar(scalar) => !scalar.is_void(),
            Type::Array(array) => array.element.is_storable() && !array.element.is_open_ended(),
            Type::Function(_) => false,
            Type::BitFields(_) | Type::Container(_) | Type::Pointer(_) => true,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Type::Array(array) if array.is_wildcard())
    }

    /// A wildcard array, or a struct whose last member is open-ended. Its true size is only
    /// known once the tail gets a length, so it may only appear in trailing position.
    pub fn is_open_ended(&self) -> bool {
        match self {
            Type::Array(array) => array.is_wildcard(),
            Type::Container(container) => {
                !container.is_union()
                    && container.members.last().is_some_and(|member| member.ty.is_open_ended())
            }
            _ => false,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarType> {
        match self {
            Type::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<&Container> {
        match self {
            Type::Container(container) => Some(container),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match self {
            Type::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<&PointerType> {
        match self {
            Type::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_bitfields(&self) -> Option<&BitFieldSpec> {
        match self {
            Type::BitFields(spec) => Some(spec),
            _ => None,
        }
    }

    /// Size of one step for `offset(n)`: arrays step by element, everything else by itself.
    pub fn stride(&self) -> usize {
        match self {
            Type::Array(array) => array.stride(),
            other => other.size(),
        }
    }

    pub fn into_shared(self) -> Arc<Type> {
        Arc::new(self)
    }
}

impl From<ScalarType> for Type {
    fn from(value: ScalarType) -> Self {
        Type::Scalar(value)
    }
}
