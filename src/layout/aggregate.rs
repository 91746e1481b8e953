//! Struct and union containers together with their member offsets.

use std::sync::Arc;

use super::error::{LayoutError, LayoutResult};
use super::record::{LayoutSize, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateKind {
    Struct,
    Union,
}

/// A member, parameter or top-level item: a type plus its optional name tag.
/// Names are cosmetic; two fields are equal when their types are.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: Option<String>,
    pub ty: Arc<Type>,
}

impl Field {
    pub fn new(ty: Arc<Type>) -> Self {
        Self { name: None, ty }
    }

    pub fn named(name: impl Into<String>, ty: Arc<Type>) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty
    }
}

impl Eq for Field {}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub kind: AggregateKind,
    pub members: Vec<Field>,
    offsets: Vec<usize>,
    layout: LayoutSize,
}

impl Container {
    pub fn new(kind: AggregateKind, members: Vec<Field>) -> LayoutResult<Self> {
        if members.is_empty() {
            return Err(LayoutError::invalid("empty container", "[]", 0));
        }
        let last = members.len() - 1;
        for (index, member) in members.iter().enumerate() {
            if member.ty.is_open_ended() && (kind == AggregateKind::Union || index != last) {
                return Err(LayoutError::invalid(
                    "wildcard array is only allowed as the trailing struct member",
                    "*",
                    0,
                ));
            }
            if !member.ty.is_storable() {
                return Err(LayoutError::invalid(
                    format!("member type {} is not storable", member.ty),
                    "",
                    0,
                ));
            }
        }
        let (offsets, layout) = match kind {
            AggregateKind::Struct => struct_layout(&members),
            AggregateKind::Union => union_layout(&members),
        }
        .ok_or_else(|| LayoutError::invalid("container size overflows", "", 0))?;
        Ok(Self {
            kind,
            members,
            offsets,
            layout,
        })
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, AggregateKind::Union)
    }

    pub fn layout(&self) -> LayoutSize {
        self.layout
    }

    pub fn offset_of(&self, index: usize) -> Option<usize> {
        self.offsets.get(index).copied()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.members
            .iter()
            .position(|member| member.name.as_deref() == Some(name))
    }

    /// Resolves a member by name into `(byte offset, type)`.
    pub fn member(&self, name: &str) -> Option<(usize, &Arc<Type>)> {
        let index = self.index_of(name)?;
        Some((self.offsets[index], &self.members[index].ty))
    }

    /// The trailing wildcard member, if the struct ends in one.
    pub fn trailing_wildcard(&self) -> Option<&Field> {
        self.members.last().filter(|member| member.ty.is_wildcard())
    }

    /// The open-ended last member: a wildcard array or a struct that itself ends in one.
    pub fn open_tail(&self) -> Option<&Field> {
        self.members.last().filter(|member| member.ty.is_open_ended())
    }
}

fn struct_layout(members: &[Field]) -> Option<(Vec<usize>, LayoutSize)> {
    let mut offsets = Vec::with_capacity(members.len());
    let mut cursor = 0usize;
    let mut align = 1usize;
    for member in members {
        let member_layout = member.ty.checked_layout()?;
        cursor = cursor.checked_next_multiple_of(member_layout.align)?;
        offsets.push(cursor);
        cursor = cursor.checked_add(member_layout.size)?;
        align = align.max(member_layout.align);
    }
    let size = cursor.checked_next_multiple_of(align)?;
    (size <= LayoutSize::MAX_SIZE).then_some((offsets, LayoutSize { size, align }))
}

fn union_layout(members: &[Field]) -> Option<(Vec<usize>, LayoutSize)> {
    let mut size = 0usize;
    let mut align = 1usize;
    for member in members {
        let member_layout = member.ty.checked_layout()?;
        size = size.max(member_layout.size);
        align = align.max(member_layout.align);
    }
    let size = size.checked_next_multiple_of(align)?;
    let offsets = vec![0; members.len()];
    (size <= LayoutSize::MAX_SIZE).then_some((offsets, LayoutSize { size, align }))
}
