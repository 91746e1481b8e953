//! Struct and union views, plus the name-to-member binding tables behind them.

use std::sync::Arc;

use ahash::AHashMap;

use crate::layout::{Container, Type, parse_one};

use super::error::{AccessError, AccessResult};
use super::handle::{AsPointer, BitFieldRef, Pointer};
use super::scope::Scope;
use super::value::Value;

#[derive(Clone, Debug)]
struct Member {
    offset: usize,
    ty: Arc<Type>,
}

/// Resolved names of a container: members by byte offset, bitfield sub-fields by index.
#[derive(Clone, Debug, Default)]
pub struct MemberTable {
    order: Vec<String>,
    members: AHashMap<String, Member>,
    subfields: AHashMap<String, (Member, usize)>,
}

impl MemberTable {
    fn from_container(container: &Container) -> Self {
        let mut table = MemberTable::default();
        for (index, field) in container.members.iter().enumerate() {
            let offset = container.offset_of(index).unwrap_or(0);
            let member = Member {
                offset,
                ty: field.ty.clone(),
            };
            if let Some(spec) = field.ty.as_bitfields() {
                for (sub_index, sub) in spec.fields.iter().enumerate() {
                    if let Some(name) = &sub.name {
                        table
                            .subfields
                            .entry(name.clone())
                            .or_insert_with(|| (member.clone(), sub_index));
                    }
                }
            }
            if let Some(name) = field.name() {
                if !table.members.contains_key(name) {
                    table.order.push(name.to_string());
                    table.members.insert(name.to_string(), member);
                }
            }
        }
        table
    }

    fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name) || self.subfields.contains_key(name)
    }

    /// Keeps only `names`; every requested name must exist.
    fn restrict(&self, names: &[&str]) -> AccessResult<Self> {
        let mut table = MemberTable::default();
        for name in names {
            if let Some(member) = self.members.get(*name) {
                table.order.push(name.to_string());
                table.members.insert(name.to_string(), member.clone());
            } else if let Some(sub) = self.subfields.get(*name) {
                table.subfields.insert(name.to_string(), sub.clone());
            } else {
                return Err(AccessError::binding(format!(
                    "member '{name}' is not declared by the descriptor"
                )));
            }
        }
        Ok(table)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// A struct or union handle with member access by name.
#[derive(Clone, Debug)]
pub struct Struct {
    ptr: Pointer,
    table: Arc<MemberTable>,
}

impl Struct {
    pub(crate) fn new(ptr: Pointer) -> AccessResult<Self> {
        let container = ptr.ty().as_container().ok_or_else(|| {
            AccessError::mismatch(format!("handle of type {} is not a struct or union", ptr.ty()))
        })?;
        let table = Arc::new(MemberTable::from_container(container));
        Ok(Self { ptr, table })
    }

    pub fn ptr(&self) -> &Pointer {
        &self.ptr
    }

    pub fn address(&self) -> usize {
        self.ptr.address()
    }

    pub fn is_union(&self) -> bool {
        self.ptr.ty().as_container().is_some_and(Container::is_union)
    }

    /// Named members in declaration order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.table.names()
    }

    /// Pointer to the named member. For unions every member starts at the base address.
    pub fn address_of(&self, name: &str) -> AccessResult<Pointer> {
        let member = self.member(name)?;
        Ok(self.ptr.project(member.offset, member.ty.clone()))
    }

    pub fn get(&self, name: &str) -> AccessResult<Value> {
        match self.table.members.get(name) {
            Some(member) => self.ptr.project(member.offset, member.ty.clone()).get(),
            None => self.field(name)?.get(),
        }
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> AccessResult<()> {
        match self.table.members.get(name) {
            Some(member) => self.ptr.project(member.offset, member.ty.clone()).set(value),
            None => self.field(name)?.set(value),
        }
    }

    /// A named bitfield sub-field of one of the members.
    pub fn field(&self, name: &str) -> AccessResult<BitFieldRef> {
        let (member, index) = self
            .table
            .subfields
            .get(name)
            .ok_or_else(|| AccessError::binding(format!("no member named '{name}'")))?;
        self.ptr
            .project(member.offset, member.ty.clone())
            .field(*index)
    }

    fn member(&self, name: &str) -> AccessResult<&Member> {
        self.table
            .members
            .get(name)
            .ok_or_else(|| AccessError::binding(format!("no member named '{name}'")))
    }
}

impl AsPointer for Struct {
    fn as_pointer(&self) -> &Pointer {
        &self.ptr
    }
}

/// A descriptor resolved once against the member names a caller needs.
///
/// Attaching the binding to a pointer yields a [`Struct`] that exposes exactly those names.
#[derive(Clone, Debug)]
pub struct Binding {
    ty: Arc<Type>,
    table: Arc<MemberTable>,
}

impl Binding {
    pub fn new(descriptor: &str, names: &[&str]) -> AccessResult<Self> {
        let item = parse_one(descriptor)?;
        Self::from_type(item.ty, names)
    }

    pub fn from_type(ty: Arc<Type>, names: &[&str]) -> AccessResult<Self> {
        let container = ty.as_container().ok_or_else(|| {
            AccessError::binding(format!("descriptor {ty} does not describe a struct or union"))
        })?;
        let full = MemberTable::from_container(container);
        let table = full.restrict(names)?;
        debug_assert!(names.iter().all(|name| table.contains(name)));
        Ok(Self {
            ty,
            table: Arc::new(table),
        })
    }

    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.table.names()
    }

    /// Views the memory behind `pointer` through this binding.
    pub fn attach(&self, pointer: &Pointer) -> AccessResult<Struct> {
        if pointer.is_null() {
            return Err(AccessError::NullArgument { operation: "attach" });
        }
        Ok(Struct {
            ptr: pointer.cast(&self.ty),
            table: self.table.clone(),
        })
    }

    pub fn allocate(&self, scope: &Scope) -> AccessResult<Struct> {
        let ptr = scope.allocate(&self.ty)?;
        self.attach(&ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ErrorKind;

    #[test]
    fn members_resolve_by_name() {
        let scope = Scope::new();
        let ty = parse_one("[c(tag) i(value) u16(bits)=[u4(low) u12(high)]]").unwrap().ty;
        let view = scope.allocate_struct(&ty).unwrap();
        view.set("value", 41i32).unwrap();
        view.set("high", 0xABCu64).unwrap();
        assert_eq!(view.get("value").unwrap(), Value::Int(41));
        assert_eq!(view.get("high").unwrap(), Value::UInt(0xABC));
        assert_eq!(view.get("low").unwrap(), Value::UInt(0));
        assert_eq!(view.address_of("value").unwrap().address(), view.address() + 4);
        assert_eq!(view.members().collect::<Vec<_>>(), ["tag", "value", "bits"]);
        assert_eq!(view.get("missing").unwrap_err().kind(), ErrorKind::Binding);
    }

    #[test]
    fn union_members_share_the_base_address() {
        let scope = Scope::new();
        let ty = parse_one("[c(a)|j(b)|S(c)]").unwrap().ty;
        let view = scope.allocate_struct(&ty).unwrap();
        assert!(view.is_union());
        for name in ["a", "b", "c"] {
            assert_eq!(view.address_of(name).unwrap().address(), view.ptr().address());
        }
        view.set("c", 0x0102u16).unwrap();
        let low_byte = if cfg!(target_endian = "little") { 0x02 } else { 0x01 };
        assert_eq!(view.get("a").unwrap(), Value::Int(low_byte));
    }

    #[test]
    fn binding_requires_declared_names() {
        let err = Binding::new("[i(x) i(y)]", &["x", "z"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Binding);
        assert!(err.to_string().contains("'z'"));
        assert!(Binding::new("i", &[]).is_err(), "scalars cannot be bound");
    }

    #[test]
    fn attached_binding_exposes_only_requested_names() {
        let scope = Scope::new();
        let binding = Binding::new("[i(x) i(y)]", &["y"]).unwrap();
        let view = binding.allocate(&scope).unwrap();
        view.set("y", 7i32).unwrap();
        assert_eq!(view.get("y").unwrap(), Value::Int(7));
        assert!(view.get("x").is_err(), "unbound names are not reachable");
        assert_eq!(binding.names().collect::<Vec<_>>(), ["y"]);
    }

    #[test]
    fn trailing_wildcard_gets_a_length_at_allocation() {
        let scope = Scope::new();
        let ty = parse_one("[i(len) *S(data)]").unwrap().ty;
        let view = scope.allocate_struct_with_tail(&ty, 3).unwrap();
        let data = view.address_of("data").unwrap().as_array().unwrap();
        assert_eq!(data.len(), 3);
        data.set(2, 9u16).unwrap();
        assert_eq!(data.get(2).unwrap(), Value::UInt(9));
        assert_eq!(view.ptr().ty().size(), 12);
    }
}
