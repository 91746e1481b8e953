//! Typed pointers over scope-owned memory.
//!
//! A [`Pointer`] is an `(address, type, owning scope, extent)` tuple. It never owns memory.
//! Deriving a handle (offset, cast, member projection, deref) is lazy and keeps the owning
//! scope; liveness and bounds are checked when memory is actually touched.

use std::fmt;
use std::sync::{Arc, Weak};

use smallvec::{SmallVec, smallvec};

use crate::layout::{ArrayType, ScalarType, Type};

use super::array::Array;
use super::bits::{extract, insert, sign_extend};
use super::callback::{self, Callback};
use super::endianword::{load_word, store_word};
use super::error::{AccessError, AccessResult};
use super::region::{copy_raw, read_raw, write_raw};
use super::scope::{Scope, ScopeInner, access, access_pair, locate};
use super::structs::Struct;
use super::value::{NativeScalar, Value, decode, encode};

type ByteBuf = SmallVec<[u8; 32]>;

/// The byte window a handle may touch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Extent {
    /// A region owned by the scope.
    Tracked { start: usize, len: usize },
    /// A window vouched for by an unsafe constructor.
    Inferred { start: usize, len: usize },
    /// A raw opaque address; a cast infers the window from the new type.
    Unbounded,
    /// An address that belongs to no region reachable from the scope.
    Foreign,
}

impl Extent {
    fn check(&self, address: usize, len: usize) -> AccessResult<()> {
        let fits = match *self {
            Extent::Tracked { start, len: window } | Extent::Inferred { start, len: window } => {
                address >= start
                    && address
                        .checked_add(len)
                        .is_some_and(|end| end <= start + window)
            }
            Extent::Unbounded | Extent::Foreign => false,
        };
        if fits {
            Ok(())
        } else {
            Err(AccessError::OutOfBounds { address, len })
        }
    }

    fn for_cast(self, address: usize, ty: &Type) -> Extent {
        match self {
            Extent::Unbounded => Extent::Inferred {
                start: address,
                len: ty.size(),
            },
            other => other,
        }
    }
}

#[derive(Clone)]
pub struct Pointer {
    address: usize,
    ty: Arc<Type>,
    scope: Weak<ScopeInner>,
    extent: Extent,
}

impl Pointer {
    pub(crate) fn with_extent(
        address: usize,
        ty: Arc<Type>,
        scope: Weak<ScopeInner>,
        extent: Extent,
    ) -> Self {
        Self {
            address,
            ty,
            scope,
            extent,
        }
    }

    /// A null pointer of `ty` bound to `scope`.
    pub fn null(ty: Arc<Type>, scope: &Scope) -> Self {
        Self::with_extent(0, ty, scope.downgrade(), Extent::Foreign)
    }

    /// Wraps an address obtained outside the crate, such as from a foreign call.
    ///
    /// # Safety
    /// `address` must stay valid for `ty.size()` bytes while `scope` is alive. Opaque types get
    /// an unbounded extent that the first cast narrows to the new type's size.
    pub unsafe fn from_raw(address: usize, ty: Arc<Type>, scope: &Scope) -> Self {
        let extent = if ty.is_storable() {
            Extent::Inferred {
                start: address,
                len: ty.size(),
            }
        } else {
            Extent::Unbounded
        };
        Self::with_extent(address, ty, scope.downgrade(), extent)
    }

    #[inline(always)]
    pub fn address(&self) -> usize {
        self.address
    }

    #[inline(always)]
    pub fn ty(&self) -> &Arc<Type> {
        &self.ty
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn is_null(&self) -> bool {
        self.address == 0
    }

    pub fn scope(&self) -> Option<Scope> {
        Scope::from_weak(&self.scope)
    }

    pub fn is_alive(&self) -> bool {
        self.scope().is_some_and(|scope| scope.is_alive())
    }

    /// The address for handing to a call layer; fails once the scope is gone.
    pub fn raw_address(&self) -> AccessResult<usize> {
        access(&self.scope, || Ok(self.address))
    }

    pub fn get(&self) -> AccessResult<Value> {
        access(&self.scope, || self.load())
    }

    pub fn set(&self, value: impl Into<Value>) -> AccessResult<()> {
        let value = value.into();
        access(&self.scope, || self.store(&value))
    }

    pub fn read<T: NativeScalar>(&self) -> AccessResult<T> {
        let scalar = *self
            .ty
            .as_scalar()
            .filter(|scalar| T::matches(scalar))
            .ok_or_else(|| self.type_mismatch(std::any::type_name::<T>()))?;
        access(&self.scope, || {
            let bytes = self.read_bytes(scalar.byte_size())?;
            Ok(T::from_raw(load_word(&bytes, scalar.endianness)))
        })
    }

    pub fn write<T: NativeScalar>(&self, value: T) -> AccessResult<()> {
        let scalar = *self
            .ty
            .as_scalar()
            .filter(|scalar| T::matches(scalar))
            .ok_or_else(|| self.type_mismatch(std::any::type_name::<T>()))?;
        access(&self.scope, || {
            let mut bytes: ByteBuf = smallvec![0; scalar.byte_size()];
            self.check(bytes.len())?;
            store_word(value.to_raw(), &mut bytes, scalar.endianness);
            // Safety: `check` confirmed the range and the gate is held.
            unsafe { write_raw(self.address, &bytes) };
            Ok(())
        })
    }

    /// Moves by `count` whole values of this handle's type (elements for arrays).
    pub fn offset(&self, count: isize) -> Pointer {
        let stride = self.ty.stride() as isize;
        let mut moved = self.clone();
        moved.address = self.address.wrapping_add_signed(count.wrapping_mul(stride));
        moved
    }

    /// Reinterprets the same address as `ty`. The extent is kept, so a wider view of a small
    /// region fails on access.
    pub fn cast(&self, ty: &Arc<Type>) -> Pointer {
        Pointer {
            address: self.address,
            ty: ty.clone(),
            scope: self.scope.clone(),
            extent: self.extent.for_cast(self.address, ty),
        }
    }

    /// Follows a pointer-typed value to its pointee. Targets outside the scope's regions
    /// produce a handle that refuses every access.
    pub fn deref(&self) -> AccessResult<Pointer> {
        let pointee = self.pointee()?;
        access(&self.scope, || {
            let target = self.load_address()?;
            if target == 0 {
                return Ok(Pointer::with_extent(0, pointee, self.scope.clone(), Extent::Foreign));
            }
            Ok(match locate(&self.scope, target) {
                Some((owner, start, len)) => {
                    Pointer::with_extent(target, pointee, owner, Extent::Tracked { start, len })
                }
                None => Pointer::with_extent(target, pointee, self.scope.clone(), Extent::Foreign),
            })
        })
    }

    /// Like [`Pointer::deref`] but trusts foreign targets for the pointee's size.
    ///
    /// # Safety
    /// The stored address must be valid for the pointee's size while the scope is alive.
    pub unsafe fn deref_unchecked(&self) -> AccessResult<Pointer> {
        let target = self.deref()?;
        if target.extent != Extent::Foreign || target.is_null() {
            return Ok(target);
        }
        let extent = Extent::Unbounded.for_cast(target.address, &target.ty);
        Ok(Pointer { extent, ..target })
    }

    /// Sub-field `index` of a bitfield group.
    pub fn field(&self, index: usize) -> AccessResult<BitFieldRef> {
        let spec = self
            .ty
            .as_bitfields()
            .ok_or_else(|| self.type_mismatch("a bitfield group"))?;
        let field = spec.fields.get(index).ok_or(AccessError::IndexOutOfRange {
            index,
            len: spec.fields.len(),
        })?;
        Ok(BitFieldRef {
            storage: self.clone(),
            offset: u32::from(spec.offset_of(index).unwrap_or(0)),
            width: u32::from(field.width),
            signed: field.signed,
        })
    }

    pub fn as_struct(&self) -> AccessResult<Struct> {
        Struct::new(self.clone())
    }

    pub fn as_array(&self) -> AccessResult<Array> {
        Array::new(self.clone())
    }

    /// Views `len` consecutive values starting here; a wildcard array gets its length fixed.
    pub fn as_array_of(&self, len: usize) -> AccessResult<Array> {
        let array = match &*self.ty {
            Type::Array(array) if array.is_wildcard() => array.resolved(len),
            _ => ArrayType::fixed(self.ty.clone(), len),
        };
        let ty = Arc::new(Type::Array(array));
        if ty.checked_layout().is_none() {
            return Err(AccessError::mismatch(format!(
                "{len} elements of {} do not fit in memory",
                self.ty
            )));
        }
        let mut view = self.cast(&ty);
        if let Extent::Inferred { start, .. } = view.extent {
            view.extent = Extent::Inferred {
                start,
                len: ty.size(),
            };
        }
        Array::new(view)
    }

    /// Resolves a function or function-pointer handle to the callback registered there.
    pub fn as_callback(&self) -> AccessResult<Callback> {
        let entry_point = match &*self.ty {
            Type::Function(_) => self.raw_address()?,
            Type::Pointer(pointer) if pointer.is_function() => {
                access(&self.scope, || self.load_address())?
            }
            _ => return Err(self.type_mismatch("a function or function pointer")),
        };
        if entry_point == 0 {
            return Err(AccessError::NullDereference);
        }
        let resource = callback::lookup(entry_point).ok_or_else(|| {
            AccessError::mismatch(format!("0x{entry_point:X} is not a callback entry point"))
        })?;
        Ok(Callback::from_resource(&resource))
    }

    pub(crate) fn project(&self, offset: usize, ty: Arc<Type>) -> Pointer {
        Pointer {
            address: self.address.wrapping_add(offset),
            ty,
            scope: self.scope.clone(),
            extent: self.extent,
        }
    }

    pub(crate) fn scope_ref(&self) -> &Weak<ScopeInner> {
        &self.scope
    }

    /// Null and extent check for `len` bytes at this address.
    pub(crate) fn check(&self, len: usize) -> AccessResult<()> {
        if self.is_null() {
            return Err(AccessError::NullDereference);
        }
        self.extent.check(self.address, len)
    }

    /// Reads `len` bytes; the caller holds the gate.
    pub(crate) fn read_bytes(&self, len: usize) -> AccessResult<ByteBuf> {
        self.check(len)?;
        let mut bytes: ByteBuf = smallvec![0; len];
        // Safety: `check` confirmed the range and the gate is held.
        unsafe { read_raw(self.address, &mut bytes) };
        Ok(bytes)
    }

    pub(crate) fn load(&self) -> AccessResult<Value> {
        if !self.ty.is_storable() {
            return Err(AccessError::mismatch(format!("type {} has no stored value", self.ty)));
        }
        let bytes = self.read_bytes(self.ty.size())?;
        decode(&bytes, &self.ty)
    }

    pub(crate) fn store(&self, value: &Value) -> AccessResult<()> {
        if !self.ty.is_storable() {
            return Err(AccessError::mismatch(format!("type {} has no stored value", self.ty)));
        }
        let mut bytes = self.read_bytes(self.ty.size())?;
        encode(&mut bytes, &self.ty, value)?;
        // Safety: `read_bytes` checked the same range and the gate is still held.
        unsafe { write_raw(self.address, &bytes) };
        Ok(())
    }

    fn pointee(&self) -> AccessResult<Arc<Type>> {
        self.ty
            .as_pointer()
            .map(|pointer| pointer.pointee.clone())
            .ok_or_else(|| self.type_mismatch("a pointer"))
    }

    fn load_address(&self) -> AccessResult<usize> {
        self.load()?
            .as_address()
            .ok_or_else(|| self.type_mismatch("a pointer"))
    }

    fn type_mismatch(&self, expected: &str) -> AccessError {
        AccessError::mismatch(format!("handle of type {} is not {expected}", self.ty))
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("address", &format_args!("0x{:X}", self.address))
            .field("ty", &format_args!("{}", self.ty))
            .field("extent", &self.extent)
            .finish()
    }
}

/// One sub-field of a bitfield group. Writes read the storage word, replace only this
/// field's bits and write the word back.
#[derive(Clone, Debug)]
pub struct BitFieldRef {
    storage: Pointer,
    offset: u32,
    width: u32,
    signed: bool,
}

impl BitFieldRef {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn bit_offset(&self) -> u32 {
        self.offset
    }

    pub fn get(&self) -> AccessResult<Value> {
        access(self.storage.scope_ref(), || {
            let raw = extract(self.load_word()?, self.offset, self.width);
            Ok(if self.signed {
                Value::Int(sign_extend(raw, self.width))
            } else {
                Value::UInt(raw)
            })
        })
    }

    pub fn set(&self, value: impl Into<Value>) -> AccessResult<()> {
        let value = value.into();
        let raw = value
            .as_u64()
            .or_else(|| value.as_i64().map(|int| int as u64))
            .ok_or_else(|| AccessError::mismatch(format!("cannot store {value:?} into a bitfield")))?;
        access(self.storage.scope_ref(), || {
            let (mut bytes, storage) = self.storage_bytes()?;
            let word = insert(load_word(&bytes, storage.endianness), self.offset, self.width, raw);
            store_word(word, &mut bytes, storage.endianness);
            // Safety: `storage_bytes` checked the range and the gate is held.
            unsafe { write_raw(self.storage.address, &bytes) };
            Ok(())
        })
    }

    fn load_word(&self) -> AccessResult<u64> {
        let (bytes, storage) = self.storage_bytes()?;
        Ok(load_word(&bytes, storage.endianness))
    }

    fn storage_bytes(&self) -> AccessResult<(ByteBuf, ScalarType)> {
        let storage = self
            .storage
            .ty
            .as_bitfields()
            .map(|spec| spec.storage)
            .ok_or_else(|| self.storage.type_mismatch("a bitfield group"))?;
        Ok((self.storage.read_bytes(storage.byte_size())?, storage))
    }
}

/// Anything that is a view over a [`Pointer`].
pub trait AsPointer {
    fn as_pointer(&self) -> &Pointer;
}

impl AsPointer for Pointer {
    fn as_pointer(&self) -> &Pointer {
        self
    }
}

/// Copies the value behind `source` over `destination`.
///
/// Both handles must have structurally equal types; arrays must agree on element type and
/// length. Nothing is copied unless every check passes.
pub fn assign(source: &impl AsPointer, destination: &impl AsPointer) -> AccessResult<()> {
    let source = source.as_pointer();
    let destination = destination.as_pointer();
    if source.is_null() || destination.is_null() {
        return Err(AccessError::NullArgument { operation: "assign" });
    }
    if source.ty != destination.ty {
        return Err(AccessError::mismatch(format!(
            "cannot assign {} to {}",
            source.ty, destination.ty
        )));
    }
    if !source.ty.is_storable() {
        return Err(AccessError::mismatch(format!("type {} has no stored value", source.ty)));
    }
    let len = source.ty.size();
    access_pair(&source.scope, &destination.scope, || {
        source.check(len)?;
        destination.check(len)?;
        // Safety: both ranges were checked and both gates are held.
        unsafe { copy_raw(source.address, destination.address, len) };
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{DataModel, Endianness, Parser};
    use crate::memory::ErrorKind;

    fn ty(text: &str) -> Arc<Type> {
        Parser::with_model(text, DataModel::Lp64).single().unwrap().ty
    }

    #[test]
    fn scalar_get_set_round_trip() {
        let scope = Scope::new();
        let ptr = scope.allocate(&ty("i")).unwrap();
        assert_eq!(ptr.get().unwrap(), Value::Int(0), "fresh memory is zeroed");
        ptr.set(-42i32).unwrap();
        assert_eq!(ptr.get().unwrap(), Value::Int(-42));
        assert_eq!(ptr.read::<i32>().unwrap(), -42);
        assert!(ptr.read::<u32>().is_err(), "typed reads must match the layout");
    }

    #[test]
    fn big_endian_write_reads_reversed_as_little() {
        let scope = Scope::new();
        let big = scope.allocate(&ty(">J")).unwrap();
        big.write(0x0102_0304_0506_0708u64).unwrap();
        let little = big.cast(&ty("<J"));
        assert_eq!(little.read::<u64>().unwrap(), 0x0807_0605_0403_0201);
        let native = big.cast(&ty("J"));
        let expected = if Endianness::host() == Endianness::Big {
            0x0102_0304_0506_0708
        } else {
            0x0807_0605_0403_0201
        };
        assert_eq!(native.read::<u64>().unwrap(), expected);
    }

    #[test]
    fn widening_cast_of_small_region_fails() {
        // a one byte region cannot be read as a four byte integer
        let scope = Scope::new();
        let byte = scope.allocate(&ty("C")).unwrap();
        let wide = byte.cast(&ty("i"));
        let err = wide.get().unwrap_err();
        assert!(matches!(err, AccessError::OutOfBounds { len: 4, .. }), "got {err:?}");
        assert_eq!(err.kind(), ErrorKind::Bounds);
        assert!(byte.get().is_ok(), "the original view still fits");
    }

    #[test]
    fn offset_is_lazy_and_bounded() {
        let scope = Scope::new();
        let array = scope.allocate_array(&ty("S"), 2).unwrap();
        let first = array.at(0).unwrap();
        let past_end = first.offset(2);
        assert_eq!(past_end.address(), first.address() + 4, "offset only moves the address");
        assert!(matches!(past_end.get(), Err(AccessError::OutOfBounds { .. })));
        first.offset(1).set(7u16).unwrap();
        assert_eq!(array.get(1).unwrap(), Value::UInt(7));
    }

    #[test]
    fn null_pointer_values_round_trip() {
        let scope = Scope::new();
        let slot = scope.allocate(&ty("P:i")).unwrap();
        slot.set(Value::NULL).unwrap();
        assert!(slot.get().unwrap().is_null());
        let target = slot.deref().unwrap();
        assert!(target.is_null());
        assert_eq!(target.get().unwrap_err(), AccessError::NullDereference);
    }

    #[test]
    fn deref_follows_addresses_inside_the_scope() {
        let scope = Scope::new();
        let value = scope.allocate(&ty("i")).unwrap();
        value.set(99i32).unwrap();
        let slot = scope.allocate(&ty("P:i")).unwrap();
        slot.set(Value::Address(value.address())).unwrap();
        let target = slot.deref().unwrap();
        assert_eq!(target.get().unwrap(), Value::Int(99));

        slot.set(Value::Address(0x10)).unwrap();
        let foreign = slot.deref().unwrap();
        assert_eq!(foreign.extent(), Extent::Foreign);
        assert!(matches!(foreign.get(), Err(AccessError::OutOfBounds { .. })));
    }

    #[test]
    fn bitfield_refs_leave_siblings_untouched() {
        let scope = Scope::new();
        let group = scope.allocate(&ty("u16:2b9b5b")).unwrap();
        group.set(0b00011_000000010_01u16).unwrap();
        group.field(1).unwrap().set(60u64).unwrap();
        let values: Vec<Value> = (0..3).map(|index| group.field(index).unwrap().get().unwrap()).collect();
        assert_eq!(values, [Value::UInt(1), Value::UInt(60), Value::UInt(3)]);
        assert!(matches!(group.field(3), Err(AccessError::IndexOutOfRange { index: 3, len: 3 })));
    }

    #[test]
    fn signed_bitfields_sign_extend() {
        let scope = Scope::new();
        let group = scope.allocate(&ty("s:4b4b")).unwrap();
        group.field(0).unwrap().set(-3i64).unwrap();
        assert_eq!(group.field(0).unwrap().get().unwrap(), Value::Int(-3));
        assert_eq!(group.field(1).unwrap().get().unwrap(), Value::Int(0));
    }

    #[test]
    fn raw_handles_infer_their_extent() {
        let scope = Scope::new();
        let backing = scope.allocate(&ty("j")).unwrap();
        backing.set(5i64).unwrap();
        let void = Arc::new(Type::Scalar(ScalarType::VOID));
        let opaque = unsafe { Pointer::from_raw(backing.address(), void, &scope) };
        assert_eq!(opaque.extent(), Extent::Unbounded);
        let typed = opaque.cast(&ty("j"));
        assert_eq!(typed.extent(), Extent::Inferred { start: backing.address(), len: 8 });
        assert_eq!(typed.get().unwrap(), Value::Int(5));
    }

    #[test]
    fn assign_requires_equal_types() {
        let scope = Scope::new();
        let a = scope.allocate(&ty("[i s]")).unwrap();
        let b = scope.allocate(&ty("[i s]")).unwrap();
        let c = scope.allocate(&ty("[i s c]")).unwrap();
        a.set(Value::Aggregate(vec![Value::Int(1), Value::Int(2)])).unwrap();
        assign(&a, &b).unwrap();
        assert_eq!(b.get().unwrap(), a.get().unwrap());
        let err = assign(&a, &c).unwrap_err();
        assert!(matches!(err, AccessError::Mismatch { .. }));
        let null = Pointer::null(ty("[i s]"), &scope);
        assert_eq!(
            assign(&null, &b).unwrap_err(),
            AccessError::NullArgument { operation: "assign" }
        );
    }

    #[test]
    fn oversized_array_views_are_refused() {
        let scope = Scope::new();
        let first = scope.allocate(&ty("J")).unwrap();
        let err = first.as_array_of(usize::MAX / 4).unwrap_err();
        assert!(matches!(err, AccessError::Mismatch { .. }), "got {err:?}");
        assert_eq!(first.as_array_of(1).unwrap().len(), 1);
    }

    #[test]
    fn raw_address_checks_liveness() {
        let scope = Scope::new();
        let ptr = scope.allocate(&ty("i")).unwrap();
        assert_eq!(ptr.raw_address().unwrap(), ptr.address());
        scope.close();
        assert_eq!(ptr.raw_address().unwrap_err(), AccessError::ScopeNotAlive);
        assert!(!ptr.is_alive());
    }
}
