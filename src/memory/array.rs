//! Fixed-length array views.

use std::sync::Arc;

use crate::layout::Type;

use super::error::{AccessError, AccessResult};
use super::handle::{AsPointer, Pointer};
use super::region::write_raw;
use super::scope::access;
use super::value::{Value, encode};

#[derive(Clone, Debug)]
pub struct Array {
    ptr: Pointer,
    element: Arc<Type>,
    len: usize,
}

impl Array {
    pub(crate) fn new(ptr: Pointer) -> AccessResult<Self> {
        let array = ptr.ty().as_array().ok_or_else(|| {
            AccessError::mismatch(format!("handle of type {} is not an array", ptr.ty()))
        })?;
        let len = array.element_count().ok_or_else(|| {
            AccessError::mismatch(format!("wildcard array {} has no length yet", ptr.ty()))
        })?;
        let element = array.element.clone();
        Ok(Self { ptr, element, len })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn element(&self) -> &Arc<Type> {
        &self.element
    }

    pub fn ptr(&self) -> &Pointer {
        &self.ptr
    }

    pub fn address(&self) -> usize {
        self.ptr.address()
    }

    /// Pointer to element `index`.
    pub fn at(&self, index: usize) -> AccessResult<Pointer> {
        if index >= self.len {
            return Err(AccessError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        Ok(self.ptr.project(index * self.stride(), self.element.clone()))
    }

    pub fn get(&self, index: usize) -> AccessResult<Value> {
        self.at(index)?.get()
    }

    pub fn set(&self, index: usize, value: impl Into<Value>) -> AccessResult<()> {
        self.at(index)?.set(value)
    }

    /// Every element, read under a single liveness check.
    pub fn to_vec(&self) -> AccessResult<Vec<Value>> {
        access(self.ptr.scope_ref(), || match self.ptr.load()? {
            Value::Aggregate(values) => Ok(values),
            other => Ok(vec![other]),
        })
    }

    /// Overwrites every element; `values` must match the array length. Memory is written
    /// only once every element has encoded.
    pub fn fill_from(&self, values: &[Value]) -> AccessResult<()> {
        if values.len() != self.len {
            return Err(AccessError::mismatch(format!(
                "expected {} values, got {}",
                self.len,
                values.len()
            )));
        }
        let stride = self.stride();
        access(self.ptr.scope_ref(), || {
            let mut bytes = self.ptr.read_bytes(self.len * stride)?;
            for (index, value) in values.iter().enumerate() {
                encode(&mut bytes[index * stride..], &self.element, value)?;
            }
            // Safety: `read_bytes` checked the same range and the gate is still held.
            unsafe { write_raw(self.ptr.address(), &bytes) };
            Ok(())
        })
    }

    fn stride(&self) -> usize {
        self.element.layout().size
    }
}

impl AsPointer for Array {
    fn as_pointer(&self) -> &Pointer {
        &self.ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_one;
    use crate::memory::{ErrorKind, Scope};

    fn ty(text: &str) -> Arc<Type> {
        parse_one(text).unwrap().ty
    }

    #[test]
    fn elements_are_indexed_by_stride() {
        let scope = Scope::new();
        let array = scope.allocate_array(&ty("[c i]"), 3).unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.at(2).unwrap().address(), array.address() + 16);
        array.set(1, vec![Value::Int(1), Value::Int(-5)]).unwrap();
        assert_eq!(array.get(1).unwrap(), Value::Aggregate(vec![Value::Int(1), Value::Int(-5)]));
        let err = array.at(3).unwrap_err();
        assert_eq!(err, AccessError::IndexOutOfRange { index: 3, len: 3 });
        assert_eq!(err.kind(), ErrorKind::Bounds);
    }

    #[test]
    fn fill_and_collect() {
        let scope = Scope::new();
        let values = [Value::UInt(1), Value::UInt(2), Value::UInt(3)];
        let array = scope.allocate_array_from(&ty("S"), &values).unwrap();
        assert_eq!(array.to_vec().unwrap(), values);
        assert!(array.fill_from(&values[..2]).is_err(), "length must match");
        assert_eq!(array.to_vec().unwrap(), values);
    }

    #[test]
    fn failed_fill_leaves_memory_untouched() {
        let scope = Scope::new();
        let array = scope.allocate_array_from(&ty("P:i"), &[Value::Address(8), Value::Address(16)]).unwrap();
        let err = array.fill_from(&[Value::Address(1), Value::Float(0.5)]).unwrap_err();
        assert!(matches!(err, AccessError::Mismatch { .. }));
        assert_eq!(array.to_vec().unwrap(), [Value::Address(8), Value::Address(16)]);
    }

    #[test]
    fn wildcard_arrays_need_a_length() {
        let scope = Scope::new();
        let storage = scope.allocate_array(&ty("i"), 4).unwrap();
        let wildcard = storage.ptr().cast(&ty("*i"));
        assert!(wildcard.as_array().is_err());
        let view = wildcard.as_array_of(2).unwrap();
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn closed_scope_refuses_reads() {
        let scope = Scope::new();
        let array = scope.allocate_array(&ty("C"), 2).unwrap();
        scope.close();
        assert_eq!(array.to_vec().unwrap_err(), AccessError::ScopeNotAlive);
        assert_eq!(array.get(0).unwrap_err(), AccessError::ScopeNotAlive);
    }
}
