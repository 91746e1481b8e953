//! Host functions exposed through stable, scope-owned entry points.
//!
//! Each callback owns a small stub region whose address serves as its entry point. A
//! process-wide registry maps entry points back to their resources so a function pointer
//! read out of native memory resolves to the same callback it was written from.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};

use ahash::AHashMap;
use log::trace;

use crate::layout::{FunctionType, Type};

use super::error::{AccessError, AccessResult};
use super::handle::{AsPointer, Extent, Pointer};
use super::scope::{ScopeInner, access};
use super::value::Value;

pub type CallbackFn = dyn Fn(&[Value]) -> AccessResult<Value> + Send + Sync;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> MutexGuard<'static, AHashMap<usize, Weak<CallbackResource>>> {
    static REGISTRY: OnceLock<Mutex<AHashMap<usize, Weak<CallbackResource>>>> = OnceLock::new();
    REGISTRY
        .get_or_init(|| Mutex::new(AHashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn register(resource: &Arc<CallbackResource>) {
    registry().insert(resource.entry_point, Arc::downgrade(resource));
    trace!(
        "registered callback {} at 0x{:X}",
        resource.id, resource.entry_point
    );
}

pub(crate) fn unregister(resource: &CallbackResource) {
    registry().remove(&resource.entry_point);
    trace!("unregistered callback {}", resource.id);
}

pub(crate) fn lookup(entry_point: usize) -> Option<Arc<CallbackResource>> {
    registry().get(&entry_point).and_then(Weak::upgrade)
}

/// The binding behind a callback: its signature, entry point and current body.
pub struct CallbackResource {
    id: u64,
    entry_point: usize,
    stub_len: usize,
    signature: Arc<Type>,
    scope: Weak<ScopeInner>,
    body: RwLock<Arc<CallbackFn>>,
}

impl CallbackResource {
    pub(crate) fn new(
        entry_point: usize,
        stub_len: usize,
        signature: Arc<Type>,
        scope: Weak<ScopeInner>,
        body: Arc<CallbackFn>,
    ) -> Self {
        Self {
            id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
            entry_point,
            stub_len,
            signature,
            scope,
            body: RwLock::new(body),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn entry_point(&self) -> usize {
        self.entry_point
    }

    fn body(&self) -> Arc<CallbackFn> {
        self.body
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for CallbackResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackResource")
            .field("id", &self.id)
            .field("entry_point", &format_args!("0x{:X}", self.entry_point))
            .field("signature", &format_args!("{}", self.signature))
            .finish()
    }
}

/// Handle to a registered callback. Two handles are equal when they share a resource.
#[derive(Clone, Debug)]
pub struct Callback {
    ptr: Pointer,
    resource: Weak<CallbackResource>,
}

impl Callback {
    pub(crate) fn from_resource(resource: &Arc<CallbackResource>) -> Self {
        let ptr = Pointer::with_extent(
            resource.entry_point,
            resource.signature.clone(),
            resource.scope.clone(),
            Extent::Tracked {
                start: resource.entry_point,
                len: resource.stub_len,
            },
        );
        Self {
            ptr,
            resource: Arc::downgrade(resource),
        }
    }

    pub fn ptr(&self) -> &Pointer {
        &self.ptr
    }

    pub fn signature(&self) -> Option<&FunctionType> {
        self.ptr.ty().as_function()
    }

    /// Address to hand to native code as a function pointer.
    pub fn entry_point(&self) -> AccessResult<usize> {
        self.ptr.raw_address()
    }

    /// The entry point as a value for storing into pointer-typed memory.
    pub fn to_value(&self) -> AccessResult<Value> {
        self.entry_point().map(Value::Address)
    }

    pub fn resource(&self) -> Weak<CallbackResource> {
        self.resource.clone()
    }

    /// Calls the current body after checking liveness and the argument count.
    pub fn invoke(&self, args: &[Value]) -> AccessResult<Value> {
        let body = access(self.ptr.scope_ref(), || {
            let resource = self.live_resource()?;
            let accepted = resource
                .signature
                .as_function()
                .is_some_and(|function| function.accepts(args.len()));
            if !accepted {
                return Err(AccessError::mismatch(format!(
                    "callback {} cannot take {} arguments",
                    resource.signature,
                    args.len()
                )));
            }
            Ok(resource.body())
        })?;
        body(args)
    }

    /// Swaps the host function while keeping the entry point.
    pub fn replace<F>(&self, body: F) -> AccessResult<()>
    where
        F: Fn(&[Value]) -> AccessResult<Value> + Send + Sync + 'static,
    {
        access(self.ptr.scope_ref(), || {
            let resource = self.live_resource()?;
            *resource.body.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(body);
            trace!("replaced body of callback {}", resource.id);
            Ok(())
        })
    }

    fn live_resource(&self) -> AccessResult<Arc<CallbackResource>> {
        self.resource.upgrade().ok_or(AccessError::ScopeNotAlive)
    }
}

impl PartialEq for Callback {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.resource, &other.resource)
    }
}

impl Eq for Callback {}

impl AsPointer for Callback {
    fn as_pointer(&self) -> &Pointer {
        &self.ptr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_one;
    use crate::memory::Scope;

    fn adder(args: &[Value]) -> AccessResult<Value> {
        let sum = args.iter().filter_map(Value::as_i64).sum::<i64>();
        Ok(Value::Int(sum))
    }

    #[test]
    fn invoke_checks_arity() {
        let scope = Scope::new();
        let ty = parse_one("(i i)i").unwrap().ty;
        let callback = scope.allocate_callback(&ty, adder).unwrap();
        assert_eq!(callback.invoke(&[Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
        assert!(matches!(
            callback.invoke(&[Value::Int(2)]),
            Err(AccessError::Mismatch { .. })
        ));
    }

    #[test]
    fn replace_keeps_entry_point() {
        let scope = Scope::new();
        let ty = parse_one("(i *)i").unwrap().ty;
        let callback = scope.allocate_callback(&ty, adder).unwrap();
        let before = callback.entry_point().unwrap();
        callback.replace(|_| Ok(Value::Int(-1))).unwrap();
        assert_eq!(callback.entry_point().unwrap(), before);
        assert_eq!(callback.invoke(&[Value::Int(1), Value::Int(2)]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn function_pointer_round_trip_preserves_identity() {
        let scope = Scope::new();
        let ty = parse_one("()v").unwrap().ty;
        let callback = scope.allocate_callback(&ty, |_| Ok(Value::Void)).unwrap();
        let slot = scope.allocate(&parse_one("P:()v").unwrap().ty).unwrap();
        slot.set(callback.to_value().unwrap()).unwrap();
        let restored = slot.as_callback().unwrap();
        assert_eq!(restored, callback, "callbacks compare by resource identity");
        assert!(Weak::ptr_eq(&restored.resource(), &callback.resource()));
    }

    #[test]
    fn closed_scope_unregisters_callbacks() {
        let scope = Scope::new();
        let ty = parse_one("()i").unwrap().ty;
        let callback = scope.allocate_callback(&ty, |_| Ok(Value::Int(1))).unwrap();
        let entry = callback.entry_point().unwrap();
        let id = callback.resource().upgrade().unwrap().id();
        scope.close();
        assert!(lookup(entry).is_none_or(|found| found.id() != id), "entry point was released");
        assert_eq!(callback.invoke(&[]).unwrap_err(), AccessError::ScopeNotAlive);
        assert_eq!(callback.entry_point().unwrap_err(), AccessError::ScopeNotAlive);
        assert!(callback.resource().upgrade().is_none());
    }
}
