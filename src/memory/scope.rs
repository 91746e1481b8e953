//! Arena scopes that own native regions and decide whether handles may still touch them.
//!
//! A scope owns its regions and the callback resources allocated through it. Children created
//! with [`Scope::fork`] hold a weak link to their parent and are dead as soon as any ancestor
//! is. Closing is one-way: it flips the liveness flag under the scope's write gate, closes the
//! live children depth-first, then frees the regions. Every handle access holds the read side of
//! the gate for the duration of the liveness check and the memory operation, so an access either
//! completes against live memory or fails with [`AccessError::ScopeNotAlive`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};

use log::{debug, warn};

use crate::layout::{ArrayType, Container, Type};

use super::array::Array;
use super::callback::{self, Callback, CallbackResource};
use super::error::{AccessError, AccessResult};
use super::handle::{Extent, Pointer};
use super::region::Region;
use super::structs::Struct;
use super::value::Value;

/// Size of the stub region that gives each callback a unique entry point.
const CALLBACK_STUB_LEN: usize = 16;

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);
static GLOBAL: OnceLock<Scope> = OnceLock::new();

/// Allocation policy for the regions of one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeConfig {
    /// Byte written over every fresh region.
    pub fill: u8,
    /// Lower bound on region alignment; the layout's own alignment wins when larger.
    pub min_align: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            fill: 0,
            min_align: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScopeStats {
    pub regions: usize,
    pub allocated_bytes: usize,
    pub children: usize,
    pub callbacks: usize,
}

#[derive(Default)]
struct ScopeState {
    regions: Vec<Region>,
    children: Vec<Weak<ScopeInner>>,
    callbacks: Vec<Arc<CallbackResource>>,
}

pub(crate) struct ScopeInner {
    id: u64,
    alive: AtomicBool,
    gate: RwLock<()>,
    parent: Option<Weak<ScopeInner>>,
    global: bool,
    config: ScopeConfig,
    state: Mutex<ScopeState>,
}

impl ScopeInner {
    fn new(parent: Option<Weak<ScopeInner>>, config: ScopeConfig, global: bool) -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            alive: AtomicBool::new(true),
            gate: RwLock::new(()),
            parent,
            global,
            config,
            state: Mutex::new(ScopeState::default()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Own flag plus every ancestor's.
    fn is_alive(&self) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            return false;
        }
        match &self.parent {
            None => true,
            Some(parent) => parent.upgrade().is_some_and(|parent| parent.is_alive()),
        }
    }

    fn close(&self) {
        let gate = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        let state = std::mem::take(&mut *self.lock_state());
        for child in state.children.iter().filter_map(Weak::upgrade) {
            child.close();
        }
        for resource in &state.callbacks {
            callback::unregister(resource);
        }
        let bytes: usize = state.regions.iter().map(Region::len).sum();
        let regions = state.regions.len();
        drop(state);
        drop(gate);
        debug!("closed scope {} and released {regions} regions ({bytes} bytes)", self.id);
    }

    fn find_region(&self, address: usize) -> Option<(usize, usize)> {
        self.lock_state()
            .regions
            .iter()
            .find(|region| region.contains(address))
            .map(|region| (region.start(), region.len()))
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shared handle to one scope. Clones refer to the same arena; dropping the last one closes it.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self::with_config(ScopeConfig::default())
    }

    pub fn with_config(config: ScopeConfig) -> Self {
        let scope = Self {
            inner: Arc::new(ScopeInner::new(None, config, false)),
        };
        debug!("created scope {}", scope.id());
        scope
    }

    /// Process-wide scope that lives until exit and ignores `close()`.
    pub fn global() -> Scope {
        GLOBAL
            .get_or_init(|| Scope {
                inner: Arc::new(ScopeInner::new(None, ScopeConfig::default(), true)),
            })
            .clone()
    }

    /// Creates a new scope, runs `body` in it and closes it on every exit path.
    pub fn scoped<R>(body: impl FnOnce(&Scope) -> R) -> R {
        Scope::new().with(body)
    }

    /// Runs `body` and closes this scope afterwards, including when `body` panics.
    pub fn with<R>(&self, body: impl FnOnce(&Scope) -> R) -> R {
        let guard = CloseOnDrop(self);
        body(guard.0)
    }

    pub fn fork(&self) -> AccessResult<Scope> {
        let _gate = self.read_gate();
        if !self.inner.is_alive() {
            return Err(AccessError::ScopeNotAlive);
        }
        let child = Scope {
            inner: Arc::new(ScopeInner::new(
                Some(Arc::downgrade(&self.inner)),
                self.inner.config,
                false,
            )),
        };
        let mut state = self.inner.lock_state();
        state.children.retain(|child| child.strong_count() > 0);
        state.children.push(Arc::downgrade(&child.inner));
        drop(state);
        debug!("forked scope {} from {}", child.id(), self.id());
        Ok(child)
    }

    /// Closes this scope and its children. Closing twice is a no-op; the global scope never closes.
    pub fn close(&self) {
        if self.inner.global {
            warn!("ignoring close() on the global scope");
            return;
        }
        self.inner.close();
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    pub fn is_global(&self) -> bool {
        self.inner.global
    }

    pub fn config(&self) -> ScopeConfig {
        self.inner.config
    }

    pub fn parent(&self) -> Option<Scope> {
        let parent = self.inner.parent.as_ref()?.upgrade()?;
        Some(Scope { inner: parent })
    }

    pub fn children(&self) -> Vec<Scope> {
        self.inner
            .lock_state()
            .children
            .iter()
            .filter_map(Weak::upgrade)
            .map(|inner| Scope { inner })
            .collect()
    }

    pub fn stats(&self) -> ScopeStats {
        let state = self.inner.lock_state();
        ScopeStats {
            regions: state.regions.len(),
            allocated_bytes: state.regions.iter().map(Region::len).sum(),
            children: state.children.iter().filter(|child| child.strong_count() > 0).count(),
            callbacks: state.callbacks.len(),
        }
    }

    pub fn allocated_bytes(&self) -> usize {
        self.stats().allocated_bytes
    }

    pub fn region_count(&self) -> usize {
        self.stats().regions
    }

    /// Allocates one zeroed value of `ty`.
    pub fn allocate(&self, ty: &Arc<Type>) -> AccessResult<Pointer> {
        if ty.is_wildcard() {
            return Err(AccessError::mismatch(
                "a wildcard array needs a length; use allocate_array",
            ));
        }
        if !ty.is_storable() {
            return Err(AccessError::mismatch(format!("type {ty} is not storable")));
        }
        let layout = ty
            .checked_layout()
            .ok_or(AccessError::Alloc { size: ty.size() })?;
        let start = self.allocate_region(layout.size, layout.align)?;
        Ok(self.tracked(start, layout.size, ty.clone()))
    }

    /// Allocates `len` elements; `element` may also be a wildcard array, whose element is used.
    pub fn allocate_array(&self, element: &Arc<Type>, len: usize) -> AccessResult<Array> {
        let element = match element.as_array() {
            Some(array) if array.is_wildcard() => array.element.clone(),
            _ => element.clone(),
        };
        let ty = Arc::new(Type::Array(ArrayType::fixed(element, len)));
        self.allocate(&ty)?.as_array()
    }

    pub fn allocate_array_from(&self, element: &Arc<Type>, values: &[Value]) -> AccessResult<Array> {
        let array = self.allocate_array(element, values.len())?;
        array.fill_from(values)?;
        Ok(array)
    }

    pub fn allocate_struct(&self, ty: &Arc<Type>) -> AccessResult<Struct> {
        if ty.as_container().is_none() {
            return Err(AccessError::mismatch(format!("type {ty} is not a struct or union")));
        }
        self.allocate(ty)?.as_struct()
    }

    /// Allocates a struct whose trailing wildcard member holds `tail_len` elements. The
    /// wildcard may sit at the end of a nested last member.
    pub fn allocate_struct_with_tail(&self, ty: &Arc<Type>, tail_len: usize) -> AccessResult<Struct> {
        if ty.as_container().is_none() {
            return Err(AccessError::mismatch(format!("type {ty} is not a struct or union")));
        }
        if !ty.is_open_ended() {
            return Err(AccessError::mismatch(format!(
                "type {ty} has no trailing wildcard member"
            )));
        }
        let sized = with_tail(ty, tail_len)?;
        self.allocate_struct(&sized)
    }

    /// Registers `body` as a callback with signature `ty` and gives it a stable entry point.
    pub fn allocate_callback<F>(&self, ty: &Arc<Type>, body: F) -> AccessResult<Callback>
    where
        F: Fn(&[Value]) -> AccessResult<Value> + Send + Sync + 'static,
    {
        let signature = match &**ty {
            Type::Function(_) => ty.clone(),
            Type::Pointer(pointer) if pointer.is_function() => pointer.pointee.clone(),
            _ => {
                return Err(AccessError::mismatch(format!(
                    "type {ty} is not a function signature"
                )));
            }
        };
        let _gate = self.read_gate();
        if !self.inner.is_alive() {
            return Err(AccessError::ScopeNotAlive);
        }
        let region = Region::allocate(CALLBACK_STUB_LEN, CALLBACK_STUB_LEN, self.inner.config.fill)?;
        let entry_point = region.start();
        let resource = Arc::new(CallbackResource::new(
            entry_point,
            CALLBACK_STUB_LEN,
            signature,
            Arc::downgrade(&self.inner),
            Arc::new(body),
        ));
        callback::register(&resource);
        let handle = Callback::from_resource(&resource);
        let mut state = self.inner.lock_state();
        state.regions.push(region);
        state.callbacks.push(resource);
        Ok(handle)
    }

    fn allocate_region(&self, size: usize, align: usize) -> AccessResult<usize> {
        let _gate = self.read_gate();
        if !self.inner.is_alive() {
            return Err(AccessError::ScopeNotAlive);
        }
        let config = self.inner.config;
        let region = Region::allocate(size, align.max(config.min_align), config.fill)?;
        let start = region.start();
        self.inner.lock_state().regions.push(region);
        debug!("scope {} allocated {size} bytes at 0x{start:X}", self.id());
        Ok(start)
    }

    fn tracked(&self, start: usize, len: usize, ty: Arc<Type>) -> Pointer {
        Pointer::with_extent(
            start,
            ty,
            Arc::downgrade(&self.inner),
            Extent::Tracked { start, len },
        )
    }

    fn read_gate(&self) -> std::sync::RwLockReadGuard<'_, ()> {
        self.inner.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ScopeInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_weak(scope: &Weak<ScopeInner>) -> Option<Scope> {
        scope.upgrade().map(|inner| Scope { inner })
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("alive", &self.is_alive())
            .field("global", &self.inner.global)
            .finish()
    }
}

struct CloseOnDrop<'a>(&'a Scope);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Rebuilds an open-ended type with its wildcard fixed to `len` elements.
fn with_tail(ty: &Arc<Type>, len: usize) -> AccessResult<Arc<Type>> {
    match &**ty {
        Type::Array(array) if array.is_wildcard() => {
            let sized = Type::Array(array.resolved(len));
            if sized.checked_layout().is_none() {
                return Err(AccessError::Alloc { size: sized.size() });
            }
            Ok(Arc::new(sized))
        }
        Type::Container(container) => {
            let mut members = container.members.clone();
            let Some(last) = members.last_mut() else {
                return Ok(ty.clone());
            };
            last.ty = with_tail(&last.ty, len)?;
            let sized = Container::new(container.kind, members)
                .map_err(|_| AccessError::Alloc { size: usize::MAX })?;
            Ok(Arc::new(Type::Container(sized)))
        }
        _ => Ok(ty.clone()),
    }
}

/// Runs `op` while holding `scope`'s read gate, failing if the scope or an ancestor is dead.
pub(crate) fn access<R>(
    scope: &Weak<ScopeInner>,
    op: impl FnOnce() -> AccessResult<R>,
) -> AccessResult<R> {
    let inner = scope.upgrade().ok_or(AccessError::ScopeNotAlive)?;
    let _gate = inner.gate.read().unwrap_or_else(PoisonError::into_inner);
    if !inner.is_alive() {
        return Err(AccessError::ScopeNotAlive);
    }
    op()
}

/// Two-scope variant of [`access`]; gates are taken in ascending scope id.
pub(crate) fn access_pair<R>(
    first: &Weak<ScopeInner>,
    second: &Weak<ScopeInner>,
    op: impl FnOnce() -> AccessResult<R>,
) -> AccessResult<R> {
    let a = first.upgrade().ok_or(AccessError::ScopeNotAlive)?;
    let b = second.upgrade().ok_or(AccessError::ScopeNotAlive)?;
    if Arc::ptr_eq(&a, &b) {
        return access(first, op);
    }
    let (low, high) = if a.id < b.id { (&a, &b) } else { (&b, &a) };
    let _low = low.gate.read().unwrap_or_else(PoisonError::into_inner);
    let _high = high.gate.read().unwrap_or_else(PoisonError::into_inner);
    if !a.is_alive() || !b.is_alive() {
        return Err(AccessError::ScopeNotAlive);
    }
    op()
}

/// Finds the region holding `address` in `scope` or one of its ancestors.
pub(crate) fn locate(
    scope: &Weak<ScopeInner>,
    address: usize,
) -> Option<(Weak<ScopeInner>, usize, usize)> {
    let mut current = scope.upgrade();
    while let Some(inner) = current {
        if let Some((start, len)) = inner.find_region(address) {
            return Some((Arc::downgrade(&inner), start, len));
        }
        current = inner.parent.as_ref().and_then(Weak::upgrade);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::parse_one;

    fn int32() -> Arc<Type> {
        parse_one("i").unwrap().ty
    }

    #[test]
    fn close_is_terminal_and_idempotent() {
        let scope = Scope::new();
        assert!(scope.is_alive());
        scope.close();
        scope.close();
        assert!(!scope.is_alive(), "a closed scope never comes back");
        assert_eq!(scope.allocate(&int32()).unwrap_err(), AccessError::ScopeNotAlive);
        assert_eq!(scope.fork().unwrap_err(), AccessError::ScopeNotAlive);
    }

    #[test]
    fn closing_parent_closes_children() {
        let parent = Scope::new();
        let child = parent.fork().unwrap();
        let grandchild = child.fork().unwrap();
        assert_eq!(child.parent(), Some(parent.clone()));
        assert_eq!(parent.children(), vec![child.clone()]);
        parent.close();
        assert!(!child.is_alive());
        assert!(!grandchild.is_alive());
    }

    #[test]
    fn closing_child_leaves_parent_alive() {
        let parent = Scope::new();
        let child = parent.fork().unwrap();
        child.close();
        assert!(parent.is_alive());
        assert!(parent.allocate(&int32()).is_ok());
    }

    #[test]
    fn global_scope_ignores_close() {
        let global = Scope::global();
        global.close();
        assert!(global.is_alive(), "the global scope lives for the whole process");
        assert!(global.is_global());
        assert_eq!(global, Scope::global());
        let child = global.fork().unwrap();
        child.close();
        assert!(global.is_alive());
    }

    #[test]
    fn regions_are_accounted() {
        let scope = Scope::with_config(ScopeConfig {
            fill: 0,
            min_align: 16,
        });
        let ptr = scope.allocate(&int32()).unwrap();
        assert_eq!(ptr.address() % 16, 0, "minimum alignment is applied");
        scope.allocate_array(&int32(), 4).unwrap();
        let stats = scope.stats();
        assert_eq!(stats.regions, 2);
        assert_eq!(stats.allocated_bytes, 20);
        assert_eq!(scope.region_count(), 2);
    }

    #[test]
    fn with_closes_on_panic() {
        let scope = Scope::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scope.with(|_| panic!("body failed"));
        }));
        assert!(result.is_err());
        assert!(!scope.is_alive(), "the guard closes the scope while unwinding");
    }

    #[test]
    fn dropping_last_handle_closes_scope() {
        let scope = Scope::new();
        let ptr = scope.allocate(&int32()).unwrap();
        drop(scope);
        assert_eq!(ptr.get().unwrap_err(), AccessError::ScopeNotAlive);
    }

    #[test]
    fn non_storable_types_are_refused() {
        let scope = Scope::new();
        let func = parse_one("(i)v").unwrap().ty;
        assert!(matches!(scope.allocate(&func), Err(AccessError::Mismatch { .. })));
        let wildcard = parse_one("*i").unwrap().ty;
        assert!(scope.allocate(&wildcard).is_err());
        assert_eq!(scope.allocate_array(&wildcard, 3).unwrap().len(), 3);
    }

    #[test]
    fn oversized_arrays_fail_to_allocate() {
        let scope = Scope::new();
        let err = scope.allocate_array(&int32(), usize::MAX / 2).unwrap_err();
        assert!(matches!(err, AccessError::Alloc { .. }), "got {err:?}");
        assert_eq!(err.kind(), crate::memory::ErrorKind::Alloc);
        assert_eq!(scope.region_count(), 0, "nothing was reserved");
        let err = scope
            .allocate_struct_with_tail(&parse_one("[i *j]").unwrap().ty, usize::MAX / 4)
            .unwrap_err();
        assert!(matches!(err, AccessError::Alloc { .. }), "got {err:?}");
    }

    #[test]
    fn nested_tail_gets_its_length() {
        let scope = Scope::new();
        let ty = parse_one("[c(kind) [S(count) *i(items)](body)]").unwrap().ty;
        let record = scope.allocate_struct_with_tail(&ty, 3).unwrap();
        assert_eq!(record.ptr().ty().size(), 4 + 4 + 12);
        let body = record.get("body").unwrap();
        assert_eq!(body.as_slice().map(<[Value]>::len), Some(2));
        let fixed = parse_one("[c i]").unwrap().ty;
        assert!(matches!(
            scope.allocate_struct_with_tail(&fixed, 3),
            Err(AccessError::Mismatch { .. })
        ));
    }
}
