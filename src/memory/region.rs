//! Heap regions owned by a scope, and the raw copies performed inside them.

use std::alloc::{Layout, alloc, alloc_zeroed, dealloc};
use std::ptr::NonNull;

use super::error::{AccessError, AccessResult};

/// One zeroed (or filled) allocation. Freed when dropped, which only its scope does.
#[derive(Debug)]
pub struct Region {
    base: NonNull<u8>,
    layout: Layout,
    len: usize,
}

// The region is plain bytes; synchronisation is the owning scope's access gate.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    pub fn allocate(len: usize, align: usize, fill: u8) -> AccessResult<Self> {
        let layout = Layout::from_size_align(len.max(1), align.max(1).next_power_of_two())
            .map_err(|_| AccessError::Alloc { size: len })?;
        // Safety: the layout has a non-zero size.
        let raw = unsafe {
            if fill == 0 {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };
        let base = NonNull::new(raw).ok_or(AccessError::Alloc { size: len })?;
        if fill != 0 {
            // Safety: `base` points to `layout.size()` writable bytes.
            unsafe { base.as_ptr().write_bytes(fill, layout.size()) };
        }
        Ok(Self { base, layout, len })
    }

    #[inline(always)]
    pub fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Requested length; the allocation itself is at least one byte.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, address: usize) -> bool {
        let start = self.start();
        start <= address && address < start + self.layout.size()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // Safety: `base` was allocated with exactly this layout.
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}

/// Copies `out.len()` bytes starting at `address`.
///
/// # Safety
/// The range must lie inside a live region and the owning scope's gate must be held.
pub(crate) unsafe fn read_raw(address: usize, out: &mut [u8]) {
    unsafe { std::ptr::copy_nonoverlapping(address as *const u8, out.as_mut_ptr(), out.len()) };
}

/// # Safety
/// Same contract as [`read_raw`].
pub(crate) unsafe fn write_raw(address: usize, data: &[u8]) {
    unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), address as *mut u8, data.len()) };
}

/// Overlap-tolerant copy between two live ranges.
///
/// # Safety
/// Both ranges must satisfy the contract of [`read_raw`].
pub(crate) unsafe fn copy_raw(source: usize, destination: usize, len: usize) {
    unsafe { std::ptr::copy(source as *const u8, destination as *mut u8, len) };
}
