use std::{
    alloc::{GlobalAlloc, Layout},
    mem, ptr,
    sync::{Mutex, MutexGuard},
};

use crate::{block::Header, freelist::FreeList};

/// Thread-safe handle to the allocator.
///
/// Every operation takes the one internal lock for its whole duration,
/// OS calls included, so concurrent allocs and frees behave as if executed
/// one after another. The semantics mirror libc's `malloc`/`free`, with one
/// deliberate difference: if the OS refuses to map or unmap pages, the
/// allocator panics instead of reporting failure.
///
/// `new` is `const`, so a `MemArena` can live in a `static` and serve as
/// the process allocator:
///
/// ```
/// use memarena::MemArena;
///
/// #[global_allocator]
/// static ALLOCATOR: MemArena = MemArena::new();
///
/// fn main() {
///     let greeting = String::from("served by MemArena");
///     assert!(greeting.ends_with("MemArena"));
/// }
/// ```
pub struct MemArena {
    inner: Mutex<FreeList>,
}

impl MemArena {
    /// Creates an allocator that owns no memory yet. Pages are mapped on
    /// first demand.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(FreeList::new()),
        }
    }

    /// Allocates `size` bytes and returns the address of an uninitialized
    /// region at least that large, or null when `size` is zero. The region
    /// stays owned by the caller until passed to [`MemArena::free`].
    ///
    /// Panics if the OS cannot supply pages.
    ///
    /// # Safety
    ///
    /// The call itself is sound; it is marked `unsafe` because the returned
    /// raw region is uninitialized and unmanaged, and every use of it is up
    /// to the caller.
    pub unsafe fn alloc(&self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }
        let mut list = self.lock();
        unsafe { list.alloc(size) }
    }

    /// Returns a region previously produced by [`MemArena::alloc`] to the
    /// allocator. Null is a no-op. If the region's arena ends up fully
    /// unused, its pages go back to the OS.
    ///
    /// Panics if the OS refuses to take pages back.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or an address returned by [`MemArena::alloc`] on
    /// this same allocator and not freed since, and the caller must not
    /// touch the region afterwards.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let mut list = self.lock();
        unsafe { list.free(ptr) }
    }

    fn lock(&self) -> MutexGuard<'_, FreeList> {
        self.inner.lock().expect("allocator lock poisoned")
    }
}

impl Default for MemArena {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for MemArena {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        // Payloads are aligned to the block header and no further; refuse
        // layouts this allocator cannot place.
        if layout.align() > mem::align_of::<Header>() {
            return ptr::null_mut();
        }

        unsafe { MemArena::alloc(self, layout.size()) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        unsafe { MemArena::free(self, ptr) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_allocation_and_write() {
        let allocator = MemArena::new();

        unsafe {
            let block1 = allocator.alloc(mem::size_of::<u32>()).cast::<u32>();
            *block1 = 12415;
            assert_eq!(*block1, 12415);

            let block2 = allocator.alloc(mem::size_of::<u32>()).cast::<u32>();
            *block2 = 36353;
            assert_eq!(*block2, 36353);

            // Check block1 has not been overwritten
            assert_eq!(*block1, 12415);

            allocator.free(block1.cast());
            allocator.free(block2.cast());
        }
    }

    #[test]
    fn alloc_zero() {
        let allocator = MemArena::new();

        unsafe {
            let p = allocator.alloc(0);
            assert!(p.is_null());

            // Freeing what alloc(0) returned must not fault.
            allocator.free(p);
        }
    }

    #[test]
    fn free_null() {
        // This should not do anything, it should not panic.
        let allocator = MemArena::new();

        unsafe {
            allocator.free(ptr::null_mut());
        }
    }

    #[test]
    fn serves_layouts_through_global_alloc() {
        let allocator = MemArena::new();
        let layout = Layout::new::<u64>();

        unsafe {
            let p = GlobalAlloc::alloc(&allocator, layout);
            assert!(!p.is_null());
            assert_eq!(p as usize % layout.align(), 0);

            p.cast::<u64>().write(0xDEAD_BEEF_u64);
            assert_eq!(p.cast::<u64>().read(), 0xDEAD_BEEF_u64);

            GlobalAlloc::dealloc(&allocator, p, layout);
        }
    }

    #[test]
    fn refuses_over_aligned_layouts() {
        let allocator = MemArena::new();
        let layout = Layout::from_size_align(64, 2 * mem::align_of::<Header>()).unwrap();

        unsafe {
            assert!(GlobalAlloc::alloc(&allocator, layout).is_null());
        }
    }
}
