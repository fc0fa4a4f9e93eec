use std::{mem, ptr, ptr::NonNull};

use crate::{
    block::{Header, Link, HEADER_SIZE},
    kernel,
    utils::align,
};

/// The allocator engine: one singly linked intrusive list of every block in
/// every arena, in insertion order, headed by a permanent sentinel.
///
/// Blocks of one arena always form a contiguous run of the list, in
/// increasing address order, and no two adjacent free blocks of the same
/// arena survive an operation; they are coalesced on free. When every block
/// of an arena is free, the whole run is spliced out and the arena is
/// unmapped.
///
/// Nothing here locks. Callers serialize access; see [`crate::MemArena`].
pub(crate) struct FreeList {
    /// Permanent sentinel. Zero-sized and never allocated, so the walker
    /// always moves past it to a real block, and list-front insertion needs
    /// no special case.
    head: Header,
}

// The engine holds raw pointers into the arenas it manages. Every access is
// serialized by the mutex around it, so handing the whole engine to another
// thread is sound.
unsafe impl Send for FreeList {}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: Header::sentinel(),
        }
    }

    /// Allocates at least `size` bytes and returns the payload address, or
    /// null when `size` is zero.
    ///
    /// First fit: the walker takes the first free block large enough, never
    /// a later one. When the block's surplus can hold a header of its own,
    /// the surplus is carved off into a new free block; otherwise the caller
    /// silently receives the whole block. When the walk reaches the tail
    /// without a fit, a fresh arena is mapped and the walk resumes on its
    /// block, which is large enough by construction.
    ///
    /// Panics if the OS refuses to supply pages.
    ///
    /// **SAFETY**: Caller must guarantee exclusive access to the engine.
    pub(crate) unsafe fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return ptr::null_mut();
        }

        // Headers are written with typed stores, so every block start must
        // keep the header's alignment. Rounding payload sizes up preserves
        // that: arena bases are page aligned and HEADER_SIZE is a multiple
        // of the alignment.
        let size = align(size, mem::align_of::<Header>());

        let mut p = NonNull::from(&mut self.head);
        loop {
            if unsafe { (*p.as_ptr()).fits(size) } {
                let payload = unsafe { Header::payload(p) };

                unsafe {
                    let gap = (*p.as_ptr()).size - size;
                    if gap >= HEADER_SIZE {
                        // Carve the surplus into a new free block right
                        // after the payload being handed out.
                        let tail = payload.add(size).cast::<Header>();
                        tail.write(Header {
                            size: gap - HEADER_SIZE,
                            allocated: false,
                            next: (*p.as_ptr()).next,
                            arena: (*p.as_ptr()).arena,
                        });
                        (*p.as_ptr()).next = NonNull::new(tail);
                        (*p.as_ptr()).size = size;
                    }
                    // A surplus smaller than a header cannot be tracked as
                    // a block of its own; the caller gets it as
                    // over-delivery.

                    (*p.as_ptr()).allocated = true;
                }
                return payload;
            }

            p = match unsafe { (*p.as_ptr()).next } {
                Some(next) => next,
                None => unsafe { grow(p, size) },
            };
        }
    }

    /// Returns the block whose payload starts at `ptr` to the allocator.
    /// Null is a no-op. If the block's arena ends up with no allocated
    /// block, the arena is unmapped.
    ///
    /// Panics if the OS refuses to take the arena's pages back.
    ///
    /// **SAFETY**: Caller must guarantee exclusive access to the engine,
    /// and `ptr` must be null or an address produced by [`FreeList::alloc`]
    /// on this engine and not freed since.
    pub(crate) unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let block = unsafe { Header::from_payload(ptr) };
        let arena = unsafe { (*block.as_ptr()).arena };

        unsafe {
            if !(*block.as_ptr()).allocated {
                return;
            }
            (*block.as_ptr()).allocated = false;

            // A free right neighbor of the same arena merges immediately. A
            // free *left* neighbor cannot be reached backward through a
            // singly linked list; the sweep below picks that case up.
            absorb_next(block, arena);
        }

        // One forward pass over the whole list. It settles three things at
        // once: any pending left-neighbor coalesce in this arena, whether
        // any block of the arena is still allocated, and which block
        // precedes the arena's run in list order.
        let mut arena_free = true;
        let mut first: Link = None;
        let mut prev = NonNull::from(&mut self.head);

        let mut it = NonNull::from(&mut self.head);
        loop {
            let it_arena = unsafe { (*it.as_ptr()).arena };

            if it_arena == arena {
                if unsafe { (*it.as_ptr()).allocated } {
                    arena_free = false;
                } else {
                    unsafe { absorb_next(it, arena) };
                }
                if first.is_none() {
                    first = Some(it);
                }
            }

            let next = match unsafe { (*it.as_ptr()).next } {
                Some(next) => next,
                None => break,
            };
            if it_arena != arena && unsafe { (*next.as_ptr()).arena } == arena {
                // `it` is the last block before the arena's run. When the
                // run sits right behind the sentinel this never fires, and
                // `prev` keeps its seed: the sentinel itself.
                prev = it;
            }
            it = next;
        }

        if !arena_free {
            return;
        }

        // Every block of the arena is free, and the sweep has merged them
        // into a single one. Splice it out and hand the pages back.
        if let Some(first) = first {
            unsafe {
                (*prev.as_ptr()).next = (*first.as_ptr()).next;
                kernel::return_memory(
                    first.cast::<u8>().as_ptr(),
                    HEADER_SIZE + (*first.as_ptr()).size,
                );
            }
        }
    }
}

/// Maps a fresh arena large enough for a `size`-byte payload and links its
/// single spanning free block after `tail`, the current last block of the
/// list. Returns the new block.
unsafe fn grow(tail: NonNull<Header>, size: usize) -> NonNull<Header> {
    // Room for the header plus the payload, rounded to the header size to
    // keep block spacing aligned, then to whole pages for the OS.
    let aligned = align(HEADER_SIZE + size, HEADER_SIZE);
    let alloc_size = align(aligned, kernel::page_size());

    unsafe {
        let arena = kernel::request_memory(alloc_size);

        let block = arena.cast::<Header>();
        block.as_ptr().write(Header {
            size: alloc_size - HEADER_SIZE,
            allocated: false,
            next: None,
            arena: arena.as_ptr(),
        });

        (*tail.as_ptr()).next = Some(block);
        block
    }
}

/// Absorbs `block`'s successor when that successor is a free block of the
/// same arena: the successor's header and payload both become payload of
/// `block`, and the successor leaves the list.
unsafe fn absorb_next(block: NonNull<Header>, arena: *mut u8) {
    let node = unsafe { &mut *block.as_ptr() };

    if let Some(next) = node.next {
        let next = unsafe { &*next.as_ptr() };

        if next.arena == arena && !next.allocated {
            node.size += HEADER_SIZE + next.size;
            node.next = next.next;
        }
    }
}
