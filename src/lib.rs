//! MemArena is a general-purpose memory allocator that obtains pages
//! directly from the operating system and subdivides them into blocks.
//! It is cross-platform, therefor we request the pages from the kernel using:
//!
//! [`mmap`](https://man7.org/linux/man-pages/man2/mmap.2.html) on Unix
//! [`VirtualAlloc`](https://learn.microsoft.com/en-us/windows/win32/api/memoryapi/nf-memoryapi-virtualalloc)
//! on Windows.
//!
//! The internal structure of the allocator looks like this:
//!
//! ```text
//!
//!  sentinel                 arena                            arena
//! +--------+   +-------------------------------+   +----------------------+
//! |        |   | +--------+----+ +--------+--+ |   | +--------+---------+ |
//! | Header |-->| | Header |data|>| Header |  | |-->| | Header |  free   | |
//! |        |   | +--------+----+ +--------+--+ |   | +--------+---------+ |
//! +--------+   +-------------------------------+   +----------------------+
//!
//! ```
//!
//! One singly linked list threads through every block of every arena. Its
//! head is a permanent sentinel that never carries a payload. Each arena is
//! the product of a single page mapping; its blocks sit end-to-end, and the
//! arena is handed back to the kernel in one piece the moment none of its
//! blocks is allocated.
//!
//! Allocation is first-fit over that list, splitting a block when the
//! surplus can host another one. Freeing coalesces a free right neighbor in
//! place, and a whole-list sweep merges pending left neighbors while it
//! decides whether the arena can be unmapped.
//!
//! The main structure is [`MemArena`], you can follow the codebase from
//! there.


mod block;
mod freelist;
mod kernel;
mod memarena;
mod utils;


pub use crate::memarena::MemArena;
