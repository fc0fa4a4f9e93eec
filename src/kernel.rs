use std::{io, ptr::NonNull};

use lazy_static::lazy_static;

lazy_static! {
    /// Virtual memory page size of the machine. Usually 4096. Queried from
    /// the OS once, on first use; every arena's length is a multiple of it.
    static ref PAGE_SIZE: usize = unsafe { Os::page_size() };
}

/// The per-platform syscall implementations hang off this marker type.
struct Os;

/// Abstraction over the low level memory operations the allocator needs.
/// The allocator's view of memory has nothing to do with the concrete
/// APIs offered by each kernel, so those live behind this trait.
trait PlatformMemory {
    /// Request a readable, writable region of `len` bytes backed by
    /// private anonymous memory. Returns a pointer to the start of the
    /// region, or `None` if the underlying syscall fails.
    unsafe fn request_memory(len: usize) -> Option<NonNull<u8>>;

    /// Return the region of `len` bytes starting at `addr` to the kernel.
    /// `addr` must be the exact address a [`request_memory`] call produced.
    unsafe fn return_memory(addr: *mut u8, len: usize) -> bool;

    /// The virtual memory page size of the machine in bytes.
    unsafe fn page_size() -> usize;
}

#[inline]
pub(crate) fn page_size() -> usize {
    *PAGE_SIZE
}

/// Maps a fresh `len`-byte region for a new arena.
///
/// A refused mapping leaves the allocator with no way to satisfy the
/// in-flight request, so it is treated as fatal: the process panics with
/// the OS error as the cause.
pub(crate) unsafe fn request_memory(len: usize) -> NonNull<u8> {
    match unsafe { Os::request_memory(len) } {
        Some(addr) => addr,
        None => panic!(
            "failed to map {} bytes of anonymous memory: {}",
            len,
            io::Error::last_os_error()
        ),
    }
}

/// Unmaps the `len`-byte arena starting at `addr`. A refused unmap would
/// leave the bookkeeping and the address space disagreeing, so it is fatal
/// as well.
pub(crate) unsafe fn return_memory(addr: *mut u8, len: usize) {
    if !unsafe { Os::return_memory(addr, len) } {
        panic!(
            "failed to unmap arena at {:p}: {}",
            addr,
            io::Error::last_os_error()
        );
    }
}

#[cfg(unix)]
mod unix {
    use super::{Os, PlatformMemory};

    use libc::{c_int, c_void, off_t, size_t};

    use std::ptr::{self, NonNull};

    impl PlatformMemory for Os {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // mmap parameters.
            const ADDR: *mut c_void = ptr::null_mut::<c_void>();
            // Read-Write only memory.
            const PROT: c_int = libc::PROT_READ | libc::PROT_WRITE;
            const FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
            const FD: c_int = -1;
            const OFFSET: off_t = 0;

            unsafe {
                let addr = libc::mmap(ADDR, len as size_t, PROT, FLAGS, FD, OFFSET);

                if addr == libc::MAP_FAILED {
                    None
                } else {
                    Some(NonNull::new_unchecked(addr).cast::<u8>())
                }
            }
        }

        unsafe fn return_memory(addr: *mut u8, len: usize) -> bool {
            unsafe { libc::munmap(addr.cast::<c_void>(), len as size_t) == 0 }
        }

        unsafe fn page_size() -> usize {
            unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) as usize }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Os, PlatformMemory};

    use std::{ffi::c_void, mem::MaybeUninit, ptr::NonNull};

    use windows::Win32::System::{Memory, SystemInformation};

    impl PlatformMemory for Os {
        unsafe fn request_memory(len: usize) -> Option<NonNull<u8>> {
            // Read-Write only.
            let protection = Memory::PAGE_READWRITE;

            let flags = Memory::MEM_RESERVE | Memory::MEM_COMMIT;

            unsafe {
                let addr = Memory::VirtualAlloc(None, len, flags, protection);

                NonNull::new(addr.cast())
            }
        }

        unsafe fn return_memory(addr: *mut u8, _len: usize) -> bool {
            // Releasing a whole reservation requires a size of zero.
            unsafe {
                Memory::VirtualFree(addr.cast::<c_void>(), 0, Memory::MEM_RELEASE).is_ok()
            }
        }

        unsafe fn page_size() -> usize {
            unsafe {
                let mut system_info = MaybeUninit::uninit();
                SystemInformation::GetSystemInfo(system_info.as_mut_ptr());

                system_info.assume_init().dwPageSize as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let size = page_size();

        assert!(size >= 512);
        assert!(size.is_power_of_two());
    }

    #[test]
    fn mapped_memory_is_writable() {
        unsafe {
            let len = page_size();
            let addr = request_memory(len);

            for offset in [0, len / 2, len - 1] {
                addr.as_ptr().add(offset).write(0xAB);
                assert_eq!(addr.as_ptr().add(offset).read(), 0xAB);
            }

            return_memory(addr.as_ptr(), len);
        }
    }
}
