use std::ptr;

/// The low level memory boundary of the collector. This is where tracked
/// blocks actually come from and go back to; everything above this module
/// only does bookkeeping.
///
/// The collector's own data structures (registry buckets, chain nodes, the
/// transient candidate set built during marking) never go through this
/// module. They live in ordinary owned Rust storage, so a collection can
/// allocate scratch memory without re-entering the tracked path and
/// recursively triggering another collection.
pub(crate) struct Kernel;

/// This trait provides an abstraction to handle the platform-dependant
/// allocation calls. The collector, our top level view of this, has nothing
/// to do with the concrete APIs offered by each platform.
trait PlatformAlloc {
    /// Requests `size` bytes from the system allocator. Returns a null
    /// pointer if the underlying call fails.
    unsafe fn raw_alloc(size: usize) -> *mut u8;

    /// Returns a block previously obtained from [`PlatformAlloc::raw_alloc`]
    /// back to the system allocator.
    unsafe fn raw_free(ptr: *mut u8);
}

/// Wrapper to use [`Kernel::raw_alloc`].
#[inline]
pub(crate) unsafe fn raw_alloc(size: usize) -> *mut u8 {
    if size == 0 {
        return ptr::null_mut();
    }

    unsafe { Kernel::raw_alloc(size) }
}

/// Wrapper to use [`Kernel::raw_free`].
#[inline]
pub(crate) unsafe fn raw_free(ptr: *mut u8) {
    unsafe { Kernel::raw_free(ptr) }
}

#[cfg(unix)]
mod unix {
    use super::{Kernel, PlatformAlloc};

    use libc::{c_void, free, malloc, size_t};

    impl PlatformAlloc for Kernel {
        unsafe fn raw_alloc(size: usize) -> *mut u8 {
            unsafe { malloc(size as size_t) as *mut u8 }
        }

        unsafe fn raw_free(ptr: *mut u8) {
            unsafe { free(ptr as *mut c_void) }
        }
    }
}

#[cfg(windows)]
mod windows {
    use super::{Kernel, PlatformAlloc};

    use std::os::raw::c_void;

    use windows::Win32::System::Memory;

    impl PlatformAlloc for Kernel {
        unsafe fn raw_alloc(size: usize) -> *mut u8 {
            unsafe {
                let Ok(heap) = Memory::GetProcessHeap() else {
                    return std::ptr::null_mut();
                };

                Memory::HeapAlloc(heap, Memory::HEAP_NONE, size) as *mut u8
            }
        }

        unsafe fn raw_free(ptr: *mut u8) {
            unsafe {
                if let Ok(heap) = Memory::GetProcessHeap() {
                    let _ = Memory::HeapFree(heap, Memory::HEAP_NONE, Some(ptr as *const c_void));
                }
            }
        }
    }
}
