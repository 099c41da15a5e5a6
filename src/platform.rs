use std::{alloc::Layout, ptr::NonNull};

/// Backend every memory resource ends up talking to. The resources
/// only decide *whether* a request is valid and keep their bookkeeping,
/// getting and returning the actual bytes is done here.
pub(crate) struct Platform;

/// This trait provides an abstraction to handle low level memory operations.
/// The resources, our top level view of this, have nothing to do with the
/// concrete APIs offered by each platform.
trait PlatformMemory {
    /// Request a block that satisfies `layout`. It returns a pointer to the
    /// given location or None if the underlying call fails.
    ///
    /// `layout` must have a non-zero size.
    unsafe fn request_memory(layout: Layout) -> Option<NonNull<u8>>;

    /// Returns the block starting at `addr` back to the platform.
    ///
    /// `addr` must come from [`PlatformMemory::request_memory`] called with
    /// the same `layout`, and must not have been returned already.
    unsafe fn return_memory(addr: NonNull<u8>, layout: Layout);
}

/// Wrapper to use [`Platform::request_memory`]
#[inline]
pub(crate) unsafe fn request_memory(layout: Layout) -> Option<NonNull<u8>> {
    unsafe { Platform::request_memory(layout) }
}

/// Wrapper to use [`Platform::return_memory`]
#[inline]
pub(crate) unsafe fn return_memory(addr: NonNull<u8>, layout: Layout) {
    unsafe { Platform::return_memory(addr, layout) }
}

#[cfg(unix)]
mod unix {
    use super::{Platform, PlatformMemory};
    use crate::utils::align;

    use std::{alloc::Layout, mem, os::raw::c_void, ptr::{self, NonNull}};

    impl PlatformMemory for Platform {
        unsafe fn request_memory(layout: Layout) -> Option<NonNull<u8>> {
            // posix_memalign wants a power of two multiple of the pointer size.
            let alignment = align(layout.align(), mem::size_of::<*mut c_void>());
            let mut addr: *mut c_void = ptr::null_mut();

            unsafe {
                match libc::posix_memalign(&mut addr, alignment, layout.size()) {
                    0 => NonNull::new(addr.cast::<u8>()),
                    _ => None,
                }
            }
        }

        unsafe fn return_memory(addr: NonNull<u8>, _layout: Layout) {
            unsafe { libc::free(addr.as_ptr().cast::<c_void>()) }
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    use super::{Platform, PlatformMemory};

    use std::{alloc::{GlobalAlloc, Layout, System}, ptr::NonNull};

    impl PlatformMemory for Platform {
        unsafe fn request_memory(layout: Layout) -> Option<NonNull<u8>> {
            unsafe { NonNull::new(System.alloc(layout)) }
        }

        unsafe fn return_memory(addr: NonNull<u8>, layout: Layout) {
            unsafe { System.dealloc(addr.as_ptr(), layout) }
        }
    }
}
