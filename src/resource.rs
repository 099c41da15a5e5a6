//! The [`MemoryResource`] trait and its pass-through implementation.

use std::{alloc::Layout, ptr::{self, NonNull}};

use tracing::{debug, trace};

use crate::{error::AllocError, platform, utils::is_valid_alignment};

/// Source of raw memory blocks.
///
/// Resources are used through shared references, so several containers
/// can draw from the same one. They are not synchronized and must stay
/// on one thread.
///
/// # Safety
///
/// Callers write through the blocks handed out by `allocate` without any
/// further check. An implementation must guarantee that every `Ok(ptr)`
/// points to at least `bytes.max(1)` writable bytes, aligned to
/// `alignment`, which stay valid and unaliased until the block is passed
/// to `deallocate`. A safe `impl` is rejected:
///
/// ```compile_fail
/// use std::ptr::{self, NonNull};
/// use trackalloc::{AllocError, MemoryResource};
///
/// struct Dangling;
///
/// impl MemoryResource for Dangling {
///     fn allocate(&self, _bytes: usize, _alignment: usize) -> Result<NonNull<u8>, AllocError> {
///         Ok(NonNull::dangling())
///     }
///
///     unsafe fn deallocate(&self, _ptr: NonNull<u8>, _bytes: usize, _alignment: usize) -> Result<(), AllocError> {
///         Ok(())
///     }
///
///     fn is_equal(&self, other: &dyn MemoryResource) -> bool {
///         ptr::addr_eq(self, other)
///     }
/// }
/// ```
pub unsafe trait MemoryResource {
    /// Hands out a block of at least `bytes` bytes aligned to `alignment`.
    ///
    /// A zero-byte request is served as a one-byte block.
    fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError>;

    /// Gives `ptr` back to the resource.
    ///
    /// # Safety
    ///
    /// Implementations that keep no bookkeeping trust the caller: `ptr` must
    /// have been returned by `allocate` on a resource equal to this one, with
    /// the same `bytes` and `alignment`, and not released since.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) -> Result<(), AllocError>;

    /// Whether memory allocated from `other` can be released through `self`.
    fn is_equal(&self, other: &dyn MemoryResource) -> bool;
}

impl PartialEq for dyn MemoryResource + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

/// Validates a request and turns it into the layout given to the platform.
pub(crate) fn block_layout(bytes: usize, alignment: usize) -> Result<Layout, AllocError> {
    if !is_valid_alignment(alignment) {
        debug!(alignment, "rejected allocation with invalid alignment");
        return Err(AllocError::InvalidAlignment { alignment });
    }

    Layout::from_size_align(bytes.max(1), alignment)
        .map_err(|_| AllocError::AllocationFailure { bytes, alignment })
}

/// Asks the platform for a block described by `layout`.
pub(crate) fn request_block(layout: Layout) -> Result<NonNull<u8>, AllocError> {
    unsafe { platform::request_memory(layout) }.ok_or_else(|| {
        debug!(bytes = layout.size(), alignment = layout.align(), "platform refused allocation");
        AllocError::AllocationFailure { bytes: layout.size(), alignment: layout.align() }
    })
}

/// Pass-through resource backed directly by the platform allocator.
///
/// Keeps no bookkeeping, so it cannot detect double frees. Like every
/// resource it only compares equal to itself; share [`default_resource`]
/// when several containers need equal allocators.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResource;

static SYSTEM: SystemResource = SystemResource;

/// The resource used by containers that are not given one explicitly.
pub fn default_resource() -> &'static SystemResource {
    &SYSTEM
}

// SAFETY: blocks come from the platform with the validated layout and stay
// valid until `deallocate` hands them back.
unsafe impl MemoryResource for SystemResource {
    fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        let layout = block_layout(bytes, alignment)?;
        let ptr = request_block(layout)?;

        trace!(addr = ?ptr, bytes = layout.size(), alignment, "system block allocated");
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) -> Result<(), AllocError> {
        let layout = block_layout(bytes, alignment)?;

        unsafe { platform::return_memory(ptr, layout) };
        trace!(addr = ?ptr, bytes = layout.size(), alignment, "system block released");
        Ok(())
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        ptr::addr_eq(self, other)
    }
}
