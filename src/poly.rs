//! Typed handle over a memory resource.

use std::{alloc::Layout, fmt, mem, ptr::{self, NonNull}};

use crate::{
    error::AllocError,
    resource::{MemoryResource, default_resource},
};

/// A `Copy` handle that allocates values of any type from a borrowed
/// [`MemoryResource`].
///
/// The handle does not own the resource, which has to outlive every
/// block obtained through it.
#[derive(Clone, Copy)]
pub struct PolymorphicAllocator<'a> {
    resource: &'a dyn MemoryResource,
}

impl<'a> PolymorphicAllocator<'a> {
    pub fn new(resource: &'a dyn MemoryResource) -> Self {
        Self { resource }
    }

    #[inline]
    pub fn resource(&self) -> &'a dyn MemoryResource {
        self.resource
    }

    /// Allocates uninitialized room for `n` values of `T`.
    pub fn allocate<T>(&self, n: usize) -> Result<NonNull<T>, AllocError> {
        let layout = array_layout::<T>(n)?;
        let ptr = self.resource.allocate(layout.size(), layout.align())?;

        Ok(ptr.cast())
    }

    /// Returns room for `n` values of `T` to the resource. The values are not dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`PolymorphicAllocator::allocate`] with the same
    /// `n`, on an allocator whose resource is equal to this one.
    pub unsafe fn deallocate<T>(&self, ptr: NonNull<T>, n: usize) -> Result<(), AllocError> {
        let layout = array_layout::<T>(n)?;

        unsafe { self.resource.deallocate(ptr.cast(), layout.size(), layout.align()) }
    }

    /// Moves `value` into a freshly allocated block.
    pub fn new_object<T>(&self, value: T) -> Result<NonNull<T>, AllocError> {
        let ptr = self.allocate::<T>(1)?;
        unsafe { ptr.as_ptr().write(value) };

        Ok(ptr)
    }

    /// Drops the value at `ptr`, then releases its block.
    ///
    /// # Safety
    ///
    /// `ptr` must come from [`PolymorphicAllocator::new_object`] on an
    /// allocator whose resource is equal to this one, and must not be used
    /// afterwards.
    pub unsafe fn delete_object<T>(&self, ptr: NonNull<T>) -> Result<(), AllocError> {
        unsafe {
            ptr::drop_in_place(ptr.as_ptr());
            self.deallocate(ptr, 1)
        }
    }
}

fn array_layout<T>(n: usize) -> Result<Layout, AllocError> {
    Layout::array::<T>(n).map_err(|_| AllocError::AllocationFailure {
        bytes: mem::size_of::<T>().saturating_mul(n),
        alignment: mem::align_of::<T>(),
    })
}

impl Default for PolymorphicAllocator<'static> {
    fn default() -> Self {
        Self::new(default_resource())
    }
}

impl PartialEq for PolymorphicAllocator<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.resource.is_equal(other.resource)
    }
}

impl fmt::Debug for PolymorphicAllocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolymorphicAllocator")
            .field("resource", &(self.resource as *const dyn MemoryResource).cast::<()>())
            .finish()
    }
}
