//! Error types returned by the memory resources and the dynamic array.

use thiserror::Error;

/// Errors raised by a [`crate::MemoryResource`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// Requested alignment is zero or not a power of two.
    #[error("invalid alignment {alignment}: must be a non-zero power of two")]
    InvalidAlignment { alignment: usize },

    /// The platform could not hand out the requested block.
    #[error("failed to allocate {bytes} bytes aligned to {alignment}")]
    AllocationFailure { bytes: usize, alignment: usize },

    /// The address is not a block currently checked out from this resource.
    /// Covers both freeing twice and freeing a foreign pointer.
    #[error("attempt to free unknown block at {addr:#x}")]
    DoubleFreeOrUnknownBlock { addr: usize },
}

/// Errors raised by a [`crate::DynamicArray`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArrayError {
    #[error("index {index} out of range for array of size {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Alloc(#[from] AllocError),
}
