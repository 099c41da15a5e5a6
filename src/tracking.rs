use std::{
    alloc::Layout,
    cell::{Cell, RefCell},
    collections::BTreeMap,
    mem,
    ptr::{self, NonNull},
};

use tracing::{debug, trace, warn};

use crate::{
    error::AllocError,
    platform,
    resource::{MemoryResource, block_layout, request_block},
};

/// Snapshot of a [`TrackingResource`]'s counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStats {
    /// Blocks currently checked out.
    pub live_blocks: usize,
    /// Bytes currently checked out.
    pub live_bytes: usize,
    /// Highest value `live_bytes` ever reached.
    pub peak_bytes: usize,
    /// Successful allocations since creation.
    pub total_allocations: usize,
    /// Successful deallocations since creation.
    pub total_deallocations: usize,
}

/// Memory resource that records every block it hands out.
///
/// Every live block is kept in an ordered map from its address to the
/// layout it was allocated with:
///
/// ```text
///   blocks
/// +----------------+--------------------+
/// | 0x5581_2a40    | 4 bytes, align 4   |
/// | 0x5581_2a60    | 32 bytes, align 8  |
/// | ...            | ...                |
/// +----------------+--------------------+
/// ```
///
/// Releasing an address that is not in the map is reported as
/// [`AllocError::DoubleFreeOrUnknownBlock`] and leaves the map untouched.
/// Blocks are released with the layout recorded at allocation, whatever
/// size and alignment the caller passes back.
///
/// If the resource is dropped while blocks are still checked out, they
/// are returned to the platform without running any destructor. A well
/// behaved client empties the resource before that happens.
#[derive(Debug, Default)]
pub struct TrackingResource {
    blocks: RefCell<BTreeMap<NonNull<u8>, Layout>>,
    stats: Cell<ResourceStats>,
}

impl TrackingResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks currently checked out.
    #[inline]
    pub fn live_blocks(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Number of bytes currently checked out.
    #[inline]
    pub fn live_bytes(&self) -> usize {
        self.stats.get().live_bytes
    }

    /// Whether `ptr` is a block currently checked out from this resource.
    pub fn is_tracked(&self, ptr: NonNull<u8>) -> bool {
        self.blocks.borrow().contains_key(&ptr)
    }

    /// Size recorded for the block at `ptr`, if it is live.
    pub fn block_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        self.blocks.borrow().get(&ptr).map(Layout::size)
    }

    pub fn stats(&self) -> ResourceStats {
        self.stats.get()
    }

    fn record_allocation(&self, size: usize) {
        let mut stats = self.stats.get();
        stats.live_blocks += 1;
        stats.live_bytes += size;
        stats.peak_bytes = stats.peak_bytes.max(stats.live_bytes);
        stats.total_allocations += 1;
        self.stats.set(stats);
    }

    fn record_deallocation(&self, size: usize) {
        let mut stats = self.stats.get();
        stats.live_blocks -= 1;
        stats.live_bytes -= size;
        stats.total_deallocations += 1;
        self.stats.set(stats);
    }
}

// SAFETY: blocks come from the platform with the validated layout and are
// only returned once `deallocate` finds them in the map.
unsafe impl MemoryResource for TrackingResource {
    fn allocate(&self, bytes: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        let layout = block_layout(bytes, alignment)?;
        let ptr = request_block(layout)?;

        self.blocks.borrow_mut().insert(ptr, layout);
        self.record_allocation(layout.size());

        trace!(addr = ?ptr, bytes = layout.size(), alignment, "tracked block allocated");
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize, alignment: usize) -> Result<(), AllocError> {
        let Some(layout) = self.blocks.borrow_mut().remove(&ptr) else {
            debug!(addr = ?ptr, bytes, alignment, "rejected free of unknown block");
            return Err(AllocError::DoubleFreeOrUnknownBlock { addr: ptr.as_ptr() as usize });
        };

        if layout.size() != bytes.max(1) || layout.align() != alignment {
            debug!(
                addr = ?ptr,
                recorded_bytes = layout.size(),
                recorded_alignment = layout.align(),
                bytes,
                alignment,
                "free request does not match the recorded layout"
            );
        }

        unsafe { platform::return_memory(ptr, layout) };
        self.record_deallocation(layout.size());

        trace!(addr = ?ptr, bytes = layout.size(), "tracked block released");
        Ok(())
    }

    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        ptr::addr_eq(self, other)
    }
}

impl PartialEq for TrackingResource {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for TrackingResource {}

impl Drop for TrackingResource {
    fn drop(&mut self) {
        let leaked = mem::take(self.blocks.get_mut());

        if !leaked.is_empty() {
            warn!(
                blocks = leaked.len(),
                bytes = leaked.values().map(Layout::size).sum::<usize>(),
                "releasing blocks still checked out"
            );
        }

        for (ptr, layout) in leaked {
            unsafe { platform::return_memory(ptr, layout) };
        }
    }
}
