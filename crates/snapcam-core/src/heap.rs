//! Scarce auxiliary heap.
//!
//! A dedicated [`linked_list_allocator::Heap`] over a fixed region (PSRAM on
//! the reference board), independent of the global allocator. The region is
//! handed in at construction and only claimed by [`ScarceHeap::init`], which
//! may happen lazily on the first photo save.
//!
//! Allocations are returned as [`HeapBlock`] handles that carry their own
//! size and are consumed by [`ScarceHeap::free`], so a block cannot be freed
//! twice or with the wrong layout.

use core::alloc::Layout;
use core::marker::PhantomData;
use core::mem::size_of;
use core::ptr::NonNull;

use linked_list_allocator::Heap;
use log::{debug, info, warn};

use crate::error::HeapError;

/// Alignment of every block. RGB565 frames are read as 16-bit words.
const BLOCK_ALIGN: usize = 4;

/// Smallest region that still holds the allocator's hole list after the
/// start address is aligned.
const MIN_REGION: usize = 4 * size_of::<usize>();

/// Owning handle to an allocation inside a [`ScarceHeap`].
///
/// Deliberately neither `Clone` nor `Copy`: the only way to release the
/// memory is to move the handle into [`ScarceHeap::free`].
#[must_use = "dropping a HeapBlock leaks its memory until the heap is rebuilt"]
#[derive(Debug, PartialEq, Eq)]
pub struct HeapBlock {
    offset: u32,
    len: u32,
}

impl HeapBlock {
    /// Size of the allocation in bytes.
    pub const fn len(&self) -> u32 {
        self.len
    }

    /// Offset from the start of the heap region.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    fn layout(&self) -> Option<Layout> {
        Layout::from_size_align(self.len as usize, BLOCK_ALIGN).ok()
    }
}

/// Read-only heap accounting snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStatus {
    pub initialized: bool,
    pub capacity: u32,
    pub used: u32,
    pub free: u32,
    /// High-water mark of `used`
    pub peak: u32,
    /// Number of refused allocations
    pub failures: u32,
}

pub struct ScarceHeap<'p> {
    heap: Heap,
    region: NonNull<u8>,
    region_len: usize,
    peak: u32,
    failures: u32,
    initialized: bool,
    /// The allocator writes its hole list into the borrowed region
    _region: PhantomData<&'p mut [u8]>,
}

impl<'p> ScarceHeap<'p> {
    /// Bind to a region without claiming it.
    pub fn new(region: &'p mut [u8]) -> Self {
        let region_len = region.len();
        Self {
            heap: Heap::empty(),
            region: NonNull::from(region).cast(),
            region_len,
            peak: 0,
            failures: 0,
            initialized: false,
            _region: PhantomData,
        }
    }

    /// Claim the region. Repeated calls are no-ops.
    pub fn init(&mut self) -> Result<(), HeapError> {
        if self.initialized {
            return Ok(());
        }

        if self.region_len < MIN_REGION || u32::try_from(self.region_len).is_err() {
            warn!("Aux heap region of {} bytes cannot be claimed", self.region_len);
            return Err(HeapError::RegionUnavailable);
        }

        // SAFETY: the region is exclusively borrowed for 'p, which outlives
        // `self.heap`, and is long enough for the hole list.
        unsafe { self.heap.init(self.region.as_ptr(), self.region_len) };
        self.initialized = true;

        info!("Aux heap initialized: {} KB", self.heap.size() / 1024);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Allocate `size` bytes from the first free hole that fits.
    pub fn alloc(&mut self, size: u32) -> Result<HeapBlock, HeapError> {
        if !self.initialized {
            return Err(HeapError::NotInitialized);
        }
        if size == 0 {
            return Err(HeapError::ZeroSize);
        }

        let out_of_memory = HeapError::OutOfMemory {
            requested: size,
            available: self.heap.free() as u32,
        };
        let Ok(layout) = Layout::from_size_align(size as usize, BLOCK_ALIGN) else {
            self.failures += 1;
            return Err(out_of_memory);
        };
        let Ok(ptr) = self.heap.allocate_first_fit(layout) else {
            self.failures += 1;
            return Err(out_of_memory);
        };

        let block = HeapBlock {
            offset: (ptr.as_ptr() as usize - self.heap.bottom() as usize) as u32,
            len: size,
        };
        let used = self.heap.used() as u32;
        self.peak = self.peak.max(used);
        debug!(
            "Aux heap alloc {} bytes at +0x{:06X} (used {})",
            size, block.offset, used
        );

        Ok(block)
    }

    /// Return a block to the heap. The allocator merges adjacent holes.
    pub fn free(&mut self, block: HeapBlock) {
        let (Some(ptr), Some(layout)) = (self.block_ptr(&block), block.layout()) else {
            warn!("Aux heap free of a block outside the region ignored");
            return;
        };
        // SAFETY: `block` was produced by `alloc` on this heap with the same
        // layout, and the handle is consumed so it cannot be freed twice.
        unsafe { self.heap.deallocate(ptr, layout) };
        debug!(
            "Aux heap free {} bytes at +0x{:06X} (used {})",
            block.len,
            block.offset,
            self.heap.used()
        );
    }

    fn block_ptr(&self, block: &HeapBlock) -> Option<NonNull<u8>> {
        let end = block.offset as usize + block.len as usize;
        if !self.initialized || end > self.heap.size() {
            return None;
        }
        // SAFETY: offset lies inside the claimed heap range checked above.
        NonNull::new(unsafe { self.heap.bottom().add(block.offset as usize) })
    }

    /// Contents of a live block.
    pub fn bytes(&self, block: &HeapBlock) -> &[u8] {
        match self.block_ptr(block) {
            // SAFETY: the block is live and in bounds; the shared borrow of
            // `self` prevents concurrent frees or writes.
            Some(ptr) => unsafe { core::slice::from_raw_parts(ptr.as_ptr(), block.len as usize) },
            None => &[],
        }
    }

    pub fn bytes_mut(&mut self, block: &HeapBlock) -> &mut [u8] {
        match self.block_ptr(block) {
            // SAFETY: as for `bytes`, with exclusive access through `&mut self`.
            Some(ptr) => unsafe {
                core::slice::from_raw_parts_mut(ptr.as_ptr(), block.len as usize)
            },
            None => &mut [],
        }
    }

    pub fn status(&self) -> HeapStatus {
        if !self.initialized {
            let capacity = u32::try_from(self.region_len).unwrap_or(u32::MAX);
            return HeapStatus {
                initialized: false,
                capacity,
                used: 0,
                free: capacity,
                peak: self.peak,
                failures: self.failures,
            };
        }
        HeapStatus {
            initialized: true,
            capacity: self.heap.size() as u32,
            used: self.heap.used() as u32,
            free: self.heap.free() as u32,
            peak: self.peak,
            failures: self.failures,
        }
    }
}
