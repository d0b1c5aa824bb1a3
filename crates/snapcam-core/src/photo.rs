//! Single-slot photo store on the scarce heap.
//!
//! At most one photo exists at a time. Saving replaces the previous photo:
//! its block is released before the new one is allocated, so the heap never
//! has to hold two full frames. If that allocation fails the slot stays empty
//! and the old photo is gone.

use log::{error, info};

use crate::config::BYTES_PER_PIXEL;
use crate::error::{HeapError, PhotoError};
use crate::heap::{HeapBlock, HeapStatus, ScarceHeap};

/// The stored photo. Only exists while valid.
#[derive(Debug)]
struct Photo {
    block: HeapBlock,
    width: u32,
    height: u32,
    timestamp: u64,
}

/// Borrowed view of the stored photo.
///
/// Tied to the store's lifetime, so it cannot be held across a later
/// `save` or `clear`.
#[derive(Debug, Clone, Copy)]
pub struct PhotoView<'a> {
    pub data: &'a [u8],
    pub size: u32,
    pub width: u32,
    pub height: u32,
    pub timestamp: u64,
}

/// Metadata of the stored photo, without access to its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoInfo {
    pub width: u32,
    pub height: u32,
    pub size: u32,
    /// Offset of the photo inside the heap region
    pub offset: u32,
    /// Monotonic milliseconds at capture
    pub timestamp: u64,
}

pub struct PhotoStore<'p> {
    heap: ScarceHeap<'p>,
    slot: Option<Photo>,
}

impl<'p> PhotoStore<'p> {
    pub fn new(heap: ScarceHeap<'p>) -> Self {
        Self { heap, slot: None }
    }

    /// Claim the heap region up front. Saving does this lazily otherwise.
    pub fn init_heap(&mut self) -> Result<(), HeapError> {
        self.heap.init()
    }

    /// Replace the stored photo with a copy of `data`.
    pub fn save(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        now_ms: u64,
    ) -> Result<(), PhotoError> {
        if data.is_empty() {
            error!("Invalid photo data");
            return Err(PhotoError::EmptyInput);
        }

        let expected = u64::from(width) * u64::from(height) * u64::from(BYTES_PER_PIXEL);
        if data.len() as u64 != expected {
            error!(
                "Photo data is {} bytes, {}x{} needs {}",
                data.len(),
                width,
                height,
                expected
            );
            return Err(PhotoError::SizeMismatch {
                expected: u32::try_from(expected).unwrap_or(u32::MAX),
                actual: u32::try_from(data.len()).unwrap_or(u32::MAX),
            });
        }
        // `expected` fits in u32 whenever it could fit in the heap at all
        let size = u32::try_from(data.len()).map_err(|_| HeapError::OutOfMemory {
            requested: u32::MAX,
            available: self.heap.status().free,
        })?;

        self.heap.init()?;

        if let Some(old) = self.slot.take() {
            self.heap.free(old.block);
        }

        let block = self.heap.alloc(size).map_err(|e| {
            error!("Failed to allocate aux heap for photo ({} bytes): {}", size, e);
            PhotoError::AllocationFailed(e)
        })?;
        self.heap.bytes_mut(&block).copy_from_slice(data);

        info!(
            "Photo saved: {}x{}, {} bytes, offset=+0x{:06X}",
            width,
            height,
            size,
            block.offset()
        );

        self.slot = Some(Photo {
            block,
            width,
            height,
            timestamp: now_ms,
        });
        Ok(())
    }

    pub fn get(&self) -> Result<PhotoView<'_>, PhotoError> {
        let photo = self.slot.as_ref().ok_or(PhotoError::NoPhoto)?;
        Ok(PhotoView {
            data: self.heap.bytes(&photo.block),
            size: photo.block.len(),
            width: photo.width,
            height: photo.height,
            timestamp: photo.timestamp,
        })
    }

    /// Drop the stored photo, if any.
    pub fn clear(&mut self) {
        if let Some(photo) = self.slot.take() {
            self.heap.free(photo.block);
        }
        info!("Photo cleared");
    }

    pub fn is_valid(&self) -> bool {
        self.slot.is_some()
    }

    pub fn info(&self) -> Option<PhotoInfo> {
        self.slot.as_ref().map(|photo| PhotoInfo {
            width: photo.width,
            height: photo.height,
            size: photo.block.len(),
            offset: photo.block.offset(),
            timestamp: photo.timestamp,
        })
    }

    pub fn heap_status(&self) -> HeapStatus {
        self.heap.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    const W: u32 = 240;
    const H: u32 = 320;
    const FRAME: usize = (W * H * 2) as usize;

    fn pattern(seed: u8) -> Vec<u8> {
        (0..FRAME).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
    }

    #[test]
    fn test_save_then_get_returns_saved_bytes() {
        let mut region = vec![0u8; 512 * 1024];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));
        let photo = pattern(7);

        store.save(&photo, W, H, 42).unwrap();

        let view = store.get().unwrap();
        assert_eq!(view.data, &photo[..]);
        assert_eq!(view.size, 153_600);
        assert_eq!((view.width, view.height, view.timestamp), (W, H, 42));
    }

    #[test]
    fn test_save_replaces_instead_of_accumulating() {
        let mut region = vec![0u8; 512 * 1024];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));
        let a = pattern(1);
        let b = pattern(2);

        store.save(&a, W, H, 1).unwrap();
        store.save(&b, W, H, 2).unwrap();
        for _ in 0..5 {
            store.save(&b, W, H, 3).unwrap();
        }

        assert_eq!(store.get().unwrap().data, &b[..]);
        assert_eq!(store.heap_status().used, b.len() as u32);
    }

    #[test]
    fn test_save_lazily_initializes_heap() {
        let mut region = vec![0u8; 1024];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));
        assert!(!store.heap_status().initialized);

        store.save(&[1, 2, 3, 4], 2, 1, 0).unwrap();

        assert!(store.heap_status().initialized);
    }

    #[test]
    fn test_empty_and_mismatched_input_rejected() {
        let mut region = vec![0u8; 1024];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));

        assert_eq!(store.save(&[], 0, 0, 0), Err(PhotoError::EmptyInput));
        assert_eq!(
            store.save(&[0; 10], 2, 2, 0),
            Err(PhotoError::SizeMismatch {
                expected: 8,
                actual: 10
            })
        );
        assert!(!store.is_valid());
    }

    #[test]
    fn test_failed_save_leaves_slot_empty() {
        // Room for the 8-byte photo but not for a 64-byte one
        let mut region = vec![0u8; 48];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));
        store.save(&[9; 8], 2, 2, 0).unwrap();

        let err = store.save(&[1; 64], 8, 4, 1).unwrap_err();

        assert!(matches!(err, PhotoError::AllocationFailed(HeapError::OutOfMemory { .. })));
        assert_eq!(store.get().unwrap_err(), PhotoError::NoPhoto);
        assert_eq!(store.heap_status().used, 0);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut region = vec![0u8; 64];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));
        store.save(&[5; 8], 2, 2, 0).unwrap();

        store.clear();
        assert_eq!(store.get().unwrap_err(), PhotoError::NoPhoto);
        let after_one = store.heap_status();

        store.clear();
        assert_eq!(store.get().unwrap_err(), PhotoError::NoPhoto);
        assert_eq!(store.heap_status(), after_one);
        assert!(store.info().is_none());
    }

    #[test]
    fn test_info_reports_metadata() {
        let mut region = vec![0u8; 64];
        let mut store = PhotoStore::new(ScarceHeap::new(&mut region));
        store.save(&[5; 8], 2, 2, 900).unwrap();

        let info = store.info().unwrap();
        assert_eq!(
            info,
            PhotoInfo {
                width: 2,
                height: 2,
                size: 8,
                offset: 0,
                timestamp: 900
            }
        );
    }
}
