use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::PAGE_SIZE;
use crate::storage::FrameId;

/// Per-frame metadata plus the page bytes themselves.
///
/// The `RwLock` around `data` is the per-frame latch: read guards hold it
/// shared, write guards exclusive. Pin count and dirty flag are atomics
/// because the pool inspects them from the pool-latch side without going
/// through the frame latch.
pub struct FrameHeader {
    frame_id: FrameId,
    /// How many guards reference this frame. A frame can only be evicted
    /// when the pin count is 0.
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    /// Heap allocated page of exactly PAGE_SIZE bytes.
    data: RwLock<Box<[u8]>>,
}

impl FrameHeader {
    pub fn new(frame_id: FrameId) -> Self {
        FrameHeader {
            frame_id,
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(vec![0u8; PAGE_SIZE].into_boxed_slice()),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Takes the frame latch shared. A poisoned latch is recovered: the
    /// page bytes stay readable even if a holder panicked.
    pub fn latch_read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the frame latch exclusive.
    pub fn latch_write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a pin and returns the new count.
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Removes a pin and returns the new count.
    pub(crate) fn unpin(&self) -> u32 {
        let previous = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(previous > 0, "unpin of a frame that holds no pins");
        previous - 1
    }

    pub(crate) fn set_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    pub(crate) fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    /// Returns the frame to its pristine state: zeroed bytes, no pins,
    /// clean.
    pub(crate) fn reset(&self) {
        self.latch_write().fill(0);
        self.pin_count.store(0, Ordering::Release);
        self.is_dirty.store(false, Ordering::Release);
    }
}
