use std::sync::{Mutex, PoisonError, RwLockReadGuard, RwLockWriteGuard};

use crate::storage::buffer::buffer_pool::PoolState;
use crate::storage::buffer::eviction::EvictionPolicy;
use crate::storage::buffer::frame::FrameHeader;
use crate::storage::PageId;

/// Shared access to one resident page.
///
/// The guard owns one pin and holds the frame latch shared for its whole
/// life, so the page can neither be evicted nor mutated underneath it.
/// Dropping the guard releases the latch first and only then takes the
/// pool latch to give the pin back, re-arming eviction when the count
/// reaches zero.
pub struct ReadGuard<'a> {
    page_id: PageId,
    frame: &'a FrameHeader,
    pool_state: &'a Mutex<PoolState>,
    /// `Some` until drop. The slot exists so the frame latch can be
    /// released before the pool-side bookkeeping runs.
    data: Option<RwLockReadGuard<'a, Box<[u8]>>>,
}

impl<'a> ReadGuard<'a> {
    /// Only the pool constructs guards: the pool latch is held, the frame
    /// latch is already taken shared, and the pin is already counted.
    pub(crate) fn new(
        page_id: PageId,
        frame: &'a FrameHeader,
        pool_state: &'a Mutex<PoolState>,
        data: RwLockReadGuard<'a, Box<[u8]>>,
    ) -> Self {
        ReadGuard {
            page_id,
            frame,
            pool_state,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..],
            None => unreachable!("read guard used after drop"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        // Frame latch first, pool latch second: the reverse is the pool's
        // own acquisition order and would deadlock against it.
        self.data.take();

        let mut state = self
            .pool_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.frame.unpin() == 0 {
            state.replacer.set_evictable(self.frame.frame_id(), true);
        }
    }
}

/// Exclusive access to one resident page.
///
/// Same pin and latch discipline as [`ReadGuard`], with the frame latch
/// held exclusive. Handing out mutable bytes marks the frame dirty; the
/// flag stays set until the next successful writeback.
pub struct WriteGuard<'a> {
    page_id: PageId,
    frame: &'a FrameHeader,
    pool_state: &'a Mutex<PoolState>,
    /// `Some` until drop, as in [`ReadGuard`].
    data: Option<RwLockWriteGuard<'a, Box<[u8]>>>,
}

impl<'a> WriteGuard<'a> {
    /// Only the pool constructs guards: the pool latch is held, the frame
    /// latch is already taken exclusive, and the pin is already counted.
    pub(crate) fn new(
        page_id: PageId,
        frame: &'a FrameHeader,
        pool_state: &'a Mutex<PoolState>,
        data: RwLockWriteGuard<'a, Box<[u8]>>,
    ) -> Self {
        WriteGuard {
            page_id,
            frame,
            pool_state,
            data: Some(data),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            Some(data) => &data[..],
            None => unreachable!("write guard used after drop"),
        }
    }

    /// Mutable view of the page bytes. Marks the frame dirty; there is no
    /// way to unmark it short of a writeback.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.frame.set_dirty();
        match &mut self.data {
            Some(data) => &mut data[..],
            None => unreachable!("write guard used after drop"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.frame.is_dirty()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        // Frame latch first, pool latch second; see ReadGuard.
        self.data.take();

        let mut state = self
            .pool_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.frame.unpin() == 0 {
            state.replacer.set_evictable(self.frame.frame_id(), true);
        }
    }
}
