use std::collections::{HashMap, VecDeque};
use std::io::{Read, Seek, Write};
use std::mem;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::storage::buffer::eviction::EvictionPolicy;
use crate::storage::buffer::frame::FrameHeader;
use crate::storage::buffer::lruk_eviction::LrukEvictionPolicy;
use crate::storage::buffer::page_guard::{ReadGuard, WriteGuard};
use crate::storage::disk::disk_manager::DiskManager;
use crate::storage::disk::disk_scheduler::{DiskRequest, DiskScheduler};
use crate::storage::{FrameId, PageId};

/// Everything the pool latch protects: residency bookkeeping plus the
/// eviction policy.
pub(crate) struct PoolState {
    /// Maps page id to the frame currently holding it. Contains exactly
    /// the resident pages.
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page. A frame is either here or in the page
    /// table, never both.
    free_list: VecDeque<FrameId>,
    pub(crate) replacer: LrukEvictionPolicy,
}

/// The buffer pool: a fixed set of page frames, an index of which pages
/// occupy them, and the machinery to move pages between frames and disk.
///
/// One mutex (the pool latch) guards the page table, the free list, the
/// eviction policy, the page counter bump, and guard construction. Each
/// frame additionally carries its own reader/writer latch over the page
/// bytes. Lock order is fixed: pool latch before frame latch, never the
/// reverse.
pub struct BufferPoolManager<R: Read + Write + Seek + Send + 'static> {
    num_frames: usize,
    next_page_id: AtomicU32,
    frames: Vec<FrameHeader>,
    state: Mutex<PoolState>,
    disk_scheduler: DiskScheduler<R>,
}

impl<R: Read + Write + Seek + Send + 'static> BufferPoolManager<R> {
    /// Creates a pool of `num_frames` frames over `disk`, evicting with
    /// LRU-`k_dist`.
    pub fn new(num_frames: usize, disk: DiskManager<R>, k_dist: usize) -> Self {
        assert!(num_frames > 0, "a buffer pool needs at least one frame");

        let frames = (0..num_frames).map(FrameHeader::new).collect();
        let free_list = (0..num_frames).collect();

        BufferPoolManager {
            num_frames,
            next_page_id: AtomicU32::new(0),
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(num_frames),
                free_list,
                replacer: LrukEvictionPolicy::new(k_dist, num_frames),
            }),
            disk_scheduler: DiskScheduler::new(disk),
        }
    }

    /// Number of frames, fixed at construction.
    pub fn size(&self) -> usize {
        self.num_frames
    }

    /// Allocates a fresh page id and grows the disk so it is addressable.
    /// Never fails: the disk is assumed unbounded.
    pub fn new_page(&self) -> PageId {
        let _state = self.lock_state();

        let page_id = self.next_page_id.fetch_add(1, Ordering::SeqCst);
        self.disk_scheduler
            .increase_disk_space(page_id + 1)
            .expect("disk refused to grow");

        page_id
    }

    /// Drops a page from memory and releases its disk space. Returns
    /// `false` only when the page is currently pinned; deleting an absent
    /// page succeeds trivially.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.lock_state();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return true,
        };
        let frame = &self.frames[frame_id];

        if frame.pin_count() > 0 {
            return false;
        }
        if frame.is_dirty() {
            self.flush_resident(&mut state, page_id, frame_id);
        }

        state.page_table.remove(&page_id);
        state.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);
        self.disk_scheduler.deallocate_page(page_id);

        log::debug!("deleted page {page_id} from frame {frame_id}");
        true
    }

    /// Writes a page back to disk. Returns `false` when the page is not
    /// resident or has nothing to write.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let mut state = self.lock_state();

        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return false,
        };
        if !self.frames[frame_id].is_dirty() {
            return false;
        }

        self.flush_resident(&mut state, page_id, frame_id);
        true
    }

    /// Writes every dirty resident page back to disk, in no particular
    /// order.
    pub fn flush_all_pages(&self) {
        let mut state = self.lock_state();

        let resident: Vec<(PageId, FrameId)> = state
            .page_table
            .iter()
            .map(|(&page_id, &frame_id)| (page_id, frame_id))
            .collect();

        for (page_id, frame_id) in resident {
            if self.frames[frame_id].is_dirty() {
                self.flush_resident(&mut state, page_id, frame_id);
            }
        }
    }

    /// Pin count of a page, or `None` when it is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.lock_state();

        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id].pin_count())
    }

    /// Pins a page for shared access, bringing it in from disk if needed.
    /// Returns `None` when every frame is pinned (out of memory); the
    /// caller may retry after dropping guards.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<ReadGuard<'_>> {
        let mut state = self.lock_state();

        let frame_id = self.prepare_frame(&mut state, page_id)?;
        let frame = &self.frames[frame_id];

        // Pool latch before frame latch. A holder of this frame latch
        // never waits on the pool latch without releasing its frame latch
        // first, so blocking here cannot deadlock.
        let data = frame.latch_read();
        frame.pin();
        state.replacer.set_evictable(frame_id, false);

        Some(ReadGuard::new(page_id, frame, &self.state, data))
    }

    /// Pins a page for exclusive access, bringing it in from disk if
    /// needed. Returns `None` when every frame is pinned.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<WriteGuard<'_>> {
        let mut state = self.lock_state();

        let frame_id = self.prepare_frame(&mut state, page_id)?;
        let frame = &self.frames[frame_id];

        let data = frame.latch_write();
        frame.pin();
        state.replacer.set_evictable(frame_id, false);

        Some(WriteGuard::new(page_id, frame, &self.state, data))
    }

    /// `checked_read_page`, except an out-of-memory pool aborts the
    /// process. For test ergonomics only.
    pub fn read_page(&self, page_id: PageId) -> ReadGuard<'_> {
        self.checked_read_page(page_id).unwrap_or_else(|| {
            panic!("cannot bring page {page_id} into memory: every frame is pinned")
        })
    }

    /// `checked_write_page`, except an out-of-memory pool aborts the
    /// process. For test ergonomics only.
    pub fn write_page(&self, page_id: PageId) -> WriteGuard<'_> {
        self.checked_write_page(page_id).unwrap_or_else(|| {
            panic!("cannot bring page {page_id} into memory: every frame is pinned")
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The shared half of the acquisition protocol: finds or frees a frame
    /// for `page_id`, records the access, and installs the page-table
    /// entry. Returns `None` when no frame can be freed.
    fn prepare_frame(&self, state: &mut PoolState, page_id: PageId) -> Option<FrameId> {
        // Already resident: no I/O needed.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            state.replacer.record_access(frame_id);
            return Some(frame_id);
        }

        // Not resident but a free frame is available.
        if let Some(frame_id) = state.free_list.pop_front() {
            state.page_table.insert(page_id, frame_id);
            state.replacer.record_access(frame_id);
            self.load_frame(page_id, frame_id);
            return Some(frame_id);
        }

        // Every frame is occupied: one of them has to go.
        let victim = state.replacer.evict()?;

        let evicted_page_id = state
            .page_table
            .iter()
            .find(|(_, &frame_id)| frame_id == victim)
            .map(|(&evicted, _)| evicted)
            .expect("evicted frame holds no page");

        if self.frames[victim].is_dirty() {
            self.flush_resident(state, evicted_page_id, victim);
        }
        self.frames[victim].reset();

        state.page_table.remove(&evicted_page_id);
        state.page_table.insert(page_id, victim);
        state.replacer.record_access(victim);

        log::debug!("evicted page {evicted_page_id} from frame {victim} to host page {page_id}");
        self.load_frame(page_id, victim);
        Some(victim)
    }

    /// Synchronously reads a page from disk into the frame, loaning the
    /// frame's own buffer to the worker. The frame must be invisible to
    /// other threads: no guard exists and the pool latch is held.
    fn load_frame(&self, page_id: PageId, frame_id: FrameId) {
        let frame = &self.frames[frame_id];

        let buf = mem::take(&mut *frame.latch_write());
        let (done, completion) = oneshot::channel();
        self.disk_scheduler
            .schedule(DiskRequest::Read { page_id, buf, done })
            .expect("disk scheduler worker disappeared");

        let filled = completion
            .recv()
            .unwrap_or_else(|_| panic!("disk read of page {page_id} failed"));
        *frame.latch_write() = filled;
    }

    /// Writes one resident frame out and clears its dirty flag. The pool
    /// latch must be held. The frame latch is taken shared for the
    /// snapshot, so a live writer finishes before its page hits the disk.
    fn flush_resident(&self, _state: &mut PoolState, page_id: PageId, frame_id: FrameId) {
        let frame = &self.frames[frame_id];

        let data = frame.latch_read().clone();
        let (done, completion) = oneshot::channel();
        self.disk_scheduler
            .schedule(DiskRequest::Write {
                page_id,
                data,
                done,
            })
            .expect("disk scheduler worker disappeared");

        let written = completion
            .recv()
            .unwrap_or_else(|_| panic!("disk write of page {page_id} was dropped"));
        assert!(written, "disk write of page {page_id} failed");

        frame.clear_dirty();
        log::debug!("flushed page {page_id} from frame {frame_id}");
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor, Read as IoRead, Seek as IoSeek, SeekFrom, Write as IoWrite};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::config::PAGE_SIZE;
    use crate::shared::logger::setup_logger;

    fn pool(num_frames: usize, k_dist: usize) -> BufferPoolManager<Cursor<Vec<u8>>> {
        setup_logger();
        BufferPoolManager::new(num_frames, DiskManager::new(Cursor::new(Vec::new())), k_dist)
    }

    /// A cursor that counts the `write` calls going through it, so tests
    /// can observe how many disk writes an operation issued.
    struct CountingIo {
        inner: Cursor<Vec<u8>>,
        writes: Arc<AtomicUsize>,
    }

    impl CountingIo {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let writes = Arc::new(AtomicUsize::new(0));
            let io = CountingIo {
                inner: Cursor::new(Vec::new()),
                writes: Arc::clone(&writes),
            };
            (io, writes)
        }
    }

    impl IoRead for CountingIo {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl IoWrite for CountingIo {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl IoSeek for CountingIo {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_page_ids_are_allocated_monotonically() {
        let pool = pool(2, 2);

        assert_eq!(pool.new_page(), 0);
        assert_eq!(pool.new_page(), 1);
        assert_eq!(pool.new_page(), 2);
        assert_eq!(pool.size(), 2);
    }

    #[test]
    fn test_allocate_write_flush_read_back() {
        let pool = pool(4, 2);

        let page_id = pool.new_page();
        assert_eq!(page_id, 0);

        let mut guard = pool.write_page(page_id);
        guard.data_mut()[..8].copy_from_slice(b"HELLO!!!");
        drop(guard);

        assert!(pool.flush_page(page_id));

        let guard = pool.read_page(page_id);
        assert_eq!(&guard.data()[..8], b"HELLO!!!");
    }

    #[test]
    fn test_eviction_writes_dirty_page_back() {
        let (io, writes) = CountingIo::new();
        let pool = BufferPoolManager::new(1, DiskManager::new(io), 2);

        let a = pool.new_page();
        let mut guard = pool.write_page(a);
        guard.data_mut()[0] = b'A';
        drop(guard);

        // Bringing in page b evicts a and must flush it first.
        let b = pool.new_page();
        let guard = pool.write_page(b);
        drop(guard);

        // Page b was never mutated, so re-reading a evicts it with no
        // write at all.
        let writes_before = writes.load(Ordering::SeqCst);
        let guard = pool.read_page(a);
        assert_eq!(guard.data()[0], b'A');
        assert_eq!(writes.load(Ordering::SeqCst), writes_before);
    }

    #[test]
    fn test_out_of_memory_then_retry() {
        let pool = pool(2, 2);

        let a = pool.new_page();
        let b = pool.new_page();
        let c = pool.new_page();

        let w_a = pool.write_page(a);
        let r_b = pool.read_page(b);

        // Both frames pinned: c cannot come in.
        assert!(pool.checked_read_page(c).is_none());

        drop(r_b);

        let r_c = pool.checked_read_page(c);
        assert!(r_c.is_some());
        drop(r_c);
        drop(w_a);
    }

    #[test]
    fn test_delete_pinned_page() {
        let pool = pool(2, 2);

        let guard = pool.read_page(5);
        assert!(!pool.delete_page(5));

        drop(guard);
        assert!(pool.delete_page(5));
    }

    #[test]
    fn test_delete_absent_page_is_idempotent() {
        let pool = pool(2, 2);

        assert!(pool.delete_page(42));
        assert!(pool.delete_page(42));
    }

    #[test]
    fn test_delete_returns_frame_to_free_list() {
        let pool = pool(2, 2);

        let a = pool.new_page();
        let mut guard = pool.write_page(a);
        guard.data_mut()[0] = 1;
        drop(guard);

        assert!(pool.delete_page(a));

        let state = pool.lock_state();
        assert_eq!(state.free_list.len(), 2);
        assert!(state.page_table.is_empty());
    }

    #[test]
    fn test_pin_count_observation() {
        let pool = pool(2, 2);

        assert_eq!(pool.get_pin_count(9), None);

        let first = pool.read_page(9);
        assert_eq!(pool.get_pin_count(9), Some(1));

        let second = pool.read_page(9);
        assert_eq!(pool.get_pin_count(9), Some(2));

        drop(first);
        assert_eq!(pool.get_pin_count(9), Some(1));

        drop(second);
        assert_eq!(pool.get_pin_count(9), Some(0));
    }

    #[test]
    fn test_flush_page_on_absent_or_clean_page() {
        let pool = pool(2, 2);
        let a = pool.new_page();

        // Absent: nothing resident yet.
        assert!(!pool.flush_page(a));

        // Resident but never written.
        let guard = pool.read_page(a);
        drop(guard);
        assert!(!pool.flush_page(a));
    }

    #[test]
    fn test_second_flush_has_nothing_to_write() {
        let pool = pool(2, 2);
        let a = pool.new_page();

        let mut guard = pool.write_page(a);
        guard.data_mut()[0] = 7;
        drop(guard);

        assert!(pool.flush_page(a));
        assert!(!pool.flush_page(a));
    }

    #[test]
    fn test_flush_all_writes_only_dirty_pages() {
        let (io, writes) = CountingIo::new();
        let pool = BufferPoolManager::new(3, DiskManager::new(io), 2);

        for _ in 0..6 {
            pool.new_page();
        }
        drop(pool.read_page(3));
        let mut guard = pool.write_page(4);
        guard.data_mut()[0] = 0xff;
        drop(guard);
        drop(pool.read_page(5));

        let writes_before = writes.load(Ordering::SeqCst);
        pool.flush_all_pages();

        // Pages 3 and 5 are clean; only page 4 hits the disk.
        assert_eq!(writes.load(Ordering::SeqCst), writes_before + 1);
        assert!(!pool.flush_page(4));
    }

    #[test]
    fn test_eviction_skips_pinned_frames() {
        let pool = pool(2, 2);

        let a = pool.new_page();
        let b = pool.new_page();
        let c = pool.new_page();

        let mut guard = pool.write_page(a);
        guard.data_mut()[0] = b'a';

        // b is evictable, a is pinned: c must land on b's frame.
        drop(pool.read_page(b));
        let c_guard = pool.read_page(c);

        assert_eq!(pool.get_pin_count(a), Some(1));
        assert_eq!(pool.get_pin_count(b), None);
        assert_eq!(c_guard.page_id(), c);
        assert_eq!(guard.data()[0], b'a');
    }

    #[test]
    fn test_write_survives_eviction_round_trip() {
        let pool = pool(1, 2);

        let a = pool.new_page();
        let payload = [0xabu8; PAGE_SIZE];

        let mut guard = pool.write_page(a);
        guard.data_mut().copy_from_slice(&payload);
        drop(guard);

        // Churn the single frame through two other pages.
        let b = pool.new_page();
        let c = pool.new_page();
        drop(pool.read_page(b));
        drop(pool.read_page(c));

        let guard = pool.read_page(a);
        assert_eq!(guard.data(), &payload[..]);
    }

    #[test]
    fn test_free_list_and_page_table_partition_the_frames() {
        let pool = pool(3, 2);

        for _ in 0..5 {
            pool.new_page();
        }
        drop(pool.read_page(0));
        drop(pool.read_page(1));
        drop(pool.read_page(2));
        drop(pool.read_page(3));
        assert!(pool.delete_page(2));

        let state = pool.lock_state();
        assert_eq!(state.free_list.len() + state.page_table.len(), 3);
        for &frame_id in state.page_table.values() {
            assert!(!state.free_list.contains(&frame_id));
        }
    }

    #[test]
    fn test_concurrent_readers_share_one_page() {
        let pool = Arc::new(pool(4, 2));
        let a = pool.new_page();

        let mut guard = pool.write_page(a);
        guard.data_mut()[0] = 0x42;
        drop(guard);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let guard = pool.read_page(a);
                assert_eq!(guard.data()[0], 0x42);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(pool.get_pin_count(a), Some(0));
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 16;

        let pool = Arc::new(pool(2, 2));
        let a = pool.new_page();

        let mut handles = Vec::new();
        for _ in 0..THREADS {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let mut guard = pool.write_page(a);
                    let data = guard.data_mut();
                    let counter = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                    data[..4].copy_from_slice(&(counter + 1).to_le_bytes());
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let guard = pool.read_page(a);
        let data = guard.data();
        let counter = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        assert_eq!(counter as usize, THREADS * ROUNDS);
    }

    #[test]
    fn test_reader_waits_for_live_writer() {
        let pool = Arc::new(pool(2, 2));
        let a = pool.new_page();

        let (ready, acquired) = mpsc::channel();
        let writer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut guard = pool.write_page(a);
                guard.data_mut().fill(0x7f);
                ready.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
            })
        };

        acquired.recv().unwrap();
        // Blocks on the frame latch until the writer drops; a torn page is
        // never observable.
        let guard = pool.read_page(a);
        assert!(guard.data().iter().all(|&b| b == 0x7f));

        writer.join().unwrap();
    }

    #[test]
    fn test_contended_pool_makes_progress() {
        const THREADS: usize = 4;
        const PAGES: u32 = 6;

        let pool = Arc::new(pool(2, 2));
        for _ in 0..PAGES {
            pool.new_page();
        }

        let mut handles = Vec::new();
        for thread_id in 0..THREADS {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for round in 0..32u32 {
                    let page_id = (round + thread_id as u32) % PAGES;
                    loop {
                        if let Some(guard) = pool.checked_read_page(page_id) {
                            assert_eq!(guard.page_id(), page_id);
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let state = pool.lock_state();
        assert_eq!(state.free_list.len() + state.page_table.len(), 2);
    }
}
