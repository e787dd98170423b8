use crate::macros::static_assert;

/// The size (in bytes) of a page in the buffer pool
pub const PAGE_SIZE: usize = 4096;

/// The number of frames a pool holds when the caller has no better idea.
/// More frames cache more pages in memory at the cost of that memory.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// The backward distance parameter of the LRU-K eviction policy.
pub const DEFAULT_K_DIST: usize = 2;

static_assert!(PAGE_SIZE % 8 == 0);
static_assert!(DEFAULT_POOL_SIZE > 0);
static_assert!(DEFAULT_K_DIST > 0);
