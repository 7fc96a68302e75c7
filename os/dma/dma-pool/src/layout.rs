//! Fixed layout parameters shared by every pool.

use dma_memory_addresses::{PageSize, Size2M, Size4K};

/// Page size backing every pool.
pub type HugePage = Size2M;

/// Bytes per huge page.
pub const HUGE_PAGE_SIZE: u64 = HugePage::SIZE;

/// Bytes reserved in front of the first buffer of a single-page pool. The
/// first machine word of this header stores the mapped length.
pub const POOL_HEADER_SIZE: u64 = Size4K::SIZE;

/// Largest buffer alignment a pool accepts.
pub const MAX_ALIGNMENT: u64 = POOL_HEADER_SIZE;

/// Longest pool name, in bytes.
pub const MAX_POOL_NAME_LEN: usize = 63;

/// Alignment used for single-buffer pools and by [`PoolConfig::new`](crate::PoolConfig::new).
pub const DEFAULT_ALIGNMENT: u64 = 64;

/// Kernel page-table export for the calling process.
pub const PAGEMAP_PATH: &str = "/proc/self/pagemap";
