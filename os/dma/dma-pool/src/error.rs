use crate::bus_map::DmaDevice;
use crate::layout::{MAX_ALIGNMENT, MAX_POOL_NAME_LEN};
use dma_memory_addresses::{BusAddress, PhysicalAddress, VirtualAddress};
use std::collections::TryReserveError;
use std::io;

/// Virtual → physical translation failed.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("page map unavailable: {0}")]
    Unavailable(#[source] io::Error),
    #[error("page map entry for {va} unreadable: {source}")]
    Read {
        va: VirtualAddress,
        #[source]
        source: io::Error,
    },
    #[error("{0} is not backed by a present page")]
    NotPresent(VirtualAddress),
    #[error("frame number for {0} is hidden (CAP_SYS_ADMIN required)")]
    FrameHidden(VirtualAddress),
    #[error("{0} translates outside the physical address space")]
    OutOfRange(VirtualAddress),
}

/// The OS refused to hand out huge pages.
#[derive(Debug, thiserror::Error)]
pub enum HugePageError {
    #[error("huge page request of {0:#X} bytes overflows")]
    SizeOverflow(u64),
    #[error("mmap of {len:#X} bytes of huge pages failed: {source}")]
    Map {
        len: u64,
        #[source]
        source: io::Error,
    },
    #[error("heap allocation of {0:#X} bytes failed")]
    Heap(u64),
}

/// Reported by a [`BusMapper`](crate::BusMapper) implementation.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BusMapError {
    #[error("device {device} refused to map {phys} (status {status})")]
    Map {
        device: DmaDevice,
        phys: PhysicalAddress,
        status: i32,
    },
    #[error("device {device} mapped {phys} at {bus}, past the end of the bus address space")]
    Overflow {
        device: DmaDevice,
        phys: PhysicalAddress,
        bus: BusAddress,
    },
    #[error("device {device} refused to unmap {bus} (status {status})")]
    Unmap {
        device: DmaDevice,
        bus: BusAddress,
        status: i32,
    },
}

/// Pool creation failed; nothing was left allocated.
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    #[error("alignment {0} is not a power of two")]
    AlignmentNotPowerOfTwo(u64),
    #[error("alignment {0} exceeds {max}", max = MAX_ALIGNMENT)]
    AlignmentTooLarge(u64),
    #[error("buffer size must not be zero")]
    ZeroBufferSize,
    #[error("buffer size {0:#X} exceeds the huge page size")]
    BufferTooLarge(u64),
    #[error("pool must hold at least one buffer")]
    ZeroBuffers,
    #[error("pool name is {0} bytes long, at most {max} allowed", max = MAX_POOL_NAME_LEN)]
    NameTooLong(usize),
    #[error("pool geometry overflows")]
    GeometryOverflow,
    #[error("out of memory")]
    OutOfMemory,
    #[error(transparent)]
    HugePages(#[from] HugePageError),
    #[error("address translation failed: {0}")]
    Translate(#[from] TranslateError),
    #[error("fresh pool refused its first allocation: {0}")]
    FirstAllocation(#[from] FreeListError),
}

impl From<TryReserveError> for CreateError {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

/// Allocate/free failures. Expected under load; the pool stays usable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FreeListError {
    #[error("pool exhausted")]
    Exhausted,
    #[error("free list is already full")]
    Full,
    #[error("free list head {head} exceeds capacity {capacity}")]
    Corrupted { head: usize, capacity: usize },
}

/// A span handed to [`DmaPool::map_buffer`](crate::DmaPool::map_buffer) or
/// [`DmaPool::unmap_buffer`](crate::DmaPool::unmap_buffer) does not lie in one
/// huge page of the pool.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("{addr:#X} (+{len:#X}) is not inside a single huge page of the pool")]
pub struct MapBufferError {
    pub addr: u64,
    pub len: u64,
}
