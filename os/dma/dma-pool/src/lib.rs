//! # Hugepage-backed DMA memory pools
//!
//! Fixed-size buffers for device DMA, carved out of locked, physically
//! contiguous huge pages, with O(1) allocate/free and translation between
//! the CPU's view and the device's view of every buffer.
//!
//! ## Overview
//!
//! | Piece | Role |
//! |-------|------|
//! | [`DmaContext`] | Memory backend, address resolver and optional [`BusMapper`]; creates pools. |
//! | [`DmaPool`] | One pool: geometry, huge-page table, free list. |
//! | [`PhysResolver`] | Virtual → physical translation ([`Pagemap`], [`IdentityResolver`]). |
//! | [`HugePageBackend`] | Where the pages come from ([`HugeTlb`], [`HeapPages`]). |
//!
//! ## Example
//!
//! ```rust
//! use dma_pool::{DmaContext, PoolConfig};
//!
//! // Heap pages with identity translation; real drivers use `DmaContext::new()`.
//! let ctx = DmaContext::heap();
//! let pool = ctx.create_pool(&PoolConfig::new("desc", 4096, 3)).unwrap();
//!
//! let a = pool.allocate().unwrap();
//! let b = pool.allocate().unwrap();
//! assert_eq!(b.virt(), a.virt() + 4096);
//! assert_eq!(pool.resolve_virtual(b.bus()), Some(b.virt()));
//!
//! pool.free(b.virt()).unwrap();
//! assert_eq!(pool.allocate().unwrap(), b);
//! ```

#![allow(unsafe_code)]

mod bus_map;
mod config;
mod context;
mod directory;
mod error;
mod free_list;
mod huge_page;
pub mod layout;
mod pagemap;
mod pool;

pub use bus_map::{BusMapper, DmaDevice, DmaDirection, FnBusMapper};
pub use config::{PoolConfig, PoolGeometry};
pub use context::DmaContext;
pub use directory::HugePageRecord;
pub use error::{
    BusMapError, CreateError, FreeListError, HugePageError, MapBufferError, TranslateError,
};
pub use huge_page::{HeapPages, HugePageBackend, HugeTlb};
pub use pagemap::{IdentityResolver, Pagemap, PagemapEntry, PhysResolver};
pub use pool::{DmaBuffer, DmaPool};

pub use dma_memory_addresses::{BusAddress, PhysicalAddress, VirtualAddress};
