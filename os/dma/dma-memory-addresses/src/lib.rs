//! # Virtual, Physical and Bus Address Types for DMA
//!
//! Strongly typed wrappers for the three address spaces a DMA-capable driver
//! has to juggle at the same time.
//!
//! ## Overview
//!
//! A single buffer handed to a device has (at least) three names:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] | What the CPU dereferences in this process. |
//! | [`PhysicalAddress`] | Where the bytes live in host RAM (page-frame based). |
//! | [`BusAddress`] | What the device's DMA engine is programmed with. Identical to the physical address unless an IOMMU remaps it. |
//!
//! All three are `#[repr(transparent)]` wrappers around [`MemoryAddress`], a
//! raw 64-bit value. Keeping them apart at the type level means a physical
//! address can never be written into a descriptor ring by accident where a
//! bus address is expected.
//!
//! ## Page Sizes
//!
//! Page sizes are marker types that implement [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB base pages
//! - [`Size2M`]: 2 MiB huge pages (the DMA pool granule)
//!
//! ## Ranges
//!
//! [`AddressRange<A>`] is a half-open `[start, start + len)` interval over any
//! of the address kinds. Membership and offset calculations are checked and
//! never wrap.
//!
//! ```rust
//! # use dma_memory_addresses::*;
//! let page = AddressRange::new(VirtualAddress::new(0x7F00_0020_0000), Size2M::SIZE);
//! let va = VirtualAddress::new(0x7F00_0020_1234);
//! assert!(page.contains(va));
//! assert_eq!(page.offset_of(va), Some(0x1234));
//! assert!(!page.contains(page.end()));
//!
//! let bus = AddressRange::new(BusAddress::new(0x8000_0000), Size2M::SIZE);
//! assert_eq!(bus.at(0x1234), Some(BusAddress::new(0x8000_1234)));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod address_range;
mod bus_address;
mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use address_range::{Address, AddressRange};
pub use bus_address::BusAddress;
pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size2M, Size4K};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Round `value` up to the next multiple of `align` (a power of two).
///
/// Returns `None` on overflow.
#[inline]
#[must_use]
pub const fn checked_align_up(value: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_power_of_two_boundaries() {
        assert_eq!(checked_align_up(0, 4096), Some(0));
        assert_eq!(checked_align_up(1, 4096), Some(4096));
        assert_eq!(checked_align_up(4096, 4096), Some(4096));
        assert_eq!(checked_align_up(4097, 64), Some(4160));
        assert_eq!(checked_align_up(u64::MAX, 2), None);
    }

    #[test]
    fn offset_within_page() {
        let a = MemoryAddress::new(0x0000_0008_1234_5678);
        assert_eq!(a.offset::<Size4K>(), 0x678);
        assert_eq!(a.offset::<Size2M>(), 0x0014_5678);
        assert!(MemoryAddress::new(0x0000_0008_1220_0000).is_aligned_to(Size2M::SIZE));
        assert!(!a.is_aligned_to(Size4K::SIZE));
    }
}
