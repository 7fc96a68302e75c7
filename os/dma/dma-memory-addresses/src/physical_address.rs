use crate::MemoryAddress;
use core::fmt;
use core::ops::{Add, AddAssign};

/// Physical memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **physical** addresses
/// (host RAM). Like [`VirtualAddress`](super::VirtualAddress), this type
/// carries intent and prevents accidental VA↔PA mix-ups.
///
/// ### Notes
/// - On Linux a physical address is composed from a page frame number taken
///   from `/proc/self/pagemap` and the in-page offset of the virtual address;
///   see [`PhysicalAddress::from_frame`].
/// - A device may not be able to use a physical address directly when an
///   IOMMU sits in between; use [`BusAddress`](super::BusAddress) for what
///   gets programmed into hardware.
///
/// ### Examples
/// ```rust
/// # use dma_memory_addresses::*;
/// let pa = PhysicalAddress::from_frame(0x1_2345, 0x678, Size4K::SIZE);
/// assert_eq!(pa, PhysicalAddress::new(0x1234_5678));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    /// Compose `frame * page_size + offset`.
    ///
    /// `page_size` is a runtime value (the platform base page size), not a
    /// [`PageSize`](crate::PageSize) marker, since it is only known after asking the OS.
    #[inline]
    #[must_use]
    pub const fn from_frame(frame: u64, offset: u64, page_size: u64) -> Self {
        debug_assert!(offset < page_size, "offset must be < page size");
        Self::new(frame * page_size + offset)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for PhysicalAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl Add<u64> for PhysicalAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for PhysicalAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
