use crate::{MemoryAddress, PhysicalAddress};
use core::fmt;
use core::ops::{Add, AddAssign};

/// Device (I/O bus) address.
///
/// The address a DMA engine is programmed with. Without an IOMMU this is
/// numerically the [`PhysicalAddress`]; with one, it is whatever the IOMMU
/// mapping handed out and bears no fixed relation to the physical address.
///
/// ### Examples
/// ```rust
/// # use dma_memory_addresses::*;
/// let pa = PhysicalAddress::new(0x1_0000_0000);
/// // no IOMMU: identity
/// assert_eq!(BusAddress::from_physical(pa).as_u64(), pa.as_u64());
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BusAddress(MemoryAddress);

impl BusAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    /// Identity translation used when no bus mapping is in effect.
    #[inline]
    #[must_use]
    pub const fn from_physical(pa: PhysicalAddress) -> Self {
        Self::new(pa.as_u64())
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }
}

impl fmt::Debug for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for BusAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl From<PhysicalAddress> for BusAddress {
    #[inline]
    fn from(pa: PhysicalAddress) -> Self {
        Self::from_physical(pa)
    }
}

impl Add<u64> for BusAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for BusAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
