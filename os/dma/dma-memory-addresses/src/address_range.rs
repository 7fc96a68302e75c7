use crate::{BusAddress, MemoryAddress, PhysicalAddress, VirtualAddress};
use core::fmt;

mod sealed {
    pub trait Sealed {}
}

/// Common view over the address wrappers, used by [`AddressRange`].
pub trait Address: sealed::Sealed + Copy + Ord + fmt::Debug {
    fn to_raw(self) -> u64;
    fn from_raw(raw: u64) -> Self;
}

macro_rules! impl_address {
    ($($ty:ty),+) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Address for $ty {
                #[inline(always)]
                fn to_raw(self) -> u64 {
                    self.as_u64()
                }

                #[inline(always)]
                fn from_raw(raw: u64) -> Self {
                    Self::new(raw)
                }
            }
        )+
    };
}

impl_address!(MemoryAddress, VirtualAddress, PhysicalAddress, BusAddress);

/// Half-open address interval `[start, start + len)`.
///
/// ### Invariants
/// - `start + len` does not overflow `u64` (checked in [`new`](Self::new)).
/// - [`end`](Self::end) is exclusive; it is never [contained](Self::contains).
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct AddressRange<A: Address> {
    start: A,
    len: u64,
}

impl<A: Address> AddressRange<A> {
    /// # Panics
    /// Panics if the range would extend past the end of the address space.
    #[inline]
    #[must_use]
    pub fn new(start: A, len: u64) -> Self {
        assert!(
            start.to_raw().checked_add(len).is_some(),
            "address range {start:?}+{len:#X} overflows"
        );
        Self { start, len }
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> A {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First address past the range.
    #[inline]
    #[must_use]
    pub fn end(&self) -> A {
        A::from_raw(self.start.to_raw() + self.len)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: A) -> bool {
        self.offset_of(addr).is_some()
    }

    /// Whether `[addr, addr + len)` lies entirely within this range.
    #[inline]
    #[must_use]
    pub fn contains_span(&self, addr: A, len: u64) -> bool {
        match self.offset_of(addr) {
            Some(off) => len <= self.len - off,
            None => false,
        }
    }

    /// Offset of `addr` from [`start`](Self::start) if it lies in the range.
    #[inline]
    #[must_use]
    pub fn offset_of(&self, addr: A) -> Option<u64> {
        let off = addr.to_raw().checked_sub(self.start.to_raw())?;
        (off < self.len).then_some(off)
    }

    /// The address `offset` bytes into the range, if still inside it.
    #[inline]
    #[must_use]
    pub fn at(&self, offset: u64) -> Option<A> {
        (offset < self.len).then(|| A::from_raw(self.start.to_raw() + offset))
    }
}

impl<A: Address> fmt::Debug for AddressRange<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_open_bounds() {
        let r = AddressRange::new(PhysicalAddress::new(0x1000), 0x1000);
        assert!(!r.contains(PhysicalAddress::new(0x0FFF)));
        assert!(r.contains(PhysicalAddress::new(0x1000)));
        assert!(r.contains(PhysicalAddress::new(0x1FFF)));
        assert!(!r.contains(PhysicalAddress::new(0x2000)));
        assert_eq!(r.end(), PhysicalAddress::new(0x2000));
    }

    #[test]
    fn empty_range_contains_nothing() {
        let r = AddressRange::new(VirtualAddress::new(0x4000), 0);
        assert!(r.is_empty());
        assert!(!r.contains(VirtualAddress::new(0x4000)));
        assert_eq!(r.at(0), None);
    }

    #[test]
    fn spans_must_fit() {
        let r = AddressRange::new(BusAddress::new(0x10_0000), 0x1000);
        assert!(r.contains_span(BusAddress::new(0x10_0000), 0x1000));
        assert!(r.contains_span(BusAddress::new(0x10_0800), 0x800));
        assert!(!r.contains_span(BusAddress::new(0x10_0800), 0x801));
        assert!(!r.contains_span(BusAddress::new(0x0F_FFFF), 1));
    }

    #[test]
    fn range_at_top_of_address_space() {
        let r = AddressRange::new(MemoryAddress::new(u64::MAX - 0xF), 0xF);
        assert!(r.contains(MemoryAddress::new(u64::MAX - 1)));
        assert_eq!(r.offset_of(MemoryAddress::new(u64::MAX - 1)), Some(0xE));
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn overflowing_range_is_rejected() {
        let _ = AddressRange::new(MemoryAddress::new(u64::MAX), 2);
    }
}
