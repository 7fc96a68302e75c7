use crate::{MemoryAddress, PageSize};
use core::fmt;
use core::ops::{Add, AddAssign};
use core::ptr::NonNull;

/// Virtual memory address.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **process virtual**
/// addresses, i.e. what the CPU dereferences. It carries the *kind* of
/// address at the type level so you don't accidentally hand a CPU pointer to
/// a device.
///
/// ### Semantics
/// - [`VirtualAddress::from_ptr`] exposes the pointer's provenance;
///   [`VirtualAddress::as_mut_ptr`] picks it up again. Round-tripping a
///   pointer through a `VirtualAddress` is therefore sound.
/// - [`VirtualAddress::offset`] yields the offset within the page of size `S`.
///
/// ### Examples
/// ```rust
/// # use dma_memory_addresses::*;
/// let bytes = [0u8; 16];
/// let va = VirtualAddress::from_ptr(bytes.as_ptr());
/// assert_eq!(va.as_mut_ptr::<u8>().cast_const(), bytes.as_ptr());
///
/// let va = VirtualAddress::new(0x7F00_0020_1234);
/// assert_eq!(va.offset::<Size4K>(), 0x234);
/// assert_eq!(va.offset::<Size2M>(), 0x1234);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self(MemoryAddress::from_ptr(ptr))
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    /// Reconstitute a pointer from an address previously obtained via
    /// [`from_ptr`](Self::from_ptr).
    ///
    /// Creating the pointer is safe; dereferencing it is only sound while the
    /// memory it names is still mapped.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn as_mut_ptr<T>(self) -> *mut T {
        core::ptr::with_exposed_provenance_mut(self.as_u64() as usize)
    }

    #[inline]
    #[must_use]
    pub const fn offset<S: PageSize>(self) -> u64 {
        self.0.offset::<S>()
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, align: u64) -> bool {
        self.0.is_aligned_to(align)
    }
}

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}

impl From<u64> for VirtualAddress {
    #[inline]
    fn from(v: u64) -> Self {
        Self::new(v)
    }
}

impl<T> From<NonNull<T>> for VirtualAddress {
    #[inline]
    fn from(ptr: NonNull<T>) -> Self {
        Self::from_nonnull(ptr)
    }
}

impl Add<u64> for VirtualAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for VirtualAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}
