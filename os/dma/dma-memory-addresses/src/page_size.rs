use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;

    /// `mmap(2)` huge page size selector (`log2(SIZE) << MAP_HUGE_SHIFT`).
    const MAP_HUGE_BITS: i32 = Self::SHIFT.cast_signed() << 26;

    fn as_str() -> &'static str;
}

/// 4 KiB page (4096 bytes).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const SHIFT: u32 = 12;

    fn as_str() -> &'static str {
        "4K"
    }
}

/// 2 MiB page (`2_097_152` bytes).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size2M;
impl sealed::Sealed for Size2M {}
impl PageSize for Size2M {
    const SIZE: u64 = 2 * 1024 * 1024;
    const SHIFT: u32 = 21;

    fn as_str() -> &'static str {
        "2M"
    }
}

macro_rules! impl_page_size_fmt {
    ($($size:ty),+) => {
        $(
            impl fmt::Display for $size {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str(Self::as_str())
                }
            }

            impl fmt::Debug for $size {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    fmt::Display::fmt(&self, f)
                }
            }
        )+
    };
}

impl_page_size_fmt!(Size4K, Size2M);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_matches_size() {
        assert_eq!(1u64 << Size4K::SHIFT, Size4K::SIZE);
        assert_eq!(1u64 << Size2M::SHIFT, Size2M::SIZE);
    }

    #[test]
    fn huge_page_selector_bits() {
        // MAP_HUGE_2MB from <linux/mman.h>
        assert_eq!(Size2M::MAP_HUGE_BITS, 21 << 26);
    }
}
