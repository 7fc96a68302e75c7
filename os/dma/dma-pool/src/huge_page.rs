//! Huge-page backed regions.
//!
//! A region is a whole number of huge pages. Its first machine word records
//! the mapped length, and callers only ever see the memory past
//! `header_offset`:
//!
//! ```text
//! mapping                mapping + header_offset
//! │ len: u64 │ ... header │ buffers ...                         │
//! └──────────┴────────────┴─────────────────────────────────────┘
//!  ◄──────────────────── len (multiple of HUGE_PAGE_SIZE) ──────►
//! ```

use crate::error::HugePageError;
use crate::layout::{HUGE_PAGE_SIZE, HugePage};
use dma_memory_addresses::{PageSize, VirtualAddress, checked_align_up};
use log::{debug, warn};
use std::alloc::{self, Layout};
use std::io;
use std::ptr::{self, NonNull};

/// Source of huge-page-aligned, zero-filled memory.
///
/// # Safety
/// [`map`](Self::map) must return memory that is readable and writable for
/// `len` bytes, aligned to [`HUGE_PAGE_SIZE`], zero filled, and not aliased
/// by anything else until it is passed back to [`unmap`](Self::unmap).
pub unsafe trait HugePageBackend: Clone + Send + Sync {
    /// Map `len` bytes; `len` is a non-zero multiple of [`HUGE_PAGE_SIZE`].
    ///
    /// # Errors
    /// Returns [`HugePageError`] if the memory cannot be provided.
    fn map(&self, len: u64) -> Result<NonNull<u8>, HugePageError>;

    /// Release a mapping.
    ///
    /// # Safety
    /// `ptr` and `len` must describe a live mapping obtained from
    /// [`map`](Self::map) on an equivalent backend, and nothing may access it
    /// afterwards.
    unsafe fn unmap(&self, ptr: NonNull<u8>, len: u64);
}

/// `MAP_HUGETLB` mappings: locked, populated and physically contiguous per
/// huge page. Requires huge pages reserved via `vm.nr_hugepages`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HugeTlb;

const HUGETLB_FLAGS: libc::c_int =
    libc::MAP_SHARED | libc::MAP_ANONYMOUS | libc::MAP_POPULATE | libc::MAP_HUGETLB;

unsafe impl HugePageBackend for HugeTlb {
    fn map(&self, len: u64) -> Result<NonNull<u8>, HugePageError> {
        let size = usize::try_from(len).map_err(|_| HugePageError::SizeOverflow(len))?;

        match mmap_anonymous(size, HUGETLB_FLAGS | HugePage::MAP_HUGE_BITS) {
            Ok(ptr) => Ok(ptr),
            Err(err) => {
                warn!(
                    "{} hugetlb mapping of {len:#X} bytes failed ({err}); retrying with the default huge page size",
                    HugePage::as_str()
                );
                mmap_anonymous(size, HUGETLB_FLAGS)
                    .map_err(|source| HugePageError::Map { len, source })
            }
        }
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: u64) {
        let Ok(size) = usize::try_from(len) else {
            warn!(
                "cannot unmap {:?}: length {len:#X} exceeds the address space",
                VirtualAddress::from_nonnull(ptr)
            );
            return;
        };
        // SAFETY: caller passes a live mapping of exactly this length.
        if unsafe { libc::munmap(ptr.as_ptr().cast(), size) } != 0 {
            warn!(
                "munmap of {:?} failed: {}",
                VirtualAddress::from_nonnull(ptr),
                io::Error::last_os_error()
            );
        }
    }
}

fn mmap_anonymous(len: usize, flags: libc::c_int) -> io::Result<NonNull<u8>> {
    // SAFETY: anonymous mapping at a kernel-chosen address; no existing
    // memory is affected.
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            flags,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
}

/// Zero-filled, huge-page aligned heap memory.
///
/// Not locked and not physically contiguous. For hosts without reserved huge
/// pages and for tests; pair it with
/// [`IdentityResolver`](crate::IdentityResolver).
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct HeapPages;

impl HeapPages {
    #[allow(clippy::cast_possible_truncation)]
    const ALIGN: usize = HUGE_PAGE_SIZE as usize;

    fn layout(len: u64) -> Result<Layout, HugePageError> {
        let size = usize::try_from(len).map_err(|_| HugePageError::SizeOverflow(len))?;
        Layout::from_size_align(size, Self::ALIGN).map_err(|_| HugePageError::SizeOverflow(len))
    }
}

unsafe impl HugePageBackend for HeapPages {
    fn map(&self, len: u64) -> Result<NonNull<u8>, HugePageError> {
        let layout = Self::layout(len)?;
        if layout.size() == 0 {
            return Err(HugePageError::Heap(len));
        }
        // SAFETY: non-zero size checked above.
        NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or(HugePageError::Heap(len))
    }

    unsafe fn unmap(&self, ptr: NonNull<u8>, len: u64) {
        match Self::layout(len) {
            // SAFETY: `map` allocated `ptr` with this very layout.
            Ok(layout) => unsafe { alloc::dealloc(ptr.as_ptr(), layout) },
            Err(err) => warn!("cannot release {:?}: {err}", VirtualAddress::from_nonnull(ptr)),
        }
    }
}

/// Bytes of the length word at the start of every region.
const LENGTH_WORD: u64 = size_of::<u64>() as u64;

/// A mapped run of huge pages, released on drop.
pub(crate) struct HugeRegion<B: HugePageBackend> {
    backend: B,
    mapping: NonNull<u8>,
    header_offset: u64,
}

// SAFETY: the region exclusively owns its mapping; the raw pointer is only
// read for the length word, which is never written after construction.
unsafe impl<B: HugePageBackend> Send for HugeRegion<B> {}
unsafe impl<B: HugePageBackend> Sync for HugeRegion<B> {}

impl<B: HugePageBackend> HugeRegion<B> {
    /// Map room for `header_offset + size` bytes, rounded up to whole huge
    /// pages, and stamp the mapped length into the first word.
    pub fn alloc(backend: B, size: u64, header_offset: u64) -> Result<Self, HugePageError> {
        debug_assert!(header_offset >= LENGTH_WORD, "header must fit the length word");
        let len = size
            .checked_add(header_offset)
            .and_then(|len| checked_align_up(len, HUGE_PAGE_SIZE))
            .ok_or(HugePageError::SizeOverflow(size))?;

        let mapping = backend.map(len)?;
        debug_assert!(
            VirtualAddress::from_nonnull(mapping).offset::<HugePage>() == 0,
            "backend returned a misaligned mapping"
        );
        // SAFETY: the backend guarantees `len` (≥ one huge page) writable,
        // suitably aligned bytes.
        unsafe { mapping.cast::<u64>().write(len) };
        debug!(
            "mapped {} huge page(s) at {:?}",
            len / HUGE_PAGE_SIZE,
            VirtualAddress::from_nonnull(mapping)
        );

        Ok(Self {
            backend,
            mapping,
            header_offset,
        })
    }

    /// Length of the whole mapping, as recorded in its first word.
    pub fn mapped_len(&self) -> u64 {
        // SAFETY: written in `alloc`, mapping alive until drop.
        unsafe { self.mapping.cast::<u64>().read() }
    }

    pub fn page_count(&self) -> u64 {
        self.mapped_len() / HUGE_PAGE_SIZE
    }

    pub fn mapping_start(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.mapping)
    }

    /// First byte past the header.
    pub fn start(&self) -> VirtualAddress {
        self.mapping_start() + self.header_offset
    }
}

impl<B: HugePageBackend> Drop for HugeRegion<B> {
    fn drop(&mut self) {
        let len = self.mapped_len();
        debug!("releasing {len:#X} bytes at {:?}", self.mapping_start());
        // SAFETY: `mapping` came from `backend.map(len)` and is dropped once.
        unsafe { self.backend.unmap(self.mapping, len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::POOL_HEADER_SIZE;

    #[test]
    fn region_records_rounded_length() {
        let region = HugeRegion::alloc(HeapPages, 4096 * 3, POOL_HEADER_SIZE).unwrap();
        assert_eq!(region.mapped_len(), HUGE_PAGE_SIZE);
        assert_eq!(region.page_count(), 1);
        assert_eq!(region.start(), region.mapping_start() + POOL_HEADER_SIZE);
        assert!(region.mapping_start().is_aligned_to(HUGE_PAGE_SIZE));
    }

    #[test]
    fn region_spanning_pages() {
        let region = HugeRegion::alloc(HeapPages, HUGE_PAGE_SIZE, POOL_HEADER_SIZE).unwrap();
        assert_eq!(region.mapped_len(), 2 * HUGE_PAGE_SIZE);
        assert_eq!(region.page_count(), 2);
    }

    #[test]
    fn heap_pages_are_zeroed() {
        let region = HugeRegion::alloc(HeapPages, 64, POOL_HEADER_SIZE).unwrap();
        let p = region.start().as_mut_ptr::<u8>();
        // SAFETY: inside the first huge page of a live region.
        let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_request_is_rejected() {
        assert!(matches!(
            HugeRegion::alloc(HeapPages, u64::MAX - 8, POOL_HEADER_SIZE),
            Err(HugePageError::SizeOverflow(_))
        ));
    }

    #[test]
    fn unmap_with_impossible_length_leaves_memory_alone() {
        let region = HugeRegion::alloc(HeapPages, 64, POOL_HEADER_SIZE).unwrap();
        // SAFETY: the length has no layout, so nothing is released.
        unsafe { HeapPages.unmap(region.mapping, u64::MAX) };
        assert_eq!(region.mapped_len(), HUGE_PAGE_SIZE);
    }
}
