//! Virtual → physical translation through the kernel's page map.
//!
//! `/proc/<pid>/pagemap` holds one 64-bit entry per virtual page of the
//! process, indexed by `va / page_size`. Without `CAP_SYS_ADMIN` the kernel
//! zeroes the frame numbers, which [`Pagemap`] reports as
//! [`TranslateError::FrameHidden`].

use crate::error::TranslateError;
use crate::layout::PAGEMAP_PATH;
use bitfield_struct::bitfield;
use dma_memory_addresses::{BusAddress, PageSize, PhysicalAddress, Size4K, VirtualAddress};
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// One page map entry (see `Documentation/admin-guide/mm/pagemap.rst`).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PagemapEntry {
    /// Bits 0–54: page frame number, if present.
    #[bits(55)]
    pub pfn: u64,

    /// Bit 55: PTE is soft-dirty.
    pub soft_dirty: bool,

    /// Bit 56: page is exclusively mapped.
    pub exclusive: bool,

    /// Bits 57–60: zero.
    #[bits(4)]
    __: u8,

    /// Bit 61: page is file-backed or shared anonymous.
    pub file_or_shared: bool,

    /// Bit 62: page is swapped out.
    pub swapped: bool,

    /// Bit 63: page is present in RAM.
    pub present: bool,
}

impl PagemapEntry {
    /// Size of one entry in the page map file.
    pub const BYTES: u64 = size_of::<u64>() as u64;
}

/// Translates process virtual addresses.
pub trait PhysResolver: Send + Sync {
    /// # Errors
    /// Fails when the translation source is unavailable or the page is not
    /// resident.
    fn virt_to_phys(&self, va: VirtualAddress) -> Result<PhysicalAddress, TranslateError>;

    /// Bus address of `va` in the absence of any bus mapping.
    ///
    /// # Errors
    /// As [`virt_to_phys`](Self::virt_to_phys).
    fn virt_to_bus(&self, va: VirtualAddress) -> Result<BusAddress, TranslateError> {
        self.virt_to_phys(va).map(BusAddress::from_physical)
    }
}

/// Page-map-file backed resolver.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pagemap {
    path: PathBuf,
    page_size: u64,
}

impl Pagemap {
    /// The calling process's page map, with the platform base page size.
    #[must_use]
    pub fn current() -> Self {
        Self::with_path(PAGEMAP_PATH, base_page_size())
    }

    /// A page map in the kernel's format at `path`, using `page_size` to
    /// index it.
    ///
    /// # Panics
    /// Panics if `page_size` is not a power of two.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>, page_size: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        Self {
            path: path.into(),
            page_size,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Raw entry describing the page that contains `va`.
    ///
    /// The file is opened per call so a long-lived resolver never pins a
    /// descriptor.
    ///
    /// # Errors
    /// [`TranslateError::Unavailable`] if the file cannot be opened,
    /// [`TranslateError::Read`] if the entry cannot be read.
    pub fn entry(&self, va: VirtualAddress) -> Result<PagemapEntry, TranslateError> {
        let offset = (va.as_u64() / self.page_size)
            .checked_mul(PagemapEntry::BYTES)
            .ok_or(TranslateError::OutOfRange(va))?;

        let file = File::open(&self.path).map_err(TranslateError::Unavailable)?;
        let mut raw = [0u8; size_of::<u64>()];
        file.read_exact_at(&mut raw, offset)
            .map_err(|source| TranslateError::Read { va, source })?;

        Ok(PagemapEntry::from_bits(u64::from_ne_bytes(raw)))
    }
}

impl PhysResolver for Pagemap {
    fn virt_to_phys(&self, va: VirtualAddress) -> Result<PhysicalAddress, TranslateError> {
        let entry = self.entry(va)?;
        if !entry.present() {
            return Err(TranslateError::NotPresent(va));
        }
        if entry.pfn() == 0 {
            return Err(TranslateError::FrameHidden(va));
        }

        if entry.pfn().checked_mul(self.page_size).is_none() {
            return Err(TranslateError::OutOfRange(va));
        }
        let in_page = va.as_u64() & (self.page_size - 1);
        Ok(PhysicalAddress::from_frame(entry.pfn(), in_page, self.page_size))
    }
}

/// Treats virtual addresses as physical. Only meaningful for memory that no
/// real device will touch, e.g. [`HeapPages`](crate::HeapPages) in tests.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct IdentityResolver;

impl PhysResolver for IdentityResolver {
    fn virt_to_phys(&self, va: VirtualAddress) -> Result<PhysicalAddress, TranslateError> {
        Ok(PhysicalAddress::new(va.as_u64()))
    }
}

fn base_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    page_size_or_default(unsafe { libc::sysconf(libc::_SC_PAGESIZE) })
}

fn page_size_or_default(size: libc::c_long) -> u64 {
    match u64::try_from(size) {
        Ok(size) if size.is_power_of_two() => size,
        _ => {
            log::warn!("sysconf(_SC_PAGESIZE) returned {size}, assuming 4K pages");
            Size4K::SIZE
        }
    }
}
