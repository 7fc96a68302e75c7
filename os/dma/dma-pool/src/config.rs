use crate::bus_map::DmaDevice;
use crate::error::CreateError;
use crate::layout::{DEFAULT_ALIGNMENT, HUGE_PAGE_SIZE, MAX_ALIGNMENT, MAX_POOL_NAME_LEN, POOL_HEADER_SIZE};
use dma_memory_addresses::checked_align_up;

/// What a caller asks for when creating a pool.
///
/// ```rust
/// # use dma_pool::{DmaDevice, PoolConfig};
/// let cfg = PoolConfig::new("rx-ring", 2048, 512)
///     .with_device(DmaDevice::new(0, 1))
///     .with_alignment(256);
/// let geometry = cfg.geometry().unwrap();
/// assert_eq!(geometry.buffer_size, 2048);
/// assert_eq!(geometry.huge_pages, 1);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    pub name: String,
    pub device: DmaDevice,
    pub buffer_size: u64,
    pub buffer_count: usize,
    pub alignment: u64,
}

impl PoolConfig {
    /// A pool for device `0.0` with [`DEFAULT_ALIGNMENT`].
    #[must_use]
    pub fn new(name: impl Into<String>, buffer_size: u64, buffer_count: usize) -> Self {
        Self {
            name: name.into(),
            device: DmaDevice::default(),
            buffer_size,
            buffer_count,
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    #[must_use]
    pub const fn with_device(mut self, device: DmaDevice) -> Self {
        self.device = device;
        self
    }

    #[must_use]
    pub const fn with_alignment(mut self, alignment: u64) -> Self {
        self.alignment = alignment;
        self
    }

    /// Validate the configuration and derive the pool layout.
    ///
    /// # Errors
    /// Any of the configuration variants of [`CreateError`].
    pub fn geometry(&self) -> Result<PoolGeometry, CreateError> {
        if self.name.len() > MAX_POOL_NAME_LEN {
            return Err(CreateError::NameTooLong(self.name.len()));
        }
        PoolGeometry::compute(self.buffer_size, self.buffer_count, self.alignment)
    }
}

/// Derived layout of a pool.
///
/// Single-page pools place the buffers [`POOL_HEADER_SIZE`] bytes into the
/// mapping. When the buffers do not fit next to that header in one huge
/// page, the stride is rounded up to a power of two and the header grows to
/// `align_up(stride, 4K)`, which keeps every buffer inside one huge page.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PoolGeometry {
    /// Distance between consecutive buffers; the usable size of each.
    pub buffer_size: u64,
    pub buffer_count: usize,
    pub alignment: u64,
    /// Bytes between the start of the mapping and the first buffer.
    pub header_offset: u64,
    pub huge_pages: u64,
}

impl PoolGeometry {
    /// # Errors
    /// Rejects alignments that are not a power of two or exceed
    /// [`MAX_ALIGNMENT`], zero or over-large buffers, and empty pools.
    pub fn compute(
        buffer_size: u64,
        buffer_count: usize,
        alignment: u64,
    ) -> Result<Self, CreateError> {
        if !alignment.is_power_of_two() {
            return Err(CreateError::AlignmentNotPowerOfTwo(alignment));
        }
        if alignment > MAX_ALIGNMENT {
            return Err(CreateError::AlignmentTooLarge(alignment));
        }
        if buffer_size == 0 {
            return Err(CreateError::ZeroBufferSize);
        }
        if buffer_size > HUGE_PAGE_SIZE {
            return Err(CreateError::BufferTooLarge(buffer_size));
        }
        if buffer_count == 0 {
            return Err(CreateError::ZeroBuffers);
        }

        let count = buffer_count as u64;
        let mut stride =
            checked_align_up(buffer_size, alignment).ok_or(CreateError::GeometryOverflow)?;
        let single_page = stride
            .checked_mul(count)
            .and_then(|payload| payload.checked_add(POOL_HEADER_SIZE))
            .is_some_and(|total| total <= HUGE_PAGE_SIZE);

        let header_offset = if single_page {
            POOL_HEADER_SIZE
        } else {
            // stride <= HUGE_PAGE_SIZE, so this cannot exceed it either
            stride = stride.next_power_of_two();
            stride.max(POOL_HEADER_SIZE)
        };

        let huge_pages = stride
            .checked_mul(count)
            .and_then(|payload| payload.checked_add(header_offset))
            .and_then(|total| checked_align_up(total, HUGE_PAGE_SIZE))
            .ok_or(CreateError::GeometryOverflow)?
            / HUGE_PAGE_SIZE;

        Ok(Self {
            buffer_size: stride,
            buffer_count,
            alignment,
            header_offset,
            huge_pages,
        })
    }

    /// Bytes occupied by all buffers.
    #[must_use]
    pub const fn payload_len(&self) -> u64 {
        self.buffer_size * self.buffer_count as u64
    }

    #[must_use]
    pub const fn mapped_len(&self) -> u64 {
        self.huge_pages * HUGE_PAGE_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_pool_fits_one_page() {
        let g = PoolGeometry::compute(4096, 3, 64).unwrap();
        assert_eq!(g.buffer_size, 4096);
        assert_eq!(g.header_offset, POOL_HEADER_SIZE);
        assert_eq!(g.huge_pages, 1);
        assert_eq!(g.payload_len(), 3 * 4096);
    }

    #[test]
    fn size_is_rounded_to_alignment() {
        let g = PoolGeometry::compute(100, 10, 64).unwrap();
        assert_eq!(g.buffer_size, 128);
        let g = PoolGeometry::compute(8, 1, 1).unwrap();
        assert_eq!(g.buffer_size, 8);
    }

    #[test]
    fn exactly_full_page_stays_single() {
        // 511 * 4K + 4K header == 2M
        let g = PoolGeometry::compute(4096, 511, 256).unwrap();
        assert_eq!(g.header_offset, POOL_HEADER_SIZE);
        assert_eq!(g.huge_pages, 1);
    }

    #[test]
    fn overflowing_page_moves_header() {
        let g = PoolGeometry::compute(4096, 512, 256).unwrap();
        assert_eq!(g.header_offset, 4096);
        assert_eq!(g.huge_pages, 2);

        let g = PoolGeometry::compute(32768, 96, 256).unwrap();
        assert_eq!(g.header_offset, 32768);
        assert_eq!(g.huge_pages, 2);
    }

    #[test]
    fn multi_page_stride_is_power_of_two() {
        let g = PoolGeometry::compute(3 * 4096, 300, 4096).unwrap();
        assert_eq!(g.buffer_size, 16384);
        assert_eq!(g.header_offset, 16384);
        assert_eq!(HUGE_PAGE_SIZE % g.buffer_size, 0);
        assert_eq!(g.huge_pages, 3);

        let g = PoolGeometry::compute(1000, 4000, 8).unwrap();
        assert_eq!(g.buffer_size, 1024);
        assert_eq!(g.header_offset, POOL_HEADER_SIZE);
    }

    #[test]
    fn whole_page_buffers() {
        let g = PoolGeometry::compute(HUGE_PAGE_SIZE, 2, 4096).unwrap();
        assert_eq!(g.header_offset, HUGE_PAGE_SIZE);
        assert_eq!(g.huge_pages, 3);
    }

    #[test]
    fn invalid_configurations() {
        assert!(matches!(
            PoolGeometry::compute(64, 1, 0),
            Err(CreateError::AlignmentNotPowerOfTwo(0))
        ));
        assert!(matches!(
            PoolGeometry::compute(64, 1, 96),
            Err(CreateError::AlignmentNotPowerOfTwo(96))
        ));
        assert!(matches!(
            PoolGeometry::compute(64, 1, 8192),
            Err(CreateError::AlignmentTooLarge(8192))
        ));
        assert!(matches!(
            PoolGeometry::compute(HUGE_PAGE_SIZE + 1, 1, 64),
            Err(CreateError::BufferTooLarge(_))
        ));
        assert!(matches!(
            PoolGeometry::compute(0, 1, 64),
            Err(CreateError::ZeroBufferSize)
        ));
        assert!(matches!(
            PoolGeometry::compute(64, 0, 64),
            Err(CreateError::ZeroBuffers)
        ));
    }

    #[test]
    fn huge_counts_overflow() {
        assert!(matches!(
            PoolGeometry::compute(HUGE_PAGE_SIZE, usize::MAX, 64),
            Err(CreateError::GeometryOverflow)
        ));
    }

    #[test]
    fn long_names_are_rejected() {
        let ok = PoolConfig::new("x".repeat(MAX_POOL_NAME_LEN), 64, 1);
        assert!(ok.geometry().is_ok());
        let long = PoolConfig::new("x".repeat(MAX_POOL_NAME_LEN + 1), 64, 1);
        assert!(matches!(long.geometry(), Err(CreateError::NameTooLong(64))));
    }
}
