use crate::bus_map::{BusMapper, DmaDevice, DmaDirection};
use crate::config::{PoolConfig, PoolGeometry};
use crate::directory::{HugePageRecord, HugePageTable};
use crate::error::{CreateError, FreeListError, MapBufferError};
use crate::free_list::FreeList;
use crate::huge_page::{HugePageBackend, HugeRegion, HugeTlb};
use crate::pagemap::PhysResolver;
use dma_memory_addresses::{AddressRange, BusAddress, PhysicalAddress, VirtualAddress};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// A buffer handed out by [`DmaPool::allocate`].
///
/// Plain data: it does not borrow the pool and does not free itself. Pass it
/// (or its [`virt`](Self::virt) address) back to [`DmaPool::free`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct DmaBuffer {
    virt: VirtualAddress,
    bus: BusAddress,
    size: u64,
}

impl DmaBuffer {
    /// Address for the CPU.
    #[must_use]
    pub const fn virt(&self) -> VirtualAddress {
        self.virt
    }

    /// Address to program into the device.
    #[must_use]
    pub const fn bus(&self) -> BusAddress {
        self.bus
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.virt.as_mut_ptr()
    }

    /// View the buffer's memory.
    ///
    /// # Safety
    /// The pool that produced this buffer must outlive `'a`, the buffer must
    /// still be allocated, and no other reference to its memory (including
    /// from the device) may exist for `'a`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::mut_from_ref)]
    pub unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        // SAFETY: guaranteed by the caller; sizes never exceed one huge page.
        unsafe { std::slice::from_raw_parts_mut(self.as_mut_ptr(), self.size as usize) }
    }
}

/// A pool of equally sized DMA buffers carved out of huge pages.
///
/// ### Lifecycle
/// Created by [`DmaContext::create_pool`](crate::DmaContext::create_pool);
/// released by [`destroy`](Self::destroy) or by dropping it, which unmaps the
/// pages from the bus (if a [`BusMapper`] was installed at creation) and then
/// returns them to the OS. Buffers still handed out at that point dangle.
///
/// ### Concurrency
/// [`allocate`](Self::allocate) and [`free`](Self::free) take `&self` and may
/// be called from any number of threads; they contend on a spin gate held for
/// a few instructions. Address resolution only reads immutable tables.
pub struct DmaPool<B: HugePageBackend = HugeTlb> {
    name: String,
    device: DmaDevice,
    geometry: PoolGeometry,
    buffers: AddressRange<VirtualAddress>,
    base_physical: PhysicalAddress,
    free_list: FreeList,
    // Drop order matters: bus mappings go before the memory.
    table: HugePageTable,
    region: HugeRegion<B>,
}

impl<B: HugePageBackend> DmaPool<B> {
    pub(crate) fn create<R: PhysResolver + ?Sized>(
        config: &PoolConfig,
        backend: B,
        resolver: &R,
        mapper: Option<Arc<dyn BusMapper>>,
    ) -> Result<Self, CreateError> {
        let geometry = config.geometry()?;
        let region = HugeRegion::alloc(backend, geometry.payload_len(), geometry.header_offset)?;
        let table = HugePageTable::build(
            region.mapping_start(),
            region.page_count(),
            resolver,
            mapper,
            config.device,
        )?;

        let start = region.start();
        let base_physical = resolver.virt_to_phys(start).inspect_err(|err| {
            warn!("pool {}: cannot resolve base address {start:?}: {err}", config.name);
        })?;

        let stride = geometry.buffer_size;
        let free_list = FreeList::with_buffers(
            (0..geometry.buffer_count).map(|i| start + i as u64 * stride),
        )?;

        info!(
            "created DMA pool {} for device {}: {} x {:#X} bytes (align {}) in {} huge page(s) at {start:?} / {base_physical:?}",
            config.name,
            config.device,
            geometry.buffer_count,
            stride,
            geometry.alignment,
            geometry.huge_pages,
        );

        Ok(Self {
            name: config.name.clone(),
            device: config.device,
            geometry,
            buffers: AddressRange::new(start, geometry.payload_len()),
            base_physical,
            free_list,
            table,
            region,
        })
    }

    /// Release the pool. Same as dropping it, spelled out.
    pub fn destroy(self) {
        drop(self);
    }

    /// Take a free buffer.
    ///
    /// # Errors
    /// [`FreeListError::Exhausted`] if every buffer is handed out.
    ///
    /// # Panics
    /// Panics if the buffer does not resolve to any of the pool's huge pages,
    /// which means the pool's tables are corrupt.
    pub fn allocate(&self) -> Result<DmaBuffer, FreeListError> {
        let virt = self.free_list.pop()?;
        let Some(bus) = self.table.resolve_bus(virt) else {
            error!("pool {}: free list yielded {virt:?} outside every huge page", self.name);
            panic!("DMA pool {} directory is corrupt", self.name);
        };
        Ok(DmaBuffer {
            virt,
            bus,
            size: self.geometry.buffer_size,
        })
    }

    /// Return a buffer.
    ///
    /// Neither ownership nor double frees are checked.
    ///
    /// # Errors
    /// [`FreeListError::Full`] if nothing is handed out,
    /// [`FreeListError::Corrupted`] if the free list is inconsistent.
    pub fn free(&self, va: VirtualAddress) -> Result<(), FreeListError> {
        self.free_list.push(va)
    }

    /// Free the only buffer of a single-buffer pool and destroy the pool.
    ///
    /// # Errors
    /// As [`free`](Self::free); the pool is destroyed either way.
    pub fn free_single(self, buffer: DmaBuffer) -> Result<(), FreeListError> {
        self.free(buffer.virt())
    }

    /// Bus address of `va`, or `None` if the pool does not contain it.
    #[must_use]
    pub fn resolve_physical(&self, va: VirtualAddress) -> Option<BusAddress> {
        self.table.resolve_bus(va)
    }

    /// CPU address of `bus`, or `None` if the pool does not contain it.
    #[must_use]
    pub fn resolve_virtual(&self, bus: BusAddress) -> Option<VirtualAddress> {
        self.table.resolve_virt(bus)
    }

    /// Position of the buffer containing `va`.
    ///
    /// # Panics
    /// Panics if `va` lies outside the pool's buffers.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn buffer_index(&self, va: VirtualAddress) -> usize {
        let Some(offset) = self.buffers.offset_of(va) else {
            panic!("{va:?} is not a buffer of DMA pool {}", self.name);
        };
        // < buffer_count, which is a usize
        (offset / self.geometry.buffer_size) as usize
    }

    /// Bus address for a transfer of `len` bytes at `va`.
    ///
    /// Pool memory is mapped for the device when the pool is created, so
    /// this is a lookup; it fails if the span crosses a huge page boundary
    /// or leaves the pool.
    ///
    /// # Errors
    /// [`MapBufferError`] if the span is not within one huge page of the
    /// pool's buffers.
    pub fn map_buffer(
        &self,
        va: VirtualAddress,
        len: u64,
        direction: DmaDirection,
    ) -> Result<BusAddress, MapBufferError> {
        let err = MapBufferError {
            addr: va.as_u64(),
            len,
        };
        if !self.buffers.contains_span(va, len) {
            return Err(err);
        }
        let record = self.table.page_of_span(va, len).ok_or(err)?;
        let offset = record.virt_range().offset_of(va).ok_or(err)?;
        debug!("pool {}: map {va:?} +{len:#X} {direction:?}", self.name);
        Ok(record.bus() + offset)
    }

    /// Counterpart of [`map_buffer`](Self::map_buffer).
    ///
    /// # Errors
    /// [`MapBufferError`] if `bus` was not produced by this pool.
    pub fn unmap_buffer(
        &self,
        bus: BusAddress,
        len: u64,
        direction: DmaDirection,
    ) -> Result<(), MapBufferError> {
        let err = MapBufferError {
            addr: bus.as_u64(),
            len,
        };
        let va = self.resolve_virtual(bus).ok_or(err)?;
        if !self.buffers.contains_span(va, len) || self.table.page_of_span(va, len).is_none() {
            return Err(err);
        }
        debug!("pool {}: unmap {bus:?} +{len:#X} {direction:?}", self.name);
        Ok(())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn device(&self) -> DmaDevice {
        self.device
    }

    #[must_use]
    pub const fn geometry(&self) -> &PoolGeometry {
        &self.geometry
    }

    /// Size of every buffer after rounding.
    #[must_use]
    pub const fn buffer_size(&self) -> u64 {
        self.geometry.buffer_size
    }

    #[must_use]
    pub const fn buffer_count(&self) -> usize {
        self.geometry.buffer_count
    }

    #[must_use]
    pub const fn alignment(&self) -> u64 {
        self.geometry.alignment
    }

    #[must_use]
    pub const fn header_offset(&self) -> u64 {
        self.geometry.header_offset
    }

    #[must_use]
    pub fn huge_page_count(&self) -> usize {
        self.table.records().len()
    }

    /// Buffers currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free_list.available()
    }

    /// Address of the first buffer.
    #[must_use]
    pub const fn base_virtual(&self) -> VirtualAddress {
        self.buffers.start()
    }

    /// Physical address of the first buffer, as resolved at creation.
    #[must_use]
    pub const fn base_physical(&self) -> PhysicalAddress {
        self.base_physical
    }

    /// The pool's huge pages in address order.
    pub fn huge_pages(&self) -> impl ExactSizeIterator<Item = &HugePageRecord> {
        self.table.records().iter()
    }
}

impl<B: HugePageBackend> Drop for DmaPool<B> {
    fn drop(&mut self) {
        info!(
            "destroying DMA pool {} ({} of {} buffers free, {:#X} bytes mapped)",
            self.name,
            self.free_list.available(),
            self.geometry.buffer_count,
            self.region.mapped_len(),
        );
    }
}

impl<B: HugePageBackend> std::fmt::Debug for DmaPool<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DmaPool")
            .field("name", &self.name)
            .field("device", &self.device)
            .field("geometry", &self.geometry)
            .field("buffers", &self.buffers)
            .field("base_physical", &self.base_physical)
            .finish_non_exhaustive()
    }
}
