use crate::bus_map::{BusMapper, DmaDevice, FnBusMapper};
use crate::config::PoolConfig;
use crate::error::{BusMapError, CreateError, TranslateError};
use crate::huge_page::{HeapPages, HugePageBackend, HugeTlb};
use crate::layout::DEFAULT_ALIGNMENT;
use crate::pagemap::{IdentityResolver, Pagemap, PhysResolver};
use crate::pool::{DmaBuffer, DmaPool};
use dma_memory_addresses::{BusAddress, PhysicalAddress, VirtualAddress};
use std::fmt;
use std::sync::Arc;

/// Everything a pool needs from its environment: where memory comes from,
/// how it is translated, and how it is made visible to devices.
///
/// The bus mapper is captured by each pool at creation time. Replacing it
/// later only affects pools created afterwards.
pub struct DmaContext<B: HugePageBackend = HugeTlb, R: PhysResolver = Pagemap> {
    backend: B,
    resolver: R,
    bus_mapper: Option<Arc<dyn BusMapper>>,
}

impl DmaContext {
    /// `MAP_HUGETLB` memory translated through `/proc/self/pagemap`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(HugeTlb, Pagemap::current())
    }
}

impl Default for DmaContext {
    fn default() -> Self {
        Self::new()
    }
}

impl DmaContext<HeapPages, IdentityResolver> {
    /// Heap memory with identity translation. Nothing a real device could
    /// use; for hosts without huge pages.
    #[must_use]
    pub const fn heap() -> Self {
        Self::with_parts(HeapPages, IdentityResolver)
    }
}

impl<B: HugePageBackend, R: PhysResolver> DmaContext<B, R> {
    pub const fn with_parts(backend: B, resolver: R) -> Self {
        Self {
            backend,
            resolver,
            bus_mapper: None,
        }
    }

    /// Install a bus mapper built from a `map` and an `unmap` function,
    /// replacing any previous one.
    pub fn register_bus_map<M, U>(&mut self, map: M, unmap: U)
    where
        M: Fn(DmaDevice, PhysicalAddress, u64) -> Result<BusAddress, BusMapError>
            + Send
            + Sync
            + 'static,
        U: Fn(DmaDevice, BusAddress, u64) -> Result<(), BusMapError> + Send + Sync + 'static,
    {
        self.set_bus_mapper(Arc::new(FnBusMapper::new(map, unmap)));
    }

    pub fn set_bus_mapper(&mut self, mapper: Arc<dyn BusMapper>) {
        self.bus_mapper = Some(mapper);
    }

    /// Go back to identity (physical == bus) for new pools.
    pub fn clear_bus_mapper(&mut self) {
        self.bus_mapper = None;
    }

    #[must_use]
    pub fn has_bus_mapper(&self) -> bool {
        self.bus_mapper.is_some()
    }

    #[must_use]
    pub const fn resolver(&self) -> &R {
        &self.resolver
    }

    /// # Errors
    /// See [`CreateError`]; a failed creation leaves nothing allocated.
    ///
    /// # Panics
    /// Panics if the installed bus mapper refuses a page.
    pub fn create_pool(&self, config: &PoolConfig) -> Result<DmaPool<B>, CreateError> {
        DmaPool::create(
            config,
            self.backend.clone(),
            &self.resolver,
            self.bus_mapper.clone(),
        )
    }

    /// A one-buffer pool of `size` bytes with [`DEFAULT_ALIGNMENT`], and its
    /// buffer already allocated. Release both with
    /// [`DmaPool::free_single`].
    ///
    /// # Errors
    /// As [`create_pool`](Self::create_pool).
    pub fn single_buffer(
        &self,
        name: &str,
        device: DmaDevice,
        size: u64,
    ) -> Result<(DmaPool<B>, DmaBuffer), CreateError> {
        let config = PoolConfig::new(name, size, 1)
            .with_device(device)
            .with_alignment(DEFAULT_ALIGNMENT);
        let pool = self.create_pool(&config)?;
        let buffer = pool.allocate()?;
        Ok((pool, buffer))
    }

    /// # Errors
    /// See [`PhysResolver::virt_to_phys`].
    pub fn virt_to_phys(&self, va: VirtualAddress) -> Result<PhysicalAddress, TranslateError> {
        self.resolver.virt_to_phys(va)
    }

    /// # Errors
    /// See [`PhysResolver::virt_to_bus`].
    pub fn virt_to_bus(&self, va: VirtualAddress) -> Result<BusAddress, TranslateError> {
        self.resolver.virt_to_bus(va)
    }
}

impl<B: HugePageBackend + fmt::Debug, R: PhysResolver + fmt::Debug> fmt::Debug for DmaContext<B, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaContext")
            .field("backend", &self.backend)
            .field("resolver", &self.resolver)
            .field("bus_mapper", &self.bus_mapper.is_some())
            .finish()
    }
}
