use crate::bus_map::{BusMapper, DmaDevice};
use crate::error::{BusMapError, CreateError};
use crate::layout::HUGE_PAGE_SIZE;
use crate::pagemap::PhysResolver;
use dma_memory_addresses::{AddressRange, BusAddress, PhysicalAddress, VirtualAddress};
use log::{debug, error};
use std::sync::Arc;

/// One huge page of a pool: where the CPU sees it and where the device does.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HugePageRecord {
    virt: AddressRange<VirtualAddress>,
    bus: BusAddress,
}

impl HugePageRecord {
    #[must_use]
    pub const fn virt(&self) -> VirtualAddress {
        self.virt.start()
    }

    #[must_use]
    pub const fn bus(&self) -> BusAddress {
        self.bus
    }

    #[must_use]
    pub fn bus_range(&self) -> AddressRange<BusAddress> {
        AddressRange::new(self.bus, HUGE_PAGE_SIZE)
    }

    pub(crate) fn virt_range(&self) -> AddressRange<VirtualAddress> {
        self.virt
    }

    fn to_bus(&self, va: VirtualAddress) -> Option<BusAddress> {
        self.virt.offset_of(va).and_then(|off| self.bus_range().at(off))
    }

    fn to_virt(&self, bus: BusAddress) -> Option<VirtualAddress> {
        self.bus_range().offset_of(bus).and_then(|off| self.virt.at(off))
    }
}

/// Per-pool table of huge pages in mapping order.
///
/// Owns the bus mappings: dropping the table unmaps every page it mapped.
pub(crate) struct HugePageTable {
    records: Vec<HugePageRecord>,
    mapper: Option<Arc<dyn BusMapper>>,
    device: DmaDevice,
}

impl HugePageTable {
    /// Resolve (and, with a mapper, bus-map) each of the `pages` huge pages
    /// starting at `start`.
    ///
    /// # Panics
    /// Panics if the mapper refuses a page.
    pub fn build<R: PhysResolver + ?Sized>(
        start: VirtualAddress,
        pages: u64,
        resolver: &R,
        mapper: Option<Arc<dyn BusMapper>>,
        device: DmaDevice,
    ) -> Result<Self, CreateError> {
        let mut table = Self {
            records: Vec::new(),
            mapper,
            device,
        };
        table
            .records
            .try_reserve_exact(usize::try_from(pages).map_err(|_| CreateError::GeometryOverflow)?)?;

        for page in 0..pages {
            let virt = start + page * HUGE_PAGE_SIZE;
            let phys = resolver.virt_to_phys(virt)?;
            let bus = match &table.mapper {
                Some(mapper) => mapper
                    .map(device, phys, HUGE_PAGE_SIZE)
                    .unwrap_or_else(|err| fatal_bus_map(phys, &err)),
                None => BusAddress::from_physical(phys),
            };
            if bus.as_u64().checked_add(HUGE_PAGE_SIZE).is_none() {
                fatal_bus_map(
                    phys,
                    &BusMapError::Overflow { device, phys, bus },
                );
            }
            debug!("huge page {page}: {virt:?} -> {phys:?} -> {bus:?}");
            table.records.push(HugePageRecord {
                virt: AddressRange::new(virt, HUGE_PAGE_SIZE),
                bus,
            });
        }

        Ok(table)
    }

    pub fn records(&self) -> &[HugePageRecord] {
        &self.records
    }

    /// Bus address of `va`, found by scanning the pages in order.
    pub fn resolve_bus(&self, va: VirtualAddress) -> Option<BusAddress> {
        self.records.iter().find_map(|r| r.to_bus(va))
    }

    pub fn resolve_virt(&self, bus: BusAddress) -> Option<VirtualAddress> {
        self.records.iter().find_map(|r| r.to_virt(bus))
    }

    /// The page holding all of `[va, va + len)`, if any.
    pub fn page_of_span(&self, va: VirtualAddress, len: u64) -> Option<&HugePageRecord> {
        self.records.iter().find(|r| r.virt.contains_span(va, len))
    }
}

impl Drop for HugePageTable {
    fn drop(&mut self) {
        let Some(mapper) = &self.mapper else {
            return;
        };
        for record in &self.records {
            if let Err(err) = mapper.unmap(self.device, record.bus, HUGE_PAGE_SIZE) {
                error!("cannot unmap {:?} from device {}: {err}", record.bus, self.device);
                panic!("DMA bus unmapping failed: {err}");
            }
        }
    }
}

#[cold]
fn fatal_bus_map(phys: PhysicalAddress, err: &BusMapError) -> ! {
    error!("cannot bus-map huge page {phys:?}: {err}");
    panic!("DMA bus mapping failed: {err}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus_map::FnBusMapper;
    use crate::pagemap::IdentityResolver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE: u64 = 0x7F00_0000_0000;

    #[test]
    fn identity_table_resolves_both_ways() {
        let table = HugePageTable::build(
            VirtualAddress::new(BASE),
            3,
            &IdentityResolver,
            None,
            DmaDevice::default(),
        )
        .unwrap();
        assert_eq!(table.records().len(), 3);

        let va = VirtualAddress::new(BASE + HUGE_PAGE_SIZE + 0x40);
        let bus = table.resolve_bus(va).unwrap();
        assert_eq!(bus.as_u64(), va.as_u64());
        assert_eq!(table.resolve_virt(bus), Some(va));

        assert_eq!(table.resolve_bus(VirtualAddress::new(BASE + 3 * HUGE_PAGE_SIZE)), None);
        assert_eq!(table.resolve_virt(BusAddress::new(BASE - 1)), None);
    }

    #[test]
    fn spans_may_not_cross_pages() {
        let table = HugePageTable::build(
            VirtualAddress::new(BASE),
            2,
            &IdentityResolver,
            None,
            DmaDevice::default(),
        )
        .unwrap();
        let last = VirtualAddress::new(BASE + HUGE_PAGE_SIZE - 0x100);
        assert!(table.page_of_span(last, 0x100).is_some());
        assert!(table.page_of_span(last, 0x101).is_none());
    }

    #[test]
    fn mapped_pages_are_unmapped_on_drop() {
        let unmapped = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&unmapped);
        let mapper: Arc<dyn BusMapper> = Arc::new(FnBusMapper::new(
            |_, pa: PhysicalAddress, _| Ok(BusAddress::new(pa.as_u64() + 0x1000_0000)),
            move |_, _, len| {
                assert_eq!(len, HUGE_PAGE_SIZE);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        ));

        let table = HugePageTable::build(
            VirtualAddress::new(BASE),
            4,
            &IdentityResolver,
            Some(mapper),
            DmaDevice::new(0, 1),
        )
        .unwrap();
        assert_eq!(table.records()[2].bus(), BusAddress::new(BASE + 2 * HUGE_PAGE_SIZE + 0x1000_0000));

        drop(table);
        assert_eq!(unmapped.load(Ordering::SeqCst), 4);
    }
}
