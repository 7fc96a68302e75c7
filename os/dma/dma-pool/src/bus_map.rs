//! Physical → bus address mapping hooks.
//!
//! Without a mapper, a device is programmed with physical addresses. Drivers
//! sitting behind an IOMMU install a [`BusMapper`] on the
//! [`DmaContext`](crate::DmaContext); every pool created afterwards maps each
//! of its huge pages through it once and unmaps them on destruction.

use crate::error::BusMapError;
use dma_memory_addresses::{BusAddress, PhysicalAddress};
use std::fmt;

/// Identifies the device a pool is mapped for.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct DmaDevice {
    pub device: u32,
    pub subdevice: u32,
}

impl DmaDevice {
    #[must_use]
    pub const fn new(device: u32, subdevice: u32) -> Self {
        Self { device, subdevice }
    }
}

impl fmt::Display for DmaDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.subdevice)
    }
}

/// Direction of a DMA transfer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DmaDirection {
    /// Memory is read by the device.
    ToDevice,
    /// Memory is written by the device.
    FromDevice,
    Bidirectional,
}

/// Translates physical ranges into device-visible bus ranges.
///
/// Called once per huge page: `map` while a pool is created, `unmap` while it
/// is destroyed. Failures in either are treated as fatal by the pool.
pub trait BusMapper: Send + Sync {
    /// # Errors
    /// Implementation specific.
    fn map(
        &self,
        device: DmaDevice,
        phys: PhysicalAddress,
        len: u64,
    ) -> Result<BusAddress, BusMapError>;

    /// # Errors
    /// Implementation specific.
    fn unmap(&self, device: DmaDevice, bus: BusAddress, len: u64) -> Result<(), BusMapError>;
}

/// A [`BusMapper`] built from a pair of closures.
pub struct FnBusMapper<M, U> {
    map: M,
    unmap: U,
}

impl<M, U> FnBusMapper<M, U>
where
    M: Fn(DmaDevice, PhysicalAddress, u64) -> Result<BusAddress, BusMapError> + Send + Sync,
    U: Fn(DmaDevice, BusAddress, u64) -> Result<(), BusMapError> + Send + Sync,
{
    pub const fn new(map: M, unmap: U) -> Self {
        Self { map, unmap }
    }
}

impl<M, U> BusMapper for FnBusMapper<M, U>
where
    M: Fn(DmaDevice, PhysicalAddress, u64) -> Result<BusAddress, BusMapError> + Send + Sync,
    U: Fn(DmaDevice, BusAddress, u64) -> Result<(), BusMapError> + Send + Sync,
{
    fn map(
        &self,
        device: DmaDevice,
        phys: PhysicalAddress,
        len: u64,
    ) -> Result<BusAddress, BusMapError> {
        (self.map)(device, phys, len)
    }

    fn unmap(&self, device: DmaDevice, bus: BusAddress, len: u64) -> Result<(), BusMapError> {
        (self.unmap)(device, bus, len)
    }
}

impl<M, U> fmt::Debug for FnBusMapper<M, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBusMapper")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_forwarded() {
        let mapper = FnBusMapper::new(
            |_, pa: PhysicalAddress, _| Ok(BusAddress::new(pa.as_u64() | (1 << 40))),
            |dev, bus, _| {
                Err(BusMapError::Unmap {
                    device: dev,
                    bus,
                    status: -22,
                })
            },
        );
        let dev = DmaDevice::new(1, 2);
        assert_eq!(
            mapper.map(dev, PhysicalAddress::new(0x2000), 0x1000),
            Ok(BusAddress::new(0x100_0000_2000))
        );
        assert!(mapper.unmap(dev, BusAddress::new(1), 0x1000).is_err());
    }

    #[test]
    fn device_display() {
        assert_eq!(DmaDevice::new(3, 1).to_string(), "3.1");
    }
}
