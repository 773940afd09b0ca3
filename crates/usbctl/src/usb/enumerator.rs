//! Device enumeration
//!
//! [`Topology`] is the in-process view of the host's buses. It starts empty
//! and is filled by an explicit [`Topology::refresh`], normally once per
//! command. Matching and lookup only read from the last refresh.

use crate::error::UsbctlError;
use crate::usb::descriptor::DeviceLocation;
use crate::usb::host::{DiscoveredDevice, UsbHost};
use std::fmt;
use tracing::{debug, info};

/// Vendor/product identification filter
///
/// A zero field is a wildcard: `(0, 0)` matches everything, `(V, 0)` matches
/// every product of vendor `V`, `(V, P)` matches that pair only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceFilter {
    pub const ANY: DeviceFilter = DeviceFilter {
        vendor_id: 0,
        product_id: 0,
    };

    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    pub fn is_any(&self) -> bool {
        self.vendor_id == 0 && self.product_id == 0
    }

    pub fn matches(&self, vendor_id: u16, product_id: u16) -> bool {
        let vid_match = self.vendor_id == 0 || self.vendor_id == vendor_id;
        let pid_match = self.product_id == 0 || self.product_id == product_id;
        vid_match && pid_match
    }
}

impl fmt::Display for DeviceFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}/0x{:04X}", self.vendor_id, self.product_id)
    }
}

/// Devices found on one bus, in discovery order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bus {
    pub number: u8,
    pub devices: Vec<DiscoveredDevice>,
}

impl Bus {
    /// usbfs directory name of this bus
    pub fn dirname(&self) -> String {
        format!("{:03}", self.number)
    }
}

/// Bus/device topology as of the last refresh
#[derive(Debug, Default)]
pub struct Topology {
    buses: Vec<Bus>,
    refreshed: bool,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read the topology from the host
    ///
    /// Replaces the previous view entirely. Buses keep the order in which
    /// their first device was discovered; devices keep discovery order
    /// within their bus.
    pub fn refresh<H: UsbHost>(&mut self, host: &H) -> Result<usize, UsbctlError> {
        let discovered = host.discover().map_err(UsbctlError::Host)?;
        let count = discovered.len();

        let mut buses: Vec<Bus> = Vec::new();
        for device in discovered {
            let bus_number = device.location.bus;
            match buses.iter_mut().find(|b| b.number == bus_number) {
                Some(bus) => bus.devices.push(device),
                None => buses.push(Bus {
                    number: bus_number,
                    devices: vec![device],
                }),
            }
        }

        self.buses = buses;
        self.refreshed = true;

        debug!(
            "Topology refreshed: {} devices on {} buses",
            count,
            self.buses.len()
        );
        Ok(count)
    }

    pub fn is_refreshed(&self) -> bool {
        self.refreshed
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    /// Every known device, bus by bus
    pub fn devices(&self) -> impl Iterator<Item = &DiscoveredDevice> + Clone {
        self.buses.iter().flat_map(|bus| bus.devices.iter())
    }

    /// Devices accepted by `filter`, in discovery order
    ///
    /// The returned iterator is cheap to clone, so a caller can walk the
    /// match set more than once.
    pub fn matching(
        &self,
        filter: DeviceFilter,
    ) -> impl Iterator<Item = &DiscoveredDevice> + Clone {
        info!("Searching for {}", filter);
        self.devices().filter(move |device| {
            filter.matches(device.descriptor.vendor_id, device.descriptor.product_id)
        })
    }

    /// Find the device at `location`
    pub fn locate(&self, location: DeviceLocation) -> Result<&DiscoveredDevice, UsbctlError> {
        self.devices()
            .find(|device| device.location == location)
            .ok_or_else(|| UsbctlError::NotFound(location.to_string()))
    }

    /// Like [`Topology::locate`], starting from a location string
    pub fn locate_path(&self, path: &str) -> Result<&DiscoveredDevice, UsbctlError> {
        let location: DeviceLocation = path.parse()?;
        self.locate(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_logic() {
        let any = DeviceFilter::ANY;
        assert!(any.is_any());
        assert!(any.matches(0x1234, 0x5678));
        assert!(any.matches(0x0000, 0x0000));

        let vendor = DeviceFilter::new(0xABCD, 0);
        assert!(vendor.matches(0xABCD, 0x1111));
        assert!(vendor.matches(0xABCD, 0x9999));
        assert!(!vendor.matches(0x1234, 0x1111));

        let exact = DeviceFilter::new(0x1234, 0x5678);
        assert!(exact.matches(0x1234, 0x5678));
        assert!(!exact.matches(0x1234, 0x9999));
        assert!(!exact.matches(0x9999, 0x5678));
    }

    #[test]
    fn test_product_only_filter() {
        let product = DeviceFilter::new(0, 0x0201);
        assert!(product.matches(0xE6E6, 0x0201));
        assert!(product.matches(0x1234, 0x0201));
        assert!(!product.matches(0xE6E6, 0x0202));
    }

    #[test]
    fn test_filter_display() {
        assert_eq!(DeviceFilter::new(0xE6E6, 0x201).to_string(), "0xE6E6/0x0201");
    }

    #[test]
    fn test_empty_topology() {
        let topology = Topology::new();
        assert!(!topology.is_refreshed());
        assert_eq!(topology.devices().count(), 0);
        assert!(matches!(
            topology.locate(DeviceLocation::new(1, 1)),
            Err(UsbctlError::NotFound(_))
        ));
    }
}
