//! Device snapshots
//!
//! A [`DeviceSnapshot`] is an owned copy of a discovered device, detached
//! from the [`Topology`](crate::usb::enumerator::Topology) it came from. A
//! reset makes the device re-enumerate and the next refresh replaces the
//! topology, but snapshots taken earlier keep their values.
//!
//! Snapshots are collected into a [`SnapshotList`] by head insertion, so a
//! list built from a match set iterates in reverse discovery order. Callers
//! rely on that order.

use crate::error::UsbctlError;
use crate::usb::descriptor::{
    AltSetting, ConfigDescriptor, DeviceDescriptor, DeviceLocation, InterfaceDescriptor,
};
use crate::usb::host::DiscoveredDevice;
use std::collections::VecDeque;
use std::collections::vec_deque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub location: DeviceLocation,
    pub descriptor: DeviceDescriptor,
}

impl DeviceSnapshot {
    /// Deep-copy a discovered device
    ///
    /// Every level of the configuration tree is allocated fallibly; any
    /// failed allocation gives `OutOfMemory`.
    pub fn capture(device: &DiscoveredDevice) -> Result<Self, UsbctlError> {
        let source = &device.descriptor;

        let mut configurations = allocate(source.configurations.len())?;
        for config in &source.configurations {
            configurations.push(copy_config(config)?);
        }

        Ok(Self {
            location: device.location,
            descriptor: DeviceDescriptor {
                usb_version: source.usb_version,
                class_code: source.class_code,
                sub_class_code: source.sub_class_code,
                protocol_code: source.protocol_code,
                max_packet_size: source.max_packet_size,
                vendor_id: source.vendor_id,
                product_id: source.product_id,
                release: source.release,
                manufacturer_index: source.manufacturer_index,
                product_index: source.product_index,
                serial_number_index: source.serial_number_index,
                num_configurations: source.num_configurations,
                configurations,
            },
        })
    }

    pub fn vendor_id(&self) -> u16 {
        self.descriptor.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.descriptor.product_id
    }
}

/// Empty vector with room for `len` elements
fn allocate<T>(len: usize) -> Result<Vec<T>, UsbctlError> {
    let mut items = Vec::new();
    items
        .try_reserve_exact(len)
        .map_err(|_| UsbctlError::OutOfMemory)?;
    Ok(items)
}

fn copy_config(config: &ConfigDescriptor) -> Result<ConfigDescriptor, UsbctlError> {
    let mut interfaces = allocate(config.interfaces.len())?;
    for interface in &config.interfaces {
        let mut alt_settings = allocate(interface.alt_settings.len())?;
        for alt in &interface.alt_settings {
            alt_settings.push(copy_alt_setting(alt)?);
        }
        interfaces.push(InterfaceDescriptor {
            number: interface.number,
            alt_settings,
        });
    }

    Ok(ConfigDescriptor {
        number: config.number,
        attributes: config.attributes,
        max_power_ma: config.max_power_ma,
        description_index: config.description_index,
        interfaces,
    })
}

fn copy_alt_setting(alt: &AltSetting) -> Result<AltSetting, UsbctlError> {
    let mut endpoints = allocate(alt.endpoints.len())?;
    endpoints.extend_from_slice(&alt.endpoints);

    Ok(AltSetting {
        interface_number: alt.interface_number,
        setting_number: alt.setting_number,
        class_code: alt.class_code,
        sub_class_code: alt.sub_class_code,
        protocol_code: alt.protocol_code,
        description_index: alt.description_index,
        endpoints,
    })
}

/// Ordered sequence of snapshots, owned by one command run
#[derive(Debug, Default)]
pub struct SnapshotList {
    items: VecDeque<DeviceSnapshot>,
}

impl SnapshotList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every device of `devices` into a new list
    ///
    /// Each capture is inserted at the head, so the first device yielded
    /// ends up last.
    pub fn capture_all<'a, I>(devices: I) -> Result<Self, UsbctlError>
    where
        I: IntoIterator<Item = &'a DiscoveredDevice>,
    {
        let mut list = Self::new();
        for device in devices {
            list.prepend(DeviceSnapshot::capture(device)?)?;
        }
        Ok(list)
    }

    /// Insert at the head in O(1)
    pub fn prepend(&mut self, snapshot: DeviceSnapshot) -> Result<(), UsbctlError> {
        self.items
            .try_reserve(1)
            .map_err(|_| UsbctlError::OutOfMemory)?;
        self.items.push_front(snapshot);
        Ok(())
    }

    /// Drop every snapshot
    pub fn release_all(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceSnapshot> {
        self.items.get(index)
    }

    /// The element before `index`, i.e. the one inserted right after it
    pub fn prior(&self, index: usize) -> Option<&DeviceSnapshot> {
        index.checked_sub(1).and_then(|i| self.items.get(i))
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, DeviceSnapshot> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a SnapshotList {
    type Item = &'a DeviceSnapshot;
    type IntoIter = vec_deque::Iter<'a, DeviceSnapshot>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(bus: u8, address: u8, vid: u16, pid: u16) -> DiscoveredDevice {
        DiscoveredDevice {
            location: DeviceLocation::new(bus, address),
            descriptor: DeviceDescriptor {
                vendor_id: vid,
                product_id: pid,
                num_configurations: 1,
                configurations: vec![ConfigDescriptor {
                    number: 1,
                    ..Default::default()
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_prepend_order() {
        let a = DeviceSnapshot::capture(&device(1, 2, 0x1001, 1)).unwrap();
        let b = DeviceSnapshot::capture(&device(1, 3, 0x1001, 2)).unwrap();

        let mut list = SnapshotList::new();
        list.prepend(a.clone()).unwrap();
        list.prepend(b.clone()).unwrap();

        let order: Vec<_> = list.iter().cloned().collect();
        assert_eq!(order, vec![b, a]);
    }

    #[test]
    fn test_prior_link() {
        let devices = [device(1, 2, 1, 1), device(1, 3, 1, 2), device(1, 4, 1, 3)];
        let list = SnapshotList::capture_all(devices.iter()).unwrap();

        assert_eq!(list.len(), 3);
        assert!(list.prior(0).is_none());
        assert_eq!(list.prior(1).unwrap().location, DeviceLocation::new(1, 4));
        assert_eq!(list.prior(2).unwrap().location, DeviceLocation::new(1, 3));
    }

    #[test]
    fn test_capture_copies_everything() {
        let live = device(2, 7, 0xE6E6, 0x0201);
        let snap = DeviceSnapshot::capture(&live).unwrap();
        assert_eq!(snap.location, live.location);
        assert_eq!(snap.descriptor, live.descriptor);
    }

    #[test]
    fn test_capture_copies_nested_tree() {
        let live = crate::test_utils::create_mock_device(1, 5, 0xE6E6, 0x0201);
        let snap = DeviceSnapshot::capture(&live).unwrap();
        assert_eq!(snap.descriptor, live.descriptor);
        let alt = &snap.descriptor.configurations[0].interfaces[0].alt_settings[0];
        assert_eq!(alt.endpoints.len(), 2);
    }

    #[test]
    fn test_failed_allocation_is_out_of_memory() {
        let err = allocate::<ConfigDescriptor>(usize::MAX).unwrap_err();
        assert!(matches!(err, UsbctlError::OutOfMemory));
        assert!(err.is_fatal());

        assert!(allocate::<AltSetting>(0).unwrap().is_empty());
    }

    #[test]
    fn test_release_all() {
        let mut empty = SnapshotList::new();
        empty.release_all();
        assert!(empty.is_empty());

        let devices = [device(1, 2, 1, 1), device(1, 3, 1, 2)];
        let mut list = SnapshotList::capture_all(devices.iter()).unwrap();
        assert_eq!(list.len(), 2);
        list.release_all();
        assert!(list.is_empty());
        assert!(list.get(0).is_none());
    }
}
