//! Test utilities for usbctl
//!
//! In-memory [`UsbHost`]/[`UsbSession`] doubles. Every session call is
//! recorded in a log shared with the host, so a test can check open/close
//! parity, the exact call sequence on each device, and whether anything was
//! sent to a session after it issued a bus reset.
//!
//! # Example
//!
//! ```
//! use usbctl::test_utils::{FailPoint, FakeHost, create_mock_device};
//! use usbctl::usb::DeviceLocation;
//!
//! let host = FakeHost::new();
//! host.add_device(create_mock_device(1, 2, 0x1234, 0x5678));
//! host.fail_at(DeviceLocation::new(1, 2), FailPoint::Claim);
//! assert_eq!(host.open_count(), 0);
//! ```

use crate::usb::descriptor::{
    AltSetting, BcdVersion, ConfigDescriptor, DeviceDescriptor, DeviceLocation,
    EndpointDescriptor, InterfaceDescriptor,
};
use crate::usb::host::{DiscoveredDevice, UsbHost, UsbSession};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

/// Step at which a fake device can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Open,
    DriverQuery,
    Detach,
    Claim,
    Release,
    Reattach,
    Transfer,
    Reset,
    Strings,
}

/// One recorded call on a fake session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    Open,
    KernelDriverActive(u8),
    DetachKernelDriver(u8),
    AttachKernelDriver(u8),
    ClaimInterface(u8),
    ReleaseInterface(u8),
    WriteControl {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        timeout_ms: u128,
    },
    Reset,
    ReadString(u8),
    Close,
}

#[derive(Debug, Default)]
struct HostState {
    devices: Vec<DiscoveredDevice>,
    failures: HashMap<DeviceLocation, HashSet<FailPoint>>,
    bound_drivers: HashSet<DeviceLocation>,
    strings: HashMap<(DeviceLocation, u8), String>,
    calls: Vec<(DeviceLocation, SessionCall)>,
    post_reset_calls: Vec<(DeviceLocation, SessionCall)>,
    fail_discovery: bool,
    discover_count: usize,
    opens: usize,
    closes: usize,
}

impl HostState {
    fn should_fail(&self, location: DeviceLocation, point: FailPoint) -> bool {
        self.failures
            .get(&location)
            .is_some_and(|points| points.contains(&point))
    }
}

/// Fake host whose bus contents the test controls
#[derive(Debug, Default, Clone)]
pub struct FakeHost {
    state: Rc<RefCell<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with the given devices, in discovery order
    pub fn with_devices(devices: impl IntoIterator<Item = DiscoveredDevice>) -> Self {
        let host = Self::new();
        for device in devices {
            host.add_device(device);
        }
        host
    }

    pub fn add_device(&self, device: DiscoveredDevice) {
        self.state.borrow_mut().devices.push(device);
    }

    /// Replace the bus contents, as after a re-enumeration
    pub fn replace_devices(&self, devices: Vec<DiscoveredDevice>) {
        self.state.borrow_mut().devices = devices;
    }

    pub fn fail_at(&self, location: DeviceLocation, point: FailPoint) {
        self.state
            .borrow_mut()
            .failures
            .entry(location)
            .or_default()
            .insert(point);
    }

    pub fn fail_discovery(&self) {
        self.state.borrow_mut().fail_discovery = true;
    }

    /// Pretend a kernel driver is bound to the device's interfaces
    pub fn bind_kernel_driver(&self, location: DeviceLocation) {
        self.state.borrow_mut().bound_drivers.insert(location);
    }

    pub fn kernel_driver_bound(&self, location: DeviceLocation) -> bool {
        self.state.borrow().bound_drivers.contains(&location)
    }

    pub fn set_string(&self, location: DeviceLocation, index: u8, value: &str) {
        self.state
            .borrow_mut()
            .strings
            .insert((location, index), value.to_string());
    }

    /// Every call, in order, across all devices
    pub fn calls(&self) -> Vec<(DeviceLocation, SessionCall)> {
        self.state.borrow().calls.clone()
    }

    pub fn calls_for(&self, location: DeviceLocation) -> Vec<SessionCall> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|(loc, _)| *loc == location)
            .map(|(_, call)| call.clone())
            .collect()
    }

    /// Calls made on a session after it issued a reset (close excluded)
    pub fn post_reset_calls(&self) -> Vec<(DeviceLocation, SessionCall)> {
        self.state.borrow().post_reset_calls.clone()
    }

    pub fn discover_count(&self) -> usize {
        self.state.borrow().discover_count
    }

    pub fn open_count(&self) -> usize {
        self.state.borrow().opens
    }

    pub fn close_count(&self) -> usize {
        self.state.borrow().closes
    }

    /// Sessions opened but not yet closed
    pub fn open_sessions(&self) -> usize {
        let state = self.state.borrow();
        state.opens - state.closes
    }
}

impl UsbHost for FakeHost {
    type Session = FakeSession;

    fn discover(&self) -> rusb::Result<Vec<DiscoveredDevice>> {
        let mut state = self.state.borrow_mut();
        state.discover_count += 1;
        if state.fail_discovery {
            return Err(rusb::Error::Other);
        }
        Ok(state.devices.clone())
    }

    fn open(&self, location: DeviceLocation) -> rusb::Result<FakeSession> {
        let mut state = self.state.borrow_mut();
        state.calls.push((location, SessionCall::Open));

        if state.should_fail(location, FailPoint::Open) {
            return Err(rusb::Error::Access);
        }
        if !state.devices.iter().any(|d| d.location == location) {
            return Err(rusb::Error::NoDevice);
        }

        state.opens += 1;
        Ok(FakeSession {
            location,
            state: Rc::clone(&self.state),
            reset_done: Cell::new(false),
        })
    }
}

/// Session on a [`FakeHost`] device; closes on drop
#[derive(Debug)]
pub struct FakeSession {
    location: DeviceLocation,
    state: Rc<RefCell<HostState>>,
    reset_done: Cell<bool>,
}

impl FakeSession {
    /// Record `call` and report whether `point` is set to fail
    fn record(&self, call: SessionCall, point: FailPoint) -> bool {
        let mut state = self.state.borrow_mut();
        if self.reset_done.get() {
            state.post_reset_calls.push((self.location, call.clone()));
        }
        state.calls.push((self.location, call));
        state.should_fail(self.location, point)
    }
}

impl UsbSession for FakeSession {
    fn kernel_driver_active(&self, interface: u8) -> rusb::Result<bool> {
        if self.record(SessionCall::KernelDriverActive(interface), FailPoint::DriverQuery) {
            return Err(rusb::Error::Other);
        }
        Ok(self.state.borrow().bound_drivers.contains(&self.location))
    }

    fn detach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        if self.record(SessionCall::DetachKernelDriver(interface), FailPoint::Detach) {
            return Err(rusb::Error::Busy);
        }
        self.state.borrow_mut().bound_drivers.remove(&self.location);
        Ok(())
    }

    fn attach_kernel_driver(&mut self, interface: u8) -> rusb::Result<()> {
        if self.record(SessionCall::AttachKernelDriver(interface), FailPoint::Reattach) {
            return Err(rusb::Error::NotFound);
        }
        self.state.borrow_mut().bound_drivers.insert(self.location);
        Ok(())
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        if self.record(SessionCall::ClaimInterface(interface), FailPoint::Claim) {
            return Err(rusb::Error::Busy);
        }
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        if self.record(SessionCall::ReleaseInterface(interface), FailPoint::Release) {
            return Err(rusb::Error::NotFound);
        }
        Ok(())
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        let call = SessionCall::WriteControl {
            request_type,
            request,
            value,
            index,
            timeout_ms: timeout.as_millis(),
        };
        if self.record(call, FailPoint::Transfer) {
            return Err(rusb::Error::Pipe);
        }
        Ok(data.len())
    }

    fn reset(&mut self) -> rusb::Result<()> {
        let fail = self.record(SessionCall::Reset, FailPoint::Reset);
        self.reset_done.set(true);
        if fail {
            return Err(rusb::Error::NotFound);
        }
        Ok(())
    }

    fn read_string_ascii(&self, index: u8) -> rusb::Result<String> {
        if self.record(SessionCall::ReadString(index), FailPoint::Strings) {
            return Err(rusb::Error::Io);
        }
        self.state
            .borrow()
            .strings
            .get(&(self.location, index))
            .cloned()
            .ok_or(rusb::Error::InvalidParam)
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.calls.push((self.location, SessionCall::Close));
        state.closes += 1;
    }
}

/// Create a mock device with one configuration, one interface (number 0)
/// and a bulk endpoint pair
///
/// String indices are 1 (manufacturer), 2 (product) and 3 (serial).
pub fn create_mock_device(
    bus: u8,
    address: u8,
    vendor_id: u16,
    product_id: u16,
) -> DiscoveredDevice {
    create_mock_device_with_interface(bus, address, vendor_id, product_id, 0)
}

/// Like [`create_mock_device`], with the primary interface numbered
/// `interface`
pub fn create_mock_device_with_interface(
    bus: u8,
    address: u8,
    vendor_id: u16,
    product_id: u16,
    interface: u8,
) -> DiscoveredDevice {
    let endpoints = vec![
        EndpointDescriptor {
            address: 0x81,
            attributes: 0x02,
            max_packet_size: 512,
            interval: 0,
            refresh: 0,
            synch_address: 0,
        },
        EndpointDescriptor {
            address: 0x02,
            attributes: 0x02,
            max_packet_size: 512,
            interval: 0,
            refresh: 0,
            synch_address: 0,
        },
    ];

    DiscoveredDevice {
        location: DeviceLocation::new(bus, address),
        descriptor: DeviceDescriptor {
            usb_version: BcdVersion {
                major: 2,
                minor: 0,
                sub_minor: 0,
            },
            class_code: 0xFF,
            max_packet_size: 64,
            vendor_id,
            product_id,
            release: BcdVersion {
                major: 1,
                minor: 0,
                sub_minor: 0,
            },
            manufacturer_index: Some(1),
            product_index: Some(2),
            serial_number_index: Some(3),
            num_configurations: 1,
            configurations: vec![ConfigDescriptor {
                number: 1,
                attributes: 0x80,
                max_power_ma: 100,
                description_index: None,
                interfaces: vec![InterfaceDescriptor {
                    number: interface,
                    alt_settings: vec![AltSetting {
                        interface_number: interface,
                        setting_number: 0,
                        class_code: 0xFF,
                        sub_class_code: 0,
                        protocol_code: 0,
                        description_index: None,
                        endpoints,
                    }],
                }],
            }],
            ..Default::default()
        },
    }
}

/// Create a mock device that reports no configuration descriptor
pub fn create_unconfigured_device(
    bus: u8,
    address: u8,
    vendor_id: u16,
    product_id: u16,
) -> DiscoveredDevice {
    let mut device = create_mock_device(bus, address, vendor_id, product_id);
    device.descriptor.configurations.clear();
    device
}
