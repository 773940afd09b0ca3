//! Owned USB descriptor types
//!
//! Every value here is plain owned data, read once from the host at
//! discovery time. Nothing refers back into the host library, so a copy
//! stays valid after the device resets and re-enumerates.

use crate::error::UsbctlError;
use std::fmt;
use std::str::FromStr;

/// Physical location of a device: usbfs bus directory and device file
///
/// Rendered as `BBB/DDD`, the same shape as `/dev/bus/usb/BBB/DDD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceLocation {
    pub bus: u8,
    pub address: u8,
}

impl DeviceLocation {
    pub fn new(bus: u8, address: u8) -> Self {
        Self { bus, address }
    }

    /// Bus directory name (`001`)
    pub fn bus_dir(&self) -> String {
        format!("{:03}", self.bus)
    }

    /// Device file name inside the bus directory (`004`)
    pub fn device_file(&self) -> String {
        format!("{:03}", self.address)
    }
}

impl fmt::Display for DeviceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}/{:03}", self.bus, self.address)
    }
}

impl FromStr for DeviceLocation {
    type Err = UsbctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UsbctlError::InvalidLocation(s.to_string());

        let trimmed = s
            .trim()
            .trim_start_matches("/dev/bus/usb/")
            .trim_start_matches("/proc/bus/usb/");

        let (bus, device) = trimmed.split_once('/').ok_or_else(invalid)?;
        if device.contains('/') {
            return Err(invalid());
        }

        let bus = bus.parse::<u8>().map_err(|_| invalid())?;
        let address = device.parse::<u8>().map_err(|_| invalid())?;

        Ok(Self { bus, address })
    }
}

/// Binary-coded decimal version (`bcdUSB`, `bcdDevice`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BcdVersion {
    pub major: u8,
    pub minor: u8,
    pub sub_minor: u8,
}

impl fmt::Display for BcdVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.major, self.minor, self.sub_minor)
    }
}

/// Standard device descriptor plus its configuration tree
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    pub usb_version: BcdVersion,
    pub class_code: u8,
    pub sub_class_code: u8,
    pub protocol_code: u8,
    pub max_packet_size: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Device release number (`bcdDevice`)
    pub release: BcdVersion,
    pub manufacturer_index: Option<u8>,
    pub product_index: Option<u8>,
    pub serial_number_index: Option<u8>,
    pub num_configurations: u8,
    /// Configurations that could be read; may be shorter than
    /// `num_configurations` when the host refused some of them.
    pub configurations: Vec<ConfigDescriptor>,
}

impl DeviceDescriptor {
    /// Interface number of alternate setting 0 of the first interface of
    /// the first configuration
    ///
    /// This is the one interface a device handle claims. `None` when the
    /// device exposes no configuration (or an empty one).
    pub fn primary_interface(&self) -> Option<u8> {
        self.configurations
            .first()?
            .interfaces
            .first()?
            .alt_settings
            .first()
            .map(|alt| alt.interface_number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigDescriptor {
    /// `bConfigurationValue`
    pub number: u8,
    /// `bmAttributes`
    pub attributes: u8,
    /// Maximum power draw in milliamps
    pub max_power_ma: u16,
    pub description_index: Option<u8>,
    pub interfaces: Vec<InterfaceDescriptor>,
}

impl ConfigDescriptor {
    pub fn num_interfaces(&self) -> usize {
        self.interfaces.len()
    }
}

/// One interface with all of its alternate settings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alt_settings: Vec<AltSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AltSetting {
    pub interface_number: u8,
    pub setting_number: u8,
    pub class_code: u8,
    pub sub_class_code: u8,
    pub protocol_code: u8,
    pub description_index: Option<u8>,
    pub endpoints: Vec<EndpointDescriptor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointDescriptor {
    /// `bEndpointAddress`, direction in bit 7
    pub address: u8,
    /// `bmAttributes`: transfer type, sync type and usage type bits
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
    pub refresh: u8,
    pub synch_address: u8,
}
