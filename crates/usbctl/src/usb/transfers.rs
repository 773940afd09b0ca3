//! Control requests issued on an open session
//!
//! Covers the vendor status probe and string descriptor reads. Both are
//! synchronous and block until the transport returns or times out.

use crate::usb::descriptor::DeviceDescriptor;
use crate::usb::host::UsbSession;
use rusb::{Direction, Recipient, RequestType};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for the status control transfer (5 seconds)
pub const STATUS_TIMEOUT: Duration = Duration::from_millis(5000);

/// Standard `GET_STATUS` request code
pub const GET_STATUS: u8 = 0x00;

/// `bmRequestType` of the status probe: host-to-device, vendor, device
pub fn status_request_type() -> u8 {
    rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device)
}

/// Send the vendor `GET_STATUS` probe
///
/// Returns the number of bytes the transport reports as written.
pub fn send_status_probe(session: &dyn UsbSession) -> rusb::Result<usize> {
    let request_type = status_request_type();
    debug!(
        "Control transfer: request_type={:#x}, request={:#x}, timeout={}ms",
        request_type,
        GET_STATUS,
        STATUS_TIMEOUT.as_millis()
    );

    match session.write_control(request_type, GET_STATUS, 0, 0, &[], STATUS_TIMEOUT) {
        Ok(len) => {
            debug!("Control transfer succeeded: {} bytes", len);
            Ok(len)
        }
        Err(e) => {
            warn!("Control transfer failed: {}", e);
            Err(e)
        }
    }
}

/// Human-readable strings of a device
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStrings {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// Read manufacturer, product and serial number strings
///
/// Unreadable or absent strings are left as `None`.
pub fn read_device_strings(
    session: &dyn UsbSession,
    descriptor: &DeviceDescriptor,
) -> DeviceStrings {
    let read = |index: Option<u8>| {
        index
            .filter(|&idx| idx != 0)
            .and_then(|idx| session.read_string_ascii(idx).ok())
            .filter(|s| !s.is_empty())
    };

    DeviceStrings {
        manufacturer: read(descriptor.manufacturer_index),
        product: read(descriptor.product_index),
        serial_number: read(descriptor.serial_number_index),
    }
}
