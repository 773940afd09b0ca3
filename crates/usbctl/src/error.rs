//! Error types for device discovery, the handle lifecycle and batch runs
//!
//! Errors fall into three groups:
//! - fatal, raised before any device is touched (`UnknownCommand`,
//!   `OutOfMemory`, `Host`, `InvalidLocation`, and `NotFound` for an
//!   explicitly requested location)
//! - per-device, caught by the batch executor and recorded as that device's
//!   result (`Open`, `Claim`, `NoConfiguration`, `Transfer`)
//! - advisory, only ever logged (`Detach`, `Reattach`)

use crate::usb::descriptor::DeviceLocation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsbctlError {
    #[error("Failed to open device {location}: {source}")]
    Open {
        location: DeviceLocation,
        #[source]
        source: rusb::Error,
    },

    #[error("Failed to claim interface {interface} on device {location}: {source}")]
    Claim {
        location: DeviceLocation,
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Could not detach kernel driver from interface {interface}: {source}")]
    Detach {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Could not reattach kernel driver to interface {interface}: {source}")]
    Reattach {
        interface: u8,
        #[source]
        source: rusb::Error,
    },

    #[error("Transfer failed on device {location}: {message}")]
    Transfer {
        location: DeviceLocation,
        message: String,
    },

    #[error("No device at {0}")]
    NotFound(String),

    #[error("Device {0} has no configuration descriptor")]
    NoConfiguration(DeviceLocation),

    #[error("Out of memory while copying device descriptors")]
    OutOfMemory,

    #[error("Unknown command '{0}', expected one of: display, show, status, reset")]
    UnknownCommand(String),

    #[error("Invalid device location '{0}', expected BUS/DEVICE (e.g. 001/004)")]
    InvalidLocation(String),

    #[error("USB host error: {0}")]
    Host(#[source] rusb::Error),
}

/// Discriminant of [`UsbctlError`], kept in per-device results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Open,
    Claim,
    Detach,
    Reattach,
    Transfer,
    NotFound,
    NoConfiguration,
    OutOfMemory,
    UnknownCommand,
    InvalidLocation,
    Host,
}

impl UsbctlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UsbctlError::Open { .. } => ErrorKind::Open,
            UsbctlError::Claim { .. } => ErrorKind::Claim,
            UsbctlError::Detach { .. } => ErrorKind::Detach,
            UsbctlError::Reattach { .. } => ErrorKind::Reattach,
            UsbctlError::Transfer { .. } => ErrorKind::Transfer,
            UsbctlError::NotFound(_) => ErrorKind::NotFound,
            UsbctlError::NoConfiguration(_) => ErrorKind::NoConfiguration,
            UsbctlError::OutOfMemory => ErrorKind::OutOfMemory,
            UsbctlError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            UsbctlError::InvalidLocation(_) => ErrorKind::InvalidLocation,
            UsbctlError::Host(_) => ErrorKind::Host,
        }
    }

    /// Errors that stop the command before the batch starts
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::OutOfMemory
                | ErrorKind::UnknownCommand
                | ErrorKind::InvalidLocation
                | ErrorKind::Host
                | ErrorKind::NotFound
        )
    }

    /// Errors that are reported but never fail a device
    pub fn is_advisory(&self) -> bool {
        matches!(self.kind(), ErrorKind::Detach | ErrorKind::Reattach)
    }
}

/// Describe a rusb error the way the transport reports it
///
/// Used for transfer failures, where the error ends up as text in the
/// device's result line.
pub fn describe_rusb_error(err: rusb::Error) -> String {
    match err {
        rusb::Error::Timeout => "timed out".to_string(),
        rusb::Error::Pipe => "endpoint stalled (pipe error)".to_string(),
        rusb::Error::NoDevice => "device disconnected".to_string(),
        rusb::Error::Busy => "resource busy".to_string(),
        rusb::Error::Access => "access denied".to_string(),
        rusb::Error::Io => "input/output error".to_string(),
        other => other.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, UsbctlError>;
