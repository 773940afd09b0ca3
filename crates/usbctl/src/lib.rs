//! usbctl
//!
//! Finds attached USB devices by vendor/product id and runs one exclusive
//! operation on each of them: print descriptors, send a status probe, or
//! reset the device. Devices are handled one at a time; a failure on one
//! device is recorded and the batch continues.
//!
//! The pieces, leaves first:
//! - [`usb::enumerator`]: bus topology and id filtering
//! - [`usb::snapshot`]: owned copies of the matched devices
//! - [`usb::lifecycle`]: open/detach/claim and release/reattach/close
//! - [`executor`]: the per-device batch loop
//! - [`dispatcher`]: command name to batch run

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod printer;
pub mod test_utils;
pub mod usb;

pub use dispatcher::{CommandRequest, Dispatcher};
pub use error::{ErrorKind, Result, UsbctlError};
pub use executor::{BatchExecutor, BatchReport, Operation, OperationResult, OperationStatus};
