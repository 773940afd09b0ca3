//! Command dispatch
//!
//! Turns a [`CommandRequest`] into one batch run: parse the command,
//! refresh the topology, capture the selected devices and hand them to the
//! [`BatchExecutor`]. Errors returned from here are fatal; per-device
//! failures live inside the returned [`BatchReport`].

use crate::error::UsbctlError;
use crate::executor::{BatchExecutor, BatchReport, Operation};
use crate::usb::descriptor::DeviceLocation;
use crate::usb::driver::KernelDriverSupport;
use crate::usb::enumerator::{DeviceFilter, Topology};
use crate::usb::host::UsbHost;
use crate::usb::snapshot::SnapshotList;
use std::io::Write;
use tracing::{debug, info};

/// Structured request produced by the command line layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRequest {
    /// `display`/`show`, `status` or `reset`, any case
    pub command: String,
    pub verbosity: u8,
    /// `BUS/DEVICE`; selects exactly one device and bypasses the filter
    pub device_location: Option<String>,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
}

impl CommandRequest {
    pub fn operation(&self) -> Result<Operation, UsbctlError> {
        self.command.parse()
    }

    pub fn filter(&self) -> DeviceFilter {
        DeviceFilter::new(self.vendor_id.unwrap_or(0), self.product_id.unwrap_or(0))
    }

    pub fn location(&self) -> Result<Option<DeviceLocation>, UsbctlError> {
        self.device_location
            .as_deref()
            .map(str::parse::<DeviceLocation>)
            .transpose()
    }
}

pub struct Dispatcher<'a, H: UsbHost> {
    host: &'a H,
    drivers: &'a dyn KernelDriverSupport,
}

impl<'a, H: UsbHost> Dispatcher<'a, H> {
    pub fn new(host: &'a H, drivers: &'a dyn KernelDriverSupport) -> Self {
        Self { host, drivers }
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        topology: &mut Topology,
        out: &mut dyn Write,
    ) -> Result<BatchReport, UsbctlError> {
        // Nothing below may touch a device before the request is known good
        let operation = request.operation()?;
        let location = request.location()?;

        let count = topology.refresh(self.host)?;
        debug!("{} devices on the bus", count);

        let mut snapshots = match location {
            Some(location) => SnapshotList::capture_all([topology.locate(location)?])?,
            None => SnapshotList::capture_all(topology.matching(request.filter()))?,
        };
        info!("Running {} on {} device(s)", operation, snapshots.len());

        let executor = BatchExecutor::new(self.host, self.drivers, request.verbosity);
        let report = executor.run(&snapshots, operation, out);

        snapshots.release_all();
        Ok(report)
    }
}
