//! Batch operation executor
//!
//! Runs one operation against every snapshot of a [`SnapshotList`], in list
//! order, strictly one device at a time. A failure on one device becomes
//! that device's [`OperationResult`] and the batch moves on.

use crate::error::{ErrorKind, UsbctlError};
use crate::printer;
use crate::usb::descriptor::DeviceLocation;
use crate::usb::driver::KernelDriverSupport;
use crate::usb::host::UsbHost;
use crate::usb::lifecycle::{ClaimedDevice, HandleManager};
use crate::usb::snapshot::{DeviceSnapshot, SnapshotList};
use crate::usb::transfers::{self, DeviceStrings};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Print descriptors; never claims the device
    Display,
    /// Vendor `GET_STATUS` probe on the claimed device
    Status,
    /// Bus reset on the claimed device
    Reset,
}

impl FromStr for Operation {
    type Err = UsbctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "display" | "show" => Ok(Operation::Display),
            "status" => Ok(Operation::Status),
            "reset" => Ok(Operation::Reset),
            _ => Err(UsbctlError::UnknownCommand(s.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Display => "display",
            Operation::Status => "status",
            Operation::Reset => "reset",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Succeeded { detail: String },
    Failed { kind: ErrorKind, message: String },
}

/// Outcome of one operation on one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub location: DeviceLocation,
    pub vendor_id: u16,
    pub product_id: u16,
    pub operation: Operation,
    pub status: OperationStatus,
}

impl OperationResult {
    fn new(
        snapshot: &DeviceSnapshot,
        operation: Operation,
        outcome: Result<String, UsbctlError>,
    ) -> Self {
        let status = match outcome {
            Ok(detail) => OperationStatus::Succeeded { detail },
            Err(e) => OperationStatus::Failed {
                kind: e.kind(),
                message: e.to_string(),
            },
        };

        Self {
            location: snapshot.location,
            vendor_id: snapshot.vendor_id(),
            product_id: snapshot.product_id(),
            operation,
            status,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OperationStatus::Succeeded { .. })
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self.status {
            OperationStatus::Failed { kind, .. } => Some(kind),
            OperationStatus::Succeeded { .. } => None,
        }
    }
}

/// All results of one batch, in snapshot order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub operation: Operation,
    pub results: Vec<OperationResult>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

pub struct BatchExecutor<'a, H: UsbHost> {
    manager: HandleManager<'a, H>,
    verbosity: u8,
}

impl<'a, H: UsbHost> BatchExecutor<'a, H> {
    pub fn new(host: &'a H, drivers: &'a dyn KernelDriverSupport, verbosity: u8) -> Self {
        Self {
            manager: HandleManager::new(host, drivers),
            verbosity,
        }
    }

    /// Run `operation` on every snapshot
    ///
    /// Always returns exactly one result per snapshot. `out` receives the
    /// display output and progress lines.
    pub fn run(
        &self,
        snapshots: &SnapshotList,
        operation: Operation,
        out: &mut dyn Write,
    ) -> BatchReport {
        let mut results = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            let outcome = match operation {
                Operation::Display => self.display(snapshot, out),
                Operation::Status => self.with_claimed(snapshot, |handle| {
                    let written = handle.send_status()?;
                    Ok(format!("GET_STATUS accepted, {} bytes", written))
                }),
                Operation::Reset => {
                    if let Err(e) = writeln!(out, "Resetting!") {
                        debug!("Could not write progress line: {}", e);
                    }
                    self.with_claimed(snapshot, |handle| {
                        handle.reset()?;
                        Ok("bus reset issued".to_string())
                    })
                }
            };

            let result = OperationResult::new(snapshot, operation, outcome);
            match &result.status {
                OperationStatus::Succeeded { detail } => {
                    info!("{} {}: {}", operation, snapshot.location, detail);
                }
                OperationStatus::Failed { message, .. } => {
                    warn!("{} {} failed: {}", operation, snapshot.location, message);
                }
            }
            results.push(result);
        }

        BatchReport { operation, results }
    }

    /// Claim, run `f`, release
    ///
    /// The handle is released whatever `f` returns. Release problems are
    /// logged by the lifecycle manager and do not change the outcome.
    fn with_claimed<F>(&self, snapshot: &DeviceSnapshot, f: F) -> Result<String, UsbctlError>
    where
        F: FnOnce(&mut ClaimedDevice<H::Session>) -> Result<String, UsbctlError>,
    {
        let mut handle = self.manager.claim(snapshot)?;
        let outcome = f(&mut handle);
        let report = self.manager.release(handle);
        if !report.is_clean() {
            debug!("Release of {} was not clean: {:?}", snapshot.location, report);
        }
        outcome
    }

    /// Print the snapshot, fetching strings over a short unclaimed session
    fn display(
        &self,
        snapshot: &DeviceSnapshot,
        out: &mut dyn Write,
    ) -> Result<String, UsbctlError> {
        let strings = match self.manager.open_readonly(snapshot) {
            Ok(session) => transfers::read_device_strings(&session, &snapshot.descriptor),
            Err(_) => DeviceStrings::default(),
        };

        if let Err(e) = printer::print_device(out, snapshot, &strings, self.verbosity) {
            warn!("Could not print device {}: {}", snapshot.location, e);
        }

        Ok(printer::device_label(snapshot, &strings))
    }
}
