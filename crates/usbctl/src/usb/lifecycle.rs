//! Device handle lifecycle
//!
//! A handle moves through `Closed → Opened → DriverDetached →
//! InterfaceClaimed` inside [`HandleManager::claim`]. Any failing step closes
//! the session again before the error is returned, so a failed claim never
//! leaves an open session behind.
//!
//! [`HandleManager::release`] undoes a successful claim: it unclaims the
//! interface, gives the interface back to the kernel driver if one was
//! detached, and closes the session. Release never fails; problems on the
//! way out are logged and returned in a [`ReleaseReport`].

use crate::error::UsbctlError;
use crate::usb::descriptor::DeviceLocation;
use crate::usb::driver::KernelDriverSupport;
use crate::usb::host::{UsbHost, UsbSession};
use crate::usb::snapshot::DeviceSnapshot;
use crate::usb::transfers;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Closed,
    Opened,
    DriverDetached,
    InterfaceClaimed,
}

/// An open session with the primary interface claimed
///
/// Only [`HandleManager::claim`] creates one and only
/// [`HandleManager::release`] ends one.
#[derive(Debug)]
pub struct ClaimedDevice<S: UsbSession> {
    session: S,
    location: DeviceLocation,
    interface: u8,
    driver_detached: bool,
    state: HandleState,
    reset_issued: bool,
}

impl<S: UsbSession> ClaimedDevice<S> {
    pub fn location(&self) -> DeviceLocation {
        self.location
    }

    /// The claimed interface number
    pub fn interface(&self) -> u8 {
        self.interface
    }

    /// Whether claiming unbound a kernel driver
    pub fn driver_detached(&self) -> bool {
        self.driver_detached
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// True once a bus reset was issued; the device is gone from this
    /// session's point of view
    pub fn is_invalidated(&self) -> bool {
        self.reset_issued
    }

    fn live_session(&self) -> Result<&S, UsbctlError> {
        if self.reset_issued {
            return Err(UsbctlError::Transfer {
                location: self.location,
                message: "handle invalidated by bus reset".to_string(),
            });
        }
        Ok(&self.session)
    }

    /// Vendor `GET_STATUS` probe; returns the transferred length
    pub fn send_status(&self) -> Result<usize, UsbctlError> {
        let session = self.live_session()?;
        transfers::send_status_probe(session).map_err(|e| UsbctlError::Transfer {
            location: self.location,
            message: crate::error::describe_rusb_error(e),
        })
    }

    /// Issue a bus reset
    ///
    /// Whatever the outcome, the handle is invalid afterwards: the device
    /// may already be re-enumerating under a new address.
    pub fn reset(&mut self) -> Result<(), UsbctlError> {
        if self.reset_issued {
            return Err(UsbctlError::Transfer {
                location: self.location,
                message: "reset already issued on this handle".to_string(),
            });
        }
        self.reset_issued = true;

        self.session.reset().map_err(|e| UsbctlError::Transfer {
            location: self.location,
            message: format!("reset failed: {}", crate::error::describe_rusb_error(e)),
        })?;

        debug!("Reset device {}", self.location);
        Ok(())
    }
}

fn transition(location: DeviceLocation, state: &mut HandleState, next: HandleState) {
    debug!("Device {}: {:?} -> {:?}", location, *state, next);
    *state = next;
}

/// Problems met while releasing a handle
#[derive(Debug, Default)]
pub struct ReleaseReport {
    pub unclaim_error: Option<rusb::Error>,
    pub reattach_error: Option<UsbctlError>,
    /// The handle had been reset, so only the session was closed
    pub skipped_after_reset: bool,
}

impl ReleaseReport {
    pub fn is_clean(&self) -> bool {
        self.unclaim_error.is_none() && self.reattach_error.is_none()
    }
}

/// Opens, claims, releases and closes devices one at a time
pub struct HandleManager<'a, H: UsbHost> {
    host: &'a H,
    drivers: &'a dyn KernelDriverSupport,
}

impl<'a, H: UsbHost> HandleManager<'a, H> {
    pub fn new(host: &'a H, drivers: &'a dyn KernelDriverSupport) -> Self {
        Self { host, drivers }
    }

    /// Open the device and claim its primary interface
    pub fn claim(
        &self,
        snapshot: &DeviceSnapshot,
    ) -> Result<ClaimedDevice<H::Session>, UsbctlError> {
        let location = snapshot.location;
        let interface = snapshot
            .descriptor
            .primary_interface()
            .ok_or(UsbctlError::NoConfiguration(location))?;

        let mut state = HandleState::Closed;

        let mut session = self.host.open(location).map_err(|source| {
            warn!("Failed to open device {}: {}", location, source);
            UsbctlError::Open { location, source }
        })?;
        transition(location, &mut state, HandleState::Opened);

        // A failed detach is not fatal on its own, the claim below decides.
        let driver_detached = match self.drivers.try_detach(&mut session, interface) {
            Ok(detached) => detached,
            Err(e) => {
                warn!("Device {}: {}", location, e);
                false
            }
        };
        transition(location, &mut state, HandleState::DriverDetached);

        if let Err(source) = session.claim_interface(interface) {
            warn!(
                "Failed to claim interface {} on device {}: {}",
                interface, location, source
            );
            if driver_detached {
                if let Err(e) = self.drivers.try_reattach(&mut session, interface) {
                    warn!("Device {}: {}", location, e);
                }
            }
            drop(session);
            transition(location, &mut state, HandleState::Closed);
            return Err(UsbctlError::Claim {
                location,
                interface,
                source,
            });
        }
        transition(location, &mut state, HandleState::InterfaceClaimed);

        Ok(ClaimedDevice {
            session,
            location,
            interface,
            driver_detached,
            state,
            reset_issued: false,
        })
    }

    /// Unclaim, reattach and close
    pub fn release(&self, handle: ClaimedDevice<H::Session>) -> ReleaseReport {
        let ClaimedDevice {
            mut session,
            location,
            interface,
            driver_detached,
            mut state,
            reset_issued,
        } = handle;

        let mut report = ReleaseReport::default();

        if reset_issued {
            report.skipped_after_reset = true;
            drop(session);
            debug!("Closed device {} after reset", location);
            return report;
        }

        if let Err(e) = session.release_interface(interface) {
            warn!(
                "Failed to release interface {} on device {}: {}",
                interface, location, e
            );
            report.unclaim_error = Some(e);
        }

        if driver_detached {
            if let Err(e) = self.drivers.try_reattach(&mut session, interface) {
                warn!("Device {}: {}", location, e);
                report.reattach_error = Some(e);
            }
        }

        drop(session);
        transition(location, &mut state, HandleState::Closed);
        report
    }

    /// Open a session without claiming anything
    ///
    /// Enough for reading string descriptors. The session closes when it
    /// is dropped.
    pub fn open_readonly(&self, snapshot: &DeviceSnapshot) -> Result<H::Session, UsbctlError> {
        let location = snapshot.location;
        self.host.open(location).map_err(|source| {
            debug!("Could not open device {} for reading: {}", location, source);
            UsbctlError::Open { location, source }
        })
    }
}
