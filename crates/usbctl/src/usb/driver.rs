//! Kernel driver detach/reattach capability
//!
//! Whether the host can unbind its own driver from an interface is a
//! platform property. It is picked once, at configuration time, through
//! [`select_driver_support`]; the lifecycle code only ever talks to the
//! [`KernelDriverSupport`] trait.

use crate::error::UsbctlError;
use crate::usb::host::UsbSession;
use tracing::debug;

pub trait KernelDriverSupport {
    /// Unbind a kernel driver from `interface` if one is bound
    ///
    /// Returns `Ok(true)` when a driver was actually detached, `Ok(false)`
    /// when there was nothing to do.
    fn try_detach(&self, session: &mut dyn UsbSession, interface: u8) -> Result<bool, UsbctlError>;

    /// Give `interface` back to the kernel
    fn try_reattach(&self, session: &mut dyn UsbSession, interface: u8) -> Result<(), UsbctlError>;

    fn name(&self) -> &'static str;
}

/// Detach/reattach through the host library
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelDriverControl;

impl KernelDriverSupport for KernelDriverControl {
    fn try_detach(&self, session: &mut dyn UsbSession, interface: u8) -> Result<bool, UsbctlError> {
        match session.kernel_driver_active(interface) {
            Ok(true) => {
                session
                    .detach_kernel_driver(interface)
                    .map_err(|source| UsbctlError::Detach { interface, source })?;
                debug!("Detached kernel driver from interface {}", interface);
                Ok(true)
            }
            Ok(false) => {
                debug!("No kernel driver active on interface {}", interface);
                Ok(false)
            }
            Err(rusb::Error::NotSupported) => Ok(false),
            Err(source) => Err(UsbctlError::Detach { interface, source }),
        }
    }

    fn try_reattach(&self, session: &mut dyn UsbSession, interface: u8) -> Result<(), UsbctlError> {
        session
            .attach_kernel_driver(interface)
            .map_err(|source| UsbctlError::Reattach { interface, source })?;
        debug!("Reattached kernel driver to interface {}", interface);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "kernel-driver-control"
    }
}

/// Used where the host cannot detach drivers
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDriverControl;

impl KernelDriverSupport for NoDriverControl {
    fn try_detach(
        &self,
        _session: &mut dyn UsbSession,
        _interface: u8,
    ) -> Result<bool, UsbctlError> {
        Ok(false)
    }

    fn try_reattach(
        &self,
        _session: &mut dyn UsbSession,
        _interface: u8,
    ) -> Result<(), UsbctlError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Choose the capability from the configuration and the platform flag
pub fn select_driver_support(
    detach_enabled: bool,
    platform_supported: bool,
) -> Box<dyn KernelDriverSupport> {
    if detach_enabled && platform_supported {
        Box::new(KernelDriverControl)
    } else {
        Box::new(NoDriverControl)
    }
}

/// Whether libusb on this platform can detach kernel drivers
pub fn platform_supports_detach() -> bool {
    rusb::supports_detach_kernel_driver()
}
