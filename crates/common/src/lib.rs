//! Common utilities for usbctl
//!
//! Process-level helpers shared by the usbctl binaries: the setup error type
//! and the tracing subscriber bootstrap.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{level_for_verbosity, setup_logging};
