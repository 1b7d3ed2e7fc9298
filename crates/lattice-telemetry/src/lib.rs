//! Lattice Telemetry - Logging and operation tracing for the Lattice runtime.
//!
//! This crate provides:
//! - Configurable logging setup with several output formats
//! - [`OperationContext`] for correlating the log lines of one lifecycle or
//!   loader operation, including the nested operations it triggers
//!
//! # Example
//!
//! ```rust,no_run
//! use lattice_core::UnitId;
//! use lattice_telemetry::{LogConfig, LogFormat, OperationContext, setup_logging};
//!
//! # fn main() -> Result<(), lattice_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("lattice_wiring=debug");
//! setup_logging(&config)?;
//!
//! let ctx = OperationContext::new("start").with_unit(UnitId(4));
//! let _guard = ctx.span().entered();
//! tracing::info!("Starting unit");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod context;
mod error;
mod logging;

pub use context::{OperationContext, OperationGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
