//! Vellum Telemetry - logging setup and operation context for the ledger.
//!
//! This crate provides:
//! - Subscriber setup with pretty, compact, full or JSON output to stderr,
//!   stdout or rolling files
//! - [`OperationContext`] for correlating the log lines of one ledger
//!   operation
//! - With the `config` feature, conversion from the `[logging]` config
//!   section
//!
//! # Example
//!
//! ```rust,no_run
//! use vellum_telemetry::{LogConfig, LogFormat, OperationContext, setup_logging};
//!
//! # fn main() -> Result<(), vellum_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("vellum_ledger=debug");
//! setup_logging(&config)?;
//!
//! let ctx = OperationContext::new("ledger").with_operation("append");
//! let _guard = ctx.span().entered();
//! tracing::info!("appending");
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

pub use context::OperationContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
