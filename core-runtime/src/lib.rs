//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the host bindings:
//! - Logging and tracing, with optional forwarding to a host `LoggerSink`
//! - Fail-fast runtime configuration
//!
//! ## Overview
//!
//! Nothing here touches the toolkit. The `netbridge` facade reads a
//! [`config::RuntimeConfig`], installs the subscriber described by its
//! [`logging::LoggingConfig`] and then loads whatever the config points at.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{RuntimeConfig, RuntimeConfigBuilder, RuntimeSettings};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat, LoggerSinkLayer, LoggingConfig};
