//! Ridelink CLI library
//!
//! Command-line front end of the ride telemetry gateway: argument parsing,
//! layered configuration, the file-backed catalog and ride sink, and the
//! command handlers that drive a session runtime.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod services;

pub use cli::{Cli, Commands};
pub use commands::CommandDispatcher;
pub use config::{CliAppConfig, ConfigError};
pub use error::{CliError, Result};
pub use services::{location_provider, FileCatalogService, JsonRideSink};
