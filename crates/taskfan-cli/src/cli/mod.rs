//! Command-line surface of the `taskfan` binary.
//!
//! ## Structure
//!
//! - [`config`] - argument parsing and validation (`CliArgs` -> `CliConfig`).
//! - [`commands`] - one function per subcommand, each a thin caller of a
//!   `taskfan` runner.
//! - [`telemetry`] - log subscriber setup.

pub mod commands;
pub mod config;
pub mod telemetry;

pub use commands::run;
pub use config::{CliArgs, CliConfig};
pub use telemetry::init_telemetry;
