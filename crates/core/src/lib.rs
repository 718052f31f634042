//! # tabletop-core
//!
//! Configuration and logging foundation shared by the migration engine and
//! the `tabletop` command line tool.

pub mod config;
pub mod logging;

pub use config::*;
pub use logging::*;
