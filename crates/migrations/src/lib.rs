//! # tabletop-migrations
//!
//! Sequenced, checksummed, transactional schema migrations.
//!
//! - [`MigrationLoader`] discovers `NNN_slug.sql` files and parses their
//!   up/down sections.
//! - [`MigrationTracker`] owns the ledger table of applied migrations.
//! - [`MigrationRunner`] reconciles the two and runs `up`, `down`, `reset`
//!   and `status`, one transaction per migration, stopping at the first
//!   failure.
//!
//! Concurrent runners against the same database are not coordinated beyond
//! the ledger's unique filename constraint.

pub mod definitions;
pub mod dialect;
pub mod error;
pub mod loader;
pub mod rollback;
pub mod runner;
pub mod tracker;

pub use definitions::*;
pub use dialect::Dialect;
pub use error::{MigrationError, MigrationResult};
pub use loader::MigrationLoader;
pub use rollback::select_rollback;
pub use runner::{select_pending, MigrationRunner};
pub use tracker::MigrationTracker;
