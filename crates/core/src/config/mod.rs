pub mod app_config;
pub mod database;
pub mod migrations;
pub mod sources;
pub mod validation;

pub use app_config::*;
pub use database::*;
pub use migrations::*;
pub use sources::*;
pub use validation::*;
