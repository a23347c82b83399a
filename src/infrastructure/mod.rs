//! Infrastructure layer: adapters for the domain's ports plus the
//! ambient concerns (config, logging) that aren't part of the domain.

pub mod config;
pub mod database;
pub mod deployer;
pub mod logging;

pub use deployer::NullDeployer;
