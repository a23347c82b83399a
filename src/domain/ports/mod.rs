//! Domain ports (interfaces) the core depends on but does not implement.

pub mod deployer;
pub mod store;

pub use deployer::{DeployOutcome, DeployStatus, Deployer, ProgressCallback, RunStatus};
pub use store::{RawRow, Store, StoreError, StoreResult};
