//! Temporally versioned channel configuration.

pub mod chain;
pub mod model;
pub mod pump_models;
pub mod store;

pub use chain::{VersionChain, VersionPlan, check_partition, plan_set_version, resolve};
pub use model::{ConfigFields, ConfigPatch, ConfigVersion, PumpType, VersionError};
pub use store::CurrentConfig;
