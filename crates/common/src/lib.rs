pub mod advisor;
pub mod config;
pub mod error;
pub mod types;

pub use advisor::Advisor;
pub use config::{AdvisoryConfig, AllocationConfig, CadenceConfig, Config, SessionConfig, MAX_CADENCE_SECS};
pub use error::{Error, Result};
pub use types::*;
