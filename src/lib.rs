// Library exports for launchspec

pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod logs;
pub mod plan;

pub use config::{LaunchSpec, LoadOptions};
pub use error::{LaunchError, Result};
pub use host::{ForegroundHost, HostHandle, ManifestHost, Outcome, SupervisorHost};
pub use plan::LaunchPlan;
