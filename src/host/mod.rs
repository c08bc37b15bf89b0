// Host module - Hand-off of a resolved launch plan to a process supervisor

mod foreground;
mod manifest;

pub use foreground::ForegroundHost;
pub use manifest::{Manifest, ManifestHost, MANIFEST_VERSION};

use crate::error::Result;
use crate::plan::LaunchPlan;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A process-supervision service that accepts launch plans.
///
/// Restarting, memory enforcement and uptime accounting belong to the host;
/// callers only hand over the plan and keep the returned handle.
#[async_trait]
pub trait SupervisorHost: Send + Sync {
    /// Short name used in logs and CLI output
    fn kind(&self) -> &'static str;

    /// Hand `plan` to the host
    async fn launch(&self, plan: &LaunchPlan) -> Result<HostHandle>;
}

/// How a supervised run ended, as far as this side can tell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The child exited; `None` when it was terminated by a signal
    Exited(Option<i32>),
    /// Ownership of the process stays with an external supervisor
    Detached,
}

/// Opaque handle returned by a host
#[derive(Debug)]
pub struct HostHandle {
    name: String,
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Foreground(foreground::Running),
    Published { manifest: PathBuf },
}

impl HostHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// OS process id, when the host started the process itself
    pub fn pid(&self) -> Option<u32> {
        match &self.inner {
            HandleInner::Foreground(running) => Some(running.pid()),
            HandleInner::Published { .. } => None,
        }
    }

    /// Manifest location, when the plan was published for an external supervisor
    pub fn manifest_path(&self) -> Option<&Path> {
        match &self.inner {
            HandleInner::Foreground(_) => None,
            HandleInner::Published { manifest } => Some(manifest),
        }
    }

    /// Wait for the run to end
    pub async fn wait(&mut self) -> Result<Outcome> {
        match &mut self.inner {
            HandleInner::Foreground(running) => running.wait().await,
            HandleInner::Published { .. } => Ok(Outcome::Detached),
        }
    }

    /// Ask the process to stop, forcing it after the plan's kill timeout
    pub async fn stop(&mut self) -> Result<Outcome> {
        match &mut self.inner {
            HandleInner::Foreground(running) => running.stop(&self.name).await,
            HandleInner::Published { .. } => Ok(Outcome::Detached),
        }
    }
}
