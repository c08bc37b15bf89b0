use super::{HandleInner, HostHandle, SupervisorHost};
use crate::error::{LaunchError, Result};
use crate::plan::LaunchPlan;
use async_trait::async_trait;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Manifest schema version
pub const MANIFEST_VERSION: u32 = 1;

/// Document published for an external supervisor
#[derive(Debug, Serialize)]
pub struct Manifest<'a> {
    pub version: u32,
    pub generated_at: String,
    pub plan: &'a LaunchPlan,
}

/// Publishes resolved plans as `<dir>/<name>.json` for an external
/// supervisor to pick up. Nothing is started here.
#[derive(Debug, Clone)]
pub struct ManifestHost {
    dir: PathBuf,
}

impl ManifestHost {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn manifest_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl SupervisorHost for ManifestHost {
    fn kind(&self) -> &'static str {
        "manifest"
    }

    async fn launch(&self, plan: &LaunchPlan) -> Result<HostHandle> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            LaunchError::HostError(format!(
                "Failed to create manifest directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        // The external supervisor appends to these without creating them
        plan.create_log_directories()?;

        let manifest = Manifest {
            version: MANIFEST_VERSION,
            generated_at: Local::now().to_rfc3339(),
            plan,
        };
        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| LaunchError::SerializationError(format!("manifest: {}", e)))?;

        let path = self.manifest_path(&plan.name);

        // Write to a temporary file first so readers never see a partial manifest
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &body).await.map_err(|e| {
            LaunchError::HostError(format!("Failed to write {}: {}", temp_path.display(), e))
        })?;
        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            LaunchError::HostError(format!("Failed to publish {}: {}", path.display(), e))
        })?;

        tracing::info!("Published launch plan for {} to {}", plan.name, path.display());

        Ok(HostHandle {
            name: plan.name.clone(),
            inner: HandleInner::Published { manifest: path },
        })
    }
}
