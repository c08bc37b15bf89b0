use crate::config::units::serialize_millis;
use crate::config::{paths, EnvMap, LaunchSpec, RestartPolicy};
use crate::error::{LaunchError, Result};
use crate::logs::{self, LogFiles};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Variable injected into the child's environment naming the selected profile
pub const PROFILE_ENV_VAR: &str = "LAUNCHSPEC_PROFILE";

/// A launch specification with every path, profile and interpreter resolved.
/// This is what gets handed to a host supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub name: String,
    /// Executable to start: the interpreter, or the script itself
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Variables added on top of the inherited environment
    pub env: EnvMap,
    pub profile: Option<String>,
    pub instances: u32,
    pub logs: LogFiles,
    pub restart: RestartPolicy,
    pub max_memory_restart: Option<u64>,
    #[serde(rename = "kill_timeout_ms", serialize_with = "serialize_millis")]
    pub kill_timeout: Duration,
    #[serde(rename = "listen_timeout_ms", serialize_with = "serialize_millis")]
    pub listen_timeout: Duration,
    pub watch: bool,
}

impl LaunchPlan {
    /// Resolve `spec` for launch under `profile`.
    ///
    /// Fails before anything is started when the working directory, script,
    /// interpreter or profile cannot be resolved. Nothing is created on disk.
    pub fn prepare(spec: &LaunchSpec, profile: Option<&str>) -> Result<Self> {
        let cwd = spec.resolve_working_directory()?;
        let script = spec.resolve_script(&cwd)?;
        let interpreter = spec.resolve_interpreter()?;

        let (program, args) = match interpreter {
            Some(interpreter) => {
                let mut args = spec.interpreter_args.clone();
                args.push(script.to_string_lossy().into_owned());
                args.extend(spec.args.iter().cloned());
                (interpreter, args)
            }
            None => (script, spec.args.clone()),
        };

        let mut env = spec.select_environment_profile(profile)?;
        if let Some(profile) = profile {
            env.insert(PROFILE_ENV_VAR.to_string(), profile.to_string());
        }

        let logs = Self::resolve_logs(spec, &cwd)?;

        let plan = LaunchPlan {
            name: spec.name.clone(),
            program,
            args,
            cwd,
            env,
            profile: profile.map(str::to_string),
            instances: spec.instances,
            logs,
            restart: spec.restart.clone(),
            max_memory_restart: spec.max_memory_restart,
            kill_timeout: spec.kill_timeout,
            listen_timeout: spec.listen_timeout,
            watch: spec.watch,
        };

        tracing::debug!(
            "Prepared launch plan for {} ({}) in {}",
            plan.name,
            plan.program.display(),
            plan.cwd.display()
        );

        Ok(plan)
    }

    fn resolve_logs(spec: &LaunchSpec, cwd: &Path) -> Result<LogFiles> {
        let resolve = |path: &Path| {
            let path = paths::anchor(path, cwd);
            if spec.logs.merge_logs {
                path
            } else {
                paths::instance_log_path(&path, 0)
            }
        };

        let timestamp_format = if spec.logs.time {
            let pattern = logs::strftime_pattern(&spec.logs.date_format);
            logs::validate_pattern(&pattern)?;
            Some(pattern)
        } else {
            None
        };

        Ok(LogFiles {
            out_file: resolve(&spec.logs.out_file),
            error_file: resolve(&spec.logs.error_file),
            log_file: resolve(&spec.logs.log_file),
            timestamp_format,
        })
    }

    /// Make sure every log file's directory exists
    pub fn create_log_directories(&self) -> Result<()> {
        for path in [
            &self.logs.out_file,
            &self.logs.error_file,
            &self.logs.log_file,
        ] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    LaunchError::LogError(format!(
                        "Failed to create log directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// The full command line, for display
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
