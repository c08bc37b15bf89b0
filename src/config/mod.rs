pub mod env;
pub mod paths;
pub mod units;

use crate::error::{LaunchError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use env::EnvMap;
use units::Quantity;

/// Keys understood by other process managers that carry no meaning here
const IGNORED_KEYS: &[&str] = &["pmx", "vizion", "automation"];

/// Default strftime pattern for timestamped log lines
pub const DEFAULT_LOG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Source file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    /// Pick a format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match extension {
            "toml" => Ok(Format::Toml),
            "json" => Ok(Format::Json),
            _ => Err(LaunchError::config(format!(
                "Unsupported file format: '{}'. Use .toml or .json",
                extension
            ))),
        }
    }
}

/// Restart thresholds. Carried as data for the host supervisor, never acted on here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartPolicy {
    pub autorestart: bool,
    #[serde(rename = "restart_delay_ms", serialize_with = "units::serialize_millis")]
    pub restart_delay: Duration,
    pub max_restarts: u32,
    /// A run shorter than this counts as a failed start
    #[serde(rename = "min_uptime_ms", serialize_with = "units::serialize_millis")]
    pub min_uptime: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            autorestart: true,
            restart_delay: Duration::ZERO,
            max_restarts: 16,
            min_uptime: Duration::from_secs(1),
        }
    }
}

/// Where the child's output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub out_file: PathBuf,
    pub error_file: PathBuf,
    /// Receives both streams
    pub log_file: PathBuf,
    /// Prefix each line with a timestamp
    pub time: bool,
    pub date_format: String,
    /// When false, file names carry the instance number
    pub merge_logs: bool,
}

impl LogSettings {
    fn defaults_for(name: &str) -> Self {
        Self {
            out_file: PathBuf::from(format!("logs/{}-out.log", name)),
            error_file: PathBuf::from(format!("logs/{}-error.log", name)),
            log_file: PathBuf::from(format!("logs/{}.log", name)),
            time: false,
            date_format: DEFAULT_LOG_DATE_FORMAT.to_string(),
            merge_logs: true,
        }
    }
}

/// Options applied while loading
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Working directory supplied by the operator; wins over the file's `cwd`
    pub cwd_override: Option<PathBuf>,
    /// Expand `$VAR` / `${VAR}` from the current environment in paths and
    /// arguments
    pub expand_env: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            cwd_override: None,
            expand_env: true,
        }
    }
}

/// Declarative source as written on disk. Every field is optional here;
/// [`LaunchSpec::from_source`] decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpreter_args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autorestart: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_restart: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_delay: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_uptime: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kill_timeout: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_timeout: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_date_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_logs: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, BTreeMap<String, Value>>,
    /// `env_<profile>` overlays and anything unrecognised
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Validated description of how one process is launched and governed.
/// Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub name: String,
    pub script: PathBuf,
    pub args: Vec<String>,
    pub interpreter: Option<String>,
    pub interpreter_args: Vec<String>,
    pub cwd: PathBuf,
    pub instances: u32,
    pub watch: bool,
    pub restart: RestartPolicy,
    /// Memory ceiling in bytes
    pub max_memory_restart: Option<u64>,
    /// Grace period between the stop signal and a forced kill
    pub kill_timeout: Duration,
    /// Grace period for the child to signal readiness
    pub listen_timeout: Duration,
    pub env: EnvMap,
    pub profiles: BTreeMap<String, EnvMap>,
    pub logs: LogSettings,
    /// Directory of the file this was loaded from; relative `cwd` values resolve against it
    pub origin: Option<PathBuf>,
}

impl LaunchSpec {
    /// Load every launch specification in a file (TOML or JSON)
    pub fn from_file(path: &Path, options: &LoadOptions) -> Result<Vec<LaunchSpec>> {
        let format = Format::from_path(path)?;

        let contents = std::fs::read_to_string(path).map_err(|e| {
            LaunchError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let origin = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        tracing::debug!("Loading launch specification from {}", path.display());
        Self::from_str_with(&contents, format, options, Some(&origin))
    }

    /// Load exactly one specification. With several apps in the file, `name` picks one.
    pub fn load(path: &Path, options: &LoadOptions, name: Option<&str>) -> Result<LaunchSpec> {
        let specs = Self::from_file(path, options)?;
        Self::pick(specs, name)
    }

    fn pick(specs: Vec<LaunchSpec>, name: Option<&str>) -> Result<LaunchSpec> {
        match name {
            Some(wanted) => {
                let available: Vec<String> = specs.iter().map(|s| s.name.clone()).collect();
                specs
                    .into_iter()
                    .find(|s| s.name == wanted)
                    .ok_or_else(|| {
                        LaunchError::config(format!(
                            "no app named '{}' (available: {})",
                            wanted,
                            available.join(", ")
                        ))
                    })
            }
            None => {
                if specs.len() > 1 {
                    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
                    return Err(LaunchError::config(format!(
                        "file declares {} apps ({}); choose one by name",
                        specs.len(),
                        names.join(", ")
                    )));
                }
                specs
                    .into_iter()
                    .next()
                    .ok_or_else(|| LaunchError::config("No app configuration found"))
            }
        }
    }

    /// Parse specifications from an in-memory document
    pub fn from_str_with(
        contents: &str,
        format: Format,
        options: &LoadOptions,
        origin: Option<&Path>,
    ) -> Result<Vec<LaunchSpec>> {
        let sources = parse_sources(contents, format)?;

        let mut specs = Vec::with_capacity(sources.len());
        for source in sources {
            let spec = Self::from_source(source, options, origin)?;
            if specs.iter().any(|s: &LaunchSpec| s.name == spec.name) {
                return Err(LaunchError::config(format!(
                    "app name '{}' is declared more than once",
                    spec.name
                )));
            }
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Build a validated specification from its declarative source
    pub fn from_source(
        source: SpecSource,
        options: &LoadOptions,
        origin: Option<&Path>,
    ) -> Result<LaunchSpec> {
        let name = required(source.name, "name")?;
        let script = required(source.script.filter(|p| !p.as_os_str().is_empty()), "script")?;

        let cwd = match (&options.cwd_override, source.cwd) {
            (Some(dir), file_cwd) => {
                if let Some(file_cwd) = file_cwd {
                    tracing::info!(
                        "Working directory {} overridden by {}",
                        file_cwd.display(),
                        dir.display()
                    );
                }
                absolute_from_here(dir)?
            }
            (None, Some(dir)) if !dir.as_os_str().is_empty() => dir,
            (None, _) => {
                return Err(LaunchError::config(
                    "missing required field: cwd (set it in the file, pass --cwd or set LAUNCHSPEC_CWD)",
                ))
            }
        };

        let instances = match source.instances {
            None => 1,
            Some(1) => 1,
            Some(n) => {
                return Err(LaunchError::config(format!(
                    "instances must be 1 (got {}); a launch specification describes exactly one process",
                    n
                )))
            }
        };

        let mut restart = RestartPolicy::default();
        if let Some(flag) = source.autorestart {
            restart.autorestart = flag;
        }
        if let Some(q) = &source.restart_delay {
            restart.restart_delay = q.to_duration("restart_delay")?;
        }
        if let Some(n) = source.max_restarts {
            restart.max_restarts = u32::try_from(n).map_err(|_| {
                LaunchError::config(format!(
                    "max_restarts must be a non-negative integer (got {})",
                    n
                ))
            })?;
        }
        if let Some(q) = &source.min_uptime {
            restart.min_uptime = q.to_duration("min_uptime")?;
        }

        let max_memory_restart = source
            .max_memory_restart
            .as_ref()
            .map(|q| q.to_bytes("max_memory_restart"))
            .transpose()?;

        let kill_timeout = source
            .kill_timeout
            .as_ref()
            .map(|q| q.to_duration("kill_timeout"))
            .transpose()?
            .unwrap_or(Duration::from_millis(1600));

        let listen_timeout = source
            .listen_timeout
            .as_ref()
            .map(|q| q.to_duration("listen_timeout"))
            .transpose()?
            .unwrap_or(Duration::from_secs(3));

        let env = env_map(&source.env, "env")?;

        let mut profiles = BTreeMap::new();
        for (profile, vars) in &source.profiles {
            profiles.insert(profile.clone(), env_map(vars, &format!("profiles.{}", profile))?);
        }

        for (key, value) in &source.extra {
            if let Some(profile) = key.strip_prefix(env::PROFILE_KEY_PREFIX) {
                if profile.is_empty() {
                    return Err(LaunchError::config(format!("invalid profile key '{}'", key)));
                }
                if profiles.contains_key(profile) {
                    return Err(LaunchError::config(format!(
                        "profile '{}' is declared both as '{}' and under profiles",
                        profile, key
                    )));
                }
                let vars: BTreeMap<String, Value> = serde_json::from_value(value.clone())
                    .map_err(|e| LaunchError::config(format!("{}: {}", key, e)))?;
                profiles.insert(profile.to_string(), env_map(&vars, key)?);
            } else if IGNORED_KEYS.contains(&key.as_str()) {
                tracing::warn!("Ignoring supervisor-specific key '{}' in app '{}'", key, name);
            } else {
                return Err(LaunchError::config(format!(
                    "unknown field '{}' in app '{}'",
                    key, name
                )));
            }
        }

        let mut logs = LogSettings::defaults_for(&name);
        if let Some(path) = source.out_file {
            logs.out_file = path;
        }
        if let Some(path) = source.error_file {
            logs.error_file = path;
        }
        if let Some(path) = source.log_file {
            logs.log_file = path;
        }
        if let Some(flag) = source.time {
            logs.time = flag;
        }
        if let Some(format) = source.log_date_format {
            logs.date_format = format;
        }
        if let Some(flag) = source.merge_logs {
            logs.merge_logs = flag;
        }

        let mut spec = LaunchSpec {
            name,
            script,
            args: source.args,
            interpreter: source.interpreter,
            interpreter_args: source.interpreter_args,
            cwd,
            instances,
            watch: source.watch.unwrap_or(false),
            restart,
            max_memory_restart,
            kill_timeout,
            listen_timeout,
            env,
            profiles,
            logs,
            origin: origin.map(Path::to_path_buf),
        };

        if options.expand_env {
            spec.expand_env_vars();
        }

        spec.validate()?;
        Ok(spec)
    }

    /// Check field-level rules that do not touch the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(LaunchError::config("missing required field: name"));
        }

        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(LaunchError::config(format!(
                "invalid name '{}': use letters, digits, '-', '_' or '.'",
                self.name
            )));
        }

        if self.name.chars().all(|c| c == '.') {
            return Err(LaunchError::config(format!(
                "invalid name '{}': must contain a letter, digit, '-' or '_'",
                self.name
            )));
        }

        if self.script.as_os_str().is_empty() {
            return Err(LaunchError::config("missing required field: script"));
        }

        if self.cwd.as_os_str().is_empty() {
            return Err(LaunchError::config("missing required field: cwd"));
        }

        if self.instances != 1 {
            return Err(LaunchError::config("instances must be 1"));
        }

        if let Some(interpreter) = &self.interpreter {
            if interpreter.trim().is_empty() {
                return Err(LaunchError::config("interpreter must not be empty"));
            }
        }

        for (label, path) in [
            ("out_file", &self.logs.out_file),
            ("error_file", &self.logs.error_file),
            ("log_file", &self.logs.log_file),
        ] {
            if path.as_os_str().is_empty() || path.file_name().is_none() {
                return Err(LaunchError::config(format!(
                    "{} must name a file (got '{}')",
                    label,
                    path.display()
                )));
            }
        }

        let maps = std::iter::once(("env", &self.env))
            .chain(self.profiles.iter().map(|(k, v)| (k.as_str(), v)));
        for (label, map) in maps {
            for key in map.keys() {
                if key.is_empty() || key.contains('=') || key.contains('\0') {
                    return Err(LaunchError::config(format!(
                        "invalid environment variable name '{}' in {}",
                        key, label
                    )));
                }
            }
        }

        Ok(())
    }

    /// Expand environment variables in paths and arguments. Env values are
    /// handed to the child exactly as written.
    fn expand_env_vars(&mut self) {
        fn expand_path(path: &Path) -> PathBuf {
            PathBuf::from(env::expand_from_process(&path.to_string_lossy()))
        }

        self.script = expand_path(&self.script);
        self.cwd = expand_path(&self.cwd);
        self.logs.out_file = expand_path(&self.logs.out_file);
        self.logs.error_file = expand_path(&self.logs.error_file);
        self.logs.log_file = expand_path(&self.logs.log_file);

        for arg in self.args.iter_mut().chain(self.interpreter_args.iter_mut()) {
            *arg = env::expand_from_process(arg);
        }
    }

    /// Resolve the working directory to an existing absolute path
    pub fn resolve_working_directory(&self) -> Result<PathBuf> {
        paths::resolve_working_directory(&self.cwd, self.origin.as_deref())
    }

    /// Base environment overlaid with the named profile. `None` returns the base environment.
    pub fn select_environment_profile(&self, profile: Option<&str>) -> Result<EnvMap> {
        let Some(profile) = profile else {
            return Ok(self.env.clone());
        };

        let overrides = self.profiles.get(profile).ok_or_else(|| {
            let declared: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
            LaunchError::ProfileNotFound(if declared.is_empty() {
                format!("'{}' (no profiles declared)", profile)
            } else {
                format!("'{}' (declared: {})", profile, declared.join(", "))
            })
        })?;

        Ok(env::overlay(&self.env, overrides))
    }

    /// Names of the declared environment profiles
    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    /// Script location relative to a resolved working directory
    pub fn resolve_script(&self, cwd: &Path) -> Result<PathBuf> {
        paths::resolve_script(&self.script, cwd)
    }

    /// Interpreter location on `PATH`, if one is configured
    pub fn resolve_interpreter(&self) -> Result<Option<PathBuf>> {
        paths::resolve_interpreter(self.interpreter.as_deref())
    }

    /// Convert back into its declarative form
    pub fn to_source(&self) -> SpecSource {
        fn values(map: &EnvMap) -> BTreeMap<String, Value> {
            map.iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect()
        }

        SpecSource {
            name: Some(self.name.clone()),
            script: Some(self.script.clone()),
            args: self.args.clone(),
            interpreter: self.interpreter.clone(),
            interpreter_args: self.interpreter_args.clone(),
            cwd: Some(self.cwd.clone()),
            instances: Some(i64::from(self.instances)),
            autorestart: Some(self.restart.autorestart),
            watch: Some(self.watch),
            max_memory_restart: self.max_memory_restart.map(Quantity::from_bytes),
            restart_delay: Some(Quantity::from_duration(self.restart.restart_delay)),
            max_restarts: Some(i64::from(self.restart.max_restarts)),
            min_uptime: Some(Quantity::from_duration(self.restart.min_uptime)),
            kill_timeout: Some(Quantity::from_duration(self.kill_timeout)),
            listen_timeout: Some(Quantity::from_duration(self.listen_timeout)),
            out_file: Some(self.logs.out_file.clone()),
            error_file: Some(self.logs.error_file.clone()),
            log_file: Some(self.logs.log_file.clone()),
            time: Some(self.logs.time),
            log_date_format: Some(self.logs.date_format.clone()),
            merge_logs: Some(self.logs.merge_logs),
            env: values(&self.env),
            profiles: self
                .profiles
                .iter()
                .map(|(k, v)| (k.clone(), values(v)))
                .collect(),
            extra: BTreeMap::new(),
        }
    }

    /// Serialize as a TOML document that loads back to an equal specification
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.to_source())
            .map_err(|e| LaunchError::SerializationError(format!("TOML: {}", e)))
    }

    /// Serialize as a JSON document that loads back to an equal specification
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_source())
            .map_err(|e| LaunchError::SerializationError(format!("JSON: {}", e)))
    }

    pub fn to_format(&self, format: Format) -> Result<String> {
        match format {
            Format::Toml => self.to_toml(),
            Format::Json => self.to_json(),
        }
    }
}

/// Split a document into one source per app. Accepts either a single app or `apps = [...]`.
fn parse_sources(contents: &str, format: Format) -> Result<Vec<SpecSource>> {
    let document: Value = match format {
        Format::Toml => toml::from_str(contents)
            .map_err(|e| LaunchError::config(format!("Failed to parse TOML: {}", e)))?,
        Format::Json => serde_json::from_str(contents)
            .map_err(|e| LaunchError::config(format!("Failed to parse JSON: {}", e)))?,
    };

    let Value::Object(mut top) = document else {
        return Err(LaunchError::config("top level must be a table/object"));
    };

    let sources = match top.remove("apps") {
        Some(apps) => {
            if !top.is_empty() {
                let keys: Vec<&String> = top.keys().collect();
                return Err(LaunchError::config(format!(
                    "unexpected top-level keys next to 'apps': {:?}",
                    keys
                )));
            }
            serde_json::from_value::<Vec<SpecSource>>(apps)
                .map_err(|e| LaunchError::config(format!("invalid apps list: {}", e)))?
        }
        None => vec![serde_json::from_value::<SpecSource>(Value::Object(top))
            .map_err(|e| LaunchError::config(format!("invalid app: {}", e)))?],
    };

    if sources.is_empty() {
        return Err(LaunchError::config("No app configuration found in file"));
    }

    Ok(sources)
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| LaunchError::config(format!("missing required field: {}", field)))
}

fn absolute_from_here(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Environment values may be written as strings, numbers or booleans
fn env_map(raw: &BTreeMap<String, Value>, label: &str) -> Result<EnvMap> {
    raw.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                other => {
                    return Err(LaunchError::config(format!(
                        "{}.{} must be a string, number or boolean (got {})",
                        label, key, other
                    )))
                }
            };
            Ok((key.clone(), value))
        })
        .collect()
}
