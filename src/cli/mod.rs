// CLI module - User-facing command-line interface

pub mod output;

use crate::config::{Format, LaunchSpec, LoadOptions};
use crate::error::Result;
use crate::host::{ForegroundHost, ManifestHost, Outcome, SupervisorHost};
use crate::plan::LaunchPlan;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Instant;

/// launchspec - validate and launch a supervised single-instance process
#[derive(Parser)]
#[command(name = "launchspec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that loads a launch specification
#[derive(Args, Debug, Clone)]
struct SpecArgs {
    /// Launch specification file (.toml or .json)
    config: PathBuf,

    /// App to use when the file declares several
    #[arg(short, long)]
    app: Option<String>,

    /// Working directory, overriding the file's cwd
    #[arg(long, env = "LAUNCHSPEC_CWD")]
    cwd: Option<PathBuf>,

    /// Do not expand $VAR references from the current environment
    #[arg(long)]
    no_expand: bool,
}

impl SpecArgs {
    fn load(&self) -> Result<LaunchSpec> {
        let options = LoadOptions {
            cwd_override: self.cwd.clone(),
            expand_env: !self.no_expand,
        };
        LaunchSpec::load(&self.config, &options, self.app.as_deref())
    }
}

#[derive(Args, Debug, Clone)]
struct ProfileArg {
    /// Environment profile to overlay on the base environment (e.g. production)
    #[arg(short, long, env = "LAUNCHSPEC_PROFILE")]
    profile: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Toml,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Toml => Format::Toml,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load the specification and resolve paths, interpreter and profile
    Validate {
        #[command(flatten)]
        spec: SpecArgs,
        #[command(flatten)]
        profile: ProfileArg,
    },

    /// Print the loaded specification in canonical form
    Show {
        #[command(flatten)]
        spec: SpecArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: OutputFormat,
    },

    /// Print the environment the process would receive
    Env {
        #[command(flatten)]
        spec: SpecArgs,
        #[command(flatten)]
        profile: ProfileArg,
    },

    /// Print the fully resolved launch plan as JSON
    Plan {
        #[command(flatten)]
        spec: SpecArgs,
        #[command(flatten)]
        profile: ProfileArg,
    },

    /// Run the process in the foreground until it exits or Ctrl-C
    Run {
        #[command(flatten)]
        spec: SpecArgs,
        #[command(flatten)]
        profile: ProfileArg,
    },

    /// Publish the resolved plan as a manifest for an external supervisor
    Publish {
        #[command(flatten)]
        spec: SpecArgs,
        #[command(flatten)]
        profile: ProfileArg,

        /// Directory receiving <name>.json
        #[arg(short, long, default_value = "manifests")]
        dir: PathBuf,
    },
}

impl Cli {
    /// Execute the parsed command. Returns the process exit code.
    pub async fn execute(self) -> Result<i32> {
        match self.command {
            Commands::Validate { spec, profile } => {
                let loaded = spec.load()?;
                let plan = LaunchPlan::prepare(&loaded, profile.profile.as_deref())?;
                output::print_summary(&loaded, Some(&plan));
                Ok(0)
            }

            Commands::Show { spec, format } => {
                let loaded = spec.load()?;
                print!("{}", loaded.to_format(format.into())?);
                Ok(0)
            }

            Commands::Env { spec, profile } => {
                let loaded = spec.load()?;
                let env = loaded.select_environment_profile(profile.profile.as_deref())?;
                output::print_env(&env);
                Ok(0)
            }

            Commands::Plan { spec, profile } => {
                let loaded = spec.load()?;
                let plan = LaunchPlan::prepare(&loaded, profile.profile.as_deref())?;
                let json = serde_json::to_string_pretty(&plan).map_err(|e| {
                    crate::error::LaunchError::SerializationError(format!("plan: {}", e))
                })?;
                println!("{}", json);
                Ok(0)
            }

            Commands::Run { spec, profile } => {
                let loaded = spec.load()?;
                let plan = LaunchPlan::prepare(&loaded, profile.profile.as_deref())?;
                run_foreground(&plan).await
            }

            Commands::Publish { spec, profile, dir } => {
                let loaded = spec.load()?;
                let plan = LaunchPlan::prepare(&loaded, profile.profile.as_deref())?;
                let host = ManifestHost::new(dir);
                let handle = host.launch(&plan).await?;
                output::print_launched(host.kind(), &handle);
                Ok(0)
            }
        }
    }
}

/// Hand the plan to the foreground host and wait, stopping on Ctrl-C
async fn run_foreground(plan: &LaunchPlan) -> Result<i32> {
    let host = ForegroundHost::new();
    let started = Instant::now();
    let mut handle = host.launch(plan).await?;
    output::print_launched(host.kind(), &handle);

    let outcome = tokio::select! {
        outcome = handle.wait() => outcome?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, stopping {}", plan.name);
            handle.stop().await?
        }
    };

    output::print_outcome(&plan.name, outcome, started.elapsed());

    Ok(match outcome {
        Outcome::Exited(Some(code)) => code,
        Outcome::Exited(None) => 1,
        Outcome::Detached => 0,
    })
}
