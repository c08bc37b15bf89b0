// Output formatting and display for CLI

use crate::config::units::{format_byte_size, format_duration};
use crate::config::{EnvMap, LaunchSpec};
use crate::host::{HostHandle, Outcome};
use crate::plan::LaunchPlan;
use colored::*;
use std::time::Duration;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn row(field: &str, value: impl Into<String>) -> FieldRow {
    FieldRow {
        field: field.to_string(),
        value: value.into(),
    }
}

/// Print the validated specification, plus its resolved plan when available
pub fn print_summary(spec: &LaunchSpec, plan: Option<&LaunchPlan>) {
    println!("{}", "✓ Launch specification is valid".green().bold());

    let mut rows = vec![
        row("name", spec.name.cyan().to_string()),
        row("script", spec.script.display().to_string()),
        row(
            "interpreter",
            spec.interpreter.clone().unwrap_or_else(|| "-".to_string()),
        ),
        row("cwd", spec.cwd.display().to_string()),
        row("instances", spec.instances.to_string()),
        row("autorestart", spec.restart.autorestart.to_string()),
        row(
            "max_memory_restart",
            spec.max_memory_restart
                .map(format_byte_size)
                .unwrap_or_else(|| "-".to_string()),
        ),
        row("restart_delay", format_duration(spec.restart.restart_delay)),
        row("max_restarts", spec.restart.max_restarts.to_string()),
        row("min_uptime", format_duration(spec.restart.min_uptime)),
        row("kill_timeout", format_duration(spec.kill_timeout)),
        row("listen_timeout", format_duration(spec.listen_timeout)),
        row("profiles", join_or_dash(&spec.profile_names())),
    ];

    if let Some(plan) = plan {
        rows.push(row("command", plan.command_line()));
        rows.push(row("resolved cwd", plan.cwd.display().to_string()));
        rows.push(row("out_file", plan.logs.out_file.display().to_string()));
        rows.push(row("error_file", plan.logs.error_file.display().to_string()));
        rows.push(row("log_file", plan.logs.log_file.display().to_string()));
        if let Some(profile) = &plan.profile {
            rows.push(row("profile", profile.clone()));
        }
    }

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));

    println!("\n{}\n", table);
}

/// Print an environment as `KEY=VALUE` lines
pub fn print_env(env: &EnvMap) {
    for (key, value) in env {
        println!("{}={}", key, value);
    }
}

/// Report a successful hand-off
pub fn print_launched(kind: &str, handle: &HostHandle) {
    println!(
        "{}",
        format!("✓ {} handed to {} host", handle.name(), kind)
            .green()
            .bold()
    );
    if let Some(pid) = handle.pid() {
        println!("  {}: {}", "PID".bold(), pid);
    }
    if let Some(path) = handle.manifest_path() {
        println!("  {}: {}", "Manifest".bold(), path.display());
    }
}

/// Report how a foreground run ended
pub fn print_outcome(name: &str, outcome: Outcome, elapsed: Duration) {
    match outcome {
        Outcome::Exited(Some(0)) => println!(
            "{} {} exited cleanly after {}",
            "✓".green().bold(),
            name,
            format_elapsed(elapsed)
        ),
        Outcome::Exited(Some(code)) => println!(
            "{} {} exited with code {} after {}",
            "✗".red().bold(),
            name,
            code,
            format_elapsed(elapsed)
        ),
        Outcome::Exited(None) => println!(
            "{} {} was terminated by a signal after {}",
            "✗".yellow().bold(),
            name,
            format_elapsed(elapsed)
        ),
        Outcome::Detached => println!("{} {} is owned by its supervisor", "ℹ".blue().bold(), name),
    }
}

/// Print an error message to stderr
pub fn print_error(error: &str) {
    eprintln!("{} {}", "✗ Error:".red().bold(), error);
}

fn join_or_dash(items: &[&str]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

/// Format a wall-clock duration in human-readable format
fn format_elapsed(duration: Duration) -> String {
    let secs = duration.as_secs();

    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        let secs = secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
