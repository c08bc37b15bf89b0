#![cfg(unix)]

use launchspec::config::{Format, LaunchSpec, LoadOptions};
use launchspec::host::{ForegroundHost, Outcome, SupervisorHost};
use launchspec::plan::LaunchPlan;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Write `body` as run.sh in `dir` and build a plan that runs it with sh
fn plan_for(dir: &Path, body: &str, extra: &str, profile: Option<&str>) -> LaunchPlan {
    fs::write(dir.join("run.sh"), body).unwrap();

    let contents = format!(
        "name = \"test-app\"\nscript = \"run.sh\"\ninterpreter = \"sh\"\ncwd = \"{}\"\n{}",
        dir.display(),
        extra
    );
    let spec = LaunchSpec::from_str_with(&contents, Format::Toml, &LoadOptions::default(), None)
        .unwrap()
        .remove(0);

    LaunchPlan::prepare(&spec, profile).unwrap()
}

#[tokio::test]
async fn test_run_to_completion_writes_logs() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(
        temp_dir.path(),
        "echo hello\necho problem >&2\nexit 3\n",
        "",
        None,
    );

    let host = ForegroundHost::new();
    let mut handle = host.launch(&plan).await.unwrap();
    assert!(handle.pid().is_some());
    assert!(handle.manifest_path().is_none());

    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome, Outcome::Exited(Some(3)));

    let out = fs::read_to_string(&plan.logs.out_file).unwrap();
    let err = fs::read_to_string(&plan.logs.error_file).unwrap();
    let combined = fs::read_to_string(&plan.logs.log_file).unwrap();

    assert_eq!(out, "hello\n");
    assert_eq!(err, "problem\n");
    assert!(combined.contains("hello\n"));
    assert!(combined.contains("problem\n"));

    // A second wait returns the same outcome
    assert_eq!(handle.wait().await.unwrap(), outcome);
}

#[tokio::test]
async fn test_logs_are_appended_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(temp_dir.path(), "echo run\n", "", None);
    let host = ForegroundHost::new();

    for _ in 0..2 {
        let mut handle = host.launch(&plan).await.unwrap();
        assert_eq!(handle.wait().await.unwrap(), Outcome::Exited(Some(0)));
    }

    let out = fs::read_to_string(&plan.logs.out_file).unwrap();
    assert_eq!(out, "run\nrun\n");
}

#[tokio::test]
async fn test_profile_environment_reaches_child() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(
        temp_dir.path(),
        "echo \"$NODE_ENV $BASE_ONLY $LAUNCHSPEC_PROFILE\"\n",
        "[env]\nNODE_ENV = \"development\"\nBASE_ONLY = \"kept\"\n\n[env_production]\nNODE_ENV = \"production\"\n",
        Some("production"),
    );

    let mut handle = ForegroundHost::new().launch(&plan).await.unwrap();
    handle.wait().await.unwrap();

    let out = fs::read_to_string(&plan.logs.out_file).unwrap();
    assert_eq!(out, "production kept production\n");
}

#[tokio::test]
async fn test_child_runs_in_working_directory() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(temp_dir.path(), "pwd -P\n", "", None);

    let mut handle = ForegroundHost::new().launch(&plan).await.unwrap();
    handle.wait().await.unwrap();

    let out = fs::read_to_string(&plan.logs.out_file).unwrap();
    assert_eq!(out.trim_end(), plan.cwd.display().to_string());
}

#[tokio::test]
async fn test_timestamped_lines() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(
        temp_dir.path(),
        "echo stamped\n",
        "time = true\nlog_date_format = \"YYYY\"\n",
        None,
    );

    let mut handle = ForegroundHost::new().launch(&plan).await.unwrap();
    handle.wait().await.unwrap();

    let out = fs::read_to_string(&plan.logs.out_file).unwrap();
    let (year, rest) = out.split_once(": ").unwrap();
    assert_eq!(year.len(), 4);
    assert!(year.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(rest, "stamped\n");
}

#[tokio::test]
async fn test_stop_with_sigterm() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(temp_dir.path(), "exec sleep 30\n", "kill_timeout = \"5s\"\n", None);

    let mut handle = ForegroundHost::new().launch(&plan).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let outcome = handle.stop().await.unwrap();

    assert_eq!(outcome, Outcome::Exited(None));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_escalates_to_sigkill_after_kill_timeout() {
    let temp_dir = TempDir::new().unwrap();
    let plan = plan_for(
        temp_dir.path(),
        "trap '' TERM\nwhile true; do sleep 0.1; done\n",
        "kill_timeout = 300\n",
        None,
    );

    let mut handle = ForegroundHost::new().launch(&plan).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let started = Instant::now();
    let outcome = handle.stop().await.unwrap();

    assert_eq!(outcome, Outcome::Exited(None));
    assert!(started.elapsed() >= Duration::from_millis(300));
}
