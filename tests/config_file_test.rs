// Integration test for launch specification files

use launchspec::config::{Format, LaunchSpec, LoadOptions};
use launchspec::error::LaunchError;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

const ECOSYSTEM_JSON: &str = r#"
{
    "name": "plaza-scraper",
    "script": "scraper.py",
    "interpreter": "python3",
    "cwd": "/path/to/your/scraper",
    "instances": 1,
    "autorestart": true,
    "watch": false,
    "max_memory_restart": "1G",
    "env": {
        "NODE_ENV": "production"
    },
    "error_file": "./logs/err.log",
    "out_file": "./logs/out.log",
    "log_file": "./logs/combined.log",
    "time": true,
    "log_date_format": "YYYY-MM-DD HH:mm:ss Z",
    "merge_logs": true,
    "restart_delay": 4000,
    "max_restarts": 10,
    "min_uptime": "10s",
    "pmx": true,
    "kill_timeout": 1600,
    "listen_timeout": 3000,
    "env_production": {
        "NODE_ENV": "production"
    }
}
"#;

fn write(dir: &TempDir, file: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(file);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_ecosystem_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "ecosystem.json", ECOSYSTEM_JSON);

    let spec = LaunchSpec::load(&path, &LoadOptions::default(), None).unwrap();

    assert_eq!(spec.name, "plaza-scraper");
    assert_eq!(spec.script, PathBuf::from("scraper.py"));
    assert_eq!(spec.interpreter.as_deref(), Some("python3"));
    assert_eq!(spec.instances, 1);
    assert_eq!(spec.max_memory_restart, Some(1_073_741_824));
    assert_eq!(spec.restart.restart_delay, Duration::from_millis(4000));
    assert_eq!(spec.restart.max_restarts, 10);
    assert_eq!(spec.restart.min_uptime, Duration::from_secs(10));
    assert_eq!(spec.kill_timeout, Duration::from_millis(1600));
    assert_eq!(spec.listen_timeout, Duration::from_millis(3000));
    assert_eq!(spec.profile_names(), vec!["production"]);
}

#[test]
fn test_placeholder_cwd_loads_but_does_not_resolve() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "ecosystem.json", ECOSYSTEM_JSON);

    let spec = LaunchSpec::load(&path, &LoadOptions::default(), None).unwrap();
    assert!(matches!(
        spec.resolve_working_directory(),
        Err(LaunchError::PathError(_))
    ));
}

#[test]
fn test_cwd_override_replaces_placeholder() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "ecosystem.json", ECOSYSTEM_JSON);
    let deploy_dir = TempDir::new().unwrap();

    let options = LoadOptions {
        cwd_override: Some(deploy_dir.path().to_path_buf()),
        ..LoadOptions::default()
    };
    let spec = LaunchSpec::load(&path, &options, None).unwrap();

    assert_eq!(
        spec.resolve_working_directory().unwrap(),
        deploy_dir.path().canonicalize().unwrap()
    );
}

#[test]
fn test_round_trip_keeps_example_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        &temp_dir,
        "app.toml",
        r#"
        name = "plaza-scraper"
        script = "scraper.py"
        cwd = "/srv/scraper"
        instances = 1
        max_restarts = 10
        min_uptime = "10s"
    "#,
    );

    let spec = LaunchSpec::load(&path, &LoadOptions::default(), None).unwrap();

    for format in [Format::Toml, Format::Json] {
        let rendered = spec.to_format(format).unwrap();
        let file = match format {
            Format::Toml => "rendered.toml",
            Format::Json => "rendered.json",
        };
        let reloaded_path = write(&temp_dir, file, &rendered);
        let reloaded = LaunchSpec::load(&reloaded_path, &LoadOptions::default(), None).unwrap();

        assert_eq!(reloaded.name, "plaza-scraper");
        assert_eq!(reloaded.script, PathBuf::from("scraper.py"));
        assert_eq!(reloaded.instances, 1);
        assert_eq!(reloaded.restart.max_restarts, 10);
        assert_eq!(reloaded.restart.min_uptime, Duration::from_secs(10));
        assert_eq!(reloaded, spec);
    }
}

#[test]
fn test_rendered_toml_uses_readable_units() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "ecosystem.json", ECOSYSTEM_JSON);
    let spec = LaunchSpec::load(&path, &LoadOptions::default(), None).unwrap();

    let rendered = spec.to_toml().unwrap();
    assert!(rendered.contains("max_memory_restart = \"1G\""));
    assert!(rendered.contains("min_uptime = \"10s\""));
    assert!(rendered.contains("restart_delay = \"4s\""));
    assert!(rendered.contains("[profiles.production]"));
}

#[test]
fn test_memory_units() {
    let temp_dir = TempDir::new().unwrap();
    let base = "name = \"a\"\nscript = \"a.sh\"\ncwd = \"/srv\"\n";

    let path = write(&temp_dir, "half.toml", &format!("{}max_memory_restart = \"512M\"", base));
    let spec = LaunchSpec::load(&path, &LoadOptions::default(), None).unwrap();
    assert_eq!(spec.max_memory_restart, Some(512 * 1024 * 1024));

    let path = write(&temp_dir, "bad.toml", &format!("{}max_memory_restart = \"1Q\"", base));
    assert!(matches!(
        LaunchSpec::load(&path, &LoadOptions::default(), None),
        Err(LaunchError::ConfigurationError(_))
    ));
}

#[test]
fn test_missing_required_fields_in_file() {
    let temp_dir = TempDir::new().unwrap();

    for (file, contents) in [
        ("no-name.json", r#"{"script": "a.sh", "cwd": "/srv"}"#),
        ("no-script.json", r#"{"name": "a", "cwd": "/srv"}"#),
        ("no-cwd.json", r#"{"name": "a", "script": "a.sh"}"#),
    ] {
        let path = write(&temp_dir, file, contents);
        assert!(
            matches!(
                LaunchSpec::load(&path, &LoadOptions::default(), None),
                Err(LaunchError::ConfigurationError(_))
            ),
            "{} should fail",
            file
        );
    }
}

#[test]
fn test_malformed_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(&temp_dir, "broken.json", "{ not json");
    assert!(matches!(
        LaunchSpec::load(&path, &LoadOptions::default(), None),
        Err(LaunchError::ConfigurationError(_))
    ));

    let missing = temp_dir.path().join("missing.toml");
    assert!(matches!(
        LaunchSpec::load(&missing, &LoadOptions::default(), None),
        Err(LaunchError::ConfigurationError(_))
    ));
}

#[test]
fn test_select_app_by_name() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        &temp_dir,
        "apps.toml",
        r#"
        [[apps]]
        name = "scraper"
        script = "scraper.py"
        cwd = "/srv/scraper"

        [[apps]]
        name = "notifier"
        script = "notify.py"
        cwd = "/srv/notifier"
    "#,
    );

    let all = LaunchSpec::from_file(&path, &LoadOptions::default()).unwrap();
    assert_eq!(all.len(), 2);

    let notifier = LaunchSpec::load(&path, &LoadOptions::default(), Some("notifier")).unwrap();
    assert_eq!(notifier.script, PathBuf::from("notify.py"));

    assert!(matches!(
        LaunchSpec::load(&path, &LoadOptions::default(), None),
        Err(LaunchError::ConfigurationError(_))
    ));
}

#[test]
fn test_profile_overlay_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write(
        &temp_dir,
        "profiles.toml",
        r#"
        name = "scraper"
        script = "scraper.py"
        cwd = "/srv"

        [env]
        NODE_ENV = "development"
        CHECK_INTERVAL = "300"

        [profiles.production]
        NODE_ENV = "production"
    "#,
    );
    let spec = LaunchSpec::load(&path, &LoadOptions::default(), None).unwrap();

    let env = spec.select_environment_profile(Some("production")).unwrap();
    assert_eq!(env.get("NODE_ENV").map(String::as_str), Some("production"));
    assert_eq!(env.get("CHECK_INTERVAL").map(String::as_str), Some("300"));

    assert!(matches!(
        spec.select_environment_profile(Some("staging")),
        Err(LaunchError::ProfileNotFound(_))
    ));
}
