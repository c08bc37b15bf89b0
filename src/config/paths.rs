use crate::config::env;
use crate::error::{LaunchError, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Interpreter value meaning "execute the script itself"
pub const NO_INTERPRETER: &str = "none";

/// Whether a working-directory value is an unfilled deployment template
/// rather than a real location.
///
/// Recognised forms: `/path/to/...`, `<your-dir>`, anything containing
/// `CHANGE_ME`, and unexpanded `$VAR` / `${VAR}` references.
pub fn is_placeholder(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    let value = raw.trim();

    value == "/path/to"
        || value.starts_with("/path/to/")
        || (value.contains('<') && value.contains('>'))
        || value.to_ascii_uppercase().contains("CHANGE_ME")
        || env::has_unexpanded_var(value)
}

/// Join `path` onto `base` unless it is already absolute
pub fn anchor(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Resolve the working directory to a canonical absolute path
pub fn resolve_working_directory(cwd: &Path, origin: Option<&Path>) -> Result<PathBuf> {
    if cwd.as_os_str().is_empty() {
        return Err(LaunchError::path("working directory is empty"));
    }

    if is_placeholder(cwd) {
        return Err(LaunchError::path(format!(
            "working directory '{}' is an unfilled placeholder; set cwd in the config, pass --cwd or set LAUNCHSPEC_CWD",
            cwd.display()
        )));
    }

    let candidate = match origin {
        Some(base) => anchor(cwd, base),
        None => cwd.to_path_buf(),
    };

    if !candidate.exists() {
        return Err(LaunchError::path(format!(
            "working directory does not exist: {}",
            candidate.display()
        )));
    }

    if !candidate.is_dir() {
        return Err(LaunchError::path(format!(
            "working directory is not a directory: {}",
            candidate.display()
        )));
    }

    candidate.canonicalize().map_err(|e| {
        LaunchError::path(format!(
            "cannot resolve working directory {}: {}",
            candidate.display(),
            e
        ))
    })
}

/// Resolve the script against the (already resolved) working directory
pub fn resolve_script(script: &Path, cwd: &Path) -> Result<PathBuf> {
    let resolved = anchor(script, cwd);

    if !resolved.is_file() {
        return Err(LaunchError::path(format!(
            "script not found: {} (relative to {})",
            script.display(),
            cwd.display()
        )));
    }

    Ok(resolved)
}

/// Locate an interpreter on `PATH`.
///
/// Returns `None` when no interpreter is configured.
pub fn resolve_interpreter(interpreter: Option<&str>) -> Result<Option<PathBuf>> {
    let name = match interpreter.map(str::trim) {
        None => return Ok(None),
        Some(name) if name.is_empty() || name == NO_INTERPRETER => return Ok(None),
        Some(name) => name,
    };

    let search_path = std::env::var_os("PATH").unwrap_or_default();
    find_executable(OsStr::new(name), &search_path)
        .map(Some)
        .ok_or_else(|| {
            LaunchError::path(format!("interpreter '{}' was not found on PATH", name))
        })
}

/// Search `search_path` (a `PATH`-style list) for `name`.
/// Names containing a separator are checked directly.
pub fn find_executable(name: &OsStr, search_path: &OsStr) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.components().count() > 1 {
        return is_executable(direct).then(|| direct.to_path_buf());
    }

    std::env::split_paths(search_path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Per-instance log file name used when logs are not merged (`out.log` -> `out-0.log`)
pub fn instance_log_path(path: &Path, instance: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, instance, ext.to_string_lossy()),
        None => format!("{}-{}", stem, instance),
    };
    path.with_file_name(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_placeholder_forms() {
        assert!(is_placeholder(Path::new("/path/to/your/scraper")));
        assert!(is_placeholder(Path::new("<deploy dir>")));
        assert!(is_placeholder(Path::new("/srv/CHANGE_ME")));
        assert!(is_placeholder(Path::new("${DEPLOY_ROOT}/scraper")));
        assert!(!is_placeholder(Path::new("/srv/scraper")));
        assert!(!is_placeholder(Path::new("relative/dir")));
    }

    #[test]
    fn test_resolve_placeholder_is_path_error() {
        let result = resolve_working_directory(Path::new("/path/to/your/scraper"), None);
        assert!(matches!(result, Err(LaunchError::PathError(_))));
    }

    #[test]
    fn test_resolve_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let resolved = resolve_working_directory(temp_dir.path(), None).unwrap();
        assert!(resolved.is_absolute());
        assert_eq!(resolved, temp_dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_relative_against_origin() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("app")).unwrap();

        let resolved =
            resolve_working_directory(Path::new("app"), Some(temp_dir.path())).unwrap();
        assert_eq!(resolved, temp_dir.path().join("app").canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_missing_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");
        assert!(matches!(
            resolve_working_directory(&missing, None),
            Err(LaunchError::PathError(_))
        ));

        let file = temp_dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();
        assert!(matches!(
            resolve_working_directory(&file, None),
            Err(LaunchError::PathError(_))
        ));
    }

    #[test]
    fn test_resolve_script() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("scraper.py"), "print('hi')").unwrap();

        let script = resolve_script(Path::new("scraper.py"), temp_dir.path()).unwrap();
        assert_eq!(script, temp_dir.path().join("scraper.py"));

        assert!(matches!(
            resolve_script(Path::new("missing.py"), temp_dir.path()),
            Err(LaunchError::PathError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_on_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let bin = temp_dir.path().join("fakepy");
        fs::write(&bin, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&bin, fs::Permissions::from_mode(0o755)).unwrap();

        let not_exec = temp_dir.path().join("plain");
        fs::write(&not_exec, "").unwrap();

        let search = std::env::join_paths([temp_dir.path()]).unwrap();
        assert_eq!(find_executable(OsStr::new("fakepy"), &search), Some(bin));
        assert_eq!(find_executable(OsStr::new("plain"), &search), None);
        assert_eq!(find_executable(OsStr::new("absent"), &search), None);
    }

    #[test]
    fn test_no_interpreter() {
        assert_eq!(resolve_interpreter(None).unwrap(), None);
        assert_eq!(resolve_interpreter(Some("none")).unwrap(), None);
        assert!(matches!(
            resolve_interpreter(Some("definitely-not-an-interpreter-xyz")),
            Err(LaunchError::PathError(_))
        ));
    }

    #[test]
    fn test_instance_log_path() {
        assert_eq!(
            instance_log_path(Path::new("logs/out.log"), 0),
            PathBuf::from("logs/out-0.log")
        );
        assert_eq!(
            instance_log_path(Path::new("logs/combined"), 0),
            PathBuf::from("logs/combined-0")
        );
    }
}
