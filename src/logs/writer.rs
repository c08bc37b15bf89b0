use crate::error::{LaunchError, Result};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;

/// Which output stream of the child a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Log destinations after path resolution
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LogFiles {
    pub out_file: PathBuf,
    pub error_file: PathBuf,
    pub log_file: PathBuf,
    /// strftime pattern, present when lines are timestamped
    pub timestamp_format: Option<String>,
}

/// Translate a moment.js style date pattern (`YYYY-MM-DD HH:mm:ss Z`) into
/// strftime. Patterns that already contain `%` are returned unchanged.
pub fn strftime_pattern(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }

    // Longest tokens first so `YYYY` wins over `YY`
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("SSS", "%3f"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("ZZ", "%z"),
        ("Z", "%:z"),
        ("A", "%p"),
    ];

    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;
    'scan: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

/// Check that a strftime pattern only uses known specifiers
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(LaunchError::ConfigurationError(format!(
            "invalid log_date_format '{}'",
            pattern
        )));
    }
    Ok(())
}

/// Build one log entry, prefixed with a timestamp when `pattern` is set
pub fn format_entry(
    timestamp: &DateTime<Local>,
    pattern: Option<&str>,
    line: &[u8],
) -> Result<Vec<u8>> {
    let mut entry = Vec::with_capacity(line.len() + 32);

    if let Some(pattern) = pattern {
        let mut stamp = String::new();
        write!(stamp, "{}", timestamp.format_with_items(StrftimeItems::new(pattern)))
            .map_err(|_| LaunchError::LogError(format!("cannot format timestamp with '{}'", pattern)))?;
        entry.extend_from_slice(stamp.as_bytes());
        entry.extend_from_slice(b": ");
    }

    entry.extend_from_slice(line);
    if !line.ends_with(b"\n") {
        entry.push(b'\n');
    }
    Ok(entry)
}

/// Writes the child's output to its out/error files and the combined file.
/// All three are opened in append mode and never truncated or rotated.
#[derive(Debug)]
pub struct LogSink {
    out: TokioFile,
    err: TokioFile,
    combined: TokioFile,
    timestamp_format: Option<String>,
}

impl LogSink {
    /// Open (creating if needed) the three log files. Parent directories must exist.
    pub async fn open(files: &LogFiles) -> Result<Self> {
        if let Some(pattern) = &files.timestamp_format {
            validate_pattern(pattern)?;
        }

        Ok(Self {
            out: open_append(&files.out_file)?,
            err: open_append(&files.error_file)?,
            combined: open_append(&files.log_file)?,
            timestamp_format: files.timestamp_format.clone(),
        })
    }

    /// Append one line to the stream's file and to the combined file
    pub async fn write_line(&mut self, stream: Stream, line: &[u8]) -> Result<()> {
        let entry = format_entry(&Local::now(), self.timestamp_format.as_deref(), line)?;

        let target = match stream {
            Stream::Stdout => &mut self.out,
            Stream::Stderr => &mut self.err,
        };
        write_all(target, &entry).await?;
        write_all(&mut self.combined, &entry).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        for file in [&mut self.out, &mut self.err, &mut self.combined] {
            file.flush()
                .await
                .map_err(|e| LaunchError::LogError(format!("Failed to flush log: {}", e)))?;
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<TokioFile> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| {
            LaunchError::LogError(format!("Failed to open log {}: {}", path.display(), e))
        })?;
    Ok(TokioFile::from_std(file))
}

async fn write_all(file: &mut TokioFile, entry: &[u8]) -> Result<()> {
    file.write_all(entry)
        .await
        .map_err(|e| LaunchError::LogError(format!("Failed to write to log: {}", e)))?;
    file.flush()
        .await
        .map_err(|e| LaunchError::LogError(format!("Failed to flush log: {}", e)))
}
