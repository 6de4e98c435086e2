//! Logging setup for the tunesmith binary.
//!
//! Two layers: stderr (warnings only, or the full filter with
//! `--verbose`) and a size-capped file under the tunesmith home. When
//! the file outgrows its cap it is archived under a timestamped name
//! and the oldest archives are deleted, keeping disk usage bounded
//! across long orchestrator runs.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "tunesmith=info,tunesmith_jobs=info,tunesmith_dataset=info";
const LOG_FILE_NAME: &str = "tunesmith.log";
const ARCHIVE_PREFIX: &str = "tunesmith-";
const MAX_ARCHIVES: usize = 4;
const ROLL_AT_BYTES: u64 = 8 * 1024 * 1024;

/// Initialize tracing with a size-capped log file and stderr output.
pub fn init_logging(verbose: bool) -> Result<()> {
    let dir = ensure_logs_dir()?;
    let sink = LogFile::open(&dir)
        .with_context(|| format!("Failed to open log file in {}", dir.display()))?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if verbose {
        file_filter.clone()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(sink))
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Get the Tunesmith home directory: ~/.tunesmith
pub fn tunesmith_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("TUNESMITH_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".tunesmith")
}

/// Get the logs directory: ~/.tunesmith/logs
pub fn logs_dir() -> PathBuf {
    tunesmith_home().join("logs")
}

/// Ensure the logs directory exists.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}

/// Append-only log file that archives itself once it passes the cap.
///
/// Shared across layers as `Mutex<LogFile>`; tracing-subscriber's
/// blanket `MakeWriter` impl for mutexed writers handles the locking.
struct LogFile {
    dir: PathBuf,
    file: File,
    written: u64,
    roll_at: u64,
}

impl LogFile {
    fn open(dir: &Path) -> io::Result<Self> {
        Self::with_roll_at(dir, ROLL_AT_BYTES)
    }

    fn with_roll_at(dir: &Path, roll_at: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE_NAME))?;
        let written = file.metadata()?.len();
        Ok(Self {
            dir: dir.to_path_buf(),
            file,
            written,
            roll_at,
        })
    }

    /// Move the current file aside under a timestamped archive name,
    /// drop archives beyond the retention count, and start fresh.
    fn roll(&mut self) -> io::Result<()> {
        self.file.flush()?;
        fs::rename(self.dir.join(LOG_FILE_NAME), next_archive_path(&self.dir)?)?;
        prune_archives(&self.dir)?;

        let fresh = Self::with_roll_at(&self.dir, self.roll_at)?;
        self.file = fresh.file;
        self.written = 0;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written + buf.len() as u64 > self.roll_at {
            self.roll()?;
        }
        let bytes = self.file.write(buf)?;
        self.written += bytes as u64;
        Ok(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Archive name for the current roll: `tunesmith-<unix seconds>.log`,
/// with a counter suffix when several rolls land in the same second.
fn next_archive_path(dir: &Path) -> io::Result<PathBuf> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?
        .as_secs();

    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{}{}.log", ARCHIVE_PREFIX, secs)
        } else {
            format!("{}{}-{}.log", ARCHIVE_PREFIX, secs, attempt)
        };
        let path = dir.join(name);
        if !path.exists() {
            return Ok(path);
        }
        attempt += 1;
    }
}

/// Delete the oldest archives until at most `MAX_ARCHIVES` remain.
fn prune_archives(dir: &Path) -> io::Result<()> {
    let mut archives: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(ARCHIVE_PREFIX) && name.ends_with(".log") {
            archives.push((entry.metadata()?.modified()?, entry.path()));
        }
    }

    archives.sort_by_key(|(modified, _)| *modified);
    while archives.len() > MAX_ARCHIVES {
        let (_, path) = archives.remove(0);
        fs::remove_file(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_roll_archives_current_file_and_starts_fresh() {
        let temp = TempDir::new().unwrap();
        let mut sink = LogFile::with_roll_at(temp.path(), 48).unwrap();

        sink.write_all(&[b'a'; 40]).unwrap();
        // This write crosses the cap: the first 40 bytes get archived.
        sink.write_all(&[b'b'; 40]).unwrap();
        sink.flush().unwrap();

        let names = log_files(temp.path());
        assert!(names.contains(&LOG_FILE_NAME.to_string()));
        assert_eq!(names.len(), 2, "expected one archive, got {:?}", names);

        let current = fs::read(temp.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(current, vec![b'b'; 40]);
    }

    #[test]
    fn test_same_second_rolls_get_distinct_archive_names() {
        let temp = TempDir::new().unwrap();
        let mut sink = LogFile::with_roll_at(temp.path(), 8).unwrap();

        for _ in 0..4 {
            sink.write_all(&[b'x'; 6]).unwrap();
        }
        sink.flush().unwrap();

        // Three rolls happened back to back; none overwrote another.
        let names = log_files(temp.path());
        assert_eq!(names.len(), 4, "expected 3 archives + current, got {:?}", names);
    }

    #[test]
    fn test_prune_keeps_retention_count() {
        let temp = TempDir::new().unwrap();
        for i in 0..(MAX_ARCHIVES + 3) {
            fs::write(
                temp.path().join(format!("{}100{}.log", ARCHIVE_PREFIX, i)),
                b"old",
            )
            .unwrap();
        }
        // Unrelated files are left alone.
        fs::write(temp.path().join(LOG_FILE_NAME), b"current").unwrap();

        prune_archives(temp.path()).unwrap();

        let names = log_files(temp.path());
        let archives = names.iter().filter(|n| n.starts_with(ARCHIVE_PREFIX)).count();
        assert_eq!(archives, MAX_ARCHIVES);
        assert!(names.contains(&LOG_FILE_NAME.to_string()));
    }
}
