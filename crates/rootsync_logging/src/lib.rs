//! Logging setup shared by rootsync binaries.
//!
//! Installs a `tracing` subscriber with two sinks: a size-rotated log file
//! under the rootsync home directory and stderr.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "rootsync=info";
const QUIET_CONSOLE_FILTER: &str = "rootsync=warn";
const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Environment variable overriding the rootsync home directory.
pub const HOME_ENV: &str = "ROOTSYNC_HOME";

/// Logging configuration for a rootsync binary.
pub struct LogConfig<'a> {
    /// Base name of the log file (`<app_name>.log`).
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only.
    pub verbose: bool,
    /// Directory for log files. Defaults to [`logs_dir`].
    pub log_dir: Option<PathBuf>,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// `RUST_LOG` overrides the file filter; stderr follows it only in verbose mode.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir {
        Some(dir) => dir,
        None => logs_dir()?,
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_writer = SharedRollingWriter::open(&log_dir, config.app_name)?;

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.clone()
    } else {
        EnvFilter::new(QUIET_CONSOLE_FILTER)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))?;

    Ok(())
}

/// The rootsync home directory: `$ROOTSYNC_HOME` or `~/.rootsync`.
pub fn rootsync_home() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(override_path));
    }
    dirs::home_dir()
        .map(|home| home.join(".rootsync"))
        .ok_or_else(|| anyhow!("Could not determine home directory; set {HOME_ENV}"))
}

/// The logs directory: `<home>/logs`.
pub fn logs_dir() -> Result<PathBuf> {
    Ok(rootsync_home()?.join("logs"))
}

/// Append-only log file that rolls over to `<name>.log.N` once it exceeds `max_size`.
struct RollingFileAppender {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl RollingFileAppender {
    fn open(dir: &Path, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        let mut appender = Self {
            dir: dir.to_path_buf(),
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            written: 0,
        };
        appender.reopen()?;
        if appender.written > appender.max_size {
            appender.roll()?;
        }
        Ok(appender)
    }

    fn active_path(&self) -> PathBuf {
        self.dir.join(format!("{}.log", self.base_name))
    }

    fn archive_path(&self, generation: usize) -> PathBuf {
        self.dir.join(format!("{}.log.{}", self.base_name, generation))
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.active_path())?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    /// Shift archives up one generation, dropping the oldest, then start a fresh active file.
    fn roll(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }

        let oldest = self.max_files.saturating_sub(1);
        if oldest > 0 {
            let last = self.archive_path(oldest);
            if last.exists() {
                fs::remove_file(&last)?;
            }
            for generation in (1..oldest).rev() {
                let from = self.archive_path(generation);
                if from.exists() {
                    fs::rename(&from, self.archive_path(generation + 1))?;
                }
            }
            let active = self.active_path();
            if active.exists() {
                fs::rename(&active, self.archive_path(1))?;
            }
        } else {
            // Single-file mode: truncate in place.
            File::create(self.active_path())?;
        }

        self.reopen()
    }
}

impl Write for RollingFileAppender {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.roll()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// `MakeWriter` handle sharing one appender across subscriber layers and threads.
#[derive(Clone)]
struct SharedRollingWriter {
    inner: Arc<Mutex<RollingFileAppender>>,
}

impl SharedRollingWriter {
    fn open(dir: &Path, app_name: &str) -> Result<Self> {
        let appender = RollingFileAppender::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file for {app_name}"))?;
        Ok(Self {
            inner: Arc::new(Mutex::new(appender)),
        })
    }

    fn with_appender<T>(
        &self,
        f: impl FnOnce(&mut RollingFileAppender) -> io::Result<T>,
    ) -> io::Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?;
        f(&mut *guard)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_appender(|appender| appender.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_appender(|appender| appender.flush())
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
