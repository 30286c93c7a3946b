/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1
  ------------------------------------------------------------
  Purpose:
    Session log for one drive-preparation run. Every audit,
    plan and transfer reports through it, and the closing
    summary tells the operator whether the run degraded
    (unreachable mirror directories, ambiguous drive files,
    failed transfers) before the drive is unplugged.

  Security / Safety Notes:
    Log payloads contain mirror URLs and drive filenames only.

  Dependencies:
    std::fs::File, std::sync::Mutex, sha2 for integrity hashing.

  Operational Scope:
    One logger per CLI invocation; a menu session keeps the
    same file across every refresh cycle.

  Revision History:
    2025-11-12 COD  Carried Syn-Syu-Core logger into Prep-Disk.
    2025-11-19 COD  Added degraded-session accounting.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Graceful error propagation on I/O failures
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{PrepError, Result};

/// Structured log level for Prep-Disk-Core events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Append-only session log in Synavera format.
///
/// WARN and ERROR always reach stderr; INFO and DEBUG only with `--verbose`.
pub struct Logger {
    file: Option<Mutex<BufWriter<File>>>,
    path: Option<PathBuf>,
    verbose: bool,
    warnings: AtomicUsize,
    errors: AtomicUsize,
}

impl Logger {
    /// Build a logger that writes to stderr and optionally to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let file = if let Some(ref file_path) = path {
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    PrepError::Filesystem(format!(
                        "Failed to create log directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|err| {
                    PrepError::Filesystem(format!(
                        "Failed to open log file {}: {err}",
                        file_path.display()
                    ))
                })?;
            Some(Mutex::new(BufWriter::new(file)))
        } else {
            None
        };

        Ok(Self {
            file,
            path,
            verbose,
            warnings: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    /// Logger with no file sink and no stderr echo below WARN.
    #[cfg(test)]
    pub fn quiet() -> Self {
        Self {
            file: None,
            path: None,
            verbose: false,
            warnings: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        match level {
            LogLevel::Warn => {
                self.warnings.fetch_add(1, Ordering::Relaxed);
            }
            LogLevel::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
            LogLevel::Info | LogLevel::Debug => {}
        }
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!(
            "{timestamp} [{}] [{}] {}",
            level.as_str(),
            code,
            message.as_ref()
        );

        if self.verbose || level == LogLevel::Error || level == LogLevel::Warn {
            eprintln!("{payload}");
        }

        if let Some(file) = &self.file {
            if let Ok(mut guard) = file.lock() {
                if writeln!(guard, "{payload}").is_err() {
                    eprintln!(
                        "{} [{}] [LOGGER] Failed to write to log file",
                        timestamp,
                        LogLevel::Error.as_str()
                    );
                }
                if guard.flush().is_err() {
                    eprintln!(
                        "{} [{}] [LOGGER] Failed to flush log writer",
                        timestamp,
                        LogLevel::Warn.as_str()
                    );
                }
            }
        }
    }

    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Warning and error counts so far.
    pub fn tally(&self) -> (usize, usize) {
        (
            self.warnings.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }

    /// Close the session: record the degraded/clean summary, then write the
    /// SHA-256 digest of the log file to `<log>.hash`.
    pub fn finalize(&self) -> Result<()> {
        let (warnings, errors) = self.tally();
        let verdict = if warnings + errors == 0 { "clean" } else { "degraded" };
        self.info(
            "SESSION",
            format!("{verdict}: {warnings} warnings, {errors} errors"),
        );

        if let Some(path) = self.path() {
            if let Some(file) = &self.file {
                if let Ok(mut guard) = file.lock() {
                    let _ = guard.flush();
                }
            }
            let data = std::fs::read(path).map_err(|err| {
                PrepError::Filesystem(format!(
                    "Failed to read log for hashing {}: {err}",
                    path.display()
                ))
            })?;
            let digest = Sha256::digest(&data);
            let mut hash_os = path.as_os_str().to_os_string();
            hash_os.push(".hash");
            let hash_path = PathBuf::from(hash_os);
            let mut file = File::create(&hash_path).map_err(|err| {
                PrepError::Filesystem(format!(
                    "Failed to create hash file {}: {err}",
                    hash_path.display()
                ))
            })?;
            writeln!(
                file,
                "{:x}  {}",
                digest,
                path.file_name().unwrap_or_default().to_string_lossy()
            )
            .map_err(|err| {
                PrepError::Filesystem(format!(
                    "Failed to write hash file {}: {err}",
                    hash_path.display()
                ))
            })?;
        }
        Ok(())
    }
}
