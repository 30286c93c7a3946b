/*============================================================
  Synavera Project: Prep-Disk
  Module: prepdisk_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Prep-Disk-Core error types so configuration,
    mirror, transfer and filesystem failures share consistent
    diagnostics and exit semantics.

  Security / Safety Notes:
    Error contexts carry mirror URLs and drive paths only; no
    credentials are ever part of the payload.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate failures. Mirror failures
    are recovered inside the audit; only configuration errors
    are fatal for a session.

  Revision History:
    2025-11-12 COD  Derived taxonomy from Syn-Syu-Core errors.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

/// Result alias for Prep-Disk-Core operations.
pub type Result<T> = std::result::Result<T, PrepError>;

/// Enumerates high-level error domains surfaced by Prep-Disk-Core.
#[derive(Debug, Error)]
pub enum PrepError {
    #[error("Configuration file {} not found (run `init-config` to create one)", path.display())]
    ConfigMissing { path: PathBuf },
    #[error("Configuration file {} is malformed: {reason}", path.display())]
    ConfigMalformed { path: PathBuf, reason: String },
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Mirror listing {url} unavailable: {reason}")]
    MirrorUnavailable { url: String, reason: String },
    #[error("Network: {0}")]
    Network(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Transfer of {url} failed: {reason}")]
    TransferFailed { url: String, reason: String },
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error("No catalog entry with identifier {0}")]
    UnknownEntry(u32),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PrepError {
    /// Map error category to a deterministic exit code.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            PrepError::ConfigMissing { .. } => ExitCode::from(20),
            PrepError::ConfigMalformed { .. } => ExitCode::from(21),
            PrepError::Config(_) => ExitCode::from(22),
            PrepError::MirrorUnavailable { .. } => ExitCode::from(30),
            PrepError::Network(_) => ExitCode::from(31),
            PrepError::Serialization(_) => ExitCode::from(32),
            PrepError::TransferFailed { .. } => ExitCode::from(33),
            PrepError::Filesystem(_) => ExitCode::from(40),
            PrepError::Io(_) => ExitCode::from(41),
            PrepError::Runtime(_) => ExitCode::from(50),
            PrepError::UnknownEntry(_) => ExitCode::from(60),
        }
    }
}
