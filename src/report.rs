// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation report.
//!
//! Append-only forensic trail of everything a run does. Messages carry a level
//! and free text. Every level except [`Level::Debug`] is mirrored to the
//! interactive output through [`tracing`], and every level is appended to the
//! persistent install log with a timestamp. The report is never read back by
//! oxisetup itself. It exists so a human can figure out what happened after
//! the fact.

use chrono::Local;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{error, info, warn};

/// Severity of a report message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

impl Level {
    /// Tag written in front of each persisted line.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }

    /// Whether messages of this level reach the interactive output.
    pub fn is_interactive(&self) -> bool {
        !matches!(self, Self::Debug)
    }
}

impl Display for Level {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.tag())
    }
}

/// Append-only installation report.
#[derive(Debug)]
pub struct Report {
    log_path: PathBuf,
    file: File,
}

impl Report {
    /// Open install log for appending.
    ///
    /// Creates the log file and its parent directories if missing. Existing
    /// content is kept, so the log accumulates across runs.
    ///
    /// # Errors
    ///
    /// - Return [`ReportError::CreateLogDir`] if parent directory cannot be
    ///   created.
    /// - Return [`ReportError::OpenLog`] if log file cannot be opened.
    pub fn open(log_path: impl Into<PathBuf>) -> Result<Self> {
        let log_path = log_path.into();
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(|err| ReportError::CreateLogDir {
                source: err,
                path: parent.to_path_buf(),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|err| ReportError::OpenLog {
                source: err,
                path: log_path.clone(),
            })?;

        Ok(Self { log_path, file })
    }

    /// Path to persistent install log.
    pub fn log_path(&self) -> &Path {
        self.log_path.as_path()
    }

    /// Record a message at target level.
    ///
    /// Failure to persist a message is itself only reported interactively. A
    /// broken log must never stop a run.
    pub fn record(&self, level: Level, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            Level::Info => info!("{message}"),
            Level::Success => info!("✓ {message}"),
            Level::Warning => warn!("{message}"),
            Level::Error => error!("{message}"),
            Level::Debug => {}
        }

        let stamp = Local::now().format("%Y-%m-%dT%H:%M:%S");
        let line = format!("{stamp} [{}] {message}\n", level.tag());
        if let Err(err) = (&self.file).write_all(line.as_bytes()) {
            warn!(
                "cannot append to install log {:?}: {err}",
                self.log_path.display()
            );
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(Level::Info, message);
    }

    pub fn success(&self, message: impl AsRef<str>) {
        self.record(Level::Success, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.record(Level::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(Level::Error, message);
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.record(Level::Debug, message);
    }
}

/// Installation report error types.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Parent directory of install log cannot be created.
    #[error("failed to create log directory {:?}", .path.display())]
    CreateLogDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Install log cannot be opened for appending.
    #[error("failed to open install log {:?}", .path.display())]
    OpenLog {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ReportError> = std::result::Result<T, E>;
