// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Preflight checks.
//!
//! Checks run before any step is allowed to touch the system. A failing
//! preflight check aborts the run outright. Since nothing has been mutated yet
//! there is nothing to roll back.

use crate::{
    config::SetupConfig,
    report::Report,
    tools::{available_kib, ToolError},
};

use std::path::{Path, PathBuf};
use tracing::instrument;

/// Preflight checks of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preflight {
    required_os: Option<String>,
    min_free_mib: u64,
    disk_probe: PathBuf,
    required_tools: Vec<String>,
}

impl Preflight {
    /// Construct preflight checks from configuration.
    ///
    /// Free disk space is measured on the filesystem the backup area will
    /// live on.
    pub fn from_config(config: &SetupConfig) -> Self {
        Self {
            required_os: config.settings.required_os.clone(),
            min_free_mib: config.settings.min_free_mib,
            disk_probe: config.settings.backup_root.clone(),
            required_tools: config.settings.required_tools.clone(),
        }
    }

    /// Run every check.
    ///
    /// # Errors
    ///
    /// - Return [`PreflightError::UnsupportedOs`] if running on the wrong OS.
    /// - Return [`PreflightError::MissingTool`] if a required tool is not on
    ///   `PATH`.
    /// - Return [`PreflightError::InsufficientDisk`] if free space is below
    ///   the minimum.
    /// - Return [`PreflightError::DiskQuery`] if free space cannot be queried.
    #[instrument(skip(self, report), level = "debug")]
    pub fn check(&self, report: &Report) -> Result<()> {
        if let Some(expected) = &self.required_os {
            let found = std::env::consts::OS;
            if expected != found {
                return Err(PreflightError::UnsupportedOs {
                    expected: expected.clone(),
                    found: found.into(),
                });
            }
            report.debug(format!("running on {found}"));
        }

        for tool in &self.required_tools {
            let path = which::which(tool).map_err(|_| PreflightError::MissingTool {
                tool: tool.clone(),
            })?;
            report.debug(format!("found {tool} at {:?}", path.display()));
        }

        if self.min_free_mib > 0 {
            let probe = nearest_existing_ancestor(&self.disk_probe);
            let available_mib = available_kib(&probe)? / 1024;
            if available_mib < self.min_free_mib {
                return Err(PreflightError::InsufficientDisk {
                    path: probe,
                    required_mib: self.min_free_mib,
                    available_mib,
                });
            }
            report.debug(format!(
                "{available_mib} MiB free on {:?}",
                probe.display()
            ));
        }

        report.success("preflight checks passed");

        Ok(())
    }
}

fn nearest_existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|ancestor| !ancestor.as_os_str().is_empty() && ancestor.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Preflight error types.
#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    /// Running on an operating system the setup does not support.
    #[error("unsupported operating system {found:?}, expected {expected:?}")]
    UnsupportedOs { expected: String, found: String },

    /// Required external tool is not installed.
    #[error("required tool {tool:?} not found on PATH")]
    MissingTool { tool: String },

    /// Not enough free disk space.
    #[error(
        "not enough free disk space on {:?}: {available_mib} MiB available, {required_mib} MiB required",
        .path.display()
    )]
    InsufficientDisk {
        path: PathBuf,
        required_mib: u64,
        available_mib: u64,
    },

    /// Free disk space cannot be queried.
    #[error(transparent)]
    DiskQuery(#[from] ToolError),
}

/// Friendly result alias :3
pub type Result<T, E = PreflightError> = std::result::Result<T, E>;
