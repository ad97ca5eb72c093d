// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup ledger.
//!
//! Before a setup step touches a path that already exists, the ledger copies
//! that path into a per-run __backup area__ and remembers where the copy went.
//! Restoring is then a matter of asking the ledger for a [`BackupLabel`].
//!
//! # Backup Area Layout
//!
//! Each run gets its own backup area named after the time the ledger was
//! created, e.g., `$HOME/.oxisetup/backups/20251018_080000`. If a previous run
//! already claimed that name, a numeric suffix is appended. The area is only
//! created once something actually needs backing up, so runs that never touch
//! pre-existing state leave nothing behind.
//!
//! Inside the area every backup lives under an entry named after its label,
//! next to a `records.toml` manifest describing what each entry was and where
//! it came from. The manifest lets a later invocation reattach to an old backup
//! area through [`BackupLedger::open`] and restore from it by label.

use crate::fsops::{copy_path, remove_path};

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{self, read_to_string, write},
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

const MANIFEST_NAME: &str = "records.toml";

/// Symbolic name of a backup.
///
/// Labels are decoupled from the filesystem paths they protect, so a backup
/// can be found again without knowing where it originally came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(into = "String", try_from = "String")]
pub enum BackupLabel {
    /// Interactive shell startup file.
    ShellRc,

    /// Login shell profile file.
    ShellProfile,

    /// Terminal emulator configuration directory.
    TerminalConfig,

    /// System information tool configuration directory.
    InfoToolConfig,

    /// Anything else a step wants protected.
    Custom(String),
}

impl BackupLabel {
    /// Name of backup entry inside the backup area.
    pub fn entry_name(&self) -> String {
        match self {
            Self::ShellRc => "shell-rc".into(),
            Self::ShellProfile => "shell-profile".into(),
            Self::TerminalConfig => "terminal-config".into(),
            Self::InfoToolConfig => "info-tool-config".into(),
            Self::Custom(name) => format!("custom-{name}"),
        }
    }

    /// Check if label can name an entry inside the backup area.
    ///
    /// Custom names must be non-empty and must not contain path separators,
    /// so every valid label maps to its own entry.
    pub fn is_valid(&self) -> bool {
        match self {
            Self::Custom(name) => !name.is_empty() && !name.contains(['/', '\\']),
            _ => true,
        }
    }
}

impl Display for BackupLabel {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.entry_name().as_str())
    }
}

impl FromStr for BackupLabel {
    type Err = LedgerError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "shell-rc" => Ok(Self::ShellRc),
            "shell-profile" => Ok(Self::ShellProfile),
            "terminal-config" => Ok(Self::TerminalConfig),
            "info-tool-config" => Ok(Self::InfoToolConfig),
            other => match other.strip_prefix("custom-") {
                Some(name) => {
                    let label = Self::Custom(name.into());
                    if label.is_valid() {
                        Ok(label)
                    } else {
                        Err(LedgerError::InvalidLabel(label))
                    }
                }
                None => Err(LedgerError::UnknownLabel(other.into())),
            },
        }
    }
}

impl From<BackupLabel> for String {
    fn from(label: BackupLabel) -> Self {
        label.entry_name()
    }
}

impl TryFrom<String> for BackupLabel {
    type Error = LedgerError;

    fn try_from(data: String) -> Result<Self, Self::Error> {
        data.parse()
    }
}

/// What a backup entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    File,
    Directory,
}

/// Mapping from an original path to its copy in the backup area.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackupRecord {
    pub label: BackupLabel,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub kind: BackupKind,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Manifest {
    #[serde(default, rename = "record")]
    records: Vec<BackupRecord>,
}

/// Per-run backup ledger.
#[derive(Debug)]
pub struct BackupLedger {
    root: PathBuf,
    stamp: String,
    area: Option<PathBuf>,
    records: Vec<BackupRecord>,
}

impl BackupLedger {
    /// Construct new ledger whose backup area will live under `root`.
    ///
    /// Nothing touches the filesystem until the first backup is taken.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            area: None,
            records: Vec::new(),
        }
    }

    /// Reattach to backup area left behind by a previous run.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::ReadManifest`] if manifest cannot be read.
    /// - Return [`LedgerError::ManifestFormat`] if manifest is malformed.
    #[instrument(skip(area), level = "debug")]
    pub fn open(area: impl Into<PathBuf>) -> Result<Self> {
        let area = area.into();
        let manifest_path = area.join(MANIFEST_NAME);
        let content = read_to_string(&manifest_path).map_err(|err| LedgerError::ReadManifest {
            source: err,
            path: manifest_path.clone(),
        })?;
        let manifest: Manifest = toml::de::from_str(&content)?;

        // INVARIANT: Entries are resolved against where the area is now, not
        // where it was when the manifest was written.
        let records = manifest
            .records
            .into_iter()
            .map(|record| BackupRecord {
                backup_path: area.join(record.label.entry_name()),
                ..record
            })
            .collect();
        let stamp = area
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let root = area.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            root,
            stamp,
            area: Some(area),
            records,
        })
    }

    /// Backup area of this run, if one has been created yet.
    pub fn area(&self) -> Option<&Path> {
        self.area.as_deref()
    }

    /// Directory holding every run's backup area.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// All backups taken so far, in the order they were taken.
    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    /// Look up backup by label.
    pub fn find(&self, label: &BackupLabel) -> Option<&BackupRecord> {
        self.records.iter().find(|record| &record.label == label)
    }

    /// Backup path under label.
    ///
    /// Returns `false` if there was nothing at `path` to back up. A label
    /// that already has a backup of the same path keeps its first copy,
    /// because that copy is the state from before the run, so backing it up
    /// again also returns `false`.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::InvalidLabel`] if label cannot name an entry.
    /// - Return [`LedgerError::LabelTaken`] if label already protects a
    ///   different path.
    /// - Return [`LedgerError::Stat`] if path cannot be inspected.
    /// - Return [`LedgerError::CreateArea`] if backup area cannot be created.
    /// - Return [`LedgerError::Copy`] if path cannot be copied into backup
    ///   area. Partial copies are cleaned up and no record is kept.
    /// - Return [`LedgerError::WriteManifest`] if manifest cannot be updated.
    ///   The backup itself is still usable in this run.
    #[instrument(skip(self, path), level = "debug")]
    pub fn backup(&mut self, path: impl AsRef<Path>, label: BackupLabel) -> Result<bool> {
        let path = path.as_ref();
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("nothing to back up at {:?}", path.display());
                return Ok(false);
            }
            Err(err) => {
                return Err(LedgerError::Stat {
                    source: err,
                    path: path.to_path_buf(),
                })
            }
        };

        if !label.is_valid() {
            return Err(LedgerError::InvalidLabel(label));
        }

        if let Some(existing) = self.find(&label) {
            // INVARIANT: A label protects exactly one original path.
            if existing.original_path != path {
                return Err(LedgerError::LabelTaken {
                    label,
                    existing: existing.original_path.clone(),
                    path: path.to_path_buf(),
                });
            }
            return Ok(false);
        }

        let area = self.ensure_area()?;
        let backup_path = area.join(label.entry_name());
        if let Err(err) = copy_path(path, &backup_path) {
            let _ = remove_path(&backup_path);
            return Err(LedgerError::Copy {
                source: err,
                from: path.to_path_buf(),
                to: backup_path,
            });
        }

        let kind = if meta.is_dir() {
            BackupKind::Directory
        } else {
            BackupKind::File
        };
        debug!("backed up {:?} to {:?}", path.display(), backup_path.display());
        self.records.push(BackupRecord {
            label,
            original_path: path.to_path_buf(),
            backup_path,
            kind,
        });
        self.write_manifest()?;

        Ok(true)
    }

    /// Restore backup under label to target path.
    ///
    /// The backup is first copied next to `target`, and only once that copy
    /// is complete does it replace whatever currently sits at `target`. A
    /// directory backup therefore fully replaces the target directory instead
    /// of being merged into it, and a failed copy leaves the target alone.
    ///
    /// Returns `false` if there is no backup under label.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::Copy`] if backup cannot be copied back.
    /// - Return [`LedgerError::Remove`] if current target cannot be removed.
    /// - Return [`LedgerError::Replace`] if restored copy cannot be moved
    ///   into place.
    #[instrument(skip(self, target), level = "debug")]
    pub fn restore(&self, label: &BackupLabel, target: impl AsRef<Path>) -> Result<bool> {
        let target = target.as_ref();
        let Some(record) = self.find(label) else {
            return Ok(false);
        };

        let staging = staging_path(target);
        let _ = remove_path(&staging);
        if let Err(err) = copy_path(&record.backup_path, &staging) {
            let _ = remove_path(&staging);
            return Err(LedgerError::Copy {
                source: err,
                from: record.backup_path.clone(),
                to: target.to_path_buf(),
            });
        }

        if let Err(err) = remove_path(target) {
            let _ = remove_path(&staging);
            return Err(LedgerError::Remove {
                source: err,
                path: target.to_path_buf(),
            });
        }
        fs::rename(&staging, target).map_err(|err| LedgerError::Replace {
            source: err,
            from: staging.clone(),
            to: target.to_path_buf(),
        })?;
        debug!("restored {label} to {:?}", target.display());

        Ok(true)
    }

    fn ensure_area(&mut self) -> Result<PathBuf> {
        if let Some(area) = &self.area {
            return Ok(area.clone());
        }

        let mut area = self.root.join(&self.stamp);
        let mut suffix = 1;
        while area.exists() {
            area = self.root.join(format!("{}-{suffix}", self.stamp));
            suffix += 1;
        }

        mkdirp::mkdirp(&area).map_err(|err| LedgerError::CreateArea {
            source: err,
            path: area.clone(),
        })?;
        debug!("created backup area {:?}", area.display());
        self.area = Some(area.clone());

        Ok(area)
    }

    fn write_manifest(&self) -> Result<()> {
        let Some(area) = &self.area else {
            return Ok(());
        };

        let manifest = Manifest {
            records: self.records.clone(),
        };
        let manifest_path = area.join(MANIFEST_NAME);
        write(&manifest_path, toml::ser::to_string_pretty(&manifest)?).map_err(|err| {
            LedgerError::WriteManifest {
                source: err,
                path: manifest_path.clone(),
            }
        })
    }
}

/// Sibling of target that a restore is staged in.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".into());

    target.with_file_name(format!(".{name}.oxisetup-restore"))
}

/// Backup ledger error types.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Label does not name any known backup entry.
    #[error("unknown backup label {0:?}")]
    UnknownLabel(String),

    /// Label cannot name an entry inside the backup area.
    #[error("invalid backup label {0:?}")]
    InvalidLabel(BackupLabel),

    /// Label already protects another path.
    #[error(
        "backup label {label} already protects {:?}, cannot also protect {:?}",
        .existing.display(),
        .path.display()
    )]
    LabelTaken {
        label: BackupLabel,
        existing: PathBuf,
        path: PathBuf,
    },

    /// Path to back up cannot be inspected.
    #[error("failed to inspect {:?}", .path.display())]
    Stat {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup area cannot be created.
    #[error("failed to create backup area at {:?}", .path.display())]
    CreateArea {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Copy between original path and backup area fails.
    #[error("failed to copy {:?} to {:?}", .from.display(), .to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Restored copy cannot be moved over target.
    #[error("failed to move {:?} to {:?}", .from.display(), .to.display())]
    Replace {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },

    /// Restore target cannot be cleared.
    #[error("failed to remove {:?}", .path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest cannot be read.
    #[error("failed to read backup manifest at {:?}", .path.display())]
    ReadManifest {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest cannot be written.
    #[error("failed to write backup manifest at {:?}", .path.display())]
    WriteManifest {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Manifest is malformed.
    #[error(transparent)]
    ManifestFormat(#[from] toml::de::Error),

    /// Manifest cannot be serialized.
    #[error(transparent)]
    ManifestSerialize(#[from] toml::ser::Error),
}

/// Friendly result alias :3
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
