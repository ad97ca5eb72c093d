// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rollback engine.
//!
//! Undo what a failed run did by walking its mutation log. Modified paths get
//! their backup restored, created paths get deleted. Rollback is best-effort:
//! a path that cannot be restored is reported and the engine moves on to the
//! next entry.
//!
//! # Confirmation
//!
//! Rollback never happens behind the user's back. The caller asks through a
//! [`RollbackPrompt`] first. Declining keeps every backup in place for manual
//! recovery.

use crate::{
    context::{error_chain, Mutation},
    fsops::remove_path,
    ledger::{BackupLabel, BackupLedger, LedgerError},
    report::Report,
    sequencer::StepFailure,
};

use inquire::Confirm;
use std::path::{Path, PathBuf};
use tracing::{instrument, warn};

/// Ask whether a failed run should be rolled back.
pub trait RollbackPrompt {
    /// Return `true` to roll back.
    fn confirm(&mut self, failure: &StepFailure) -> bool;
}

/// Ask interactively on the terminal.
#[derive(Debug, Default)]
pub struct InquirePrompt;

impl RollbackPrompt for InquirePrompt {
    fn confirm(&mut self, failure: &StepFailure) -> bool {
        let question = format!("{:?} failed. Roll back changes made so far?", failure.step);
        match Confirm::new(&question)
            .with_default(true)
            .with_help_message("declining keeps all backups in place")
            .prompt()
        {
            Ok(answer) => answer,
            Err(err) => {
                warn!("cannot ask for rollback confirmation: {err}");
                false
            }
        }
    }
}

/// Answer every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl RollbackPrompt for FixedAnswer {
    fn confirm(&mut self, _failure: &StepFailure) -> bool {
        self.0
    }
}

/// What a rollback managed to undo.
#[derive(Debug, Default)]
pub struct RollbackSummary {
    /// Modified paths restored from backup.
    pub restored: usize,

    /// Created paths deleted.
    pub removed: usize,

    /// Created paths that were already gone.
    pub already_gone: usize,

    /// Entries that could not be undone.
    pub failures: Vec<RollbackError>,
}

impl RollbackSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Undo every mutation in the order it was recorded.
///
/// Entries are never skipped because an earlier entry failed. Deleting a
/// created directory takes its created children with it, so those children
/// show up as already gone, which counts as success.
#[instrument(skip_all, level = "debug")]
pub fn rollback(mutations: &[Mutation], ledger: &BackupLedger, report: &Report) -> RollbackSummary {
    let mut summary = RollbackSummary::default();

    for mutation in mutations {
        let result = match mutation {
            Mutation::Modified { label, target } => match restore_original(ledger, label, target) {
                Ok(true) => {
                    report.debug(format!("restored {:?} from {label}", target.display()));
                    summary.restored += 1;
                    Ok(())
                }
                Ok(false) => Err(RollbackError::MissingBackup {
                    label: label.clone(),
                    target: target.clone(),
                }),
                Err(err) => Err(RollbackError::Restore {
                    source: err,
                    label: label.clone(),
                    target: target.clone(),
                }),
            },
            Mutation::Created { path } => match remove_path(path) {
                Ok(true) => {
                    report.debug(format!("removed {:?}", path.display()));
                    summary.removed += 1;
                    Ok(())
                }
                Ok(false) => {
                    report.debug(format!("{:?} already gone", path.display()));
                    summary.already_gone += 1;
                    Ok(())
                }
                Err(err) => Err(RollbackError::Remove {
                    source: err,
                    path: path.clone(),
                }),
            },
        };

        if let Err(err) = result {
            report.error(format!("rollback: {}", error_chain(&err)));
            summary.failures.push(err);
        }
    }

    summary
}

/// Restore target only from a backup that was taken of target itself.
fn restore_original(
    ledger: &BackupLedger,
    label: &BackupLabel,
    target: &Path,
) -> Result<bool, LedgerError> {
    match ledger.find(label) {
        Some(record) if record.original_path == target => ledger.restore(label, target),
        _ => Ok(false),
    }
}

/// Rollback error types.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// Modified path has no backup to restore from.
    #[error("no backup of {:?} under {}", .target.display(), .label)]
    MissingBackup { label: BackupLabel, target: PathBuf },

    /// Backup cannot be restored.
    #[error("failed to restore {:?} from {}", .target.display(), .label)]
    Restore {
        #[source]
        source: LedgerError,
        label: BackupLabel,
        target: PathBuf,
    },

    /// Created path cannot be removed.
    #[error("failed to remove {:?}", .path.display())]
    Remove {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}
