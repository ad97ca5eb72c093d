// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run context.
//!
//! Everything a run accumulates lives in one [`RunContext`] value owned by the
//! caller and lent to each setup step in turn: the configuration, the backup
//! ledger, the mutation log, the packages installed so far, and the
//! installation report. Steps never reach for ambient state.

use crate::{
    config::{PackageKind, SetupConfig},
    fsops::{highest_missing_ancestor, path_exists},
    ledger::{BackupLabel, BackupLedger},
    report::Report,
};

use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Entry of the mutation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Pre-existing path was changed. Its original state is in the backup
    /// ledger under label.
    Modified { label: BackupLabel, target: PathBuf },

    /// Path did not exist before the run created it.
    Created { path: PathBuf },
}

impl Mutation {
    /// Path affected by mutation.
    pub fn path(&self) -> &Path {
        match self {
            Self::Modified { target, .. } => target.as_path(),
            Self::Created { path } => path.as_path(),
        }
    }
}

/// Package the package manager reported as freshly installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackageRecord {
    pub package_name: String,
    pub package_kind: PackageKind,
}

impl Display for InstalledPackageRecord {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} ({})", self.package_name, self.package_kind)
    }
}

/// State threaded through every setup step of a run.
#[derive(Debug)]
pub struct RunContext {
    config: SetupConfig,
    ledger: BackupLedger,
    mutations: Vec<Mutation>,
    packages: Vec<InstalledPackageRecord>,
    report: Report,
    tracked: HashSet<PathBuf>,
}

impl RunContext {
    /// Construct new run context.
    pub fn new(config: SetupConfig, ledger: BackupLedger, report: Report) -> Self {
        Self {
            config,
            ledger,
            mutations: Vec::new(),
            packages: Vec::new(),
            report,
            tracked: HashSet::new(),
        }
    }

    pub fn config(&self) -> &SetupConfig {
        &self.config
    }

    pub fn ledger(&self) -> &BackupLedger {
        &self.ledger
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Mutations recorded so far, in the order they were recorded.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn installed_packages(&self) -> &[InstalledPackageRecord] {
        &self.packages
    }

    /// Announce that path is about to be mutated.
    ///
    /// Pre-existing paths are backed up under label and logged as
    /// [`Mutation::Modified`]. Missing paths are logged as
    /// [`Mutation::Created`], starting from their highest missing ancestor,
    /// so directories created along the way are undone too. Tracking a path a
    /// second time in the same run does nothing, so the log holds exactly one
    /// entry per path.
    ///
    /// If label already protects a different path, the backup goes under a
    /// derived label instead, so no two paths ever share a backup.
    ///
    /// Backups are best-effort. A failed backup is reported as a warning and
    /// the mutation still goes ahead.
    pub fn track(&mut self, path: impl AsRef<Path>, label: BackupLabel) {
        let path = path.as_ref();
        if !self.tracked.insert(path.to_path_buf()) {
            self.report
                .debug(format!("{:?} already tracked", path.display()));
            return;
        }

        if !path_exists(path) {
            let created = highest_missing_ancestor(path);
            if created != path && !self.tracked.insert(created.clone()) {
                self.report.debug(format!(
                    "{:?} falls under already created {:?}",
                    path.display(),
                    created.display()
                ));
                return;
            }

            self.report.debug(format!(
                "{:?} does not exist yet, recording {:?} as created",
                path.display(),
                created.display()
            ));
            self.mutations.push(Mutation::Created { path: created });
            return;
        }

        let label = self.free_label(path, label);
        match self.ledger.backup(path, label.clone()) {
            Ok(true) => self
                .report
                .debug(format!("backed up {:?} as {label}", path.display())),
            Ok(false) => self.report.debug(format!(
                "backup of {:?} already exists as {label}",
                path.display()
            )),
            Err(err) => self.report.warning(format!(
                "backup of {:?} failed, continuing without it: {}",
                path.display(),
                error_chain(&err)
            )),
        }
        self.mutations.push(Mutation::Modified {
            label,
            target: path.to_path_buf(),
        });
    }

    /// Label that either is unused or already protects path itself.
    fn free_label(&self, path: &Path, label: BackupLabel) -> BackupLabel {
        let protects_other = |label: &BackupLabel| {
            self.ledger
                .find(label)
                .is_some_and(|record| record.original_path != path)
        };
        if !protects_other(&label) {
            return label;
        }

        let base = match &label {
            BackupLabel::Custom(name) => name.clone(),
            other => other.entry_name(),
        };
        let mut suffix = 2;
        let derived = loop {
            let candidate = BackupLabel::Custom(format!("{base}-{suffix}"));
            if !protects_other(&candidate) {
                break candidate;
            }
            suffix += 1;
        };
        self.report.warning(format!(
            "label {label} already protects another path, backing up {:?} as {derived}",
            path.display()
        ));

        derived
    }

    /// Record package as freshly installed.
    pub fn record_installed(&mut self, name: impl Into<String>, kind: PackageKind) {
        let record = InstalledPackageRecord {
            package_name: name.into(),
            package_kind: kind,
        };
        self.report.debug(format!("installed {record}"));
        self.packages.push(record);
    }
}

/// Render error with its full chain of sources on one line.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{SetupStep, StepOutcome, StepSequencer};
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{
        cell::Cell,
        fs::{read_to_string, write},
        rc::Rc,
    };

    fn context() -> anyhow::Result<RunContext> {
        Ok(RunContext::new(
            SetupConfig::default(),
            BackupLedger::new("backups"),
            Report::open("install.log")?,
        ))
    }

    #[sealed_test]
    fn missing_path_is_recorded_as_created() -> anyhow::Result<()> {
        let mut ctx = context()?;
        ctx.track(".zshrc", BackupLabel::ShellRc);

        assert_eq!(
            ctx.mutations(),
            &[Mutation::Created {
                path: PathBuf::from(".zshrc")
            }]
        );
        assert!(ctx.ledger().records().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn existing_path_is_backed_up_before_modification() -> anyhow::Result<()> {
        write(".zshrc", "original")?;
        let mut ctx = context()?;
        ctx.track(".zshrc", BackupLabel::ShellRc);

        assert_eq!(
            ctx.mutations(),
            &[Mutation::Modified {
                label: BackupLabel::ShellRc,
                target: PathBuf::from(".zshrc")
            }]
        );
        assert_eq!(ctx.ledger().records().len(), 1);

        Ok(())
    }

    #[sealed_test]
    fn tracking_twice_records_once() -> anyhow::Result<()> {
        let mut ctx = context()?;
        ctx.track(".zshrc", BackupLabel::ShellRc);
        write(".zshrc", "created by step")?;
        ctx.track(".zshrc", BackupLabel::ShellRc);

        assert_eq!(ctx.mutations().len(), 1);
        assert!(ctx.ledger().records().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn created_parent_directories_are_recorded() -> anyhow::Result<()> {
        let mut ctx = context()?;
        ctx.track(".config/kitty", BackupLabel::TerminalConfig);
        ctx.track(".config/fastfetch", BackupLabel::InfoToolConfig);

        assert_eq!(
            ctx.mutations(),
            &[Mutation::Created {
                path: PathBuf::from(".config")
            }]
        );

        Ok(())
    }

    #[sealed_test]
    fn shared_label_never_covers_two_paths() -> anyhow::Result<()> {
        write("a.conf", "A-original")?;
        write("b.conf", "B-original")?;
        let mut ctx = context()?;
        ctx.track("a.conf", BackupLabel::Custom("cfg".into()));
        ctx.track("b.conf", BackupLabel::Custom("cfg".into()));

        assert_eq!(
            ctx.mutations(),
            &[
                Mutation::Modified {
                    label: BackupLabel::Custom("cfg".into()),
                    target: PathBuf::from("a.conf")
                },
                Mutation::Modified {
                    label: BackupLabel::Custom("cfg-2".into()),
                    target: PathBuf::from("b.conf")
                },
            ]
        );
        let record = ctx.ledger().find(&BackupLabel::Custom("cfg-2".into())).unwrap();
        assert_eq!(read_to_string(&record.backup_path)?, "B-original");

        Ok(())
    }

    #[sealed_test]
    fn failed_backup_does_not_block_step() -> anyhow::Result<()> {
        // Backup area cannot be created beneath a regular file.
        write("backups", "in the way")?;
        write(".zshrc", "original")?;

        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        let sequencer = StepSequencer::new(vec![SetupStep::new("configure shell", move |_| {
            flag.set(true);
            Ok(StepOutcome::Applied)
        })
        .backup(".zshrc", BackupLabel::ShellRc)]);

        let mut ctx = context()?;
        sequencer.run(&mut ctx)?;

        assert!(ran.get());
        assert_eq!(
            ctx.mutations(),
            &[Mutation::Modified {
                label: BackupLabel::ShellRc,
                target: PathBuf::from(".zshrc")
            }]
        );
        assert!(ctx.ledger().records().is_empty());
        let log = read_to_string("install.log")?;
        assert!(log.contains("[WARNING] backup of \".zshrc\" failed"));

        Ok(())
    }
}
