// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Step sequencer.
//!
//! A run is a fixed, ordered list of [`SetupStep`]s executed one after the
//! other. Each step names the paths it is about to mutate, and the sequencer
//! tracks those paths in the [`RunContext`] before the step's action runs, so
//! every mutation has its backup or creation record in place beforehand.
//!
//! # Severity
//!
//! Steps are either [`Severity::Fatal`] or [`Severity::Advisory`]. The first
//! fatal failure halts the sequence immediately. Advisory failures are
//! reported as warnings and the sequence moves on. Refreshing the package
//! catalog is the typical advisory step: a stale catalog is annoying, not
//! dangerous.
//!
//! # Idempotence
//!
//! Steps are expected to notice when their goal is already met. A step may
//! carry a __sentinel__, a cheap check run before anything is tracked, and its
//! action may itself report [`StepOutcome::Skipped`] after a closer look.

use crate::{
    config::SetupConfig,
    context::{error_chain, RunContext},
    ledger::BackupLabel,
    report::Report,
    tools::ToolError,
};

use std::{fmt, path::PathBuf, thread, time::Duration};
use tracing::instrument;

/// What a step's action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step changed something.
    Applied,

    /// Goal was already met, nothing changed.
    Skipped,
}

/// How a step's failure affects the run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Failure halts the run.
    #[default]
    Fatal,

    /// Failure is reported and the run continues.
    Advisory,
}

/// Path a step is about to mutate, with the label its backup goes under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupTarget {
    pub path: PathBuf,
    pub label: BackupLabel,
}

type Action = Box<dyn Fn(&mut RunContext) -> StepResult>;
type Sentinel = Box<dyn Fn(&RunContext) -> bool>;

/// Result of running a step's action.
pub type StepResult = Result<StepOutcome, StepError>;

/// One unit of setup work.
pub struct SetupStep {
    name: String,
    severity: Severity,
    backup_targets: Vec<BackupTarget>,
    sentinel: Option<Sentinel>,
    action: Action,
}

impl SetupStep {
    /// Construct new fatal step with no backup targets.
    pub fn new(
        name: impl Into<String>,
        action: impl Fn(&mut RunContext) -> StepResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            severity: Severity::Fatal,
            backup_targets: Vec::new(),
            sentinel: None,
            action: Box::new(action),
        }
    }

    /// Mark step as advisory.
    pub fn advisory(mut self) -> Self {
        self.severity = Severity::Advisory;
        self
    }

    /// Declare path the step mutates.
    pub fn backup(mut self, path: impl Into<PathBuf>, label: BackupLabel) -> Self {
        self.backup_targets.push(BackupTarget {
            path: path.into(),
            label,
        });
        self
    }

    /// Skip step entirely when sentinel says its goal is already met.
    pub fn skip_when(mut self, sentinel: impl Fn(&RunContext) -> bool + 'static) -> Self {
        self.sentinel = Some(Box::new(sentinel));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn backup_targets(&self) -> &[BackupTarget] {
        &self.backup_targets
    }
}

impl fmt::Debug for SetupStep {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("SetupStep")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .field("backup_targets", &self.backup_targets)
            .finish_non_exhaustive()
    }
}

/// What a sequence did when every fatal step succeeded.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SequenceSummary {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub advisories: Vec<String>,
}

/// Runs setup steps in their fixed order.
#[derive(Debug, Default)]
pub struct StepSequencer {
    steps: Vec<SetupStep>,
}

impl StepSequencer {
    /// Construct new sequencer over ordered steps.
    pub fn new(steps: Vec<SetupStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[SetupStep] {
        &self.steps
    }

    /// Run every step in order.
    ///
    /// # Errors
    ///
    /// - Return [`StepFailure`] for the first fatal step that fails. No later
    ///   step is run.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn run(&self, ctx: &mut RunContext) -> Result<SequenceSummary, StepFailure> {
        let mut summary = SequenceSummary::default();
        let total = self.steps.len();

        for (index, step) in self.steps.iter().enumerate() {
            ctx.report()
                .info(format!("[{}/{total}] {}", index + 1, step.name));

            if step.sentinel.as_ref().is_some_and(|sentinel| sentinel(&*ctx)) {
                ctx.report()
                    .success(format!("{}: already done, skipping", step.name));
                summary.skipped.push(step.name.clone());
                continue;
            }

            for target in &step.backup_targets {
                ctx.track(&target.path, target.label.clone());
            }

            match (step.action)(ctx) {
                Ok(StepOutcome::Applied) => {
                    ctx.report().success(format!("{}: done", step.name));
                    summary.applied.push(step.name.clone());
                }
                Ok(StepOutcome::Skipped) => {
                    ctx.report()
                        .success(format!("{}: already done, skipping", step.name));
                    summary.skipped.push(step.name.clone());
                }
                Err(err) if step.severity == Severity::Advisory => {
                    ctx.report().warning(format!(
                        "{}: failed, continuing anyway: {}",
                        step.name,
                        error_chain(&err)
                    ));
                    summary.advisories.push(step.name.clone());
                }
                Err(err) => {
                    ctx.report()
                        .error(format!("{}: failed: {}", step.name, error_chain(&err)));
                    return Err(StepFailure {
                        step: step.name.clone(),
                        source: err,
                    });
                }
            }
        }

        Ok(summary)
    }
}

/// Bounded retry with fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Construct retry policy from configuration.
    pub fn from_config(config: &SetupConfig) -> Self {
        Self {
            attempts: config.retry.attempts.max(1),
            delay: config.retry_delay(),
        }
    }

    /// Run operation until it succeeds or attempt cap is reached.
    ///
    /// Failed attempts before the last are reported as warnings. There is no
    /// backoff, every wait is the same fixed delay.
    ///
    /// # Errors
    ///
    /// - Return [`StepError::RetriesExhausted`] wrapping the last failure once
    ///   attempt cap is reached.
    pub fn run<T>(
        &self,
        report: &Report,
        what: &str,
        mut op: impl FnMut() -> Result<T, StepError>,
    ) -> Result<T, StepError> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= attempts => {
                    return Err(StepError::RetriesExhausted {
                        what: what.into(),
                        attempts,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    report.warning(format!(
                        "{what} failed (attempt {attempt}/{attempts}), retrying in {}s: {}",
                        self.delay.as_secs(),
                        error_chain(&err)
                    ));
                    thread::sleep(self.delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Fatal step failed, halting the run.
#[derive(Debug, thiserror::Error)]
#[error("setup step {step:?} failed")]
pub struct StepFailure {
    pub step: String,
    #[source]
    pub source: StepError,
}

impl StepFailure {
    /// Exit code to propagate out of the process.
    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }
}

/// Setup step error types.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// External tool fails.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Filesystem operation of step fails.
    #[error("failed to write {:?}", .path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Operation still fails after every retry.
    #[error("{what} failed after {attempts} attempts")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        #[source]
        source: Box<StepError>,
    },

    /// Anything else a step wants to complain about.
    #[error("{0}")]
    Message(String),
}

impl StepError {
    /// Exit code of failing external command, or 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Tool(err) => err.exit_code().filter(|code| *code != 0).unwrap_or(1),
            Self::RetriesExhausted { source, .. } => source.exit_code(),
            Self::Io { .. } | Self::Message(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::BackupLedger;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::{cell::Cell, fs::write, rc::Rc};

    fn context() -> anyhow::Result<RunContext> {
        Ok(RunContext::new(
            SetupConfig::default(),
            BackupLedger::new("backups"),
            Report::open("install.log")?,
        ))
    }

    fn no_delay(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::ZERO,
        }
    }

    #[sealed_test]
    fn first_fatal_failure_halts_sequence() -> anyhow::Result<()> {
        let ran_last = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran_last);
        let sequencer = StepSequencer::new(vec![
            SetupStep::new("first", |_| Ok(StepOutcome::Applied)),
            SetupStep::new("second", |_| Err(StepError::Message("boom".into()))),
            SetupStep::new("third", move |_| {
                flag.set(true);
                Ok(StepOutcome::Applied)
            }),
        ]);

        let failure = sequencer.run(&mut context()?).unwrap_err();
        assert_eq!(failure.step, "second");
        assert_eq!(failure.exit_code(), 1);
        assert!(!ran_last.get());

        Ok(())
    }

    #[sealed_test]
    fn advisory_failure_does_not_halt_sequence() -> anyhow::Result<()> {
        let sequencer = StepSequencer::new(vec![
            SetupStep::new("refresh catalog", |_| {
                Err(StepError::Message("offline".into()))
            })
            .advisory(),
            SetupStep::new("configure", |_| Ok(StepOutcome::Applied)),
        ]);

        let summary = sequencer.run(&mut context()?)?;
        assert_eq!(
            summary,
            SequenceSummary {
                applied: vec!["configure".into()],
                skipped: vec![],
                advisories: vec!["refresh catalog".into()],
            }
        );

        Ok(())
    }

    #[sealed_test]
    fn backup_targets_are_tracked_before_action() -> anyhow::Result<()> {
        write(".zshrc", "original")?;
        let sequencer = StepSequencer::new(vec![SetupStep::new("configure shell", |ctx| {
            assert_eq!(ctx.ledger().records().len(), 1);
            write(".zshrc", "changed").map_err(|err| StepError::Io {
                source: err,
                path: ".zshrc".into(),
            })?;
            Ok(StepOutcome::Applied)
        })
        .backup(".zshrc", BackupLabel::ShellRc)]);

        let mut ctx = context()?;
        sequencer.run(&mut ctx)?;
        assert_eq!(ctx.mutations().len(), 1);

        Ok(())
    }

    #[sealed_test]
    fn satisfied_sentinel_skips_tracking_and_action() -> anyhow::Result<()> {
        let sequencer = StepSequencer::new(vec![SetupStep::new("never", |_| {
            Err(StepError::Message("should not run".into()))
        })
        .backup(".zshrc", BackupLabel::ShellRc)
        .skip_when(|_| true)]);

        let mut ctx = context()?;
        let summary = sequencer.run(&mut ctx)?;
        assert_eq!(summary.skipped, vec!["never".to_string()]);
        assert!(ctx.mutations().is_empty());

        Ok(())
    }

    #[sealed_test]
    fn retry_gives_up_after_attempt_cap() -> anyhow::Result<()> {
        let report = Report::open("install.log")?;
        let mut calls = 0;
        let result: Result<(), _> = no_delay(3).run(&report, "download", || {
            calls += 1;
            Err(StepError::Message("connection refused".into()))
        });

        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(StepError::RetriesExhausted { attempts: 3, .. })
        ));

        Ok(())
    }

    #[sealed_test]
    fn retry_stops_at_first_success() -> anyhow::Result<()> {
        let report = Report::open("install.log")?;
        let mut calls = 0;
        let result = no_delay(3).run(&report, "download", || {
            calls += 1;
            if calls < 2 {
                Err(StepError::Message("flaky".into()))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result?, 2);

        Ok(())
    }

    #[test]
    fn exit_code_comes_from_failing_command() {
        let err = StepError::RetriesExhausted {
            what: "install".into(),
            attempts: 3,
            source: Box::new(StepError::Tool(ToolError::Failed {
                command: "brew".into(),
                code: Some(42),
                message: String::new(),
            })),
        };
        assert_eq!(err.exit_code(), 42);
    }
}
