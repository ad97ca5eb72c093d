// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation run.
//!
//! Drives one run from start to finish:
//!
//! ```text
//! Preflight -> Step 1..k -> Success
//!                        \-> Failure -> RollbackDecision -> Rollback     -> Report
//!                                                        \-> SkipRollback -> Report
//! ```
//!
//! Preflight failures end the run before anything is touched. Step failures
//! all funnel into one failure handler, which asks whether to roll back and
//! always tells the user where the backups and the log are.

use crate::{
    context::{error_chain, RunContext},
    preflight::{Preflight, PreflightError},
    rollback::{rollback, RollbackPrompt, RollbackSummary},
    sequencer::{SequenceSummary, StepFailure, StepSequencer},
};

use tracing::instrument;

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every fatal step succeeded.
    Success(SequenceSummary),

    /// Preflight checks failed, nothing was touched.
    PreflightFailed(PreflightError),

    /// A step failed and the user chose to roll back.
    RolledBack {
        failure: StepFailure,
        summary: RollbackSummary,
    },

    /// A step failed and the user kept the changes for manual recovery.
    RollbackDeclined { failure: StepFailure },
}

impl RunOutcome {
    /// Exit code of the process.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Success(_) => 0,
            Self::PreflightFailed(_) => 1,
            Self::RolledBack { failure, .. } | Self::RollbackDeclined { failure } => {
                failure.exit_code()
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// One installation run.
#[derive(Debug)]
pub struct Installation<P>
where
    P: RollbackPrompt,
{
    preflight: Preflight,
    sequencer: StepSequencer,
    prompt: P,
}

impl<P> Installation<P>
where
    P: RollbackPrompt,
{
    /// Construct new installation run.
    pub fn new(preflight: Preflight, sequencer: StepSequencer, prompt: P) -> Self {
        Self {
            preflight,
            sequencer,
            prompt,
        }
    }

    /// Run preflight checks, then every step, handling failure if any.
    #[instrument(skip(self, ctx), level = "debug")]
    pub fn run(&mut self, ctx: &mut RunContext) -> RunOutcome {
        ctx.report().info("running preflight checks");
        if let Err(err) = self.preflight.check(ctx.report()) {
            ctx.report()
                .error(format!("preflight failed: {}", error_chain(&err)));
            ctx.report().info("nothing was changed");
            return RunOutcome::PreflightFailed(err);
        }

        match self.sequencer.run(ctx) {
            Ok(summary) => {
                report_success(ctx, &summary);
                RunOutcome::Success(summary)
            }
            Err(failure) => self.handle_failure(ctx, failure),
        }
    }

    fn handle_failure(&mut self, ctx: &mut RunContext, failure: StepFailure) -> RunOutcome {
        ctx.report().error(format!(
            "setup stopped at {:?}: {}",
            failure.step,
            error_chain(&failure.source)
        ));

        let outcome = if self.prompt.confirm(&failure) {
            ctx.report().info(format!(
                "rolling back {} change(s)",
                ctx.mutations().len()
            ));
            let summary = rollback(ctx.mutations(), ctx.ledger(), ctx.report());
            if summary.is_complete() {
                ctx.report().success(format!(
                    "rollback finished: {} restored, {} removed",
                    summary.restored,
                    summary.removed + summary.already_gone
                ));
            } else {
                ctx.report().warning(format!(
                    "rollback finished with {} problem(s), check the log",
                    summary.failures.len()
                ));
            }
            RunOutcome::RolledBack { failure, summary }
        } else {
            ctx.report()
                .warning("rollback skipped, changes left in place for manual recovery");
            RunOutcome::RollbackDeclined { failure }
        };

        report_locations(ctx);
        if !ctx.installed_packages().is_empty() {
            ctx.report().info(format!(
                "packages installed during this run are left installed: {}",
                installed_list(ctx)
            ));
        }

        outcome
    }
}

fn report_success(ctx: &RunContext, summary: &SequenceSummary) {
    ctx.report().success(format!(
        "setup complete: {} applied, {} already done",
        summary.applied.len(),
        summary.skipped.len()
    ));
    if !summary.advisories.is_empty() {
        ctx.report().warning(format!(
            "some advisory steps failed: {}",
            summary.advisories.join(", ")
        ));
    }
    if !ctx.installed_packages().is_empty() {
        ctx.report()
            .info(format!("installed packages: {}", installed_list(ctx)));
    }
    report_locations(ctx);
}

fn report_locations(ctx: &RunContext) {
    match ctx.ledger().area() {
        Some(area) => ctx
            .report()
            .info(format!("backups kept in {:?}", area.display())),
        None => ctx.report().info("no pre-existing files needed backing up"),
    }
    ctx.report().info(format!(
        "full log at {:?}",
        ctx.report().log_path().display()
    ));
}

fn installed_list(ctx: &RunContext) -> String {
    ctx.installed_packages()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
