// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package installation.

use crate::{
    config::{PackageKind, PackageSpec, SetupConfig},
    context::RunContext,
    sequencer::{RetryPolicy, SetupStep, StepOutcome, StepResult},
    tools::{PackageManager, ToolError},
};

use std::{collections::HashSet, rc::Rc};

/// Install every configured package that is not installed yet.
///
/// The package manager's installed list is the sentinel. Each missing package
/// is installed under the retry policy and recorded in the run context once
/// the package manager reports success.
pub fn install_step(config: &SetupConfig, brew: Rc<dyn PackageManager>) -> SetupStep {
    let packages = config.packages.clone();
    let policy = RetryPolicy::from_config(config);

    SetupStep::new("install packages", move |ctx| {
        install_missing(ctx, brew.as_ref(), &packages, policy)
    })
}

fn install_missing(
    ctx: &mut RunContext,
    brew: &dyn PackageManager,
    packages: &[PackageSpec],
    policy: RetryPolicy,
) -> StepResult {
    let formulae = installed_set(brew, PackageKind::Formula, packages)?;
    let casks = installed_set(brew, PackageKind::Cask, packages)?;

    let mut outcome = StepOutcome::Skipped;
    for package in packages {
        let installed = match package.kind {
            PackageKind::Formula => &formulae,
            PackageKind::Cask => &casks,
        };
        if installed.contains(&package.name) {
            ctx.report()
                .debug(format!("{} {} already installed", package.kind, package.name));
            continue;
        }

        ctx.report()
            .info(format!("installing {} {}", package.kind, package.name));
        policy.run(
            ctx.report(),
            &format!("install {} {}", package.kind, package.name),
            || Ok(brew.install(&package.name, package.kind)?),
        )?;
        ctx.record_installed(package.name.clone(), package.kind);
        outcome = StepOutcome::Applied;
    }

    Ok(outcome)
}

fn installed_set(
    brew: &dyn PackageManager,
    kind: PackageKind,
    packages: &[PackageSpec],
) -> Result<HashSet<String>, ToolError> {
    if !packages.iter().any(|package| package.kind == kind) {
        return Ok(HashSet::new());
    }

    Ok(brew.installed(kind)?.into_iter().collect())
}
