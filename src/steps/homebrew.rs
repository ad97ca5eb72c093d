// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manager bootstrap and catalog refresh.

use crate::{
    config::SetupConfig,
    sequencer::{RetryPolicy, SetupStep, StepOutcome},
    tools::{Fetcher, PackageManager},
};

use std::rc::Rc;

/// Install the package manager unless it is already on the system.
///
/// The installer script is downloaded under the retry policy. Running the
/// script is attempted once.
pub fn install_step(
    config: &SetupConfig,
    brew: Rc<dyn PackageManager>,
    fetcher: Rc<dyn Fetcher>,
) -> SetupStep {
    let url = config.download.homebrew_installer_url.clone();
    let policy = RetryPolicy::from_config(config);
    let sentinel = Rc::clone(&brew);

    SetupStep::new("install homebrew", move |ctx| {
        let script = policy.run(ctx.report(), "download homebrew installer", || {
            Ok(fetcher.fetch(&url)?)
        })?;
        ctx.report().debug(format!(
            "fetched homebrew installer from {url} ({} bytes)",
            script.len()
        ));
        brew.bootstrap(&script)?;

        Ok(StepOutcome::Applied)
    })
    .skip_when(move |_| sentinel.is_available())
}

/// Refresh the package catalog.
///
/// Advisory, a failed refresh leaves the old catalog in place and the run
/// continues with it.
pub fn update_step(brew: Rc<dyn PackageManager>) -> SetupStep {
    SetupStep::new("update homebrew", move |_| {
        brew.update()?;
        Ok(StepOutcome::Applied)
    })
    .advisory()
}
