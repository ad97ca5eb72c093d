// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Built-in setup steps.
//!
//! The standard run installs the package manager, refreshes its catalog,
//! installs the configured packages, and then writes configuration for the
//! shell, the terminal emulator, and the system information tool. Each step
//! checks whether its goal is already met before doing anything, so running
//! the whole sequence again is harmless.

pub mod dotconfig;
pub mod homebrew;
pub mod packages;
pub mod shell;

use crate::{
    config::SetupConfig,
    ledger::BackupLabel,
    sequencer::SetupStep,
    tools::{Fetcher, PackageManager},
};

use std::rc::Rc;

/// Build the standard ordered list of setup steps.
pub fn standard_steps(
    config: &SetupConfig,
    brew: Rc<dyn PackageManager>,
    fetcher: Rc<dyn Fetcher>,
) -> Vec<SetupStep> {
    vec![
        homebrew::install_step(config, Rc::clone(&brew), fetcher),
        homebrew::update_step(Rc::clone(&brew)),
        packages::install_step(config, brew),
        shell::configure_step(config),
        dotconfig::configure_step(
            "configure terminal",
            config.terminal.clone(),
            BackupLabel::TerminalConfig,
        ),
        dotconfig::configure_step(
            "configure info tool",
            config.info_tool.clone(),
            BackupLabel::InfoToolConfig,
        ),
    ]
}
