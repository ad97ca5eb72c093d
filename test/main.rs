// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use anyhow::Result;
use oxisetup::{
    preflight::Preflight,
    rollback::FixedAnswer,
    steps::standard_steps,
    tools::{Fetcher, PackageManager, ToolError},
    BackupLedger, Installation, PackageKind, Report, RunContext, SetupConfig, SetupStep,
    StepSequencer,
};
use std::{
    cell::{Cell, RefCell},
    path::Path,
    rc::Rc,
};

/// Package manager that only pretends.
#[derive(Debug, Default)]
pub(crate) struct FakeBrew {
    pub(crate) available: Cell<bool>,
    pub(crate) installed: RefCell<Vec<(String, PackageKind)>>,
    pub(crate) bootstraps: Cell<u32>,
    pub(crate) install_attempts: Cell<u32>,
    pub(crate) fail_installs: bool,
    pub(crate) fail_update: bool,
}

impl FakeBrew {
    pub(crate) fn failing_installs() -> Self {
        Self {
            fail_installs: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_update() -> Self {
        Self {
            fail_update: true,
            ..Self::default()
        }
    }
}

impl PackageManager for FakeBrew {
    fn is_available(&self) -> bool {
        self.available.get()
    }

    fn installed(&self, kind: PackageKind) -> Result<Vec<String>, ToolError> {
        Ok(self
            .installed
            .borrow()
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn install(&self, name: &str, kind: PackageKind) -> Result<(), ToolError> {
        self.install_attempts.set(self.install_attempts.get() + 1);
        if self.fail_installs {
            return Err(ToolError::Failed {
                command: format!("brew install {name}"),
                code: Some(42),
                message: "network unreachable".into(),
            });
        }

        self.installed.borrow_mut().push((name.into(), kind));
        Ok(())
    }

    fn update(&self) -> Result<(), ToolError> {
        if self.fail_update {
            return Err(ToolError::Failed {
                command: "brew update".into(),
                code: Some(1),
                message: "offline".into(),
            });
        }

        Ok(())
    }

    fn bootstrap(&self, _installer_script: &str) -> Result<(), ToolError> {
        self.bootstraps.set(self.bootstraps.get() + 1);
        self.available.set(true);
        Ok(())
    }
}

/// Fetcher serving a canned installer script.
#[derive(Debug, Default)]
pub(crate) struct FakeFetcher {
    pub(crate) calls: Cell<u32>,
}

impl Fetcher for FakeFetcher {
    fn fetch(&self, _url: &str) -> Result<String, ToolError> {
        self.calls.set(self.calls.get() + 1);
        Ok("#!/bin/bash\necho installing homebrew\n".into())
    }
}

/// Configuration rooted entirely inside target home directory.
pub(crate) fn sandbox_config(home: &Path) -> SetupConfig {
    let mut config = SetupConfig::default();
    config.settings.backup_root = home.join(".oxisetup/backups");
    config.settings.log_path = home.join(".oxisetup/install.log");
    config.settings.required_os = None;
    config.settings.min_free_mib = 0;
    config.settings.required_tools = Vec::new();
    config.retry.delay_secs = 0;
    config.shell.rc_file = home.join(".zshrc");
    config.shell.profile_file = home.join(".zprofile");
    config.terminal.dir = home.join(".config/kitty");
    config.info_tool.dir = home.join(".config/fastfetch");
    config.packages = vec![
        oxisetup::config::PackageSpec::formula("git"),
        oxisetup::config::PackageSpec::cask("kitty"),
    ];

    config
}

/// Fresh run context for configuration.
pub(crate) fn new_context(config: &SetupConfig) -> Result<RunContext> {
    Ok(RunContext::new(
        config.clone(),
        BackupLedger::new(&config.settings.backup_root),
        Report::open(&config.settings.log_path)?,
    ))
}

/// Standard installation followed by extra steps, answering rollback prompt
/// with fixed answer.
pub(crate) fn installation(
    config: &SetupConfig,
    brew: &Rc<FakeBrew>,
    fetcher: &Rc<FakeFetcher>,
    extra: Vec<SetupStep>,
    answer: bool,
) -> Installation<FixedAnswer> {
    let brew: Rc<dyn PackageManager> = brew.clone();
    let fetcher: Rc<dyn Fetcher> = fetcher.clone();
    let mut steps = standard_steps(config, brew, fetcher);
    steps.extend(extra);

    Installation::new(
        Preflight::from_config(config),
        StepSequencer::new(steps),
        FixedAnswer(answer),
    )
}
