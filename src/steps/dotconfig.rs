// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration directories of external tools.
//!
//! Terminal emulators and system information tools keep their settings in a
//! directory under `~/.config`. The whole directory is protected, not just the
//! one file written into it, so a rollback puts back exactly what was there
//! before, and drops anything the step added.

use crate::{
    config::ManagedConfig,
    ledger::BackupLabel,
    sequencer::{SetupStep, StepError, StepOutcome},
};

use std::fs::{read_to_string, write};

/// Write managed configuration file into its directory.
pub fn configure_step(
    name: impl Into<String>,
    managed: ManagedConfig,
    label: BackupLabel,
) -> SetupStep {
    let sentinel = managed.clone();
    let dir = managed.dir.clone();

    SetupStep::new(name, move |_| {
        let file_path = managed.file_path();
        mkdirp::mkdirp(&managed.dir).map_err(|err| StepError::Io {
            source: err,
            path: managed.dir.clone(),
        })?;
        write(&file_path, managed.contents.as_bytes()).map_err(|err| StepError::Io {
            source: err,
            path: file_path.clone(),
        })?;

        Ok(StepOutcome::Applied)
    })
    .backup(dir, label)
    .skip_when(move |_| is_current(&sentinel))
}

/// Check if managed file already holds the configured contents.
pub fn is_current(managed: &ManagedConfig) -> bool {
    read_to_string(managed.file_path())
        .map(|content| content == managed.contents)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;
    use std::{fs::create_dir_all, path::PathBuf};

    fn managed() -> ManagedConfig {
        ManagedConfig {
            dir: PathBuf::from("kitty"),
            file_name: "kitty.conf".into(),
            contents: "font_size 14.0\n".into(),
        }
    }

    #[sealed_test]
    fn stale_or_missing_file_is_not_current() -> anyhow::Result<()> {
        assert!(!is_current(&managed()));

        create_dir_all("kitty")?;
        write("kitty/kitty.conf", "font_size 11.0\n")?;
        assert!(!is_current(&managed()));

        write("kitty/kitty.conf", "font_size 14.0\n")?;
        assert!(is_current(&managed()));

        Ok(())
    }
}
