// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shell startup file configuration.
//!
//! Oxisetup owns exactly one block in each shell startup file it touches. The
//! block sits between a start marker and an end marker, and the start marker
//! is the sentinel: if a file already contains it, the file is left alone.
//! Anything the user wrote outside the block is never modified.

use crate::{
    config::{SetupConfig, ShellSettings},
    ledger::BackupLabel,
    sequencer::{SetupStep, StepError, StepOutcome},
};

use std::{
    fs::{read_to_string, OpenOptions},
    io::{ErrorKind, Write},
    path::Path,
};

/// Write managed block into rc file, and profile file if configured.
pub fn configure_step(config: &SetupConfig) -> SetupStep {
    let shell = config.shell.clone();
    let sentinel = config.shell.clone();

    let mut step = SetupStep::new("configure shell", move |_| {
        let mut outcome = StepOutcome::Skipped;
        for (path, lines) in managed_files(&shell) {
            if ensure_block(path, &shell.marker, &shell.end_marker, lines).map_err(|err| {
                StepError::Io {
                    source: err,
                    path: path.to_path_buf(),
                }
            })? {
                outcome = StepOutcome::Applied;
            }
        }

        Ok(outcome)
    })
    .backup(&config.shell.rc_file, BackupLabel::ShellRc)
    .skip_when(move |_| {
        managed_files(&sentinel)
            .into_iter()
            .all(|(path, _)| has_marker(path, &sentinel.marker))
    });

    if !config.shell.profile_lines.is_empty() {
        step = step.backup(&config.shell.profile_file, BackupLabel::ShellProfile);
    }

    step
}

fn managed_files(shell: &ShellSettings) -> Vec<(&Path, &[String])> {
    let mut files = vec![(shell.rc_file.as_path(), shell.lines.as_slice())];
    if !shell.profile_lines.is_empty() {
        files.push((shell.profile_file.as_path(), shell.profile_lines.as_slice()));
    }

    files
}

/// Check if file already carries the managed block's start marker.
pub fn has_marker(path: impl AsRef<Path>, marker: &str) -> bool {
    read_to_string(path)
        .map(|content| content.lines().any(|line| line.trim() == marker))
        .unwrap_or(false)
}

/// Append managed block to file unless its start marker is already present.
///
/// Creates the file and its parent directories if missing. Returns `true` if
/// the block was written.
///
/// # Errors
///
/// - Return [`std::io::Error`] if file cannot be read, created, or appended.
pub fn ensure_block(
    path: impl AsRef<Path>,
    marker: &str,
    end_marker: &str,
    lines: &[String],
) -> std::io::Result<bool> {
    let path = path.as_ref();
    let existing = match read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => return Err(err),
    };

    if existing.lines().any(|line| line.trim() == marker) {
        return Ok(false);
    }

    let mut block = String::new();
    if !existing.is_empty() {
        // INVARIANT: Block always starts on its own line, separated by a blank one.
        if !existing.ends_with('\n') {
            block.push('\n');
        }
        block.push('\n');
    }
    block.push_str(marker);
    block.push('\n');
    for line in lines {
        block.push_str(line);
        block.push('\n');
    }
    block.push_str(end_marker);
    block.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(block.as_bytes())?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::write;

    const START: &str = "# >>> oxisetup >>>";
    const END: &str = "# <<< oxisetup <<<";

    fn lines() -> Vec<String> {
        vec!["export EDITOR=nvim".into(), "alias ll='ls -lah'".into()]
    }

    #[sealed_test]
    fn block_is_written_to_new_file() -> anyhow::Result<()> {
        assert!(ensure_block("nested/.zshrc", START, END, &lines())?);

        let expect = indoc! {"
            # >>> oxisetup >>>
            export EDITOR=nvim
            alias ll='ls -lah'
            # <<< oxisetup <<<
        "};
        assert_eq!(read_to_string("nested/.zshrc")?, expect);

        Ok(())
    }

    #[sealed_test]
    fn block_is_appended_after_user_content() -> anyhow::Result<()> {
        write(".zshrc", "export PATH=$HOME/bin:$PATH")?;
        assert!(ensure_block(".zshrc", START, END, &lines())?);

        let expect = indoc! {"
            export PATH=$HOME/bin:$PATH

            # >>> oxisetup >>>
            export EDITOR=nvim
            alias ll='ls -lah'
            # <<< oxisetup <<<
        "};
        assert_eq!(read_to_string(".zshrc")?, expect);

        Ok(())
    }

    #[sealed_test]
    fn block_is_never_inserted_twice() -> anyhow::Result<()> {
        assert!(ensure_block(".zshrc", START, END, &lines())?);
        let first = read_to_string(".zshrc")?;

        assert!(!ensure_block(".zshrc", START, END, &lines())?);
        assert_eq!(read_to_string(".zshrc")?, first);
        assert!(has_marker(".zshrc", START));

        Ok(())
    }

    #[sealed_test]
    fn missing_file_has_no_marker() {
        assert!(!has_marker(".zshrc", START));
    }
}
