// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External tool access.
//!
//! Oxisetup never reimplements what the package manager or download utility
//! already do. It simply shells out to them. Both are reached through a small
//! trait so setup steps can be exercised without touching the network.

use crate::config::PackageKind;

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Command,
    time::Duration,
};
use tracing::{debug, instrument};

/// Well-known install prefixes of the package manager's binary.
const BREW_PREFIXES: [&str; 2] = ["/opt/homebrew/bin/brew", "/usr/local/bin/brew"];

/// Layer of indirection for package manager access.
pub trait PackageManager {
    /// Check if package manager itself is installed.
    fn is_available(&self) -> bool;

    /// List names of installed packages of target kind.
    fn installed(&self, kind: PackageKind) -> Result<Vec<String>>;

    /// Install package of target kind.
    fn install(&self, name: &str, kind: PackageKind) -> Result<()>;

    /// Refresh package catalog.
    fn update(&self) -> Result<()>;

    /// Install package manager itself by running its installer script.
    fn bootstrap(&self, installer_script: &str) -> Result<()>;
}

/// Package manager access through the `brew` binary.
#[derive(Debug, Default)]
pub struct Homebrew;

impl Homebrew {
    /// Construct new Homebrew access.
    pub fn new() -> Self {
        Self
    }

    fn program(&self) -> PathBuf {
        which::which("brew").unwrap_or_else(|_| {
            BREW_PREFIXES
                .iter()
                .map(PathBuf::from)
                .find(|path| path.exists())
                .unwrap_or_else(|| PathBuf::from("brew"))
        })
    }
}

impl PackageManager for Homebrew {
    fn is_available(&self) -> bool {
        which::which("brew").is_ok() || BREW_PREFIXES.iter().any(|path| Path::new(path).exists())
    }

    #[instrument(skip(self), level = "debug")]
    fn installed(&self, kind: PackageKind) -> Result<Vec<String>> {
        let flag = match kind {
            PackageKind::Formula => "--formula",
            PackageKind::Cask => "--cask",
        };
        let output = syscall_non_interactive(self.program(), ["list", flag, "-1"])?;

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect())
    }

    #[instrument(skip(self), level = "debug")]
    fn install(&self, name: &str, kind: PackageKind) -> Result<()> {
        let mut args = vec!["install"];
        if kind == PackageKind::Cask {
            args.push("--cask");
        }
        args.push(name);

        with_spinner(format!("installing {kind} {name}"), || {
            syscall_non_interactive(self.program(), &args)
        })?;

        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn update(&self) -> Result<()> {
        with_spinner("updating homebrew", || {
            syscall_non_interactive(self.program(), ["update"])
        })?;

        Ok(())
    }

    #[instrument(skip(self, installer_script), level = "debug")]
    fn bootstrap(&self, installer_script: &str) -> Result<()> {
        let status = Command::new("/bin/bash")
            .arg("-c")
            .arg(installer_script)
            .env("NONINTERACTIVE", "1")
            .status()
            .map_err(|err| ToolError::Spawn {
                source: err,
                command: "/bin/bash".into(),
            })?;

        if !status.success() {
            return Err(ToolError::Failed {
                command: "homebrew installer".into(),
                code: status.code(),
                message: String::new(),
            });
        }

        Ok(())
    }
}

/// Layer of indirection for fetching remote assets.
pub trait Fetcher {
    /// Fetch text content at URL.
    fn fetch(&self, url: &str) -> Result<String>;
}

/// Fetch remote assets through the `curl` binary.
#[derive(Debug, Clone)]
pub struct Curl {
    connect_timeout: Duration,
}

impl Curl {
    /// Construct new curl fetcher with connection timeout.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Fetcher for Curl {
    #[instrument(skip(self), level = "debug")]
    fn fetch(&self, url: &str) -> Result<String> {
        let timeout = self.connect_timeout.as_secs().max(1).to_string();
        let output = Command::new("curl")
            .args(["-fsSL", "--connect-timeout", timeout.as_str(), url])
            .output()
            .map_err(|err| ToolError::Spawn {
                source: err,
                command: "curl".into(),
            })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                command: format!("curl {url}"),
                code: output.status.code(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Query free space in KiB on the filesystem holding path.
///
/// # Errors
///
/// - Return [`ToolError::Spawn`] if `df` cannot be run.
/// - Return [`ToolError::Failed`] if `df` fails or its output is unreadable.
pub fn available_kib(path: impl AsRef<Path>) -> Result<u64> {
    let output = syscall_non_interactive("df", [OsStr::new("-Pk"), path.as_ref().as_os_str()])?;
    parse_df_available_kib(&output).ok_or_else(|| ToolError::Failed {
        command: "df -Pk".into(),
        code: None,
        message: format!("cannot read available space from {output:?}"),
    })
}

/// Read available KiB column out of POSIX `df -Pk` output.
pub fn parse_df_available_kib(output: &str) -> Option<u64> {
    output
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().nth(3))
        .and_then(|column| column.parse().ok())
}

fn with_spinner<T>(message: impl Into<String>, op: impl FnOnce() -> T) -> T {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {elapsed_precise:.dim}  {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    let result = op();
    bar.finish_and_clear();

    result
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let command = cmd.as_ref().to_string_lossy().into_owned();
    debug!("run {command}");
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .map_err(|err| ToolError::Spawn {
            source: err,
            command: command.clone(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        let mut message = String::new();
        if !stdout.is_empty() {
            message.push_str(format!("stdout: {stdout}").as_str());
        }
        if !stderr.is_empty() {
            message.push_str(format!("stderr: {stderr}").as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        let message = message.trim_end_matches(['\r', '\n']).to_owned();

        return Err(ToolError::Failed {
            command,
            code: output.status.code(),
            message,
        });
    }

    Ok(stdout)
}

/// External tool error types.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Command cannot be spawned at all.
    #[error("failed to run {command:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        command: String,
    },

    /// Command ran but reported failure.
    #[error("command {command:?} failed with exit code {}:\n{message}", .code.map_or("<none>".to_string(), |c| c.to_string()))]
    Failed {
        command: String,
        code: Option<i32>,
        message: String,
    },
}

impl ToolError {
    /// Exit code reported by failing command, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Spawn { .. } => None,
            Self::Failed { code, .. } => *code,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = ToolError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(
        indoc! {"
            Filesystem     1024-blocks      Used Available Capacity Mounted on
            /dev/disk3s5     971350180 412345678 523456789      45% /System/Volumes/Data
        "},
        Some(523456789);
        "posix output"
    )]
    #[test_case("Filesystem 1024-blocks Used Available Capacity Mounted on\n", None; "header only")]
    #[test_case("", None; "empty")]
    #[test]
    fn parse_df_output(input: &str, expect: Option<u64>) {
        pretty_assertions::assert_eq!(parse_df_available_kib(input), expect);
    }

    #[test]
    fn failing_command_keeps_exit_code() {
        let result = syscall_non_interactive("sh", ["-c", "echo nope >&2; exit 7"]);
        let err = result.unwrap_err();
        assert_eq!(err.exit_code(), Some(7));
        assert!(err.to_string().contains("stderr: nope"));
    }
}
