// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the setup configuration file that drives a run. Every
//! section is optional. Anything left out falls back to the built-in defaults,
//! so an empty document is a complete configuration.
//!
//! # General Layout
//!
//! ```toml
//! [settings]
//! backup_root = "~/.oxisetup/backups"
//! log_path = "~/.oxisetup/install.log"
//! required_os = "macos"
//! min_free_mib = 2048
//! required_tools = ["curl"]
//!
//! [retry]
//! attempts = 3
//! delay_secs = 5
//!
//! [shell]
//! rc_file = "~/.zshrc"
//! lines = ["export EDITOR=nvim"]
//!
//! [[package]]
//! name = "kitty"
//! kind = "cask"
//! ```
//!
//! All path fields go through shell expansion, so `~` and `$VARS` work.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

/// Setup configuration layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SetupConfig {
    /// General settings for a run.
    pub settings: Settings,

    /// Retry policy for network-dependent installers.
    pub retry: RetrySettings,

    /// Download utility settings.
    pub download: DownloadSettings,

    /// Shell startup file configuration.
    pub shell: ShellSettings,

    /// Terminal emulator configuration directory.
    pub terminal: ManagedConfig,

    /// System information tool configuration directory.
    pub info_tool: ManagedConfig,

    /// Packages to install through the package manager.
    #[serde(rename = "package")]
    pub packages: Vec<PackageSpec>,
}

impl SetupConfig {
    /// Load configuration from target path.
    ///
    /// A missing configuration file is not an error. The built-in defaults are
    /// used instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if configuration file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if configuration is malformed.
    /// - Return [`ConfigError::ShellExpansion`] if a path cannot be expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no config at {:?}, using defaults", path.display());
            return "".parse();
        }

        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Fixed delay between retry attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.delay_secs)
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            retry: RetrySettings::default(),
            download: DownloadSettings::default(),
            shell: ShellSettings::default(),
            terminal: ManagedConfig {
                dir: PathBuf::from("~/.config/kitty"),
                file_name: "kitty.conf".into(),
                contents: concat!(
                    "font_family      JetBrainsMono Nerd Font\n",
                    "font_size        14.0\n",
                    "confirm_os_window_close 0\n",
                )
                .into(),
            },
            info_tool: ManagedConfig {
                dir: PathBuf::from("~/.config/fastfetch"),
                file_name: "config.jsonc".into(),
                contents: concat!(
                    "{\n",
                    "  \"logo\": { \"type\": \"small\" },\n",
                    "  \"modules\": [\"title\", \"os\", \"kernel\", \"shell\", \"terminal\", \"memory\"]\n",
                    "}\n",
                )
                .into(),
            },
            packages: vec![
                PackageSpec::formula("git"),
                PackageSpec::formula("neovim"),
                PackageSpec::formula("ripgrep"),
                PackageSpec::formula("fastfetch"),
                PackageSpec::cask("kitty"),
            ],
        }
    }
}

impl FromStr for SetupConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: SetupConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        config.settings.backup_root = expand(&config.settings.backup_root)?;
        config.settings.log_path = expand(&config.settings.log_path)?;
        config.shell.rc_file = expand(&config.shell.rc_file)?;
        config.shell.profile_file = expand(&config.shell.profile_file)?;
        config.terminal.dir = expand(&config.terminal.dir)?;
        config.info_tool.dir = expand(&config.info_tool.dir)?;

        Ok(config)
    }
}

impl Display for SetupConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// General run settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one timestamped backup directory per run.
    pub backup_root: PathBuf,

    /// Persistent install log.
    pub log_path: PathBuf,

    /// Operating system the run must happen on, e.g., "macos".
    pub required_os: Option<String>,

    /// Minimum free disk space in MiB. Zero disables the check.
    pub min_free_mib: u64,

    /// External tools that must be reachable through `PATH`.
    pub required_tools: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from("~/.oxisetup/backups"),
            log_path: PathBuf::from("~/.oxisetup/install.log"),
            required_os: Some("macos".into()),
            min_free_mib: 2048,
            required_tools: vec!["curl".into()],
        }
    }
}

/// Bounded retry for network-dependent installers.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempt cap.
    pub attempts: u32,

    /// Fixed delay between attempts in seconds.
    pub delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_secs: 5,
        }
    }
}

/// Download utility settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,

    /// URL of package manager's installer script.
    pub homebrew_installer_url: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            homebrew_installer_url:
                "https://raw.githubusercontent.com/Homebrew/install/HEAD/install.sh".into(),
        }
    }
}

/// Shell startup file settings.
///
/// Lines are written inside a block delimited by the start and end markers.
/// The start marker doubles as the sentinel that keeps the block from being
/// inserted twice.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Interactive shell startup file.
    pub rc_file: PathBuf,

    /// Login shell profile file.
    pub profile_file: PathBuf,

    /// Start of managed block.
    pub marker: String,

    /// End of managed block.
    pub end_marker: String,

    /// Lines for the rc file block.
    pub lines: Vec<String>,

    /// Lines for the profile file block. Empty leaves profile untouched.
    pub profile_lines: Vec<String>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            rc_file: PathBuf::from("~/.zshrc"),
            profile_file: PathBuf::from("~/.zprofile"),
            marker: "# >>> oxisetup >>>".into(),
            end_marker: "# <<< oxisetup <<<".into(),
            lines: vec![
                "export EDITOR=nvim".into(),
                "alias ll='ls -lah'".into(),
            ],
            profile_lines: vec![r#"eval "$(/opt/homebrew/bin/brew shellenv)""#.into()],
        }
    }
}

/// Configuration directory owned by an external tool.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagedConfig {
    /// Directory holding the configuration.
    pub dir: PathBuf,

    /// Name of configuration file inside directory.
    pub file_name: String,

    /// Full contents of configuration file.
    pub contents: String,
}

impl ManagedConfig {
    /// Absolute path to managed configuration file.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

/// Package to install.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PackageSpec {
    /// Name of package in package manager's catalog.
    pub name: String,

    /// Catalog the package comes from.
    #[serde(default)]
    pub kind: PackageKind,
}

impl PackageSpec {
    /// Construct new command-line tool package.
    pub fn formula(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PackageKind::Formula,
        }
    }

    /// Construct new application bundle package.
    pub fn cask(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PackageKind::Cask,
        }
    }
}

/// Package kind in the package manager's catalog.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// Command-line tool.
    #[default]
    Formula,

    /// GUI application bundle.
    Cask,
}

impl Display for PackageKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Formula => fmt.write_str("formula"),
            Self::Cask => fmt.write_str("cask"),
        }
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file {:?}", .path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah"), ("DOTS", "/srv/dots")])]
    fn deserialize_partial_config() -> anyhow::Result<()> {
        let result: SetupConfig = r#"
            [settings]
            backup_root = "$DOTS/backups"
            required_os = "linux"
            min_free_mib = 0

            [retry]
            attempts = 5

            [shell]
            rc_file = "~/.bashrc"
            lines = ["export PAGER=less"]

            [[package]]
            name = "jq"

            [[package]]
            name = "wezterm"
            kind = "cask"
        "#
        .parse()?;

        assert_eq!(result.settings.backup_root, PathBuf::from("/srv/dots/backups"));
        assert_eq!(
            result.settings.log_path,
            PathBuf::from("/home/blah/.oxisetup/install.log")
        );
        assert_eq!(result.settings.required_os, Some("linux".into()));
        assert_eq!(result.settings.min_free_mib, 0);
        assert_eq!(result.retry, RetrySettings { attempts: 5, delay_secs: 5 });
        assert_eq!(result.shell.rc_file, PathBuf::from("/home/blah/.bashrc"));
        assert_eq!(result.shell.profile_file, PathBuf::from("/home/blah/.zprofile"));
        assert_eq!(result.shell.lines, vec!["export PAGER=less".to_string()]);
        assert_eq!(result.terminal.dir, PathBuf::from("/home/blah/.config/kitty"));
        assert_eq!(
            result.packages,
            vec![PackageSpec::formula("jq"), PackageSpec::cask("wezterm")]
        );

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn empty_document_uses_defaults() -> anyhow::Result<()> {
        let result: SetupConfig = "".parse()?;

        assert_eq!(result.retry.attempts, 3);
        assert_eq!(result.retry_delay(), Duration::from_secs(5));
        assert_eq!(result.shell.rc_file, PathBuf::from("/home/blah/.zshrc"));
        assert_eq!(
            result.info_tool.file_path(),
            PathBuf::from("/home/blah/.config/fastfetch/config.jsonc")
        );
        assert_eq!(result.packages.len(), 5);

        Ok(())
    }

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn serialized_config_parses_back() -> anyhow::Result<()> {
        let expect: SetupConfig = "".parse()?;
        let result: SetupConfig = expect.to_string().parse()?;
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn missing_config_file_is_not_an_error() -> anyhow::Result<()> {
        let result = SetupConfig::load("does-not-exist.toml");
        assert!(result.is_ok());

        Ok(())
    }

    #[test]
    fn malformed_config_is_rejected() {
        let result = "[retry]\nattempts = \"many\"".parse::<SetupConfig>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }
}
