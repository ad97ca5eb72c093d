// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine the well-known locations oxisetup persists its state to. Every
//! run writes into `$HOME/.oxisetup`, which holds one timestamped backup
//! directory per run and a single append-only install log.

use std::path::PathBuf;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to oxisetup's state directory.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_state_dir() -> Result<PathBuf> {
    home_dir().map(|path| path.join(".oxisetup"))
}

/// Determine default absolute path to the directory holding per-run backups.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_backup_root() -> Result<PathBuf> {
    default_state_dir().map(|path| path.join("backups"))
}

/// Determine default absolute path to the persistent install log.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_log_path() -> Result<PathBuf> {
    default_state_dir().map(|path| path.join("install.log"))
}

/// Determine default absolute path to the setup configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/oxisetup/config.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("oxisetup").join("config.toml"))
        .ok_or(NoWayHome)
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("HOME", "/home/blah")])]
    fn state_paths_live_under_home() -> anyhow::Result<()> {
        assert_eq!(default_state_dir()?, PathBuf::from("/home/blah/.oxisetup"));
        assert_eq!(
            default_backup_root()?,
            PathBuf::from("/home/blah/.oxisetup/backups")
        );
        assert_eq!(
            default_log_path()?,
            PathBuf::from("/home/blah/.oxisetup/install.log")
        );

        Ok(())
    }
}
