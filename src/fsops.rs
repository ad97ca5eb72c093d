// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Filesystem primitives shared by the backup ledger and rollback engine.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

/// Check if anything exists at path, without following symlinks.
pub(crate) fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Topmost ancestor of a missing path that does not exist either.
///
/// Creating `path` with its parents creates exactly this directory, so
/// removing it again undoes the whole chain.
pub(crate) fn highest_missing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .take_while(|ancestor| !path_exists(ancestor))
        .last()
        .unwrap_or(path)
        .to_path_buf()
}

/// Copy file, symlink, or directory tree from `src` to `dst`.
///
/// Directory trees are copied recursively with their structure intact.
/// Symlinks are copied as symlinks, never followed. Missing parent
/// directories of `dst` are created.
pub(crate) fn copy_path(src: &Path, dst: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent)?;
    }

    if meta.file_type().is_symlink() {
        return copy_symlink(src, dst);
    }

    if !meta.is_dir() {
        fs::copy(src, dst)?;
        return Ok(());
    }

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let out = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&out)?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &out)?;
        } else {
            fs::copy(entry.path(), &out)?;
        }
    }

    Ok(())
}

/// Remove file, symlink, or directory tree at path.
///
/// Returns `false` if nothing was there to begin with. A path vanishing
/// between the check and the removal also counts as already gone.
pub(crate) fn remove_path(path: &Path) -> io::Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    let result = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst).map(|_| ())
}
