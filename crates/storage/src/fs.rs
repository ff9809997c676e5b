// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic writes and symlink-safe reads.
//!
//! Durable JSON goes to disk as temp-file + fsync + rename + directory
//! fsync, so readers observe either the previous document or the new one,
//! never a truncated mix. Every opened path refuses symlinks, and
//! containment is re-checked on the real path after open.

use crate::error::StorageError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

/// `O_NOFOLLOW` for opens that must not traverse a final-component symlink.
const NO_FOLLOW: i32 = nix::libc::O_NOFOLLOW;

/// Validate `relative` against `root` without touching the filesystem.
///
/// Rejects absolute paths and any `..` component, then requires the joined
/// result to stay under `root`. Returns the joined path.
pub fn validate_rel_path(root: &Path, relative: &Path) -> Result<PathBuf, StorageError> {
    if relative.is_absolute() {
        return Err(StorageError::PathSafety(format!(
            "absolute path not allowed: {}",
            relative.display()
        )));
    }
    for component in relative.components() {
        match component {
            Component::ParentDir => {
                return Err(StorageError::PathSafety(format!(
                    "parent-directory component in {}",
                    relative.display()
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(StorageError::PathSafety(format!(
                    "rooted component in {}",
                    relative.display()
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    let joined = root.join(relative);
    if !joined.starts_with(root) {
        return Err(StorageError::PathSafety(format!(
            "{} escapes {}",
            joined.display(),
            root.display()
        )));
    }
    Ok(joined)
}

/// Re-resolve an opened path and require the real location to stay under
/// `root`. This is the TOCTOU backstop: a component swapped for a symlink
/// between validation and open is caught here.
pub fn assert_contained(root: &Path, path: &Path) -> Result<(), StorageError> {
    let real = path
        .canonicalize()
        .map_err(|e| StorageError::PathSafety(format!("{}: {}", path.display(), e)))?;
    let real_root = root
        .canonicalize()
        .map_err(|e| StorageError::PathSafety(format!("{}: {}", root.display(), e)))?;
    if real != real_root && !real.starts_with(&real_root) {
        return Err(StorageError::PathSafety(format!(
            "{} resolves outside {}",
            path.display(),
            root.display()
        )));
    }
    Ok(())
}

/// Create `dir` and any missing ancestors, refusing to traverse symlinks.
///
/// Each existing component is `lstat`-ed: a symlink or non-directory is a
/// path-safety violation, not an I/O error.
pub fn ensure_dir_no_symlink(dir: &Path) -> Result<(), StorageError> {
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) => {
                if meta.file_type().is_symlink() {
                    return Err(StorageError::PathSafety(format!(
                        "symlink in directory path: {}",
                        current.display()
                    )));
                }
                if !meta.is_dir() {
                    return Err(StorageError::PathSafety(format!(
                        "not a directory: {}",
                        current.display()
                    )));
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match fs::DirBuilder::new().mode(0o700).create(&current) {
                    Ok(()) => {}
                    // Lost a create race to a sibling writer; re-check what won.
                    Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                        let meta = fs::symlink_metadata(&current)?;
                        if meta.file_type().is_symlink() || !meta.is_dir() {
                            return Err(StorageError::PathSafety(format!(
                                "not a directory: {}",
                                current.display()
                            )));
                        }
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Open an existing file for reading, refusing symlinks and non-regular
/// files.
pub fn open_regular(path: &Path) -> Result<File, StorageError> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(NO_FOLLOW)
        .open(path)
        .map_err(|e| classify_open_error(path, e))?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(StorageError::PathSafety(format!("not a regular file: {}", path.display())));
    }
    Ok(file)
}

fn classify_open_error(path: &Path, e: std::io::Error) -> StorageError {
    // ELOOP from O_NOFOLLOW means the final component is a symlink.
    if e.raw_os_error() == Some(nix::libc::ELOOP) {
        StorageError::PathSafety(format!("symlink refused: {}", path.display()))
    } else {
        StorageError::Io(e)
    }
}

/// Read a file to string through the symlink-safe open.
pub fn read_string(path: &Path) -> Result<String, StorageError> {
    let mut file = open_regular(path)?;
    let mut buf = String::new();
    file.read_to_string(&mut buf)?;
    Ok(buf)
}

/// Read and deserialize a JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StorageError> {
    let text = read_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Read a JSON document, mapping not-found to `None`.
///
/// Readers tolerate transient absence during renames: the writer renames
/// into place, so a missing file simply means "no document yet".
pub fn read_json_opt<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    match read_json(path) {
        Ok(v) => Ok(Some(v)),
        Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Durably write `bytes` at `path`: exclusive temp file in the same
/// directory, fsync, rename over the target, fsync the directory.
///
/// After a crash at any point the target holds either the previous content
/// or the new content; at worst a temp file is left behind.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path.parent().ok_or_else(|| {
        StorageError::PathSafety(format!("no parent directory for {}", path.display()))
    })?;
    ensure_dir_no_symlink(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::PathSafety(format!("invalid file name: {}", path.display())))?;
    let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, nanoid::nanoid!(8)));

    let result = write_and_rename(&tmp_path, path, parent, bytes);
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_and_rename(
    tmp_path: &Path,
    path: &Path,
    parent: &Path,
    bytes: &[u8],
) -> Result<(), StorageError> {
    let mut tmp = OpenOptions::new()
        .write(true)
        .create_new(true)
        .custom_flags(NO_FOLLOW)
        .mode(0o600)
        .open(tmp_path)
        .map_err(|e| classify_open_error(tmp_path, e))?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.sync_all()?;
    drop(tmp);

    rename_with_retry(tmp_path, path)?;

    // Persist the directory entry so the rename survives a crash.
    File::open(parent)?.sync_all()?;
    Ok(())
}

/// Rename, tolerating exactly one ENOENT race before escalating.
fn rename_with_retry(from: &Path, to: &Path) -> Result<(), StorageError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e2) => Err(StorageError::TransientIo(format!(
                "rename {} -> {} failed twice: {} / {}",
                from.display(),
                to.display(),
                e,
                e2
            ))),
        },
        Err(e) => Err(e.into()),
    }
}

/// Serialize as pretty-printed JSON (2-space indent, trailing newline) and
/// write atomically. This is the on-disk format for every durable entity.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    atomic_write(path, &bytes)
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
