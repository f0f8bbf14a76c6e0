// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File synchronization primitives.
//!
//! Copy and remove operations that every orchestrator is built from. Copying
//! never destroys content silently: any file about to be overwritten is
//! handed to [`Backups`] first.
//!
//! # Copy Semantics
//!
//! - Missing destination: created first, a trailing separator makes it a
//!   directory, otherwise only its parents are created.
//! - Existing file destination: backed up, then overwritten with the source
//!   content and permissions.
//! - Existing directory destination: the source file lands inside it under
//!   its own name.
//! - Directory source: every contained file is copied one by one into
//!   `dest/<source name>/`. Copying a directory onto a file is a type
//!   conflict.
//!
//! No content comparison is done. Copying the same file twice burns a second
//! backup slot on the next generation and rewrites identical bytes.

use crate::{
    backup::{BackupError, Backups},
    path::{classify, has_trailing_separator, leaf, PathKind},
};

use mkdirp::mkdirp;
use std::{
    fs::{self, remove_dir_all, remove_file, symlink_metadata, write},
    path::{Path, PathBuf, MAIN_SEPARATOR},
};
use tracing::debug;
use walkdir::WalkDir;

/// Record of one file copied by [`copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Copied {
    /// File that was read.
    pub source: PathBuf,

    /// File that was written.
    pub destination: PathBuf,

    /// Where the previous content of the destination went, if any.
    pub backup: Option<PathBuf>,
}

/// Copy file or directory content with implicit backup.
///
/// # Errors
///
/// - Return [`SyncError::SourceNotFound`] if `source` does not exist.
/// - Return [`SyncError::TypeConflict`] if a directory is copied onto a file.
/// - Return [`SyncError::Backup`] if the destination cannot be backed up.
/// - Return [`SyncError::Io`] if content cannot be written.
pub fn copy(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    backups: &Backups,
) -> Result<Vec<Copied>> {
    let source = source.as_ref();
    let destination = destination.as_ref();

    if !source.exists() {
        return Err(SyncError::SourceNotFound {
            path: source.to_path_buf(),
        });
    }

    if source.is_dir() {
        return copy_dir(source, destination, backups);
    }

    copy_file(source, destination, backups).map(|copied| vec![copied])
}

fn copy_dir(source: &Path, destination: &Path, backups: &Backups) -> Result<Vec<Copied>> {
    if destination.exists() && !destination.is_dir() {
        return Err(SyncError::TypeConflict {
            from: source.to_path_buf(),
            onto: destination.to_path_buf(),
        });
    }

    let target = destination.join(leaf(source).trim_end_matches(['/', MAIN_SEPARATOR]));
    let mut copied = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        copied.push(copy_file(entry.path(), &target.join(relative), backups)?);
    }

    Ok(copied)
}

fn copy_file(source: &Path, destination: &Path, backups: &Backups) -> Result<Copied> {
    if !destination.exists() {
        match classify(destination) {
            PathKind::Directory => {
                create(destination, "", false)?;
                return copy_file(source, destination, backups);
            }
            PathKind::File => {
                create_parents(destination)?;
                return write_over(source, destination, None);
            }
        }
    }

    if destination.is_dir() {
        return copy_file(source, &destination.join(leaf(source)), backups);
    }

    let backup = backups.backup_before_overwrite(destination)?;
    write_over(source, destination, backup)
}

fn write_over(source: &Path, destination: &Path, backup: Option<PathBuf>) -> Result<Copied> {
    debug!("{} -> {}", source.display(), destination.display());
    fs::copy(source, destination).map_err(|err| SyncError::Io {
        source: err,
        path: destination.to_path_buf(),
    })?;

    Ok(Copied {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        backup,
    })
}

/// Remove a file, a directory, or everything a glob pattern matches.
///
/// Removing something that does not exist and matches nothing is a no-op.
/// Returns every path that was removed.
///
/// # Errors
///
/// - Return [`SyncError::Pattern`] if `path` is neither an existing path nor
///   a valid glob pattern.
/// - Return [`SyncError::Io`] if something cannot be removed.
pub fn remove(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();

    if let Ok(metadata) = symlink_metadata(path) {
        if metadata.is_dir() {
            remove_dir_all(path)
        } else {
            remove_file(path)
        }
        .map_err(|err| SyncError::Io {
            source: err,
            path: path.to_path_buf(),
        })?;
        debug!("removed {}", path.display());

        return Ok(vec![path.to_path_buf()]);
    }

    let pattern = path.to_string_lossy();
    let pattern = pattern.trim_end_matches(['/', MAIN_SEPARATOR]);
    let matches = glob::glob(pattern).map_err(|err| SyncError::Pattern {
        source: err,
        pattern: pattern.to_string(),
    })?;

    let mut removed = Vec::new();
    for entry in matches {
        let entry = entry?;
        // INVARIANT: An earlier match may have taken this one with it.
        if symlink_metadata(&entry).is_err() {
            continue;
        }

        removed.extend(remove(entry)?);
    }

    Ok(removed)
}

/// Create a file with given contents, or a directory.
///
/// The kind of entry is decided by [`classify`] rules on the requested path
/// itself: a trailing separator asks for a directory. An existing entry of
/// the other kind is replaced only when `replace` is set.
///
/// # Errors
///
/// - Return [`SyncError::TypeConflict`] if an entry of the other kind exists
///   and `replace` is not set.
/// - Return [`SyncError::Io`] if the entry cannot be created.
pub fn create(path: impl AsRef<Path>, contents: impl AsRef<[u8]>, replace: bool) -> Result<()> {
    let path = path.as_ref();
    let wants_dir = has_trailing_separator(path);
    let bare = PathBuf::from(
        path.to_string_lossy()
            .trim_end_matches(['/', MAIN_SEPARATOR])
            .to_string(),
    );

    if let Ok(metadata) = symlink_metadata(&bare) {
        if metadata.is_dir() != wants_dir {
            if !replace {
                return Err(SyncError::TypeConflict {
                    from: path.to_path_buf(),
                    onto: bare,
                });
            }
            remove(&bare)?;
        }
    }

    if wants_dir {
        return mkdirp(path).map(|_| ()).map_err(|err| SyncError::Io {
            source: err,
            path: path.to_path_buf(),
        });
    }

    create_parents(path)?;
    write(path, contents).map_err(|err| SyncError::Io {
        source: err,
        path: path.to_path_buf(),
    })
}

fn create_parents(path: &Path) -> Result<()> {
    // INVARIANT: A file standing where a parent directory belongs is a conflict.
    if let Some(blocker) = path
        .ancestors()
        .skip(1)
        .find(|ancestor| !ancestor.as_os_str().is_empty() && ancestor.exists())
        .filter(|ancestor| !ancestor.is_dir())
    {
        return Err(SyncError::TypeConflict {
            from: path.to_path_buf(),
            onto: blocker.to_path_buf(),
        });
    }

    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            mkdirp(parent).map(|_| ()).map_err(|err| SyncError::Io {
                source: err,
                path: parent.to_path_buf(),
            })
        }
        _ => Ok(()),
    }
}

/// File synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Source of a copy does not exist.
    #[error("source {:?} does not exist", path.display())]
    SourceNotFound { path: PathBuf },

    /// File and directory mixed up between source and destination.
    #[error(
        "cannot place {:?} onto {:?}: file and directory kinds conflict",
        from.display(),
        onto.display()
    )]
    TypeConflict { from: PathBuf, onto: PathBuf },

    /// Removal target is not a valid glob pattern.
    #[error("invalid removal pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Glob match cannot be read.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Source directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    /// Destination cannot be backed up.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// File system operation fails.
    #[error("failed to write {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
