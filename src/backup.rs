// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup generations.
//!
//! Before graft overwrites anything inside a root, the previous content is
//! copied into a __backup generation__. Backups live under a single backup
//! directory, mirroring the absolute path of whatever they preserve.
//!
//! # Backup Directory Layout
//!
//! ```text
//! <backups>/<absolute root>/<relative destination>            current
//! <backups>/<absolute root>.<MM.DD.YYYY_HH.MM.SS>/...          rotated out
//! ```
//!
//! Each root has exactly one __current__ generation, the one without a
//! timestamp suffix. Every orchestrator run starts by rotating the current
//! generation out of the way, so the current generation only ever holds the
//! state that existed right before the latest run. Rotated generations are
//! never deleted by graft.
//!
//! Only one level of undo is possible: restoring always reads from the
//! current generation.

use crate::path::join;

use chrono::Local;
use mkdirp::mkdirp;
use std::{
    fs::{copy, rename},
    path::{absolute, Path, PathBuf, MAIN_SEPARATOR},
};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Timestamp format appended to rotated generations.
pub const ROTATION_FORMAT: &str = "%m.%d.%Y_%H.%M.%S";

/// Manage backup generations under a backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backups {
    dir: PathBuf,
}

impl Backups {
    /// Construct new backup manager.
    ///
    /// Does not touch the file system until something is rotated or backed
    /// up.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// Path of the current generation for a root.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Absolute`] if `root` cannot be made absolute.
    pub fn current(&self, root: impl AsRef<Path>) -> Result<PathBuf> {
        self.mirror(root.as_ref())
    }

    /// Check if a current generation exists for a root.
    pub fn has_current(&self, root: impl AsRef<Path>) -> bool {
        self.current(root).is_ok_and(|path| path.is_dir())
    }

    /// Path that would hold the backup of a destination.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Absolute`] if `dest` cannot be made absolute.
    pub fn backup_path(&self, dest: impl AsRef<Path>) -> Result<PathBuf> {
        self.mirror(dest.as_ref())
    }

    /// Start a new backup generation for a root.
    ///
    /// Renames the current generation by appending a timestamp, then creates
    /// an empty current generation. Must run once per orchestrator run,
    /// before anything is overwritten.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Io`] if the generation cannot be renamed or
    ///   created.
    pub fn rotate(&self, root: impl AsRef<Path>) -> Result<Rotation> {
        let current = self.current(root)?;
        let mut rotated = None;

        if current.exists() {
            let base = current.to_string_lossy();
            let base = base.trim_end_matches(['/', MAIN_SEPARATOR]);
            let timestamp = Local::now().format(ROTATION_FORMAT).to_string();

            // INVARIANT: Never clobber an older generation rotated in the same second.
            let mut target = PathBuf::from(format!("{base}.{timestamp}"));
            let mut counter = 1usize;
            while target.exists() {
                target = PathBuf::from(format!("{base}.{timestamp}-{counter}"));
                counter += 1;
            }

            info!("rotate backups {:?} -> {:?}", current.display(), target.display());
            rename(&current, &target).map_err(|err| BackupError::Io {
                source: err,
                path: current.clone(),
            })?;
            rotated = Some(target);
        }

        mkdirp(&current).map_err(|err| BackupError::Io {
            source: err,
            path: current.clone(),
        })?;

        Ok(Rotation { current, rotated })
    }

    /// Preserve content of a destination before it gets overwritten.
    ///
    /// Missing destinations have nothing to preserve and record nothing. The
    /// first backup of a destination within a generation wins, so repeated
    /// writes in one run never replace the pre-run state.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Io`] if content cannot be copied.
    pub fn backup_before_overwrite(&self, dest: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let dest = dest.as_ref();
        if !dest.exists() {
            return Ok(None);
        }

        let backup = self.backup_path(dest)?;
        if backup.exists() {
            debug!("backup of {:?} already recorded", dest.display());
            return Ok(Some(backup));
        }

        debug!("backup {:?} -> {:?}", dest.display(), backup.display());
        copy_any(dest, &backup)?;

        Ok(Some(backup))
    }

    /// Put content from the current generation back onto a destination.
    ///
    /// Returns `None` if the current generation holds nothing for `dest`,
    /// leaving it to the caller to decide what that means.
    ///
    /// # Errors
    ///
    /// - Return [`BackupError::Io`] if content cannot be copied.
    pub fn restore(&self, dest: impl AsRef<Path>) -> Result<Option<PathBuf>> {
        let dest = dest.as_ref();
        let backup = self.backup_path(dest)?;
        if !backup.exists() {
            return Ok(None);
        }

        debug!("restore {:?} -> {:?}", backup.display(), dest.display());
        copy_any(&backup, dest)?;

        Ok(Some(backup))
    }

    fn mirror(&self, path: &Path) -> Result<PathBuf> {
        let path = absolute(path).map_err(|err| BackupError::Absolute {
            source: err,
            path: path.to_path_buf(),
        })?;

        Ok(join([self.dir.as_path(), path.as_path()]))
    }
}

/// Outcome of a backup rotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    /// Fresh, empty current generation.
    pub current: PathBuf,

    /// Where the previous current generation went, if there was one.
    pub rotated: Option<PathBuf>,
}

fn copy_any(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        for entry in WalkDir::new(from) {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }

            let relative = entry.path().strip_prefix(from).unwrap_or(entry.path());
            copy_file(entry.path(), &to.join(relative))?;
        }

        return Ok(());
    }

    copy_file(from, to)
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        mkdirp(parent).map_err(|err| BackupError::Io {
            source: err,
            path: parent.to_path_buf(),
        })?;
    }

    copy(from, to).map_err(|err| BackupError::Io {
        source: err,
        path: to.to_path_buf(),
    })?;

    Ok(())
}

/// Backup management error types.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// Path cannot be resolved to an absolute path.
    #[error("failed to resolve absolute path of {:?}", path.display())]
    Absolute {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backup content cannot be written or moved.
    #[error("failed to write backup at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Backed up directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
}

/// Friendly result alias :3
pub type Result<T, E = BackupError> = std::result::Result<T, E>;
