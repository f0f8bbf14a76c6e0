// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Overlay orchestration.
//!
//! An __overlay__ is a tree of added or modified files that gets projected
//! onto a __root__, some external project checkout, according to a
//! correspondence table. This module ties every other piece of graft together
//! into complete workflows.
//!
//! # Workflows
//!
//! - __install__: copy overlay files into the root, backing up anything that
//!   gets overwritten.
//! - __clean__: undo the latest install by restoring backed up files, and
//!   deleting files that only exist because of the overlay.
//! - __reverse-install__: pull changes made inside the root back into the
//!   overlay, limited to files the overlay already knows about.
//! - __check__: report which overlay files are missing or modified in the
//!   root.
//! - __hard-clean__: reset the root to its checked out revision through Git.
//!
//! # Run Stages
//!
//! Every run moves through the same stages:
//!
//! ```text
//! Unverified -> Verified -> BackedUp -> Synced
//!                  \            \
//!                   +------------+---> Failed
//! ```
//!
//! Verification covers the root, its marker files, and its revision. A
//! declined revision mismatch ends the run before anything is written. Once
//! writing has started, the first failure aborts the run. Writes that already
//! happened stay in place, and are reported through [`OverlayError::Aborted`].
//!
//! # Destination Layout
//!
//! A file key `F` mapped to `D` lands at `<root>/D/<name of F>`. Files inside
//! a directory key `K/` mapped to `D` land at
//! `<root>/D/<name of K>/<path relative to K>`.

pub mod check;
pub mod harvest;
pub mod install;
pub mod reset;

use crate::{
    backup::{BackupError, Backups},
    guard::{verify_root, verify_version, Git2TagProbe, GuardError, TagProbe, VersionCheck},
    path::{join, leaf, PathKind},
    sync::SyncError,
    table::{CorrespondenceTable, ExpandedCorrespondence, FileManifest, TableError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{absolute, Path, PathBuf},
};
use tracing::debug;

/// Root an overlay is applied to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Target {
    /// Name used in log output.
    pub name: String,

    /// Path to the root.
    pub root: PathBuf,

    /// Correspondence table to drive the run with.
    pub table: PathBuf,

    /// Files that must exist in the root.
    pub markers: Vec<String>,

    /// Revision tag the root must be checked out at.
    pub tag: String,
}

/// Overlay working directory bound to a backup directory.
///
/// Relative overlay paths in correspondence tables are resolved against the
/// working directory.
#[derive(Debug)]
pub struct Overlay<P = Git2TagProbe>
where
    P: TagProbe,
{
    workdir: PathBuf,
    backups: Backups,
    probe: P,
}

impl Overlay<Git2TagProbe> {
    /// Construct new overlay that detects revisions through libgit2.
    pub fn new(workdir: impl Into<PathBuf>, backups: Backups) -> Self {
        Self::with_probe(workdir, backups, Git2TagProbe)
    }
}

impl<P> Overlay<P>
where
    P: TagProbe,
{
    /// Construct new overlay with custom revision detection.
    pub fn with_probe(workdir: impl Into<PathBuf>, backups: Backups, probe: P) -> Self {
        Self {
            workdir: workdir.into(),
            backups,
            probe,
        }
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.as_path()
    }

    pub fn backups(&self) -> &Backups {
        &self.backups
    }

    /// Correspondence table of a target, relative paths resolved against
    /// the working directory.
    pub fn table_path(&self, target: &Target) -> PathBuf {
        if target.table.is_absolute() {
            target.table.clone()
        } else {
            self.workdir.join(&target.table)
        }
    }

    /// Verify root, markers, and revision of a target.
    ///
    /// Returns the absolute root, or the failed check if the operator
    /// declined a revision mismatch.
    fn verify(
        &self,
        target: &Target,
        confirm: impl FnOnce(&VersionCheck) -> bool,
    ) -> Result<Verified> {
        let root = absolute(&target.root).map_err(|err| OverlayError::Io {
            source: err,
            path: target.root.clone(),
        })?;

        verify_root(&root, &target.markers)?;
        let (check, proceed) = verify_version(&self.probe, &root, target.tag.as_str(), confirm);
        if !proceed {
            return Ok(Verified::Declined(check));
        }

        Ok(Verified::Root(root))
    }

    /// Load and expand the correspondence table of a target.
    fn correspondences(&self, target: &Target) -> Result<ExpandedCorrespondence> {
        let table = CorrespondenceTable::load(self.table_path(target))?;
        let expanded = table.expand_globs(&self.workdir)?;
        debug!(
            "{} correspondences expanded to {} paths",
            table.len(),
            expanded.len()
        );

        Ok(expanded)
    }
}

enum Verified {
    Root(PathBuf),
    Declined(VersionCheck),
}

/// Where a manifest file lives inside a root.
pub fn destination_of(
    root: &Path,
    destination: &str,
    manifest: &FileManifest,
    file: &Path,
) -> PathBuf {
    let relative = manifest.relative(file);
    match manifest.kind {
        PathKind::Directory => join([
            root,
            Path::new(destination),
            Path::new(&leaf(&manifest.source)),
            relative,
        ]),
        PathKind::File => join([root, Path::new(destination), relative]),
    }
}

/// How an orchestrator run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Run went through every correspondence.
    Synced(SyncReport),

    /// Operator declined to continue on a revision mismatch. Nothing was
    /// written.
    Declined(VersionCheck),
}

impl Outcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Synced(report) => Some(report),
            Self::Declined(_) => None,
        }
    }
}

/// Stage of an orchestrator run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Unverified,
    Verified,
    BackedUp,
    Synced,
    Failed,
}

impl Display for Stage {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Unverified => "unverified",
            Self::Verified => "verified",
            Self::BackedUp => "backed up",
            Self::Synced => "synced",
            Self::Failed => "failed",
        };
        fmt.write_str(name)
    }
}

/// Everything an orchestrator run did, in order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Absolute root the run operated on.
    pub root: PathBuf,

    /// Stage the run ended in.
    pub stage: Stage,

    /// Per file events.
    pub events: Vec<SyncEvent>,
}

impl SyncReport {
    /// Paths expected in the root but not found.
    pub fn missing(&self) -> impl Iterator<Item = &Path> {
        self.events.iter().filter_map(|event| match event {
            SyncEvent::Missing { path } => Some(path.as_path()),
            _ => None,
        })
    }

    /// Paths found in the root with content differing from the overlay.
    pub fn modified(&self) -> impl Iterator<Item = &Path> {
        self.events.iter().filter_map(|event| match event {
            SyncEvent::Modified { path, .. } => Some(path.as_path()),
            _ => None,
        })
    }

    /// Check if every expected path was found unmodified.
    pub fn is_clean(&self) -> bool {
        self.missing().next().is_none() && self.modified().next().is_none()
    }
}

/// Single file level event of an orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// File copied, previous content backed up if there was any.
    Copied {
        source: PathBuf,
        destination: PathBuf,
        backup: Option<PathBuf>,
    },

    /// File restored from the current backup generation.
    Restored { path: PathBuf, backup: PathBuf },

    /// Path removed because no backup of it exists.
    Removed { path: PathBuf },

    /// Path found with expected content.
    Found { path: PathBuf },

    /// Path found with content differing from the overlay.
    Modified { path: PathBuf, overlay: PathBuf },

    /// Path expected but not found.
    Missing { path: PathBuf },
}

impl From<crate::sync::Copied> for SyncEvent {
    fn from(copied: crate::sync::Copied) -> Self {
        Self::Copied {
            source: copied.source,
            destination: copied.destination,
            backup: copied.backup,
        }
    }
}

impl Display for SyncEvent {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Copied {
                source,
                destination,
                ..
            } => write!(fmt, "{} -> {}", source.display(), destination.display()),
            Self::Restored { path, backup } => write!(
                fmt,
                "replacing {:?} with backup {:?}",
                path.display(),
                backup.display()
            ),
            Self::Removed { path } => {
                write!(fmt, "removing {:?} as there is no backup entry", path.display())
            }
            Self::Found { path } => write!(fmt, "{} -- found", path.display()),
            Self::Modified { path, .. } => write!(fmt, "{} -- modified", path.display()),
            Self::Missing { path } => write!(fmt, "{} -- not found", path.display()),
        }
    }
}

/// Bookkeeping for a run in progress.
#[derive(Debug, Default)]
struct Run {
    root: PathBuf,
    stage: Stage,
    events: Vec<SyncEvent>,
}

impl Run {
    fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!("{:?}: {} -> {}", self.root.display(), self.stage, stage);
        self.stage = stage;
    }

    fn record(&mut self, event: impl Into<SyncEvent>) {
        let event = event.into();
        debug!("{event}");
        self.events.push(event);
    }

    /// Turn an error into a terminal failure, keeping what was applied.
    fn fail(mut self, error: impl Into<OverlayError>) -> OverlayError {
        let reached = self.stage;
        self.advance(Stage::Failed);
        OverlayError::Aborted {
            stage: self.stage,
            reached,
            applied: self.events,
            source: Box::new(error.into()),
        }
    }

    fn finish(mut self) -> SyncReport {
        self.advance(Stage::Synced);
        SyncReport {
            root: self.root,
            stage: self.stage,
            events: self.events,
        }
    }
}

/// Orchestration error types.
#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    /// Root or marker verification fails.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Correspondence table cannot be loaded or expanded.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Copy or removal fails.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Backup generation cannot be rotated or read.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Clean requested without any backup generation for the root.
    #[error("no backups made for {:?}, run install first", root.display())]
    NoBackupAvailable { root: PathBuf },

    /// Overlay path of a correspondence is gone.
    #[error("unable to locate overlay path {:?}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Path cannot be resolved.
    #[error("failed to resolve {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Run failed after it started writing.
    #[error("run aborted while {reached} after {} applied operations", applied.len())]
    Aborted {
        /// Always [`Stage::Failed`].
        stage: Stage,

        /// Last stage the run reached before failing.
        reached: Stage,

        applied: Vec<SyncEvent>,
        #[source]
        source: Box<OverlayError>,
    },
}

/// Friendly result alias :3
pub type Result<T, E = OverlayError> = std::result::Result<T, E>;
