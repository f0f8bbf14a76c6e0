// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hard clean through Git.
//!
//! When backups are gone or untrustworthy, the only way back to a pristine
//! root is the version control system it was checked out from. A hard clean
//! resets every tracked file to HEAD, and deletes untracked files and
//! directories below the root. Ignored files are left alone.
//!
//! This cannot be undone. Callers are expected to get explicit consent from
//! the operator first.

use crate::{
    guard::{verify_root, TagProbe},
    overlay::{Overlay, OverlayError, Result, Run, Stage, SyncEvent, SyncReport, Target},
    sync::remove,
};

use git2::{ObjectType, Repository, ResetType, Status, StatusOptions};
use std::path::{absolute, Path, PathBuf};
use tracing::{info, instrument};

impl<P> Overlay<P>
where
    P: TagProbe,
{
    /// Reset a target root to its checked out revision.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Guard`] if root or markers are missing.
    /// - Return [`OverlayError::Git2`] if the root is not inside a
    ///   repository with a work tree.
    /// - Return [`OverlayError::Aborted`] if resetting fails part way through.
    #[instrument(skip(self, target), fields(target = %target.name), level = "debug")]
    pub fn hard_clean(&self, target: &Target) -> Result<SyncReport> {
        let root = absolute(&target.root).map_err(|err| OverlayError::Io {
            source: err,
            path: target.root.clone(),
        })?;
        verify_root(&root, &target.markers)?;

        let repository = Repository::discover(&root)?;
        let workdir = repository
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| git2::Error::from_str("repository has no work tree"))?;

        let mut run = Run::new(&root);
        run.advance(Stage::Verified);

        info!("hard cleaning {:?}", root.display());
        if let Err(error) = reset_to_head(&repository) {
            return Err(run.fail(error));
        }

        let untracked = match untracked_paths(&repository, &workdir, &root) {
            Ok(untracked) => untracked,
            Err(error) => return Err(run.fail(error)),
        };

        for path in untracked {
            if let Err(error) = remove(&path) {
                return Err(run.fail(error));
            }
            run.record(SyncEvent::Removed { path });
        }

        Ok(run.finish())
    }
}

fn reset_to_head(repository: &Repository) -> Result<()> {
    let head = repository.head()?.peel(ObjectType::Commit)?;
    repository.reset(&head, ResetType::Hard, None)?;

    Ok(())
}

fn untracked_paths(repository: &Repository, workdir: &Path, root: &Path) -> Result<Vec<PathBuf>> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(false)
        .include_ignored(false);

    let statuses = repository.statuses(Some(&mut opts))?;
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let workdir = workdir
        .canonicalize()
        .unwrap_or_else(|_| workdir.to_path_buf());

    let paths = statuses
        .iter()
        .filter(|entry| entry.status().contains(Status::WT_NEW))
        .filter_map(|entry| entry.path().map(|path| workdir.join(path)))
        // INVARIANT: Only clean below the root, even if the repository is bigger.
        .filter(|path| path.starts_with(&root))
        .collect();

    Ok(paths)
}
