// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Install overlays, and clean them back out.
//!
//! Install and clean are inverses of each other, as long as no other install
//! ran in between. Install rotates the backup generation of the root, then
//! copies every overlay file to its destination. Clean walks the same
//! destinations and puts the current backup generation back in place.

use crate::{
    guard::{TagProbe, VersionCheck},
    overlay::{
        destination_of, Outcome, Overlay, OverlayError, Result, Run, Stage, SyncEvent, Target,
        Verified,
    },
    path::{join, leaf},
    sync::{copy, remove},
    table::ExpandedCorrespondence,
};

use std::path::Path;
use tracing::{info, instrument};
use walkdir::WalkDir;

impl<P> Overlay<P>
where
    P: TagProbe,
{
    /// Install overlay files into a target root.
    ///
    /// Verifies the target, rotates its backup generation, and copies every
    /// file of every expanded correspondence in table order. Destinations
    /// that already exist are backed up before they are overwritten.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Guard`] if root or markers are missing.
    /// - Return [`OverlayError::Table`] if the correspondence table is bad.
    /// - Return [`OverlayError::Aborted`] if copying fails part way through.
    #[instrument(skip(self, target, confirm), fields(target = %target.name), level = "debug")]
    pub fn install(
        &self,
        target: &Target,
        confirm: impl FnOnce(&VersionCheck) -> bool,
    ) -> Result<Outcome> {
        let root = match self.verify(target, confirm)? {
            Verified::Root(root) => root,
            Verified::Declined(check) => return Ok(Outcome::Declined(check)),
        };

        let mut run = Run::new(&root);
        run.advance(Stage::Verified);
        let expanded = self.correspondences(target)?;

        info!("installing overlay over {:?}", root.display());
        if let Err(error) = self.backups.rotate(&root) {
            return Err(run.fail(error));
        }
        run.advance(Stage::BackedUp);

        if let Err(error) = self.install_all(&root, &expanded, &mut run) {
            return Err(run.fail(error));
        }

        info!(
            "backups created in {:?}",
            self.backups.current(&root)?.display()
        );

        Ok(Outcome::Synced(run.finish()))
    }

    fn install_all(
        &self,
        root: &Path,
        expanded: &ExpandedCorrespondence,
        run: &mut Run,
    ) -> Result<()> {
        for entry in expanded {
            let manifest = entry.manifest()?;
            for file in &manifest.files {
                let dest = destination_of(root, &entry.destination, &manifest, file);
                for copied in copy(file, &dest, &self.backups)? {
                    run.record(copied);
                }
            }
        }

        Ok(())
    }

    /// Restore a target root to its state before the latest install.
    ///
    /// Every destination with an entry in the current backup generation is
    /// restored from it. Destinations without one only exist because of the
    /// overlay, so they are deleted.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Guard`] if root or markers are missing.
    /// - Return [`OverlayError::NoBackupAvailable`] if the root has no
    ///   current backup generation at all.
    /// - Return [`OverlayError::Aborted`] if restoring fails part way through.
    #[instrument(skip(self, target, confirm), fields(target = %target.name), level = "debug")]
    pub fn clean(
        &self,
        target: &Target,
        confirm: impl FnOnce(&VersionCheck) -> bool,
    ) -> Result<Outcome> {
        let root = match self.verify(target, confirm)? {
            Verified::Root(root) => root,
            Verified::Declined(check) => return Ok(Outcome::Declined(check)),
        };

        if !self.backups.has_current(&root) {
            return Err(OverlayError::NoBackupAvailable { root });
        }

        let mut run = Run::new(&root);
        run.advance(Stage::Verified);
        let expanded = self.correspondences(target)?;

        info!("cleaning root {:?}", root.display());
        // INVARIANT: Clean reads the current generation, it never starts a new one.
        run.advance(Stage::BackedUp);
        if let Err(error) = self.clean_all(&root, &expanded, &mut run) {
            return Err(run.fail(error));
        }

        Ok(Outcome::Synced(run.finish()))
    }

    fn clean_all(
        &self,
        root: &Path,
        expanded: &ExpandedCorrespondence,
        run: &mut Run,
    ) -> Result<()> {
        for entry in expanded {
            let manifest = entry.manifest()?;
            for file in &manifest.files {
                let dest = destination_of(root, &entry.destination, &manifest, file);
                if !dest.exists() {
                    run.record(SyncEvent::Missing { path: dest });
                    continue;
                }

                match self.backups.restore(&dest)? {
                    Some(backup) => run.record(SyncEvent::Restored { path: dest, backup }),
                    None => {
                        remove(&dest)?;
                        run.record(SyncEvent::Removed { path: dest });
                    }
                }
            }

            if manifest.kind.is_dir() {
                let dir = join([
                    root,
                    Path::new(&entry.destination),
                    Path::new(&leaf(&manifest.source)),
                ]);
                self.prune(&dir, run)?;
            }
        }

        Ok(())
    }

    /// Remove a directory the overlay left behind empty.
    ///
    /// Directories with a backup counterpart, or with any file left in them,
    /// belonged to the root before the install and stay.
    fn prune(&self, dir: &Path, run: &mut Run) -> Result<()> {
        if !dir.is_dir() || self.backups.backup_path(dir)?.exists() {
            return Ok(());
        }

        let has_files = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .any(|entry| !entry.file_type().is_dir());
        if has_files {
            return Ok(());
        }

        remove(dir)?;
        run.record(SyncEvent::Removed {
            path: dir.to_path_buf(),
        });

        Ok(())
    }
}
