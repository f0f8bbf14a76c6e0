// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installation checks.
//!
//! Compare a root against the overlay without writing anything.

use crate::{
    guard::{TagProbe, VersionCheck},
    overlay::{
        destination_of, Outcome, Overlay, OverlayError, Result, Run, Stage, SyncEvent, Target,
        Verified,
    },
};

use std::{fs::read, path::Path};
use tracing::{info, instrument};

impl<P> Overlay<P>
where
    P: TagProbe,
{
    /// Check that every overlay file is present and unmodified in a root.
    ///
    /// Each destination is reported as found, modified, or missing. The run
    /// itself only fails on verification or table errors.
    #[instrument(skip(self, target, confirm), fields(target = %target.name), level = "debug")]
    pub fn check(
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

        info!("checking root {:?}", root.display());
        for entry in &expanded {
            let manifest = entry.manifest()?;
            for file in &manifest.files {
                let dest = destination_of(&root, &entry.destination, &manifest, file);
                let event = compare(file, &dest)?;
                run.record(event);
            }
        }

        Ok(Outcome::Synced(run.finish()))
    }
}

fn compare(overlay: &Path, dest: &Path) -> Result<SyncEvent> {
    if !dest.is_file() {
        return Ok(SyncEvent::Missing {
            path: dest.to_path_buf(),
        });
    }

    let expected = read(overlay).map_err(|err| OverlayError::Io {
        source: err,
        path: overlay.to_path_buf(),
    })?;
    let found = read(dest).map_err(|err| OverlayError::Io {
        source: err,
        path: dest.to_path_buf(),
    })?;

    if expected == found {
        Ok(SyncEvent::Found {
            path: dest.to_path_buf(),
        })
    } else {
        Ok(SyncEvent::Modified {
            path: dest.to_path_buf(),
            overlay: overlay.to_path_buf(),
        })
    }
}
