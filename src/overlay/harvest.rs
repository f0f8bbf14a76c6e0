// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Reverse installation.
//!
//! Work done directly inside a root, e.g., fixing a build error in an
//! installed file, needs to find its way back into the overlay. Reverse
//! installation walks the correspondence table backwards and copies the
//! current content of each destination onto its overlay path.
//!
//! Roots tend to hold far more than the overlay ever put there. Directory
//! correspondences therefore only pull entries the overlay already knows
//! about: a root entry is pulled onto the overlay entry with the same name,
//! or failing that, the first root entry whose name contains the overlay
//! entry's name.

use crate::{
    guard::{TagProbe, VersionCheck},
    overlay::{Outcome, Overlay, OverlayError, Result, Run, Stage, SyncEvent, Target, Verified},
    path::{join, leaf},
    sync::{copy, SyncError},
    table::ExpandedCorrespondence,
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

impl<P> Overlay<P>
where
    P: TagProbe,
{
    /// Copy changes made inside a target root back into the overlay.
    ///
    /// Rotates the backup generation of the overlay working directory first,
    /// so overwritten overlay files can be recovered.
    ///
    /// # Errors
    ///
    /// - Return [`OverlayError::Guard`] if root or markers are missing.
    /// - Return [`OverlayError::Table`] if the correspondence table is bad.
    /// - Return [`OverlayError::Aborted`] if copying fails part way through.
    #[instrument(skip(self, target, confirm), fields(target = %target.name), level = "debug")]
    pub fn reverse_install(
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

        info!("reverse-installing from {:?}", root.display());
        if let Err(error) = self.backups.rotate(&self.workdir) {
            return Err(run.fail(error));
        }
        run.advance(Stage::BackedUp);

        if let Err(error) = self.harvest_all(&root, &expanded, &mut run) {
            return Err(run.fail(error));
        }

        Ok(Outcome::Synced(run.finish()))
    }

    fn harvest_all(
        &self,
        root: &Path,
        expanded: &ExpandedCorrespondence,
        run: &mut Run,
    ) -> Result<()> {
        for entry in expanded {
            if !entry.overlay.exists() {
                return Err(OverlayError::SourceNotFound {
                    path: entry.overlay.clone(),
                });
            }

            let dest = join([
                root,
                Path::new(&entry.destination),
                Path::new(&leaf(&entry.overlay)),
            ]);
            self.harvest(&entry.overlay, &dest, run)?;
        }

        Ok(())
    }

    fn harvest(&self, overlay: &Path, dest: &Path, run: &mut Run) -> Result<()> {
        if !dest.exists() {
            run.record(SyncEvent::Missing {
                path: dest.to_path_buf(),
            });
            return Ok(());
        }

        match (overlay.is_dir(), dest.is_dir()) {
            (true, true) => {
                let overlay_children = children(overlay)?;
                let dest_children = children(dest)?;
                for child in &overlay_children {
                    match counterpart(child, &dest_children) {
                        Some(found) => self.harvest(child, found, run)?,
                        None => run.record(SyncEvent::Missing {
                            path: dest.join(child.file_name().unwrap_or_default()),
                        }),
                    }
                }
            }
            (false, false) => {
                for copied in copy(dest, overlay, &self.backups)? {
                    run.record(copied);
                }
            }
            _ => {
                warn!(
                    "{:?} and {:?} are not the same kind of entry",
                    dest.display(),
                    overlay.display()
                );
                return Err(SyncError::TypeConflict {
                    from: dest.to_path_buf(),
                    onto: overlay.to_path_buf(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// Immediate children of a directory, sorted by name.
fn children(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut children = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(SyncError::from)?;
        children.push(entry.into_path());
    }

    Ok(children)
}

/// Root entry an overlay entry should be pulled from.
///
/// Only entries of the same kind qualify, a file is never pulled from a
/// directory or the other way around.
fn counterpart<'a>(overlay: &Path, candidates: &'a [PathBuf]) -> Option<&'a PathBuf> {
    let name = overlay.file_name()?;
    let needle = name.to_string_lossy();
    let is_dir = overlay.is_dir();
    let mut same_kind = candidates
        .iter()
        .filter(|candidate| candidate.is_dir() == is_dir);

    same_kind
        .clone()
        .find(|candidate| candidate.file_name() == Some(name))
        .or_else(|| {
            same_kind.find(|candidate| {
                candidate
                    .file_name()
                    .is_some_and(|found| found.to_string_lossy().contains(needle.as_ref()))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, write};

    #[sealed_test]
    fn counterpart_skips_other_kind() -> anyhow::Result<()> {
        create_dir_all("overlay")?;
        create_dir_all("root/Configs")?;
        write("overlay/Config", "config")?;
        write("root/MyConfig", "config")?;

        let candidates = vec![PathBuf::from("root/Configs"), PathBuf::from("root/MyConfig")];
        let result = counterpart(Path::new("overlay/Config"), &candidates);
        assert_eq!(result, Some(&PathBuf::from("root/MyConfig")));

        let result = counterpart(Path::new("overlay/Config"), &candidates[..1]);
        assert_eq!(result, None);

        Ok(())
    }

    #[test]
    fn counterpart_prefers_exact_name() {
        let candidates = vec![
            PathBuf::from("/root/Foo.cpp.orig"),
            PathBuf::from("/root/Foo.cpp"),
        ];

        let result = counterpart(Path::new("overlay/Foo.cpp"), &candidates);
        assert_eq!(result, Some(&PathBuf::from("/root/Foo.cpp")));
    }

    #[test]
    fn counterpart_falls_back_to_substring() {
        let candidates = vec![
            PathBuf::from("/root/Bar.h"),
            PathBuf::from("/root/MyFoo.cpp"),
        ];

        let result = counterpart(Path::new("overlay/Foo.cpp"), &candidates);
        assert_eq!(result, Some(&PathBuf::from("/root/MyFoo.cpp")));

        let result = counterpart(Path::new("overlay/Baz.cpp"), &candidates);
        assert_eq!(result, None);
    }
}
