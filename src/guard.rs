// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Root verification.
//!
//! Nothing gets written into a root until graft is reasonably sure the root
//! is the kind of project the correspondence table was written for. Two
//! checks gate every orchestrator run:
//!
//! 1. The root exists and holds every required __marker file__.
//! 2. The root is checked out at the expected revision tag.
//!
//! A failed marker check is fatal. A revision mismatch is not: the operator
//! gets to decide whether to go ahead anyway. The decision itself is passed
//! in by the caller, so nothing in here ever reads from a terminal.

use git2::{DescribeOptions, Repository};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Verify that a root exists and contains every marker file.
///
/// # Errors
///
/// - Return [`GuardError::RootNotFound`] if `root` does not exist.
/// - Return [`GuardError::MarkerMissing`] naming the first absent marker.
pub fn verify_root(
    root: impl AsRef<Path>,
    markers: impl IntoIterator<Item = impl AsRef<Path>>,
) -> Result<()> {
    let root = root.as_ref();
    if !root.exists() {
        return Err(GuardError::RootNotFound {
            root: root.to_path_buf(),
        });
    }

    for marker in markers {
        let marker = marker.as_ref();
        if !root.join(marker).exists() {
            return Err(GuardError::MarkerMissing {
                root: root.to_path_buf(),
                marker: marker.to_path_buf(),
            });
        }
    }

    info!("verified root {:?}", root.display());

    Ok(())
}

/// Detect revision tag of a root.
///
/// Layer of indirection over the version control system a root lives in.
pub trait TagProbe {
    /// Current revision tag of `root`, or `None` if it cannot be determined.
    fn detect_tag(&self, root: &Path) -> Option<String>;
}

/// Tag detection through libgit2.
///
/// Prefers a tag pointing exactly at HEAD. Forks rarely carry upstream tags,
/// so a checked out branch name is accepted as the revision as well.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2TagProbe;

impl TagProbe for Git2TagProbe {
    fn detect_tag(&self, root: &Path) -> Option<String> {
        let repository = match Repository::discover(root) {
            Ok(repository) => repository,
            Err(error) => {
                debug!("no repository at {:?}: {error}", root.display());
                return None;
            }
        };

        let mut opts = DescribeOptions::new();
        opts.describe_tags().max_candidates_tags(0);
        match repository.describe(&opts).and_then(|found| found.format(None)) {
            Ok(tag) => return Some(tag),
            Err(error) => debug!("no exact tag at HEAD: {error}"),
        }

        let head = repository.head().ok()?;
        if head.is_branch() {
            return head.shorthand().map(ToString::to_string);
        }

        None
    }
}

/// Result of comparing detected and expected revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    /// Root is at the expected revision.
    Match { tag: String },

    /// Root is somewhere else, or its revision is unknown.
    Mismatch {
        detected: Option<String>,
        expected: String,
    },
}

impl VersionCheck {
    /// Compare revision of a root against an expected tag.
    pub fn new(probe: &impl TagProbe, root: impl AsRef<Path>, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        match probe.detect_tag(root.as_ref()) {
            Some(tag) if tag == expected => Self::Match { tag },
            detected => Self::Mismatch { detected, expected },
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match { .. })
    }

    /// Decide whether to proceed.
    ///
    /// Matching revisions always proceed. Mismatches proceed only if the
    /// operator confirmed.
    pub fn proceed(&self, operator_confirmed: bool) -> bool {
        match self {
            Self::Match { .. } => true,
            Self::Mismatch { .. } => operator_confirmed,
        }
    }
}

impl Display for VersionCheck {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Match { tag } => write!(fmt, "verified version ({tag})"),
            Self::Mismatch { detected, expected } => write!(
                fmt,
                "only {expected} is supported, detected version: {}",
                detected.as_deref().unwrap_or("unknown")
            ),
        }
    }
}

/// Verify revision of a root, asking the operator only on mismatch.
///
/// `confirm` is called at most once, and only when the revisions differ.
/// Returns the check alongside the decision to proceed.
pub fn verify_version(
    probe: &impl TagProbe,
    root: impl AsRef<Path>,
    expected: impl Into<String>,
    confirm: impl FnOnce(&VersionCheck) -> bool,
) -> (VersionCheck, bool) {
    let check = VersionCheck::new(probe, root.as_ref(), expected);
    if check.is_match() {
        info!("{check}");
        return (check, true);
    }

    warn!("{check}");
    let proceed = check.proceed(confirm(&check));
    if proceed {
        info!("proceeding on {:?} anyway", root.as_ref().display());
    } else {
        info!("skipping {:?}", root.as_ref().display());
    }

    (check, proceed)
}

/// Root verification error types.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Root does not exist.
    #[error("root {:?} does not exist", root.display())]
    RootNotFound { root: PathBuf },

    /// Root lacks a required marker file.
    #[error("expected file {:?} not present in {:?}", marker.display(), root.display())]
    MarkerMissing { root: PathBuf, marker: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = GuardError> = std::result::Result<T, E>;
