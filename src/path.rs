// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path algebra.
//!
//! Every component decides whether a path is a file or a directory through
//! [`classify`], and builds destination paths through [`join`]. Both work on
//! paths that may not exist yet.
//!
//! # Directory Marker
//!
//! A path that exists on disk is whatever the file system says it is. A path
//! that does not exist yet is a directory if and only if it ends with a path
//! separator, either the native one or a forward slash. Correspondence tables
//! are written with forward slashes, so `Plugins/` names a directory on every
//! platform, while `Plugins` names a file until something says otherwise.

use std::path::{Path, PathBuf, MAIN_SEPARATOR, MAIN_SEPARATOR_STR};

/// Default name of the backup root, relative to the overlay working directory.
pub const DEFAULT_BACKUPS_DIR: &str = "Backups";

/// Name of the configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "graft.toml";

/// Kind of file system entry a path denotes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    #[default]
    File,
    Directory,
}

impl PathKind {
    pub fn is_dir(&self) -> bool {
        match self {
            Self::File => false,
            Self::Directory => true,
        }
    }
}

/// Determine whether a path denotes a file or a directory.
///
/// Existing paths report their actual type. Missing paths are directories
/// when their last character is a separator.
pub fn classify(path: impl AsRef<Path>) -> PathKind {
    let path = path.as_ref();
    if path.is_dir() {
        return PathKind::Directory;
    }

    if path.exists() {
        return PathKind::File;
    }

    if has_trailing_separator(path) {
        PathKind::Directory
    } else {
        PathKind::File
    }
}

/// Check if the textual form of a path ends with a separator.
pub fn has_trailing_separator(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .as_os_str()
        .as_encoded_bytes()
        .last()
        .is_some_and(|byte| *byte == b'/' || *byte == MAIN_SEPARATOR as u8)
}

/// Join path fragments without truncating on absolute fragments.
///
/// Unlike [`Path::join`], a later fragment that looks absolute does not
/// discard the fragments before it, so `join(["Backups", "/abs/root"])`
/// yields `Backups/abs/root`. Fragments may use forward slashes internally,
/// they are normalized to the native separator first.
///
/// The result is absolute if the first fragment is absolute, and ends with a
/// separator if the last fragment classifies as a directory.
pub fn join<I, P>(fragments: I) -> PathBuf
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let fragments = fragments
        .into_iter()
        .map(|fragment| fragment.as_ref().to_string_lossy().into_owned())
        .collect::<Vec<_>>();

    let (Some(first), Some(last)) = (fragments.first(), fragments.last()) else {
        return PathBuf::new();
    };

    let mut joined = String::new();
    let first = normalize_separators(first);
    if Path::new(&first).has_root() {
        // INVARIANT: Drive prefix belongs to the absolute marker.
        let (drive, _) = split_drive(&first);
        joined.push_str(drive);
        joined.push(MAIN_SEPARATOR);
    }

    let segments = fragments
        .iter()
        .map(|fragment| normalize_separators(fragment))
        .flat_map(|fragment| {
            let (_, rest) = split_drive(&fragment);
            rest.split(MAIN_SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(ToString::to_string)
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    joined.push_str(&segments.join(MAIN_SEPARATOR_STR));

    if classify(last).is_dir() && !joined.is_empty() && !joined.ends_with(MAIN_SEPARATOR) {
        joined.push(MAIN_SEPARATOR);
    }

    PathBuf::from(joined)
}

/// Final component of a path.
///
/// Directories keep a trailing separator so the leaf is still recognized as
/// a directory when fed back into [`join`]. The root itself is its own leaf.
pub fn leaf(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let text = normalize_separators(&path.to_string_lossy());
    let trimmed = text.trim_end_matches(MAIN_SEPARATOR);
    if trimmed.is_empty() {
        return if text.is_empty() {
            String::new()
        } else {
            MAIN_SEPARATOR_STR.to_string()
        };
    }

    let name = trimmed.rsplit(MAIN_SEPARATOR).next().unwrap_or(trimmed);
    if classify(path).is_dir() {
        format!("{name}{MAIN_SEPARATOR}")
    } else {
        name.to_string()
    }
}

/// Determine default absolute path to the user-wide configuration file.
///
/// Uses `$XDG_CONFIG_HOME/graft/graft.toml`. Does not check if the path
/// returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if the configuration directory cannot be
///   determined.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("graft").join(LOCAL_CONFIG_FILE))
        .ok_or(NoConfigDir)
}

fn normalize_separators(fragment: &str) -> String {
    fragment.replace('/', MAIN_SEPARATOR_STR)
}

fn split_drive(fragment: &str) -> (&str, &str) {
    let bytes = fragment.as_bytes();
    if cfg!(windows) && bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return fragment.split_at(2);
    }

    ("", fragment)
}

/// No way to determine the user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;
