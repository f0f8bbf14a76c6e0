// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Correspondence tables.
//!
//! A __correspondence table__ declares where overlay content goes inside a
//! target root. Each row is a pair of comma separated columns:
//!
//! ```text
//! DReyeVR/,Unreal/CarlaUE4/Source/CarlaUE4/
//! Configs/*.ini,Unreal/CarlaUE4/Config/
//! ```
//!
//! The first column is an overlay path or glob pattern written with forward
//! slashes. The second column is a destination relative to whatever root the
//! table is applied to. There is no header row. Columns containing a comma
//! are wrapped in double quotes.
//!
//! # Expansion
//!
//! Before a table can drive any file operation, its overlay column is
//! expanded against the real file system through [`glob`]. Patterns that
//! match nothing contribute nothing, because some overlay content is optional
//! per target. Every expanded key then refers to an existing file or
//! directory.

use crate::path::{classify, PathKind};

use std::{
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf, MAIN_SEPARATOR},
    str::FromStr,
};
use tracing::debug;
use walkdir::WalkDir;

/// Single row of a correspondence table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Correspondence {
    /// Overlay path or glob pattern.
    pub overlay: String,

    /// Destination relative to the target root.
    pub destination: String,
}

impl Correspondence {
    pub fn new(overlay: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            overlay: overlay.into(),
            destination: destination.into(),
        }
    }
}

/// Ordered listing of correspondences.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CorrespondenceTable {
    entries: Vec<Correspondence>,
}

impl CorrespondenceTable {
    /// Load correspondence table from a file.
    ///
    /// # Errors
    ///
    /// - Return [`TableError::Read`] if the table cannot be read.
    /// - Return [`TableError::Malformed`] if a row does not have exactly two
    ///   columns.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = read_to_string(path).map_err(|err| TableError::Read {
            source: err,
            table: path.to_path_buf(),
        })?;

        parse_rows(&content, path)
    }

    pub fn entries(&self) -> &[Correspondence] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expand glob patterns in the overlay column.
    ///
    /// Relative patterns are resolved against `base`. Matches keep table
    /// order. A key matched by more than one row takes the destination of the
    /// last row, but keeps the position of its first match.
    ///
    /// # Errors
    ///
    /// - Return [`TableError::Pattern`] if an overlay pattern is invalid.
    /// - Return [`TableError::Glob`] if a matched path cannot be read.
    /// - Return [`TableError::Collision`] if two keys with the same basename
    ///   map to the same destination.
    pub fn expand_globs(&self, base: impl AsRef<Path>) -> Result<ExpandedCorrespondence> {
        let base = base.as_ref();
        let mut expanded = ExpandedCorrespondence::default();

        for entry in &self.entries {
            let pattern = overlay_pattern(base, &entry.overlay);
            let matches = glob::glob(&pattern).map_err(|err| TableError::Pattern {
                source: err,
                pattern: entry.overlay.clone(),
            })?;

            let mut matched = 0usize;
            for path in matches {
                expanded.insert(path?, &entry.destination);
                matched += 1;
            }

            if matched == 0 {
                debug!("pattern {:?} matched nothing, skipping", entry.overlay);
            }
        }

        expanded.check_collisions()?;

        Ok(expanded)
    }
}

impl FromStr for CorrespondenceTable {
    type Err = TableError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        parse_rows(data, Path::new("<memory>"))
    }
}

impl FromIterator<Correspondence> for CorrespondenceTable {
    fn from_iter<T: IntoIterator<Item = Correspondence>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Correspondence with a concrete overlay path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedEntry {
    /// Existing overlay file or directory.
    pub overlay: PathBuf,

    /// Destination relative to the target root.
    pub destination: String,
}

impl ExpandedEntry {
    /// Kind of the overlay path on disk.
    pub fn kind(&self) -> PathKind {
        classify(&self.overlay)
    }

    /// List every regular file this entry covers.
    ///
    /// Directories are walked recursively, files cover only themselves.
    ///
    /// # Errors
    ///
    /// - Return [`TableError::Walk`] if a directory cannot be traversed.
    pub fn manifest(&self) -> Result<FileManifest> {
        if !self.kind().is_dir() {
            return Ok(FileManifest {
                source: self.overlay.clone(),
                kind: PathKind::File,
                files: vec![self.overlay.clone()],
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.overlay) {
            let entry = entry?;
            // INVARIANT: Manifests never list directories.
            if entry.path().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort();

        Ok(FileManifest {
            source: self.overlay.clone(),
            kind: PathKind::Directory,
            files,
        })
    }
}

/// Correspondences after glob expansion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExpandedCorrespondence {
    entries: Vec<ExpandedEntry>,
}

impl ExpandedCorrespondence {
    pub fn iter(&self) -> std::slice::Iter<'_, ExpandedEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookup destination of an expanded overlay path.
    pub fn destination(&self, overlay: impl AsRef<Path>) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.overlay == overlay.as_ref())
            .map(|entry| entry.destination.as_str())
    }

    /// List file manifests of every entry, in order.
    ///
    /// # Errors
    ///
    /// - Return [`TableError::Walk`] if a directory cannot be traversed.
    pub fn enumerate_files(&self) -> Result<Vec<FileManifest>> {
        self.entries.iter().map(ExpandedEntry::manifest).collect()
    }

    fn insert(&mut self, overlay: PathBuf, destination: &str) {
        match self.entries.iter_mut().find(|entry| entry.overlay == overlay) {
            Some(entry) => entry.destination = destination.to_string(),
            None => self.entries.push(ExpandedEntry {
                overlay,
                destination: destination.to_string(),
            }),
        }
    }

    fn check_collisions(&self) -> Result<()> {
        let mut seen: HashMap<(&str, &std::ffi::OsStr), &Path> = HashMap::new();
        for entry in &self.entries {
            let Some(name) = entry.overlay.file_name() else {
                continue;
            };

            let key = (entry.destination.trim_end_matches(['/', MAIN_SEPARATOR]), name);
            if let Some(first) = seen.insert(key, &entry.overlay) {
                return Err(TableError::Collision {
                    first: first.to_path_buf(),
                    second: entry.overlay.clone(),
                    destination: entry.destination.clone(),
                });
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a ExpandedCorrespondence {
    type Item = &'a ExpandedEntry;
    type IntoIter = std::slice::Iter<'a, ExpandedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Regular files covered by one expanded entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileManifest {
    /// Overlay path the manifest was built from.
    pub source: PathBuf,

    /// Kind of the overlay path.
    pub kind: PathKind,

    /// Sorted listing of regular files.
    pub files: Vec<PathBuf>,
}

impl FileManifest {
    /// Path of a listed file relative to the manifest source.
    ///
    /// File manifests report the file name itself.
    pub fn relative<'a>(&self, file: &'a Path) -> &'a Path {
        match self.kind {
            PathKind::Directory => file.strip_prefix(&self.source).unwrap_or(file),
            PathKind::File => file.file_name().map(Path::new).unwrap_or(file),
        }
    }
}

fn parse_rows(content: &str, table: &Path) -> Result<CorrespondenceTable> {
    let mut entries = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let columns = split_columns(line);
        let [overlay, destination] = columns.as_slice() else {
            return Err(TableError::Malformed {
                table: table.to_path_buf(),
                line: index + 1,
                columns: columns.len(),
            });
        };

        entries.push(Correspondence::new(overlay, destination));
    }

    Ok(CorrespondenceTable { entries })
}

/// Split a row on commas outside of double quotes.
///
/// A doubled quote inside a quoted column stands for a literal quote.
fn split_columns(line: &str) -> Vec<String> {
    let mut columns = Vec::new();
    let mut column = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                column.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => columns.push(std::mem::take(&mut column)),
            ch => column.push(ch),
        }
    }
    columns.push(column);

    columns
}

fn overlay_pattern(base: &Path, overlay: &str) -> String {
    // INVARIANT: Glob on the bare name, directory-ness comes from the disk.
    let trimmed = match overlay.trim_end_matches(['/', MAIN_SEPARATOR]) {
        "" => overlay,
        trimmed => trimmed,
    };

    if Path::new(trimmed).has_root() || base.as_os_str().is_empty() {
        return trimmed.to_string();
    }

    let base = glob::Pattern::escape(&base.to_string_lossy());
    Path::new(&base).join(trimmed).to_string_lossy().into_owned()
}

/// Correspondence table error types.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// Correspondence table cannot be read.
    #[error("failed to read correspondence table {:?}", table.display())]
    Read {
        #[source]
        source: std::io::Error,
        table: PathBuf,
    },

    /// Row does not have exactly two columns.
    #[error(
        "malformed row {line} in correspondence table {:?}: expected 2 columns, found {columns}",
        table.display()
    )]
    Malformed {
        table: PathBuf,
        line: usize,
        columns: usize,
    },

    /// Overlay column is not a valid glob pattern.
    #[error("invalid overlay pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Glob match cannot be read.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Overlay directory cannot be walked.
    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    /// Two expanded keys would land on the same destination file.
    #[error(
        "overlay paths {:?} and {:?} collide at destination {destination:?}",
        first.display(),
        second.display()
    )]
    Collision {
        first: PathBuf,
        second: PathBuf,
        destination: String,
    },
}

/// Friendly result alias :3
pub type Result<T, E = TableError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs::{create_dir_all, write};

    #[test]
    fn parse_correspondence_table() -> anyhow::Result<()> {
        let result: CorrespondenceTable = indoc! {r#"
            DReyeVR/,Unreal/CarlaUE4/Source/CarlaUE4/
            Configs/*.ini,Unreal/CarlaUE4/Config/

            Carla/Sensor/DReyeVRSensor.h,Unreal/CarlaUE4/Plugins/Carla/Source/Carla/Sensor/
        "#}
        .parse()?;

        let expect = CorrespondenceTable::from_iter([
            Correspondence::new("DReyeVR/", "Unreal/CarlaUE4/Source/CarlaUE4/"),
            Correspondence::new("Configs/*.ini", "Unreal/CarlaUE4/Config/"),
            Correspondence::new(
                "Carla/Sensor/DReyeVRSensor.h",
                "Unreal/CarlaUE4/Plugins/Carla/Source/Carla/Sensor/",
            ),
        ]);
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn parse_rejects_wrong_column_count() {
        let result = "a,b\nc,d,e\n".parse::<CorrespondenceTable>();
        assert!(matches!(
            result,
            Err(TableError::Malformed {
                line: 2,
                columns: 3,
                ..
            })
        ));

        let result = "lonely\n".parse::<CorrespondenceTable>();
        assert!(matches!(
            result,
            Err(TableError::Malformed {
                line: 1,
                columns: 1,
                ..
            })
        ));
    }

    #[test]
    fn parse_quoted_columns() -> anyhow::Result<()> {
        let result: CorrespondenceTable = indoc! {r#"
            "Configs/{a,b}.ini",Unreal/CarlaUE4/Config/
            "say ""hi"".txt","Docs/"
        "#}
        .parse()?;

        let expect = CorrespondenceTable::from_iter([
            Correspondence::new("Configs/{a,b}.ini", "Unreal/CarlaUE4/Config/"),
            Correspondence::new("say \"hi\".txt", "Docs/"),
        ]);
        assert_eq!(result, expect);

        Ok(())
    }

    #[sealed_test]
    fn load_reports_table_path() -> anyhow::Result<()> {
        write("paths.csv", "only-one-column\n")?;
        let error = CorrespondenceTable::load("paths.csv").unwrap_err();
        assert!(error.to_string().contains("paths.csv"));

        let error = CorrespondenceTable::load("missing.csv").unwrap_err();
        assert!(matches!(error, TableError::Read { .. }));

        Ok(())
    }

    #[sealed_test]
    fn expand_globs_keeps_table_order() -> anyhow::Result<()> {
        create_dir_all("overlay/sub")?;
        write("overlay/b.txt", "b")?;
        write("overlay/a.txt", "a")?;
        write("overlay/sub/c.txt", "c")?;

        let table: CorrespondenceTable = indoc! {r#"
            overlay/sub/,dest/sub/
            overlay/*.txt,dest/
            missing/*.txt,dest/
        "#}
        .parse()?;
        let expanded = table.expand_globs("")?;

        let result = expanded
            .iter()
            .map(|entry| (entry.overlay.clone(), entry.destination.clone()))
            .collect::<Vec<_>>();
        let expect = vec![
            (PathBuf::from("overlay/sub"), "dest/sub/".to_string()),
            (PathBuf::from("overlay/a.txt"), "dest/".to_string()),
            (PathBuf::from("overlay/b.txt"), "dest/".to_string()),
        ];
        assert_eq!(result, expect);
        assert_eq!(expanded.destination("overlay/a.txt"), Some("dest/"));

        Ok(())
    }

    #[sealed_test]
    fn expand_globs_relative_to_base() -> anyhow::Result<()> {
        create_dir_all("work/overlay")?;
        write("work/overlay/foo.txt", "hello")?;

        let table: CorrespondenceTable = "overlay/foo.txt,dest/\n".parse()?;
        let expanded = table.expand_globs("work")?;
        assert_eq!(
            expanded.iter().next().map(|entry| entry.overlay.clone()),
            Some(PathBuf::from("work/overlay/foo.txt"))
        );

        Ok(())
    }

    #[sealed_test]
    fn expand_globs_rejects_collisions() -> anyhow::Result<()> {
        create_dir_all("one")?;
        create_dir_all("two")?;
        write("one/same.txt", "1")?;
        write("two/same.txt", "2")?;

        let table: CorrespondenceTable = "one/same.txt,dest/\ntwo/same.txt,dest\n".parse()?;
        let result = table.expand_globs("");
        assert!(matches!(result, Err(TableError::Collision { .. })));

        let table: CorrespondenceTable = "one/same.txt,dest/\ntwo/same.txt,other/\n".parse()?;
        assert_eq!(table.expand_globs("")?.len(), 2);

        Ok(())
    }

    #[sealed_test]
    fn enumerate_files_lists_only_regular_files() -> anyhow::Result<()> {
        create_dir_all("overlay/nested/deeper")?;
        create_dir_all("overlay/empty")?;
        write("overlay/z.txt", "z")?;
        write("overlay/nested/y.txt", "y")?;
        write("overlay/nested/deeper/x.txt", "x")?;
        write("single.txt", "s")?;

        let table: CorrespondenceTable = "overlay/,dest/\nsingle.txt,dest/\n".parse()?;
        let manifests = table.expand_globs("")?.enumerate_files()?;

        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].kind, PathKind::Directory);
        assert_eq!(
            manifests[0].files,
            vec![
                PathBuf::from("overlay/nested/deeper/x.txt"),
                PathBuf::from("overlay/nested/y.txt"),
                PathBuf::from("overlay/z.txt"),
            ]
        );
        assert_eq!(
            manifests[0].relative(&manifests[0].files[1]),
            Path::new("nested/y.txt")
        );
        assert_eq!(manifests[1].files, vec![PathBuf::from("single.txt")]);
        for manifest in &manifests {
            for file in &manifest.files {
                assert_eq!(classify(file), PathKind::File);
            }
        }

        Ok(())
    }
}
