// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use anyhow::Result;
use git2::{IndexEntry, IndexTime, ObjectType, Repository, RepositoryInitOptions};
use graft::{
    backup::Backups,
    guard::TagProbe,
    overlay::{Overlay, Target},
};
use std::{
    env::current_dir,
    fs::{create_dir_all, write},
    path::{Path, PathBuf},
};

/// Repository acting as a root checkout.
pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename
                .as_ref()
                .as_os_str()
                .to_string_lossy()
                .into_owned()
                .into_bytes(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        index.write()?;
        let tree_oid = index.write_tree()?;
        let tree = self.repo.find_tree(tree_oid)?;

        // INVARIANT: Always determine latest parent commits to append to.
        let signature = self.repo.signature()?;
        let mut parents = Vec::new();
        if let Some(parent) = self.repo.head().ok().and_then(|head| head.target()) {
            parents.push(self.repo.find_commit(parent)?);
        }
        let parents = parents.iter().collect::<Vec<_>>();

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &parents,
        )?;

        Ok(())
    }

    /// Tag HEAD with a lightweight tag.
    pub(crate) fn tag(&self, name: impl AsRef<str>) -> Result<()> {
        let head = self.repo.head()?.peel(ObjectType::Commit)?;
        self.repo.tag_lightweight(name.as_ref(), &head, false)?;

        Ok(())
    }
}

/// Probe reporting the same revision for every root.
#[derive(Debug, Clone)]
pub(crate) struct FixedTag(pub(crate) Option<&'static str>);

impl TagProbe for FixedTag {
    fn detect_tag(&self, _: &Path) -> Option<String> {
        self.0.map(ToString::to_string)
    }
}

/// Overlay working directory and root laid out side by side.
///
/// ```text
/// <cwd>/overlay/            overlay working directory
/// <cwd>/overlay/Backups/    backup directory
/// <cwd>/overlay/table.csv   correspondence table
/// <cwd>/root/               root, with CHANGELOG.md as marker
/// ```
pub(crate) struct Workspace {
    pub(crate) overlay: PathBuf,
    pub(crate) root: PathBuf,
}

impl Workspace {
    pub(crate) const TAG: &'static str = "0.9.13";

    pub(crate) fn new(table: impl AsRef<str>) -> Result<Self> {
        let cwd = current_dir()?;
        let overlay = cwd.join("overlay");
        let root = cwd.join("root");
        create_dir_all(&overlay)?;
        create_dir_all(&root)?;
        write(root.join("CHANGELOG.md"), "changes")?;
        write(overlay.join("table.csv"), table.as_ref())?;

        Ok(Self { overlay, root })
    }

    pub(crate) fn overlay_file(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = self.overlay.join(path);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, contents)?;

        Ok(())
    }

    pub(crate) fn root_file(&self, path: impl AsRef<Path>, contents: &str) -> Result<()> {
        let path = self.root.join(path);
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        write(path, contents)?;

        Ok(())
    }

    pub(crate) fn backups(&self) -> Backups {
        Backups::new(self.overlay.join("Backups"))
    }

    pub(crate) fn graft(&self, detected: Option<&'static str>) -> Overlay<FixedTag> {
        Overlay::with_probe(&self.overlay, self.backups(), FixedTag(detected))
    }

    pub(crate) fn target(&self) -> Target {
        Target {
            name: "root".into(),
            root: self.root.clone(),
            table: self.overlay.join("table.csv"),
            markers: vec!["CHANGELOG.md".into()],
            tag: Self::TAG.into(),
        }
    }
}
