// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the `graft.toml` file, which names the roots an
//! overlay gets applied to, and where backups are kept. Reading the file is
//! handled here, but prompting the operator is left to the caller.

use crate::{overlay::Target, path::DEFAULT_BACKUPS_DIR};

use serde::{Deserialize, Serialize};
use std::{
    env::var_os,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Graft configuration layout.
///
/// # General Layout
///
/// A configuration file is composed of two basic parts: settings and
/// targets. The settings section applies to every run. Each target section
/// describes one root, i.e., which correspondence table drives it, which
/// marker files identify it, and which revision tag it must be checked out
/// at. Both parts are optional.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct GraftConfig {
    /// Settings for every run.
    #[serde(default)]
    pub settings: Settings,

    /// Listing of known roots.
    #[serde(rename = "target", default)]
    pub targets: Vec<TargetDefinition>,
}

impl GraftConfig {
    /// Load configuration file at given path.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid.
    /// - Return [`ConfigError::ShellExpansion`] if a path field references
    ///   an unset variable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        read_to_string(path)
            .map_err(|err| ConfigError::Read {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Select targets by name, or every target if no names are given.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::UnknownTarget`] if a name is not configured.
    pub fn select(&self, names: &[String]) -> Result<Vec<&TargetDefinition>> {
        if names.is_empty() {
            return Ok(self.targets.iter().collect());
        }

        names
            .iter()
            .map(|name| {
                self.targets
                    .iter()
                    .find(|target| &target.name == name)
                    .ok_or_else(|| ConfigError::UnknownTarget { name: name.clone() })
            })
            .collect()
    }
}

impl FromStr for GraftConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: GraftConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        config.settings.backups_dir = expand(&config.settings.backups_dir)?;
        for target in &mut config.targets {
            target.table = expand(&target.table)?;
        }

        Ok(config)
    }
}

impl Display for GraftConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Settings shared by every run.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Backup directory, relative to the overlay working directory unless
    /// absolute.
    #[serde(default = "default_backups_dir")]
    pub backups_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backups_dir: default_backups_dir(),
        }
    }
}

fn default_backups_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUPS_DIR)
}

/// Definition of a single root.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct TargetDefinition {
    /// Name to select the target by.
    pub name: String,

    /// Environment variable holding the root path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_env: Option<String>,

    /// Correspondence table driving the target.
    pub table: PathBuf,

    /// Files that must exist in the root.
    #[serde(default)]
    pub markers: Vec<String>,

    /// Revision tag the root must be checked out at.
    #[serde(default)]
    pub tag: String,
}

impl TargetDefinition {
    /// Bind definition to a resolved root.
    pub fn into_target(self, root: impl Into<PathBuf>) -> Target {
        Target {
            name: self.name,
            root: root.into(),
            table: self.table,
            markers: self.markers,
            tag: self.tag,
        }
    }
}

/// Where the root of a target came from.
///
/// Roots taken from the environment are easy to get wrong without noticing,
/// so callers should have the operator confirm them before use.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum RootSource {
    /// Root given directly by the operator.
    Explicit(PathBuf),

    /// Root read from an environment variable.
    Environment { var: String, path: PathBuf },

    /// No root could be found.
    Unresolved,
}

impl RootSource {
    /// Resolve root from an explicit path, falling back to an environment
    /// variable.
    pub fn resolve(explicit: Option<&Path>, var: Option<&str>) -> Self {
        if let Some(path) = explicit {
            return Self::Explicit(path.to_path_buf());
        }

        match var {
            Some(var) => match var_os(var) {
                Some(value) if !value.is_empty() => Self::Environment {
                    var: var.to_string(),
                    path: PathBuf::from(value),
                },
                _ => Self::Unresolved,
            },
            None => Self::Unresolved,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Explicit(path) => Some(path.as_path()),
            Self::Environment { path, .. } => Some(path.as_path()),
            Self::Unresolved => None,
        }
    }
}

fn expand(path: &Path) -> Result<PathBuf> {
    let expanded = shellexpand::full(path.to_string_lossy().as_ref())
        .map_err(ConfigError::ShellExpansion)?
        .into_owned();

    Ok(PathBuf::from(expanded))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read configuration file.
    #[error("failed to read configuration {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Target name is not configured.
    #[error("no target named {name:?} configured")]
    UnknownTarget { name: String },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
pub type Result<T, E = ConfigError> = std::result::Result<T, E>;
