// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! On-disk layout and configuration for a `leport` root.
//!
//! Grounded on the reference implementation's `leport.impl.config.Config`:
//! a single value, loaded once at process entry, threaded explicitly
//! through every component rather than read from ambient/global state.

use std::env;
use std::path::{Path, PathBuf};

use nix::unistd::Uid;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable consulted when `--root-dir` is not given.
pub const ROOT_ENV: &str = "LEPORT_ROOT";

/// Fallback root when neither the flag nor the environment variable is set.
pub const DEFAULT_ROOT: &str = "/opt/leport";

/// Name of the shared POSIX group that owns the root tree.
pub const SHARED_GROUP: &str = "leport";

pub const DEFAULT_CONFIG: &str = "\
repos:
  # no git entry given: a local repository maintained by hand under <root>/repos/ports
  - name: ports
  # if uncommented, points to an upstream git repository used as a ports repository
  #- name: upstream
  #  git: https://github.com/<user>/my-ports
";

/// True when the current process has effective root privilege.
pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Resolve the root directory using the documented priority order:
/// `--root-dir` flag, then `LEPORT_ROOT`, then [`DEFAULT_ROOT`].
pub fn discover_root(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    if let Ok(val) = env::var(ROOT_ENV) {
        return PathBuf::from(val);
    }
    PathBuf::from(DEFAULT_ROOT)
}

/// A single configured repository: either a hand-maintained local directory
/// or a git clone kept up to date by [`crate::repository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoConfig {
    Local {
        name: String,
    },
    Git {
        name: String,
        git: String,
        branch: Option<String>,
        tag: Option<String>,
    },
}

impl RepoConfig {
    pub fn name(&self) -> &str {
        match self {
            RepoConfig::Local { name } => name,
            RepoConfig::Git { name, .. } => name,
        }
    }

    pub fn dir(&self, cfg: &Config) -> PathBuf {
        cfg.repos_dir().join(self.name())
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    repos: Vec<RawRepo>,
}

#[derive(Debug, Deserialize)]
struct RawRepo {
    name: String,
    git: Option<String>,
    branch: Option<String>,
    tag: Option<String>,
}

impl RawRepo {
    fn into_repo(self) -> Result<RepoConfig, Error> {
        match self.git {
            None => {
                if self.branch.is_some() || self.tag.is_some() {
                    return Err(Error::InvalidRepo {
                        name: self.name,
                        reason: "branch/tag given without a git url".into(),
                    });
                }
                Ok(RepoConfig::Local { name: self.name })
            }
            Some(git) => {
                if self.branch.is_some() && self.tag.is_some() {
                    return Err(Error::InvalidRepo {
                        name: self.name,
                        reason: "cannot specify both branch and tag".into(),
                    });
                }
                let branch = if self.tag.is_none() {
                    Some(self.branch.unwrap_or_else(|| "master".to_string()))
                } else {
                    None
                };
                Ok(RepoConfig::Git {
                    name: self.name,
                    git,
                    branch,
                    tag: self.tag,
                })
            }
        }
    }
}

/// Fully resolved configuration: a root directory plus the repos configured
/// under it. Constructed once at entry and passed by reference thereafter.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    repos: Vec<RepoConfig>,
}

impl Config {
    /// Load configuration from `<root>/config.yml`.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        let path = root.join("config.yml");

        let raw: RawConfig = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            serde_yaml::from_str(&text)?
        } else {
            RawConfig { repos: vec![] }
        };

        let repos = raw
            .repos
            .into_iter()
            .map(RawRepo::into_repo)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { root, repos })
    }

    /// Write the bundled [`DEFAULT_CONFIG`] to `<root>/config.yml`, used by `init`.
    pub fn write_default(root: &Path) -> Result<(), Error> {
        let path = root.join("config.yml");
        std::fs::write(&path, DEFAULT_CONFIG).map_err(|source| Error::Io { path, source })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repos(&self) -> &[RepoConfig] {
        &self.repos
    }

    pub fn repo_from_name(&self, name: &str) -> Option<&RepoConfig> {
        self.repos.iter().find(|r| r.name() == name)
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.root.join("repos")
    }

    pub fn pkgs_dir(&self) -> PathBuf {
        self.root.join("pkgs")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn build_dir(&self) -> PathBuf {
        self.data_dir().join("build")
    }

    pub fn destdir_root(&self) -> PathBuf {
        self.data_dir().join("destdir")
    }

    pub fn pkg_registry_dir(&self) -> PathBuf {
        self.data_dir().join("registry")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("db.sqlite")
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.data_dir().join(".lock")
    }

    /// Required top-level directories; checked for existence by non-`init` commands.
    pub fn required_dirs(&self) -> [PathBuf; 3] {
        [self.repos_dir(), self.pkgs_dir(), self.data_dir()]
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid repo '{name}': {reason}")]
    InvalidRepo { name: String, reason: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn discover_root_prefers_flag() {
        let flag = PathBuf::from("/flag/root");
        assert_eq!(discover_root(Some(&flag)), flag);
    }

    #[test]
    fn local_repo_rejects_branch() {
        let raw = RawRepo {
            name: "ports".into(),
            git: None,
            branch: Some("master".into()),
            tag: None,
        };
        assert!(raw.into_repo().is_err());
    }

    #[test]
    fn git_repo_defaults_to_master() {
        let raw = RawRepo {
            name: "upstream".into(),
            git: Some("https://example.com/ports.git".into()),
            branch: None,
            tag: None,
        };
        let repo = raw.into_repo().unwrap();
        assert_eq!(
            repo,
            RepoConfig::Git {
                name: "upstream".into(),
                git: "https://example.com/ports.git".into(),
                branch: Some("master".into()),
                tag: None,
            }
        );
    }

    #[test]
    fn git_repo_rejects_branch_and_tag() {
        let raw = RawRepo {
            name: "upstream".into(),
            git: Some("https://example.com/ports.git".into()),
            branch: Some("main".into()),
            tag: Some("v1".into()),
        };
        assert!(raw.into_repo().is_err());
    }
}
