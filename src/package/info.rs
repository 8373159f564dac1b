// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A package name as it appears on the command line or in a manifest:
/// either `pkg` (unqualified, looked up across configured repos in order)
/// or `repo/pkg` (qualified to a single repo).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PkgName {
    pub repo: Option<String>,
    pub name: String,
}

impl PkgName {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        if raw.is_empty() {
            return Err(Error::InvalidPackageName { raw: raw.into() });
        }
        let mut parts = raw.splitn(3, '/');
        let first = parts.next().unwrap_or_default();
        match (parts.next(), parts.next()) {
            (None, _) => {
                if first.is_empty() {
                    return Err(Error::InvalidPackageName { raw: raw.into() });
                }
                Ok(PkgName {
                    repo: None,
                    name: first.to_string(),
                })
            }
            (Some(second), None) => {
                if first.is_empty() || second.is_empty() {
                    return Err(Error::InvalidPackageName { raw: raw.into() });
                }
                Ok(PkgName {
                    repo: Some(first.to_string()),
                    name: second.to_string(),
                })
            }
            (Some(_), Some(_)) => Err(Error::InvalidPackageName { raw: raw.into() }),
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.repo.is_some()
    }
}

impl fmt::Display for PkgName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repo {
            Some(repo) => write!(f, "{repo}/{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// One of the three kinds of upstream source a recipe may declare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PkgSource {
    Git {
        git: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Http {
        uri: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    File {
        filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
}

impl PkgSource {
    /// Validates the exactly-one-of-branch-or-tag rule for git sources.
    pub fn validate(&self) -> Result<(), Error> {
        if let PkgSource::Git { branch, tag, .. } = self {
            if branch.is_some() && tag.is_some() {
                return Err(Error::InvalidSource {
                    reason: "git source cannot set both branch and tag".into(),
                });
            }
        }
        if let PkgSource::File { filename, .. } = self {
            if filename.contains('/') || filename.is_empty() {
                return Err(Error::InvalidSource {
                    reason: format!("file source filename '{filename}' must not contain a path"),
                });
            }
        }
        Ok(())
    }

    /// Destination directory name under the build dir, for git sources.
    pub fn dest_name(&self) -> Option<&str> {
        match self {
            PkgSource::Git { name, git, .. } => Some(
                name.as_deref()
                    .unwrap_or_else(|| git.rsplit('/').next().unwrap_or(git))
                    .trim_end_matches(".git"),
            ),
            _ => None,
        }
    }
}

fn default_description() -> String {
    "No description provided.".to_string()
}

/// Recipe and archive metadata, serialized as `info.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkgInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub release: u64,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default)]
    pub sources: Vec<PkgSource>,
    #[serde(default)]
    pub url: Option<String>,
}

impl PkgInfo {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() || self.name.contains('/') {
            return Err(Error::InvalidPackageName {
                raw: self.name.clone(),
            });
        }
        for source in &self.sources {
            source.validate()?;
        }
        Ok(())
    }

    /// Path to this package's archive under `<root>/pkgs/<repo>/<name>.xz`.
    pub fn archive_path(&self, pkgs_dir: &std::path::Path, repo: &str) -> PathBuf {
        pkgs_dir.join(repo).join(format!("{}.xz", self.name))
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid package name '{raw}'")]
    InvalidPackageName { raw: String },
    #[error("invalid source: {reason}")]
    InvalidSource { reason: String },
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_unqualified() {
        let n = PkgName::parse("zlib").unwrap();
        assert_eq!(n.repo, None);
        assert_eq!(n.name, "zlib");
    }

    #[test]
    fn parses_qualified() {
        let n = PkgName::parse("ports/zlib").unwrap();
        assert_eq!(n.repo.as_deref(), Some("ports"));
        assert_eq!(n.name, "zlib");
    }

    #[test]
    fn rejects_empty_and_extra_slashes() {
        assert!(PkgName::parse("").is_err());
        assert!(PkgName::parse("a/b/c").is_err());
        assert!(PkgName::parse("/zlib").is_err());
        assert!(PkgName::parse("ports/").is_err());
    }

    #[test]
    fn git_source_rejects_branch_and_tag() {
        let src = PkgSource::Git {
            git: "https://example.com/x.git".into(),
            branch: Some("main".into()),
            tag: Some("v1".into()),
            name: None,
        };
        assert!(src.validate().is_err());
    }

    #[test]
    fn file_source_rejects_path_segments() {
        let src = PkgSource::File {
            filename: "sub/dir/file.tar".into(),
            sha256: None,
        };
        assert!(src.validate().is_err());
    }
}
