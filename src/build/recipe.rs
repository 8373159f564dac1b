// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The declarative recipe format (`build.yml`): a fixed, auditable
//! step-list vocabulary executed via `std::process::Command`, in place of
//! a dynamically loaded build script.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Deserialize, Default)]
pub struct Depends {
    #[serde(default)]
    pub programs: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
}

/// A single declarative ownership/mode record applied to one installed
/// path after the build's `install` step completes.
#[derive(Debug, Deserialize, Clone)]
pub struct StatEntry {
    pub path: String,
    pub user: String,
    pub group: String,
    pub mode: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecipeDef {
    #[serde(default)]
    pub prepare: Vec<String>,
    /// If set, its stdout (trimmed) becomes the package version.
    #[serde(default)]
    pub pkg_version: Option<String>,
    #[serde(default)]
    pub depends: Depends,
    #[serde(default)]
    pub build: Vec<String>,
    #[serde(default)]
    pub check: Vec<String>,
    #[serde(default)]
    pub install: Vec<String>,
    #[serde(default)]
    pub stat: Vec<StatEntry>,
}

impl RecipeDef {
    pub fn load(recipe_dir: &Path) -> Result<Self, Error> {
        let path = recipe_dir.join("build.yml");
        let text = std::fs::read_to_string(&path).map_err(|source| Error::Io { path: path.clone(), source })?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error at {path:?}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_recipe() {
        let yaml = "\
build:
  - make
install:
  - make install DESTDIR=$DEST_DIR
stat:
  - path: usr/bin/tool
    user: root
    group: root
    mode: \"755\"
";
        let recipe: RecipeDef = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(recipe.build, vec!["make".to_string()]);
        assert_eq!(recipe.stat.len(), 1);
        assert!(recipe.prepare.is_empty());
    }
}
