// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-path ownership and permission record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PkgManifestStat {
    pub user: String,
    pub group: String,
    /// Three-digit octal mode, e.g. `"644"`.
    pub mode: String,
}

impl PkgManifestStat {
    pub fn new(user: impl Into<String>, group: impl Into<String>, mode: impl Into<String>) -> Result<Self, Error> {
        let mode = mode.into();
        validate_octal_mode(&mode)?;
        Ok(Self {
            user: user.into(),
            group: group.into(),
            mode,
        })
    }

    /// Parses [`Self::mode`] into the numeric permission bits.
    pub fn mode_bits(&self) -> Result<u32, Error> {
        u32::from_str_radix(&self.mode, 8).map_err(|_| Error::InvalidMode {
            mode: self.mode.clone(),
        })
    }
}

fn validate_octal_mode(mode: &str) -> Result<(), Error> {
    if mode.len() != 3 || !mode.chars().all(|c| ('0'..='7').contains(&c)) {
        return Err(Error::InvalidMode {
            mode: mode.to_string(),
        });
    }
    Ok(())
}

/// The structured description of everything a package contributes to the
/// host: per-file checksums, keyed by absolute install path, plus a
/// per-path (file or directory) ownership/mode map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PkgManifest {
    pub file_checksums: BTreeMap<String, String>,
    pub stat: BTreeMap<String, PkgManifestStat>,
}

impl PkgManifest {
    /// Enforces invariant M1: every checksummed path has a stat entry, and
    /// every stat entry not in `file_checksums` is implicitly a directory.
    pub fn validate(&self) -> Result<(), Error> {
        for path in self.file_checksums.keys() {
            if !self.stat.contains_key(path) {
                return Err(Error::MissingStat { path: path.clone() });
            }
        }
        for stat in self.stat.values() {
            validate_octal_mode(&stat.mode)?;
        }
        Ok(())
    }

    /// Paths in `stat` that are not regular files per `file_checksums` — directories.
    pub fn directories(&self) -> impl Iterator<Item = &str> {
        self.stat
            .keys()
            .filter(move |p| !self.file_checksums.contains_key(p.as_str()))
            .map(String::as_str)
    }

    pub fn is_directory(&self, path: &str) -> bool {
        self.stat.contains_key(path) && !self.file_checksums.contains_key(path)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("path '{path}' has a checksum but no stat entry")]
    MissingStat { path: String },
    #[error("invalid octal mode '{mode}'")]
    InvalidMode { mode: String },
}

#[cfg(test)]
mod test {
    use super::*;

    fn stat() -> PkgManifestStat {
        PkgManifestStat::new("root", "root", "644").unwrap()
    }

    #[test]
    fn rejects_non_octal_mode() {
        assert!(PkgManifestStat::new("root", "root", "999").is_err());
        assert!(PkgManifestStat::new("root", "root", "64").is_err());
    }

    #[test]
    fn validate_catches_missing_stat() {
        let mut m = PkgManifest::default();
        m.file_checksums.insert("/usr/bin/foo".into(), "abc".into());
        assert!(matches!(m.validate(), Err(Error::MissingStat { .. })));
        m.stat.insert("/usr/bin/foo".into(), stat());
        assert!(m.validate().is_ok());
    }

    #[test]
    fn directories_excludes_files() {
        let mut m = PkgManifest::default();
        m.file_checksums.insert("/usr/bin/foo".into(), "abc".into());
        m.stat.insert("/usr/bin/foo".into(), stat());
        m.stat.insert("/usr/bin".into(), stat());
        let dirs: Vec<_> = m.directories().collect();
        assert_eq!(dirs, vec!["/usr/bin"]);
        assert!(m.is_directory("/usr/bin"));
        assert!(!m.is_directory("/usr/bin/foo"));
    }
}
