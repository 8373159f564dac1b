// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Conflict policy (C7): a pure function over a manifest, the live
//! filesystem, and a caller-supplied decision source.

use std::path::Path;

use crate::package::PkgManifest;
use crate::registry::Registry;

/// A pre-existing file at a path the incoming package also wants to own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub path: String,
    pub owner: Option<String>,
}

/// Enumerates every conflicting path in `manifest`, in the manifest's
/// natural (sorted) order, so decisions replay reproducibly.
pub fn enumerate(manifest: &PkgManifest, registry: &mut Registry) -> Result<Vec<Conflict>, crate::registry::Error> {
    let mut conflicts = Vec::new();
    for path in manifest.file_checksums.keys() {
        if manifest.is_directory(path) {
            continue;
        }
        if Path::new(path).is_file() {
            let owner = registry.which_pkg_owns_file(path)?;
            conflicts.push(Conflict { path: path.clone(), owner });
        }
    }
    Ok(conflicts)
}

/// A decision source: given a conflict, says whether to overwrite it.
pub trait DecisionSource {
    fn decide(&mut self, conflict: &Conflict) -> bool;
}

/// Always overwrite (`--force`).
pub struct AlwaysOverwrite;

impl DecisionSource for AlwaysOverwrite {
    fn decide(&mut self, _conflict: &Conflict) -> bool {
        true
    }
}

/// Never overwrite, the default when not forcing and not prompting.
pub struct NeverOverwrite;

impl DecisionSource for NeverOverwrite {
    fn decide(&mut self, _conflict: &Conflict) -> bool {
        false
    }
}

/// Resolves every conflict through `source`, returning the set of paths the
/// caller decided to overwrite.
pub fn resolve(conflicts: &[Conflict], source: &mut dyn DecisionSource) -> std::collections::HashSet<String> {
    conflicts
        .iter()
        .filter(|c| source.decide(c))
        .map(|c| c.path.clone())
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::PkgManifestStat;
    use std::io::Write as _;

    #[test]
    fn ignores_directories_and_absent_paths() {
        let mut manifest = PkgManifest::default();
        manifest
            .file_checksums
            .insert("/tmp/leport-test-does-not-exist".into(), "abc".into());
        manifest.stat.insert(
            "/tmp/leport-test-does-not-exist".into(),
            PkgManifestStat::new("root", "root", "644").unwrap(),
        );
        manifest.stat.insert(
            "/tmp".into(),
            PkgManifestStat::new("root", "root", "755").unwrap(),
        );

        let mut registry = Registry::open_in_memory().unwrap();
        let conflicts = enumerate(&manifest, &mut registry).unwrap();
        assert!(conflicts.is_empty());
    }

    #[test]
    fn detects_existing_file_conflict() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("existing.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hi").unwrap();

        let mut manifest = PkgManifest::default();
        let key = path.to_string_lossy().into_owned();
        manifest.file_checksums.insert(key.clone(), "abc".into());
        manifest
            .stat
            .insert(key.clone(), PkgManifestStat::new("root", "root", "644").unwrap());

        let mut registry = Registry::open_in_memory().unwrap();
        let conflicts = enumerate(&manifest, &mut registry).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].path, key);
        assert_eq!(conflicts[0].owner, None);
    }

    #[test]
    fn resolve_respects_decisions() {
        let conflicts = vec![
            Conflict { path: "/a".into(), owner: None },
            Conflict { path: "/b".into(), owner: None },
        ];
        let mut force = AlwaysOverwrite;
        let overwritten = resolve(&conflicts, &mut force);
        assert_eq!(overwritten.len(), 2);

        let mut never = NeverOverwrite;
        let overwritten = resolve(&conflicts, &mut never);
        assert!(overwritten.is_empty());
    }
}
