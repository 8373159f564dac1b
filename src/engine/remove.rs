// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The remove engine (C5): inverse of install — hooks, unlink tracked
//! files, prune now-empty shared directories, delete registry entries.

use std::path::Path;

use thiserror::Error;

use crate::config::{self, Config};
use crate::hooks::{Hooks, Stage};
use crate::journal::{self, Journal};
use crate::package::{Package, RegistryEntryError};
use crate::registry::{self, Registry};

#[derive(Debug)]
pub struct RemoveReport {
    pub name: String,
    pub journal_warning: Option<String>,
}

/// Removes an installed package by its unqualified name. Qualified
/// `repo/pkg` names are rejected: removal is from the system, not a repo.
pub fn remove(cfg: &Config, registry: &mut Registry, name: &str) -> Result<RemoveReport, Error> {
    if !config::is_root() {
        return Err(Error::InsufficientPrivilege);
    }
    if name.contains('/') {
        return Err(Error::QualifiedName { name: name.to_string() });
    }

    let meta_dir = cfg.pkg_registry_dir().join(name);
    let package = Package::from_registry_dir(&meta_dir).map_err(|source| Error::InvalidRegistryEntry {
        pkg: name.to_string(),
        source,
    })?;

    let hooks = package.hooks.as_deref().map(Hooks::parse).transpose()?.unwrap_or_default();
    hooks.run(Stage::PreRm, name);

    registry.begin()?;
    let mut journal = Journal::new();

    let outcome = run_phases(registry, &mut journal, &meta_dir, name);

    let dirs = match outcome {
        Ok(dirs) => {
            registry.commit()?;
            dirs
        }
        Err(err) => {
            log::warn!("remove of {name} failed, rolling back: {err}");
            if let Err(rollback_err) = registry.rollback() {
                log::warn!("registry rollback failed: {rollback_err}");
            }
            if let Err(rollback_err) = journal.rollback() {
                log::warn!("journal rollback failed: {rollback_err}");
            }
            return Err(err);
        }
    };

    let journal_warning = match journal.commit() {
        Ok(()) => None,
        Err(failure) => {
            log::warn!("remove of {name}: journal apply reported failures: {failure}");
            Some(failure.to_string())
        }
    };

    prune_directories(&dirs);
    hooks.run(Stage::PostRm, name);

    Ok(RemoveReport { name: name.to_string(), journal_warning })
}

fn run_phases(registry: &mut Registry, journal: &mut Journal, meta_dir: &Path, name: &str) -> Result<Vec<(String, i64)>, Error> {
    let files = registry.pkg_files_installed(name)?;
    for (path, _sha256) in &files {
        if Path::new(path).exists() {
            journal.push(journal::Action::rm_file(path)?);
        }
    }
    if meta_dir.exists() {
        journal.push(journal::Action::rm_tree(meta_dir)?);
    }

    let dirs = registry.pkg_dirs(name)?;
    registry.rm_pkg(name)?;
    Ok(dirs)
}

/// Directories whose refcount was 1 (this package was the sole recorder)
/// are attempted for removal if now empty on disk; `ENOTEMPTY` is benign.
fn prune_directories(dirs: &[(String, i64)]) {
    for (dir, refcount) in dirs {
        if *refcount != 1 {
            continue;
        }
        match std::fs::remove_dir(dir) {
            Ok(()) => {}
            Err(err) if err.raw_os_error() == Some(nix::libc::ENOTEMPTY) => {
                log::debug!("directory '{dir}' not empty, leaving in place");
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("failed to prune directory '{dir}': {err}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("caller must run as root to remove packages")]
    InsufficientPrivilege,
    #[error("remove takes an unqualified package name, got '{name}'")]
    QualifiedName { name: String },
    #[error("no registered entry for package '{pkg}'")]
    InvalidRegistryEntry {
        pkg: String,
        #[source]
        source: RegistryEntryError,
    },
    #[error(transparent)]
    Registry(#[from] registry::Error),
    #[error(transparent)]
    Journal(#[from] journal::Error),
    #[error(transparent)]
    Hooks(#[from] serde_yaml::Error),
}
