// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The install engine (C4): conflict enumeration, extraction, checksum
//! verification, ownership/mode application, registry update, and hook
//! invocation, wrapped in a journal + registry transaction.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use nix::unistd::{Gid, Group, User};
use thiserror::Error;

use crate::conflict::{self, DecisionSource};
use crate::config::{self, Config};
use crate::hooks::{Hooks, Stage};
use crate::journal::{self, Journal};
use crate::package::{archive, ArchiveReader, PkgInfo, PkgManifest};
use crate::registry::{self, Registry};

#[derive(Debug)]
pub struct InstallReport {
    pub name: String,
    pub journal_warning: Option<String>,
}

/// Installs the package archive at `archive_path`. `decisions` resolves any
/// file conflicts with pre-existing host files.
pub fn install(
    cfg: &Config,
    registry: &mut Registry,
    archive_path: &Path,
    decisions: &mut dyn DecisionSource,
) -> Result<InstallReport, Error> {
    if !config::is_root() {
        return Err(Error::InsufficientPrivilege);
    }
    if Group::from_name(config::SHARED_GROUP)?.is_none() {
        return Err(Error::MissingGroup);
    }

    let reader = ArchiveReader::open(archive_path);
    let info = reader.read_info()?;
    let manifest = reader.read_manifest()?;
    let hooks_text = reader.read_hooks()?;

    if registry.has_pkg(&info.name)? {
        return Err(Error::AlreadyInstalled { pkg: info.name.clone() });
    }

    let conflicts = conflict::enumerate(&manifest, registry)?;
    let overwrite = conflict::resolve(&conflicts, decisions);
    let exclude_files: HashSet<String> = conflicts
        .iter()
        .map(|c| c.path.clone())
        .filter(|p| !overwrite.contains(p))
        .collect();

    let hooks = hooks_text.as_deref().map(Hooks::parse).transpose()?.unwrap_or_default();

    registry.begin()?;
    let mut journal = Journal::new();

    let outcome = run_phases(
        cfg,
        registry,
        &mut journal,
        &reader,
        &info,
        &manifest,
        hooks_text.as_deref(),
        &hooks,
        &overwrite,
        &exclude_files,
    );

    match outcome {
        Ok(()) => {
            registry.commit()?;
            let journal_warning = match journal.commit() {
                Ok(()) => None,
                Err(failure) => {
                    log::warn!("install of {}: journal apply reported failures: {failure}", info.name);
                    Some(failure.to_string())
                }
            };
            hooks.run(Stage::PostInst, &info.name);
            Ok(InstallReport { name: info.name, journal_warning })
        }
        Err(err) => {
            log::warn!("install of {} failed, rolling back: {err}", info.name);
            if let Err(rollback_err) = registry.rollback() {
                log::warn!("registry rollback failed: {rollback_err}");
            }
            if let Err(rollback_err) = journal.rollback() {
                log::warn!("journal rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_phases(
    cfg: &Config,
    registry: &mut Registry,
    journal: &mut Journal,
    reader: &ArchiveReader,
    info: &PkgInfo,
    manifest: &PkgManifest,
    hooks_text: Option<&str>,
    hooks: &Hooks,
    overwrite: &HashSet<String>,
    exclude_files: &HashSet<String>,
) -> Result<(), Error> {
    let meta_dir = cfg.pkg_registry_dir().join(&info.name);
    let staged = journal.mkdir_staged(&meta_dir, 0o750)?;
    let gid = Group::from_name(config::SHARED_GROUP)?.map(|group| group.gid);
    write_metadata(&staged, info, manifest, hooks_text, gid)?;
    if let Some(gid) = gid {
        nix::unistd::chown(&staged, None, Some(gid)).map_err(|source| Error::Nix { path: staged.clone(), source })?;
    }

    for path in overwrite {
        journal.push(journal::Action::rm_file(path)?);
    }

    hooks.run(Stage::PreInst, &info.name);

    extract(journal, reader, manifest, exclude_files)?;
    verify_checksums(manifest, exclude_files)?;
    apply_ownership(manifest, exclude_files)?;

    registry.record_pkg(info)?;
    let kept_files: BTreeMap<String, String> = manifest
        .file_checksums
        .iter()
        .filter(|(p, _)| !exclude_files.contains(p.as_str()))
        .map(|(p, s)| (p.clone(), s.clone()))
        .collect();
    registry.record_files(&info.name, &kept_files)?;
    let dirs: Vec<String> = manifest.directories().map(str::to_string).collect();
    registry.record_dirs(&info.name, &dirs)?;

    Ok(())
}

/// Writes each metadata file into the staged directory and chowns it to
/// `gid` individually, so non-root members of the shared group can read
/// `info.yml`/`manifest.yml`/`hooks.yml` without relying on the directory's
/// group bit alone.
fn write_metadata(staged: &Path, info: &PkgInfo, manifest: &PkgManifest, hooks_text: Option<&str>, gid: Option<Gid>) -> Result<(), Error> {
    write_owned(&staged.join("info.yml"), &serde_yaml::to_string(info)?, gid)?;
    write_owned(&staged.join("manifest.yml"), &serde_yaml::to_string(manifest)?, gid)?;
    if let Some(hooks_text) = hooks_text {
        write_owned(&staged.join("hooks.yml"), hooks_text, gid)?;
    }
    Ok(())
}

fn write_owned(path: &Path, contents: &str, gid: Option<Gid>) -> Result<(), Error> {
    std::fs::write(path, contents).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    if let Some(gid) = gid {
        nix::unistd::chown(path, None, Some(gid)).map_err(|source| Error::Nix { path: path.to_path_buf(), source })?;
    }
    Ok(())
}

fn extract(
    journal: &mut Journal,
    reader: &ArchiveReader,
    manifest: &PkgManifest,
    exclude_files: &HashSet<String>,
) -> Result<(), Error> {
    reader.extract_payload(
        |dest, entry| {
            let dest_str = dest.to_string_lossy().into_owned();
            if exclude_files.contains(&dest_str) {
                return Ok(());
            }
            if dest.is_dir() {
                return Err(archive::Error::InvalidArchive {
                    reason: format!("'{}' exists as a directory but the manifest lists it as a file", dest.display()),
                });
            }
            if dest.exists() {
                journal.push(journal::Action::rm_file(dest)?);
            } else {
                journal.push(journal::Action::delete_on_error(dest));
            }
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|source| archive::Error::Io { path: parent.to_path_buf(), source })?;
            }
            let mut out = File::create(dest).map_err(|source| archive::Error::Io { path: dest.to_path_buf(), source })?;
            std::io::copy(entry, &mut out).map_err(|source| archive::Error::Io { path: dest.to_path_buf(), source })?;
            out.flush().map_err(|source| archive::Error::Io { path: dest.to_path_buf(), source })?;
            Ok(())
        },
        |dest| {
            if dest.exists() {
                if !dest.is_dir() {
                    return Err(archive::Error::InvalidArchive {
                        reason: format!("'{}' exists but is not a directory", dest.display()),
                    });
                }
                return Ok(());
            }
            // Created directly rather than staged: a nested directory's
            // parent may itself be a not-yet-promoted staged sibling, so
            // `mkdir_staged`'s rename-on-commit would collide with content
            // files have already written into the real path by then.
            // `DeleteOnError` covers the whole subtree on rollback.
            std::fs::create_dir_all(dest).map_err(|source| archive::Error::Io { path: dest.to_path_buf(), source })?;
            journal.push(journal::Action::delete_on_error(dest));
            Ok(())
        },
    )?;
    let _ = manifest;
    Ok(())
}

fn verify_checksums(manifest: &PkgManifest, exclude_files: &HashSet<String>) -> Result<(), Error> {
    for (path, expected) in &manifest.file_checksums {
        if exclude_files.contains(path) {
            continue;
        }
        let actual = archive_sha256(Path::new(path))?;
        if &actual != expected {
            return Err(Error::ChecksumMismatch { path: path.clone() });
        }
    }
    Ok(())
}

fn archive_sha256(path: &Path) -> Result<String, Error> {
    use sha2::{Digest, Sha256};
    let mut file = File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Ok(hex::encode(hasher.finalize()))
}

fn apply_ownership(manifest: &PkgManifest, exclude_files: &HashSet<String>) -> Result<(), Error> {
    for (path, stat) in &manifest.stat {
        if exclude_files.contains(path) {
            continue;
        }
        let uid = User::from_name(&stat.user)
            .map_err(|source| Error::Nix { path: Path::new(path).to_path_buf(), source })?
            .ok_or_else(|| Error::UnknownUser { user: stat.user.clone() })?
            .uid;
        let gid = Group::from_name(&stat.group)
            .map_err(|source| Error::Nix { path: Path::new(path).to_path_buf(), source })?
            .ok_or_else(|| Error::UnknownGroup { group: stat.group.clone() })?
            .gid;
        nix::unistd::chown(Path::new(path), Some(uid), Some(gid))
            .map_err(|source| Error::Nix { path: Path::new(path).to_path_buf(), source })?;
        let mode = stat.mode_bits()?;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .map_err(|source| Error::Io { path: Path::new(path).to_path_buf(), source })?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error at {path:?}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("permission error at {path:?}")]
    Nix {
        path: std::path::PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("caller must run as root to install packages")]
    InsufficientPrivilege,
    #[error("shared group '{}' does not exist; run `leport init` first", config::SHARED_GROUP)]
    MissingGroup,
    #[error("package '{pkg}' is already installed")]
    AlreadyInstalled { pkg: String },
    #[error("unknown user '{user}' named in manifest")]
    UnknownUser { user: String },
    #[error("unknown group '{group}' named in manifest")]
    UnknownGroup { group: String },
    #[error("checksum mismatch for {path}")]
    ChecksumMismatch { path: String },
    #[error(transparent)]
    Archive(#[from] archive::Error),
    #[error(transparent)]
    Manifest(#[from] crate::package::manifest::Error),
    #[error(transparent)]
    Registry(#[from] registry::Error),
    #[error(transparent)]
    Journal(#[from] journal::Error),
    #[error(transparent)]
    Hooks(#[from] serde_yaml::Error),
}
