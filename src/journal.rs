// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The reversible action journal (C1): a stack of filesystem mutations,
//! each capturing at construction time everything it needs to reverse
//! itself, applied in order on commit or reverted in reverse order on
//! rollback.
//!
//! Grounded on the sibling-rename trick used by `pkgar`'s transaction
//! module: every destructive action first moves its target out of the
//! way to a hidden sibling path, so the only publicly observable change
//! before commit is that the original name is free.

use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use nix::unistd::{self, Gid, Uid};
use thiserror::Error;

fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new("/"));
    for attempt in 0u32.. {
        let candidate = parent.join(format!(".leport-{file_name}.{attempt}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!("exhausted sibling temp path attempts")
}

/// A single reversible filesystem mutation.
#[derive(Debug)]
pub enum Action {
    RmFile { target: PathBuf, temp: PathBuf },
    RmTree { target: PathBuf, temp: PathBuf },
    MkDir { target: PathBuf, temp: PathBuf },
    DeleteOnError { target: PathBuf },
    Chown { target: PathBuf, uid: Option<u32>, gid: Option<u32>, old_uid: u32, old_gid: u32 },
    Chmod { target: PathBuf, mode: u32, old_mode: u32 },
}

impl Action {
    pub fn rm_file(target: impl Into<PathBuf>) -> Result<Self, Error> {
        let target = target.into();
        let meta = fs::symlink_metadata(&target).map_err(|source| Error::Io { path: target.clone(), source })?;
        if meta.is_dir() {
            return Err(Error::WrongType { path: target, expected: "regular file" });
        }
        let temp = temp_sibling(&target);
        fs::rename(&target, &temp).map_err(|source| Error::Io { path: target.clone(), source })?;
        Ok(Action::RmFile { target, temp })
    }

    pub fn rm_tree(target: impl Into<PathBuf>) -> Result<Self, Error> {
        let target = target.into();
        let meta = fs::symlink_metadata(&target).map_err(|source| Error::Io { path: target.clone(), source })?;
        if !meta.is_dir() {
            return Err(Error::WrongType { path: target, expected: "directory" });
        }
        let temp = temp_sibling(&target);
        fs::rename(&target, &temp).map_err(|source| Error::Io { path: target.clone(), source })?;
        Ok(Action::RmTree { target, temp })
    }

    pub fn mkdir(target: impl Into<PathBuf>, mode: u32) -> Result<Self, Error> {
        let target = target.into();
        if target.exists() {
            return Err(Error::AlreadyExists { path: target });
        }
        let temp = temp_sibling(&target);
        fs::create_dir(&temp).map_err(|source| Error::Io { path: temp.clone(), source })?;
        fs::set_permissions(&temp, fs::Permissions::from_mode(mode))
            .map_err(|source| Error::Io { path: temp.clone(), source })?;
        Ok(Action::MkDir { target, temp })
    }

    pub fn delete_on_error(target: impl Into<PathBuf>) -> Self {
        Action::DeleteOnError { target: target.into() }
    }

    /// The temp sibling path for a not-yet-applied [`Action::MkDir`], so a
    /// caller can populate the directory before it is promoted on commit.
    pub fn staged_path(&self) -> Option<&Path> {
        match self {
            Action::MkDir { temp, .. } => Some(temp),
            _ => None,
        }
    }

    pub fn chown(target: impl Into<PathBuf>, uid: Option<u32>, gid: Option<u32>) -> Result<Self, Error> {
        let target = target.into();
        let meta = fs::symlink_metadata(&target).map_err(|source| Error::Io { path: target.clone(), source })?;
        Ok(Action::Chown {
            old_uid: meta.uid(),
            old_gid: meta.gid(),
            target,
            uid,
            gid,
        })
    }

    pub fn chmod(target: impl Into<PathBuf>, mode: u32) -> Result<Self, Error> {
        let target = target.into();
        let meta = fs::symlink_metadata(&target).map_err(|source| Error::Io { path: target.clone(), source })?;
        let old_mode = meta.permissions().mode() & 0o777;
        Ok(Action::Chmod { target, mode, old_mode })
    }

    fn apply(&self) -> Result<(), Error> {
        match self {
            Action::RmFile { temp, .. } => {
                if temp.exists() {
                    fs::remove_file(temp).map_err(|source| Error::Io { path: temp.clone(), source })?;
                }
            }
            Action::RmTree { temp, .. } => {
                if temp.exists() {
                    fs::remove_dir_all(temp).map_err(|source| Error::Io { path: temp.clone(), source })?;
                }
            }
            Action::MkDir { target, temp } => {
                fs::rename(temp, target).map_err(|source| Error::Io { path: target.clone(), source })?;
            }
            Action::DeleteOnError { .. } => {}
            Action::Chown { target, uid, gid, .. } => {
                chown(target, *uid, *gid)?;
            }
            Action::Chmod { target, mode, .. } => {
                fs::set_permissions(target, fs::Permissions::from_mode(*mode))
                    .map_err(|source| Error::Io { path: target.clone(), source })?;
            }
        }
        Ok(())
    }

    fn revert(&self) -> Result<(), Error> {
        match self {
            Action::RmFile { target, temp } => {
                fs::rename(temp, target).map_err(|source| Error::Io { path: target.clone(), source })?;
            }
            Action::RmTree { target, temp } => {
                fs::rename(temp, target).map_err(|source| Error::Io { path: target.clone(), source })?;
            }
            Action::MkDir { temp, .. } => {
                if temp.exists() {
                    fs::remove_dir_all(temp).map_err(|source| Error::Io { path: temp.clone(), source })?;
                }
            }
            Action::DeleteOnError { target } => {
                if target.is_dir() {
                    fs::remove_dir_all(target).map_err(|source| Error::Io { path: target.clone(), source })?;
                } else if target.exists() || target.symlink_metadata().is_ok() {
                    fs::remove_file(target).map_err(|source| Error::Io { path: target.clone(), source })?;
                }
            }
            Action::Chown { target, old_uid, old_gid, .. } => {
                chown(target, Some(*old_uid), Some(*old_gid))?;
            }
            Action::Chmod { target, old_mode, .. } => {
                fs::set_permissions(target, fs::Permissions::from_mode(*old_mode))
                    .map_err(|source| Error::Io { path: target.clone(), source })?;
            }
        }
        Ok(())
    }

    fn target(&self) -> &Path {
        match self {
            Action::RmFile { target, .. }
            | Action::RmTree { target, .. }
            | Action::MkDir { target, .. }
            | Action::DeleteOnError { target }
            | Action::Chown { target, .. }
            | Action::Chmod { target, .. } => target,
        }
    }
}

fn chown(path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<(), Error> {
    unistd::chown(path, uid.map(Uid::from_raw), gid.map(Gid::from_raw))
        .map_err(|source| Error::Nix { path: path.to_path_buf(), source })
}

/// Scoped transaction over a list of [`Action`]s. Consumed by exactly one
/// of [`Journal::commit`] or [`Journal::rollback`].
#[derive(Debug, Default)]
pub struct Journal {
    actions: Vec<Action>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        log::debug!("journal: push {:?} on {:?}", std::mem::discriminant(&action), action.target());
        self.actions.push(action);
    }

    /// Pushes a [`Action::mkdir`] and returns its staged temp path, so the
    /// caller can write into the directory before it is promoted on commit.
    pub fn mkdir_staged(&mut self, target: impl Into<PathBuf>, mode: u32) -> Result<PathBuf, Error> {
        let action = Action::mkdir(target, mode)?;
        let temp = action.staged_path().expect("mkdir always stages a temp path").to_path_buf();
        self.push(action);
        Ok(temp)
    }

    /// Applies every action in insertion order. Failures are collected, not
    /// raised mid-sequence, and surfaced as a single compound error.
    pub fn commit(mut self) -> Result<(), CommitFailure> {
        let mut failures = Vec::new();
        for action in self.actions.drain(..) {
            if let Err(err) = action.apply() {
                log::warn!("journal apply failed: {err}");
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CommitFailure { failures })
        }
    }

    /// Reverts every action in reverse insertion order.
    pub fn rollback(mut self) -> Result<(), CommitFailure> {
        let mut failures = Vec::new();
        while let Some(action) = self.actions.pop() {
            if let Err(err) = action.revert() {
                log::warn!("journal revert failed: {err}");
                failures.push(err);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(CommitFailure { failures })
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Error)]
#[error("{} journal action(s) failed: {}", failures.len(), failures.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct CommitFailure {
    pub failures: Vec<Error>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("permission error at {path:?}")]
    Nix {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("{path:?} already exists")]
    AlreadyExists { path: PathBuf },
    #[error("{path:?} is not a {expected}")]
    WrongType { path: PathBuf, expected: &'static str },
}
