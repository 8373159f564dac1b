// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Source fetching for the prepare step of the build pipeline (C6 step 1):
//! git clones/fetches, HTTP downloads, and local file copies, each with
//! optional checksum verification.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::package::PkgSource;
use crate::progress::Progress;

pub fn prepare_all(
    sources: &[PkgSource],
    recipe_dir: &Path,
    build_dir: &Path,
    progress: &dyn Progress,
) -> Result<(), Error> {
    std::fs::create_dir_all(build_dir).map_err(|source| Error::Io { path: build_dir.to_path_buf(), source })?;
    for src in sources {
        prepare_one(src, recipe_dir, build_dir, progress)?;
    }
    Ok(())
}

fn prepare_one(src: &PkgSource, recipe_dir: &Path, build_dir: &Path, progress: &dyn Progress) -> Result<(), Error> {
    match src {
        PkgSource::Git { git, branch, tag, name } => prepare_git(git, branch.as_deref(), tag.as_deref(), name.as_deref(), build_dir),
        PkgSource::Http { uri, sha256 } => prepare_http(uri, sha256.as_deref(), build_dir, progress),
        PkgSource::File { filename, sha256 } => prepare_file(filename, sha256.as_deref(), recipe_dir, build_dir),
    }
}

fn git_dest_name(url: &str, name: Option<&str>) -> String {
    name.map(str::to_string)
        .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url).trim_end_matches(".git").to_string())
}

fn prepare_git(url: &str, branch: Option<&str>, tag: Option<&str>, name: Option<&str>, build_dir: &Path) -> Result<(), Error> {
    let dest = build_dir.join(git_dest_name(url, name));

    let repo = if dest.join(".git").exists() {
        let repo = git2::Repository::open(&dest)?;
        repo.find_remote("origin")?.fetch(&[] as &[&str], None, None)?;
        repo
    } else {
        log::info!("cloning source '{url}' into {}", dest.display());
        git2::Repository::clone(url, &dest)?
    };

    if repo.is_bare() {
        return Err(Error::BareRepo { url: url.to_string() });
    }

    if let Some(tag) = tag {
        checkout(&repo, &format!("refs/tags/{tag}")).map_err(|_| Error::InvalidTag { tag: tag.to_string() })?;
    } else {
        let branch = branch.unwrap_or("master");
        checkout(&repo, &format!("refs/remotes/origin/{branch}"))
            .or_else(|_| checkout(&repo, &format!("refs/heads/{branch}")))
            .map_err(|_| Error::InvalidBranch { branch: branch.to_string() })?;
    }
    Ok(())
}

fn checkout(repo: &git2::Repository, refname: &str) -> Result<(), git2::Error> {
    let obj = repo.revparse_single(refname)?;
    repo.checkout_tree(&obj, None)?;
    repo.set_head_detached(obj.id())
}

fn prepare_http(uri: &str, sha256: Option<&str>, build_dir: &Path, progress: &dyn Progress) -> Result<(), Error> {
    let filename = uri.rsplit('/').next().unwrap_or(uri);
    let dest = build_dir.join(filename);

    if dest.exists() {
        if let Some(expected) = sha256 {
            if sha256_of(&dest)? == expected {
                return Ok(());
            }
            log::debug!("cached '{filename}' checksum mismatch, re-downloading");
        } else {
            return Ok(());
        }
    }

    for attempt in 0..2 {
        download(uri, &dest, progress)?;
        if let Some(expected) = sha256 {
            let actual = sha256_of(&dest)?;
            if actual == expected {
                return Ok(());
            }
            if attempt == 1 {
                return Err(Error::ChecksumMismatch { what: uri.to_string(), expected: expected.to_string(), actual });
            }
            log::warn!("checksum mismatch downloading '{uri}', retrying once");
        } else {
            return Ok(());
        }
    }
    Ok(())
}

fn download(uri: &str, dest: &Path, progress: &dyn Progress) -> Result<(), Error> {
    progress.start(&format!("downloading {uri}"));
    let mut response = reqwest::blocking::get(uri)?.error_for_status()?;
    let mut out = File::create(dest).map_err(|source| Error::Io { path: dest.to_path_buf(), source })?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = std::io::Read::read(&mut response, &mut buf).map_err(|source| Error::Io { path: dest.to_path_buf(), source })?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(|source| Error::Io { path: dest.to_path_buf(), source })?;
        progress.tick(n as u64);
    }
    progress.finish();
    Ok(())
}

fn prepare_file(filename: &str, sha256: Option<&str>, recipe_dir: &Path, build_dir: &Path) -> Result<(), Error> {
    let src = recipe_dir.join(filename);
    if !src.is_file() {
        return Err(Error::MissingFile { path: src });
    }
    let dest = build_dir.join(filename);
    std::fs::copy(&src, &dest).map_err(|source| Error::Io { path: src.clone(), source })?;
    if let Some(expected) = sha256 {
        let actual = sha256_of(&dest)?;
        if actual != expected {
            return Err(Error::ChecksumMismatch { what: filename.to_string(), expected: expected.to_string(), actual });
        }
    }
    Ok(())
}

fn sha256_of(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Ok(hex::encode(hasher.finalize()))
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("git source '{url}' is bare")]
    BareRepo { url: String },
    #[error("no tag '{tag}' in git source")]
    InvalidTag { tag: String },
    #[error("no branch '{branch}' in git source")]
    InvalidBranch { branch: String },
    #[error("missing file source at {path:?}")]
    MissingFile { path: PathBuf },
    #[error("checksum mismatch for {what}: expected {expected}, got {actual}")]
    ChecksumMismatch { what: String, expected: String, actual: String },
}
