// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Reader/writer for the on-disk package archive: an xz-compressed tar
//! containing `info.yml`, `manifest.yml`, an optional `hooks.yml`, and a
//! `files/` payload tree whose members install to the path obtained by
//! stripping the `files/` prefix.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use super::info::PkgInfo;
use super::manifest::{PkgManifest, PkgManifestStat};

const FILES_PREFIX: &str = "files/";
const COMPRESSION_LEVEL: u32 = 6;

pub struct ArchiveReader {
    path: PathBuf,
}

impl ArchiveReader {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tar_stream(&self) -> Result<tar::Archive<XzDecoder<File>>, Error> {
        let file = File::open(&self.path).map_err(|source| Error::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(tar::Archive::new(XzDecoder::new(file)))
    }

    fn read_member_to_string(&self, name: &str) -> Result<Option<String>, Error> {
        let mut archive = self.tar_stream()?;
        for entry in archive.entries()? {
            let mut entry = entry?;
            if entry.path()?.to_string_lossy() == name {
                let mut buf = String::new();
                entry.read_to_string(&mut buf)?;
                return Ok(Some(buf));
            }
        }
        Ok(None)
    }

    pub fn read_info(&self) -> Result<PkgInfo, Error> {
        let text = self
            .read_member_to_string("info.yml")?
            .ok_or(Error::InvalidArchive {
                reason: "missing info.yml".into(),
            })?;
        let info: PkgInfo = serde_yaml::from_str(&text)?;
        info.validate()?;
        Ok(info)
    }

    pub fn read_manifest(&self) -> Result<PkgManifest, Error> {
        let text = self
            .read_member_to_string("manifest.yml")?
            .ok_or(Error::InvalidArchive {
                reason: "missing manifest.yml".into(),
            })?;
        let manifest: PkgManifest = serde_yaml::from_str(&text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn read_hooks(&self) -> Result<Option<String>, Error> {
        self.read_member_to_string("hooks.yml")
    }

    /// Streams the `files/` payload, invoking `on_file` for each regular
    /// file (with its absolute destination path and a reader over its
    /// contents) and `on_dir` for each directory. Members outside `files/`
    /// are skipped; a duplicate destination path is an error.
    pub fn extract_payload<FFile, FDir>(
        &self,
        mut on_file: FFile,
        mut on_dir: FDir,
    ) -> Result<(), Error>
    where
        FFile: FnMut(&Path, &mut tar::Entry<'_, XzDecoder<File>>) -> Result<(), Error>,
        FDir: FnMut(&Path) -> Result<(), Error>,
    {
        let mut archive = self.tar_stream()?;
        let mut seen = HashSet::new();

        for entry in archive.entries()? {
            let mut entry = entry?;
            let raw = entry.path()?.to_string_lossy().into_owned();
            let Some(rel) = raw.strip_prefix(FILES_PREFIX) else {
                continue;
            };
            if rel.is_empty() {
                continue;
            }
            let dest = PathBuf::from("/").join(rel);
            let dest_str = dest.to_string_lossy().into_owned();
            if !seen.insert(dest_str) {
                return Err(Error::InvalidArchive {
                    reason: format!("duplicate member '{raw}'"),
                });
            }

            if entry.header().entry_type().is_dir() {
                on_dir(&dest)?;
            } else {
                on_file(&dest, &mut entry)?;
            }
        }
        Ok(())
    }
}

/// Recursively lists every path under `root`, each tagged with whether it
/// is a directory, relative to `root` with a leading `/`.
fn walk(root: &Path) -> Result<Vec<(String, bool)>, Error> {
    fn inner(dir: &Path, root: &Path, out: &mut Vec<(String, bool)>) -> Result<(), Error> {
        for entry in std::fs::read_dir(dir).map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })? {
            let entry = entry.map_err(|source| Error::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap_or(&path);
            let rel_str = format!("/{}", rel.to_string_lossy());
            let file_type = entry.file_type().map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            if file_type.is_dir() {
                out.push((rel_str, true));
                inner(&path, root, out)?;
            } else {
                out.push((rel_str, false));
            }
        }
        Ok(())
    }

    let mut out = Vec::new();
    inner(root, root, &mut out)?;
    Ok(out)
}

fn sha256_of(path: &Path) -> Result<String, Error> {
    let mut file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hex::encode(hasher.finalize()))
}

/// Builds `info.yml`/`manifest.yml` from `destdir` and writes the full
/// archive to `archive_path`. `stat_map` must cover exactly the set of
/// files and directories under `destdir` (keyed with a leading `/`).
pub fn write_archive(
    archive_path: &Path,
    destdir: &Path,
    info: &PkgInfo,
    stat_map: &BTreeMap<String, PkgManifestStat>,
    hooks: Option<&str>,
) -> Result<PkgManifest, Error> {
    for stale in ["info.yml", "manifest.yml"] {
        if destdir.join(stale).exists() {
            return Err(Error::InvalidArchive {
                reason: format!("stale '{stale}' present at destdir root"),
            });
        }
    }

    let entries = walk(destdir)?;
    let mut file_checksums = BTreeMap::new();
    let mut seen_paths = HashSet::new();
    for (rel, is_dir) in &entries {
        seen_paths.insert(rel.clone());
        if !is_dir {
            let abs = destdir.join(rel.trim_start_matches('/'));
            file_checksums.insert(rel.clone(), sha256_of(&abs)?);
        }
    }

    let stat_paths: HashSet<_> = stat_map.keys().cloned().collect();
    if stat_paths != seen_paths {
        let mut missing: Vec<_> = seen_paths.difference(&stat_paths).cloned().collect();
        missing.sort();
        return Err(Error::MissingStat { paths: missing });
    }

    let manifest = PkgManifest {
        file_checksums,
        stat: stat_map.clone(),
    };
    manifest.validate()?;

    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let out = File::create(archive_path).map_err(|source| Error::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;
    let encoder = XzEncoder::new(out, COMPRESSION_LEVEL);
    let mut builder = tar::Builder::new(encoder);

    append_string(&mut builder, "info.yml", &serde_yaml::to_string(info)?)?;
    append_string(&mut builder, "manifest.yml", &serde_yaml::to_string(&manifest)?)?;
    if let Some(hooks) = hooks {
        append_string(&mut builder, "hooks.yml", hooks)?;
    }
    builder.append_dir_all("files", destdir)?;

    let encoder = builder.into_inner()?;
    encoder.finish().map_err(|source| Error::Io {
        path: archive_path.to_path_buf(),
        source,
    })?;

    Ok(manifest)
}

fn append_string<W: Write>(builder: &mut tar::Builder<W>, name: &str, content: &str) -> Result<(), Error> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, content.as_bytes())?;
    Ok(())
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
    TarIo(#[from] std::io::Error),
    #[error("invalid archive: {reason}")]
    InvalidArchive { reason: String },
    #[error("destdir paths do not match supplied stat map, missing: {paths:?}")]
    MissingStat { paths: Vec<String> },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Info(#[from] super::info::Error),
    #[error(transparent)]
    Manifest(#[from] super::manifest::Error),
    #[error(transparent)]
    Journal(#[from] crate::journal::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::package::info::PkgInfo;
    use std::io::Write as _;

    fn sample_info() -> PkgInfo {
        PkgInfo {
            name: "zlib".into(),
            version: Some("1.3".into()),
            release: 1,
            description: "a compression library".into(),
            sources: vec![],
            url: None,
        }
    }

    #[test]
    fn round_trip_write_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        let destdir = tmp.path().join("destdir");
        std::fs::create_dir_all(destdir.join("usr/lib")).unwrap();
        let mut f = File::create(destdir.join("usr/lib/libz.so")).unwrap();
        f.write_all(b"fake shared object").unwrap();

        let mut stat_map = BTreeMap::new();
        stat_map.insert("/usr".into(), PkgManifestStat::new("root", "root", "755").unwrap());
        stat_map.insert("/usr/lib".into(), PkgManifestStat::new("root", "root", "755").unwrap());
        stat_map.insert(
            "/usr/lib/libz.so".into(),
            PkgManifestStat::new("root", "root", "644").unwrap(),
        );

        let archive_path = tmp.path().join("zlib.xz");
        let info = sample_info();
        let manifest = write_archive(&archive_path, &destdir, &info, &stat_map, None).unwrap();
        assert_eq!(manifest.file_checksums.len(), 1);

        let reader = ArchiveReader::open(&archive_path);
        let read_info = reader.read_info().unwrap();
        assert_eq!(read_info.name, "zlib");
        let read_manifest = reader.read_manifest().unwrap();
        assert_eq!(read_manifest.file_checksums, manifest.file_checksums);

        let mut extracted = Vec::new();
        reader
            .extract_payload(
                |path, _entry| {
                    extracted.push(path.to_path_buf());
                    Ok(())
                },
                |path| {
                    extracted.push(path.to_path_buf());
                    Ok(())
                },
            )
            .unwrap();
        assert!(extracted.contains(&PathBuf::from("/usr/lib/libz.so")));
    }

    #[test]
    fn rejects_stat_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let destdir = tmp.path().join("destdir");
        std::fs::create_dir_all(&destdir).unwrap();
        File::create(destdir.join("onlyfile")).unwrap();

        let archive_path = tmp.path().join("out.xz");
        let info = sample_info();
        let err = write_archive(&archive_path, &destdir, &info, &BTreeMap::new(), None).unwrap_err();
        assert!(matches!(err, Error::MissingStat { .. }));
    }
}
