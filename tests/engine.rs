// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! End-to-end coverage of the install/remove engines against real package
//! archives. These drive the actual filesystem at absolute paths (the
//! engines have no notion of a sandboxed root), so every test is gated on
//! running as root with the `leport` group present and confines its
//! payload to a unique, self-cleaning top-level directory rather than
//! touching anything a real system would care about.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use leport::conflict::{AlwaysOverwrite, NeverOverwrite};
use leport::config::Config;
use leport::engine::{install, remove};
use leport::package::archive;
use leport::package::info::PkgInfo;
use leport::package::manifest::PkgManifestStat;
use leport::registry::Registry;

fn privileged() -> bool {
    if !leport::config::is_root() {
        return false;
    }
    matches!(nix::unistd::Group::from_name(leport::config::SHARED_GROUP), Ok(Some(_)))
}

macro_rules! require_privileged {
    () => {
        if !privileged() {
            eprintln!("skipping: requires root plus the '{}' group", leport::config::SHARED_GROUP);
            return;
        }
    };
}

/// A scratch `leport` root (config, registry, pkgs) under a tempdir, distinct
/// from the real payload paths the package actually installs to.
struct Harness {
    _root: tempfile::TempDir,
    cfg: Config,
}

impl Harness {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let cfg = Config::load(root.path()).unwrap();
        for dir in cfg.required_dirs() {
            std::fs::create_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(cfg.pkg_registry_dir()).unwrap();
        Self { _root: root, cfg }
    }

    fn registry(&self) -> Registry {
        Registry::open(self.cfg.db_path()).unwrap()
    }
}

/// A unique top-level payload directory this process owns for the duration
/// of one test, e.g. `/leport-test-8421-happy`. Not under `/tmp`: sharing
/// `/tmp` would pull in its pre-existing stat, which the engine would then
/// try to re-chown/chmod.
fn payload_root(tag: &str) -> PathBuf {
    PathBuf::from(format!("/leport-test-{}-{tag}", std::process::id()))
}

/// Builds `destdir/<relative payload_root>/...` for each file, recursively
/// collects a stat map covering every directory and file created, and
/// writes the resulting archive. Returns (archive_path, absolute payload
/// paths written).
fn build_archive(pkgs_dir: &Path, name: &str, release: u64, root: &Path, files: &[(&str, &[u8])]) -> (PathBuf, Vec<PathBuf>) {
    let staging = tempfile::tempdir().unwrap();
    let rel_root = root.strip_prefix("/").unwrap();
    let mut written = Vec::new();

    for (rel, content) in files {
        let abs_in_destdir = staging.path().join(rel_root).join(rel);
        std::fs::create_dir_all(abs_in_destdir.parent().unwrap()).unwrap();
        std::fs::File::create(&abs_in_destdir).unwrap().write_all(content).unwrap();
        written.push(root.join(rel));
    }

    let stat_map = collect_stat_map(staging.path());
    let info = PkgInfo {
        name: name.to_string(),
        version: Some("1.0".to_string()),
        release,
        description: "test fixture".to_string(),
        sources: vec![],
        url: None,
    };
    let archive_path = pkgs_dir.join(format!("{name}.xz"));
    archive::write_archive(&archive_path, staging.path(), &info, &stat_map, None).unwrap();
    (archive_path, written)
}

fn collect_stat_map(destdir: &Path) -> BTreeMap<String, PkgManifestStat> {
    fn walk(dir: &Path, root: &Path, out: &mut BTreeMap<String, PkgManifestStat>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            let rel = format!("/{}", path.strip_prefix(root).unwrap().to_string_lossy());
            let mode = if path.is_dir() { "755" } else { "644" };
            out.insert(rel, PkgManifestStat::new("root", "root", mode).unwrap());
            if path.is_dir() {
                walk(&path, root, out);
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(destdir, destdir, &mut out);
    out
}

fn cleanup(root: &Path) {
    let _ = std::fs::remove_dir_all(root);
}

#[test]
fn install_happy_path_records_files_and_extracts_payload() {
    require_privileged!();
    let h = Harness::new();
    let root = payload_root("happy");
    let (archive_path, written) = build_archive(&h.cfg.pkgs_dir(), "leport-test-happy", 1, &root, &[("bin/tool", b"#!/bin/sh\necho hi\n")]);

    let mut registry = h.registry();
    let mut decisions = NeverOverwrite;
    let report = install::install(&h.cfg, &mut registry, &archive_path, &mut decisions).unwrap();
    assert_eq!(report.name, "leport-test-happy");

    for path in &written {
        assert!(path.is_file(), "{path:?} should have been extracted");
    }
    assert_eq!(
        registry.which_pkg_owns_file(written[0].to_str().unwrap()).unwrap(),
        Some("leport-test-happy".to_string())
    );

    remove::remove(&h.cfg, &mut registry, "leport-test-happy").unwrap();
    for path in &written {
        assert!(!path.exists(), "{path:?} should have been removed");
    }
    cleanup(&root);
}

#[test]
fn install_refuses_when_already_installed() {
    require_privileged!();
    let h = Harness::new();
    let root = payload_root("dup");
    let (archive_path, written) = build_archive(&h.cfg.pkgs_dir(), "leport-test-dup", 1, &root, &[("etc/conf", b"x=1\n")]);

    let mut registry = h.registry();
    install::install(&h.cfg, &mut registry, &archive_path, &mut NeverOverwrite).unwrap();

    let err = install::install(&h.cfg, &mut registry, &archive_path, &mut NeverOverwrite).unwrap_err();
    assert!(matches!(err, install::Error::AlreadyInstalled { .. }));

    remove::remove(&h.cfg, &mut registry, "leport-test-dup").unwrap();
    for path in &written {
        assert!(!path.exists());
    }
    cleanup(&root);
}

#[test]
fn install_overwrite_declined_leaves_existing_file_untouched() {
    require_privileged!();
    let h = Harness::new();
    let root = payload_root("declined");
    std::fs::create_dir_all(&root).unwrap();
    let conflicting = root.join("keep.txt");
    std::fs::write(&conflicting, b"pre-existing").unwrap();

    let (archive_path, _written) = build_archive(&h.cfg.pkgs_dir(), "leport-test-declined", 1, &root, &[("keep.txt", b"incoming")]);

    let mut registry = h.registry();
    install::install(&h.cfg, &mut registry, &archive_path, &mut NeverOverwrite).unwrap();

    assert_eq!(std::fs::read(&conflicting).unwrap(), b"pre-existing");
    assert_eq!(registry.which_pkg_owns_file(conflicting.to_str().unwrap()).unwrap(), None);

    remove::remove(&h.cfg, &mut registry, "leport-test-declined").unwrap();
    assert_eq!(std::fs::read(&conflicting).unwrap(), b"pre-existing");
    cleanup(&root);
}

#[test]
fn install_overwrite_accepted_replaces_existing_file() {
    require_privileged!();
    let h = Harness::new();
    let root = payload_root("accepted");
    std::fs::create_dir_all(&root).unwrap();
    let conflicting = root.join("keep.txt");
    std::fs::write(&conflicting, b"pre-existing").unwrap();

    let (archive_path, _written) = build_archive(&h.cfg.pkgs_dir(), "leport-test-accepted", 1, &root, &[("keep.txt", b"incoming")]);

    let mut registry = h.registry();
    install::install(&h.cfg, &mut registry, &archive_path, &mut AlwaysOverwrite).unwrap();

    assert_eq!(std::fs::read(&conflicting).unwrap(), b"incoming");
    assert_eq!(
        registry.which_pkg_owns_file(conflicting.to_str().unwrap()).unwrap(),
        Some("leport-test-accepted".to_string())
    );

    remove::remove(&h.cfg, &mut registry, "leport-test-accepted").unwrap();
    cleanup(&root);
}

#[test]
fn install_checksum_mismatch_rolls_back_completely() {
    require_privileged!();
    let h = Harness::new();
    let root = payload_root("badsum");
    let (archive_path, written) = build_archive(&h.cfg.pkgs_dir(), "leport-test-badsum", 1, &root, &[("bin/tool", b"original")]);
    tamper_first_checksum(&archive_path);

    let mut registry = h.registry();
    let err = install::install(&h.cfg, &mut registry, &archive_path, &mut NeverOverwrite).unwrap_err();
    assert!(matches!(err, install::Error::ChecksumMismatch { .. }));

    assert!(!registry.has_pkg("leport-test-badsum").unwrap());
    for path in &written {
        assert!(!path.exists(), "{path:?} should have been rolled back");
    }
    cleanup(&root);
}

/// Rewrites `manifest.yml` inside the archive so its one checksum entry is
/// wrong, leaving everything else (including the tar structure) intact.
fn tamper_first_checksum(archive_path: &Path) {
    let reader = archive::ArchiveReader::open(archive_path);
    let info = reader.read_info().unwrap();
    let mut manifest = reader.read_manifest().unwrap();
    for value in manifest.file_checksums.values_mut() {
        *value = "0".repeat(64);
    }

    // Re-extract the payload into a scratch destdir and re-write the
    // archive with the tampered manifest but untouched file contents.
    let staging = tempfile::tempdir().unwrap();
    reader
        .extract_payload(
            |dest, entry| {
                let rel = dest.strip_prefix("/").unwrap();
                let out_path = staging.path().join(rel);
                std::fs::create_dir_all(out_path.parent().unwrap()).unwrap();
                let mut out = std::fs::File::create(&out_path).unwrap();
                std::io::copy(entry, &mut out).unwrap();
                Ok(())
            },
            |dest| {
                let rel = dest.strip_prefix("/").unwrap();
                std::fs::create_dir_all(staging.path().join(rel)).unwrap();
                Ok(())
            },
        )
        .unwrap();

    // write_archive recomputes checksums from disk, which would undo the
    // tamper, so the tar is assembled directly here instead.
    let out = std::fs::File::create(archive_path).unwrap();
    let encoder = xz2::write::XzEncoder::new(out, 6);
    let mut builder = tar::Builder::new(encoder);
    append(&mut builder, "info.yml", &serde_yaml::to_string(&info).unwrap());
    append(&mut builder, "manifest.yml", &serde_yaml::to_string(&manifest).unwrap());
    builder.append_dir_all("files", staging.path()).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    fn append<W: Write>(builder: &mut tar::Builder<W>, name: &str, content: &str) {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
}

#[test]
fn remove_honours_shared_directories() {
    require_privileged!();
    let h = Harness::new();
    let root = payload_root("shared");
    let (archive_a, written_a) = build_archive(&h.cfg.pkgs_dir(), "leport-test-shared-a", 1, &root, &[("lib/a.so", b"a")]);
    let (archive_b, written_b) = build_archive(&h.cfg.pkgs_dir(), "leport-test-shared-b", 1, &root, &[("lib/b.so", b"b")]);

    let mut registry = h.registry();
    install::install(&h.cfg, &mut registry, &archive_a, &mut NeverOverwrite).unwrap();
    install::install(&h.cfg, &mut registry, &archive_b, &mut NeverOverwrite).unwrap();

    let shared_dir = root.join("lib");
    assert!(shared_dir.is_dir());

    remove::remove(&h.cfg, &mut registry, "leport-test-shared-a").unwrap();
    assert!(shared_dir.is_dir(), "shared directory must survive while 'b' still owns it");
    assert!(!written_a[0].exists());
    assert!(written_b[0].exists());

    remove::remove(&h.cfg, &mut registry, "leport-test-shared-b").unwrap();
    assert!(!shared_dir.exists(), "directory should be pruned once empty and unowned");
    cleanup(&root);
}
