// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The build pipeline (C6): drives a recipe through
//! prepare -> version -> depends -> build -> check -> install -> package.

pub mod recipe;
pub mod sources;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::package::manifest::PkgManifestStat;
use crate::package::{self, archive, PkgInfo};
use crate::progress::Progress;
use recipe::RecipeDef;

pub struct BuildPaths {
    pub recipe_dir: PathBuf,
    pub build_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub archive_path: PathBuf,
}

/// Runs the full pipeline and writes the resulting archive, returning the
/// finalized [`PkgInfo`] (with `version` resolved if `pkg_version` ran).
pub fn build(mut info: PkgInfo, paths: &BuildPaths, progress: &dyn Progress) -> Result<PkgInfo, Error> {
    let recipe = RecipeDef::load(&paths.recipe_dir)?;

    std::fs::create_dir_all(&paths.build_dir).map_err(|source| Error::Io { path: paths.build_dir.clone(), source })?;
    std::fs::create_dir_all(&paths.dest_dir).map_err(|source| Error::Io { path: paths.dest_dir.clone(), source })?;

    sources::prepare_all(&info.sources, &paths.recipe_dir, &paths.build_dir, progress)?;
    run_steps(&recipe.prepare, &paths.build_dir, &paths.dest_dir)?;

    if let Some(cmd) = &recipe.pkg_version {
        let version = capture_stdout(cmd, &paths.build_dir)?;
        if version.is_empty() {
            return Err(Error::EmptyVersion);
        }
        info.version = Some(version);
    }
    if info.version.is_none() {
        return Err(Error::MissingVersion);
    }

    check_depends(&recipe.depends)?;

    run_steps(&recipe.build, &paths.build_dir, &paths.dest_dir)?;
    run_steps(&recipe.check, &paths.build_dir, &paths.dest_dir)?;
    run_steps(&recipe.install, &paths.build_dir, &paths.dest_dir)?;

    let stat_map = build_stat_map(&recipe.stat, &paths.dest_dir)?;

    archive::write_archive(&paths.archive_path, &paths.dest_dir, &info, &stat_map, None)?;

    Ok(info)
}

fn build_stat_map(entries: &[recipe::StatEntry], dest_dir: &Path) -> Result<BTreeMap<String, PkgManifestStat>, Error> {
    let mut map = BTreeMap::new();
    for entry in entries {
        if Path::new(&entry.path).is_absolute() {
            return Err(Error::AbsoluteStatPath { path: entry.path.clone() });
        }
        if !dest_dir.join(&entry.path).exists() {
            return Err(Error::StatPathNotFound { path: entry.path.clone() });
        }
        let stat = PkgManifestStat::new(entry.user.clone(), entry.group.clone(), entry.mode.clone())?;
        map.insert(format!("/{}", entry.path), stat);
    }
    Ok(map)
}

fn run_steps(steps: &[String], build_dir: &Path, dest_dir: &Path) -> Result<(), Error> {
    for step in steps {
        log::debug!("running build step: {step}");
        let status = Command::new("sh")
            .arg("-c")
            .arg(step)
            .current_dir(build_dir)
            .env("DEST_DIR", dest_dir)
            .env("BUILD_DIR", build_dir)
            .status()
            .map_err(|source| Error::StepSpawn { step: step.clone(), source })?;
        if !status.success() {
            return Err(Error::StepFailed { step: step.clone(), status });
        }
    }
    Ok(())
}

fn capture_stdout(cmd: &str, build_dir: &Path) -> Result<String, Error> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(build_dir)
        .output()
        .map_err(|source| Error::StepSpawn { step: cmd.to_string(), source })?;
    if !output.status.success() {
        return Err(Error::StepFailed { step: cmd.to_string(), status: output.status });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn check_depends(depends: &recipe::Depends) -> Result<(), Error> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let search_dirs: Vec<PathBuf> = std::env::split_paths(&path_var).collect();

    let missing_programs: Vec<String> = depends
        .programs
        .iter()
        .filter(|prog| !search_dirs.iter().any(|dir| dir.join(prog).is_file()))
        .cloned()
        .collect();
    if !missing_programs.is_empty() {
        return Err(Error::MissingPrograms { programs: missing_programs });
    }

    const LIB_DIRS: [&str; 3] = ["/usr/lib", "/usr/lib64", "/lib"];
    let missing_libraries: Vec<String> = depends
        .libraries
        .iter()
        .filter(|lib| {
            !LIB_DIRS.iter().any(|dir| {
                std::fs::read_dir(dir)
                    .map(|mut entries| entries.any(|e| e.map(|e| e.file_name().to_string_lossy().contains(lib.as_str())).unwrap_or(false)))
                    .unwrap_or(false)
            })
        })
        .cloned()
        .collect();
    if !missing_libraries.is_empty() {
        return Err(Error::MissingLibraries { libraries: missing_libraries });
    }

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
    #[error("failed to spawn build step '{step}'")]
    StepSpawn {
        step: String,
        #[source]
        source: std::io::Error,
    },
    #[error("build step '{step}' exited with {status}")]
    StepFailed { step: String, status: std::process::ExitStatus },
    #[error("pkg_version produced an empty version string")]
    EmptyVersion,
    #[error("recipe has no version and no pkg_version step")]
    MissingVersion,
    #[error("missing required programs: {programs:?}")]
    MissingPrograms { programs: Vec<String> },
    #[error("missing required libraries: {libraries:?}")]
    MissingLibraries { libraries: Vec<String> },
    #[error("stat path '{path}' must be relative to the destdir")]
    AbsoluteStatPath { path: String },
    #[error("stat path '{path}' does not exist under the destdir")]
    StatPathNotFound { path: String },
    #[error(transparent)]
    Recipe(#[from] recipe::Error),
    #[error(transparent)]
    Sources(#[from] sources::Error),
    #[error(transparent)]
    Archive(#[from] archive::Error),
    #[error(transparent)]
    Manifest(#[from] package::manifest::Error),
}
