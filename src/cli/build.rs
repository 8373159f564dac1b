// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::build::{self as build_pipeline, BuildPaths};
use crate::config::Config;
use crate::package::info::PkgName;
use crate::progress::IndicatifProgress;
use crate::repository;

pub fn command() -> Command {
    Command::new("build")
        .about("Drive a recipe through the build pipeline and write a package archive")
        .arg(arg!(<PKG> "[repo/]pkg recipe reference"))
        .arg(arg!(--clean "wipe the scratch build/destdir before building").action(clap::ArgAction::SetTrue))
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> Result<i32, Error> {
    let raw = args.get_one::<String>("PKG").expect("required");
    let clean = args.get_flag("clean");
    let pkg_name = PkgName::parse(raw)?;

    let recipe_dir = repository::resolve_recipe_dir(cfg, &pkg_name)?;
    let info_text = std::fs::read_to_string(recipe_dir.join("info.yml"))
        .map_err(|source| Error::Io { path: recipe_dir.join("info.yml"), source })?;
    let info: crate::package::PkgInfo = serde_yaml::from_str(&info_text)?;
    info.validate()?;

    let repo_name = pkg_name.repo.clone().unwrap_or_else(|| {
        cfg.repos()
            .iter()
            .find(|r| recipe_dir.starts_with(r.dir(cfg)))
            .map(|r| r.name().to_string())
            .unwrap_or_else(|| "ports".to_string())
    });

    let build_dir = cfg.build_dir().join(&repo_name).join(&info.name);
    let dest_dir = cfg.destdir_root().join(&repo_name).join(&info.name);
    if clean {
        let _ = std::fs::remove_dir_all(&build_dir);
        let _ = std::fs::remove_dir_all(&dest_dir);
    }

    let archive_path = info.archive_path(&cfg.pkgs_dir(), &repo_name);
    let paths = BuildPaths {
        recipe_dir,
        build_dir,
        dest_dir,
        archive_path: archive_path.clone(),
    };

    let progress = IndicatifProgress::new();
    let built = build_pipeline::build(info, &paths, &progress)?;
    println!("built {} {} -> {}", built.name, built.version.as_deref().unwrap_or("?"), archive_path.display());
    Ok(0)
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
    #[error(transparent)]
    Info(#[from] crate::package::info::Error),
    #[error(transparent)]
    Repository(#[from] crate::repository::Error),
    #[error(transparent)]
    Build(#[from] build_pipeline::Error),
}
