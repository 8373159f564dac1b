// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::Path;

use clap::{ArgMatches, Command};
use thiserror::Error;

use crate::config::{self, Config};
use crate::registry::Registry;

pub fn command() -> Command {
    Command::new("init").about("Create the root directory tree, shared group, default config, and empty registry")
}

pub fn handle(_args: &ArgMatches, root: &Path) -> Result<i32, Error> {
    if !config::is_root() {
        eprintln!("leport init must be run as root");
        return Ok(1);
    }

    if nix::unistd::Group::from_name(config::SHARED_GROUP)?.is_none() {
        eprintln!(
            "shared group '{}' does not exist; create it with `groupadd {}` and re-run init",
            config::SHARED_GROUP,
            config::SHARED_GROUP
        );
        return Ok(1);
    }

    std::fs::create_dir_all(root)?;
    Config::write_default(root)?;
    let cfg = Config::load(root)?;
    for dir in cfg.required_dirs() {
        std::fs::create_dir_all(&dir)?;
    }
    std::fs::create_dir_all(cfg.pkg_registry_dir())?;
    std::fs::create_dir_all(cfg.build_dir())?;
    std::fs::create_dir_all(cfg.destdir_root())?;

    let _registry = Registry::open(cfg.db_path())?;

    log::info!("initialized leport root at {}", root.display());
    Ok(0)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
}
