// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Command;
use thiserror::Error;

use crate::config::Config;
use crate::registry::Registry;

pub fn command() -> Command {
    Command::new("packages").about("List installed packages")
}

pub fn handle(cfg: &Config) -> Result<i32, Error> {
    let mut registry = Registry::open(cfg.db_path())?;
    let pkgs = registry.list_packages()?;
    if pkgs.is_empty() {
        return Ok(2);
    }
    for (name, version, release) in pkgs {
        println!("{name} {}-{release}", version.as_deref().unwrap_or("?"));
    }
    Ok(0)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
}
