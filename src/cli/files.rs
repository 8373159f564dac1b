// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::config::Config;
use crate::registry::Registry;

pub fn command() -> Command {
    Command::new("files").about("List files installed by a package").arg(arg!(<PKG> "installed package name"))
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> Result<i32, Error> {
    let name = args.get_one::<String>("PKG").expect("required");
    let mut registry = Registry::open(cfg.db_path())?;

    if !registry.has_pkg(name)? {
        eprintln!("no such package '{name}'");
        return Ok(2);
    }

    let files = registry.pkg_files_installed(name)?;
    for (path, _sha256) in files {
        println!("{path}");
    }
    Ok(0)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
}
