// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! `leport which <path>`: prints the owning package. Exit codes are
//! inverted from convention: 1 means the path is owned, 2 means it
//! isn't.

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::config::Config;
use crate::registry::Registry;

pub fn command() -> Command {
    Command::new("which")
        .about("Print which installed package owns an absolute path (exit 1 if found, 2 if not)")
        .arg(arg!(<PATH> "absolute path to look up"))
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> Result<i32, Error> {
    let path = args.get_one::<String>("PATH").expect("required");
    let mut registry = Registry::open(cfg.db_path())?;

    match registry.which_pkg_owns_file(path)? {
        Some(pkg) => {
            println!("{pkg}");
            Ok(1)
        }
        None => {
            eprintln!("no package owns '{path}'");
            Ok(2)
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
}
