// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::config::Config;
use crate::engine;
use crate::registry::Registry;

pub fn command() -> Command {
    Command::new("remove").about("Remove an installed package by name").arg(arg!(<PKG> "installed package name"))
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> Result<i32, Error> {
    let name = args.get_one::<String>("PKG").expect("required");
    let mut registry = Registry::open(cfg.db_path())?;

    match engine::remove::remove(cfg, &mut registry, name) {
        Ok(report) => {
            if let Some(warning) = report.journal_warning {
                log::warn!("remove of {} completed with warnings: {warning}", report.name);
            }
            println!("removed {}", report.name);
            Ok(0)
        }
        Err(err) => {
            eprintln!("remove failed: {err}");
            Ok(1)
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
}
