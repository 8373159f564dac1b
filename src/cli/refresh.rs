// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::config::Config;
use crate::repository;

pub fn command() -> Command {
    Command::new("refresh").about("Refresh configured git repositories").arg(arg!([REPO] "refresh only this repository"))
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> Result<i32, Error> {
    let only = args.get_one::<String>("REPO");

    let targets: Vec<_> = cfg
        .repos()
        .iter()
        .filter(|r| only.map(|name| r.name() == name).unwrap_or(true))
        .collect();

    if let Some(name) = only {
        if targets.is_empty() {
            eprintln!("unknown repository '{name}'");
            return Ok(1);
        }
    }

    for repo in targets {
        log::info!("refreshing repository '{}'", repo.name());
        repository::refresh(cfg, repo)?;
    }
    Ok(0)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Repository(#[from] crate::repository::Error),
}
