// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Command-line surface (C9), built with clap's builder API: one
//! `command()`/`handle()` pair per subcommand, aggregated here, mirroring
//! the reference CLI's subcommand dispatch.

pub mod build;
pub mod files;
pub mod init;
pub mod install;
pub mod packages;
pub mod refresh;
pub mod remove;
pub mod repos;
pub mod search;
pub mod which;

use std::path::PathBuf;

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::config::{self, Config};

pub fn command() -> Command {
    Command::new("leport")
        .about("A source-based package manager in the BSD-ports tradition")
        .arg(arg!(--"root-dir" <DIR> "override the root directory (else LEPORT_ROOT, else /opt/leport)").required(false))
        .arg(arg!(-v --verbose ... "increase logging verbosity").action(clap::ArgAction::Count))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(init::command())
        .subcommand(search::command())
        .subcommand(build::command())
        .subcommand(install::command())
        .subcommand(remove::command())
        .subcommand(which::command())
        .subcommand(files::command())
        .subcommand(packages::command())
        .subcommand(repos::command())
        .subcommand(refresh::command())
}

/// Dispatches to the matched subcommand and returns the process exit code.
pub fn process(args: &ArgMatches) -> Result<i32, Error> {
    let root_flag = args.get_one::<String>("root-dir").map(PathBuf::from);
    let root = config::discover_root(root_flag.as_deref());

    match args.subcommand() {
        Some(("init", sub)) => Ok(init::handle(sub, &root)?),
        Some((name, sub)) => {
            let cfg = Config::load(&root)?;
            match name {
                "search" => Ok(search::handle(sub, &cfg)),
                "build" => Ok(build::handle(sub, &cfg)?),
                "install" => Ok(install::handle(sub, &cfg)?),
                "remove" => Ok(remove::handle(sub, &cfg)?),
                "which" => Ok(which::handle(sub, &cfg)?),
                "files" => Ok(files::handle(sub, &cfg)?),
                "packages" => Ok(packages::handle(&cfg)?),
                "repos" => Ok(repos::handle(&cfg)),
                "refresh" => Ok(refresh::handle(sub, &cfg)?),
                _ => unreachable!("clap enforces a known subcommand set"),
            }
        }
        None => unreachable!("subcommand_required(true)"),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error(transparent)]
    Init(#[from] init::Error),
    #[error(transparent)]
    Build(#[from] build::Error),
    #[error(transparent)]
    Install(#[from] install::Error),
    #[error(transparent)]
    Remove(#[from] remove::Error),
    #[error(transparent)]
    Which(#[from] which::Error),
    #[error(transparent)]
    Files(#[from] files::Error),
    #[error(transparent)]
    Packages(#[from] packages::Error),
    #[error(transparent)]
    Refresh(#[from] refresh::Error),
}
