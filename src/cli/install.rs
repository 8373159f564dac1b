// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{arg, ArgMatches, Command};
use thiserror::Error;

use crate::conflict::{AlwaysOverwrite, Conflict, DecisionSource};
use crate::config::Config;
use crate::engine;
use crate::registry::Registry;

pub fn command() -> Command {
    Command::new("install")
        .about("Install a package archive onto the host filesystem")
        .arg(arg!(<PATH> "path to a package archive").value_parser(clap::value_parser!(PathBuf)))
        .arg(arg!(--force "overwrite conflicting files without prompting").action(clap::ArgAction::SetTrue))
}

struct InteractiveDecisions;

impl DecisionSource for InteractiveDecisions {
    fn decide(&mut self, conflict: &Conflict) -> bool {
        dialoguer::Confirm::new()
            .with_prompt(format!("overwrite existing file '{}'?", conflict.path))
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> Result<i32, Error> {
    let path = args.get_one::<PathBuf>("PATH").expect("required");
    let force = args.get_flag("force");

    let mut registry = Registry::open(cfg.db_path())?;
    let mut decisions: Box<dyn DecisionSource> = if force { Box::new(AlwaysOverwrite) } else { Box::new(InteractiveDecisions) };

    match engine::install::install(cfg, &mut registry, path, decisions.as_mut()) {
        Ok(report) => {
            if let Some(warning) = report.journal_warning {
                log::warn!("install of {} completed with warnings: {warning}", report.name);
            }
            println!("installed {}", report.name);
            Ok(0)
        }
        Err(engine::install::Error::AlreadyInstalled { pkg }) => {
            eprintln!("'{pkg}' is already installed");
            Ok(2)
        }
        Err(err) => {
            eprintln!("install failed: {err}");
            Ok(1)
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] crate::registry::Error),
}
