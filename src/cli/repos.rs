// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Command;

use crate::config::Config;

pub fn command() -> Command {
    Command::new("repos").about("List configured repositories")
}

pub fn handle(cfg: &Config) -> i32 {
    if cfg.repos().is_empty() {
        return 2;
    }
    for repo in cfg.repos() {
        println!("{}", repo.name());
    }
    0
}
