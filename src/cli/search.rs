// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{arg, value_parser, ArgMatches, Command};

use crate::config::Config;
use crate::repository;

const DEFAULT_MAX_DISTANCE: usize = 2;

pub fn command() -> Command {
    Command::new("search")
        .about("Fuzzy search across configured repositories")
        .arg(arg!(<NAME> "package name to search for"))
        .arg(arg!(--dist <N> "maximum Levenshtein distance").value_parser(value_parser!(usize)).default_value("2"))
}

pub fn handle(args: &ArgMatches, cfg: &Config) -> i32 {
    let name = args.get_one::<String>("NAME").expect("required");
    let max_distance = args.get_one::<usize>("dist").copied().unwrap_or(DEFAULT_MAX_DISTANCE);

    for hit in repository::search(cfg, name, max_distance) {
        println!("{}/{}", hit.repo, hit.name);
    }
    0
}
