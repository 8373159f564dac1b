// SPDX-FileCopyrightText: Copyright © 2020-2024 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use leport::cli;

fn main() {
    let args = cli::command().get_matches();

    let verbosity = args.get_count("verbose");
    let default_filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let code = match cli::process(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("leport: {err}");
            1
        }
    };
    std::process::exit(code);
}
