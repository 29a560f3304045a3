//! CLI binary for `taskflow`.
//!
//! This binary is a thin wrapper that reads stdin and delegates to the library.

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use taskflow::cli::{self, Cli};
use taskflow::config::EngineConfig;
use taskflow::logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = std::env::current_dir()
        .ok()
        .and_then(|cwd| EngineConfig::load_from(&cwd).ok().flatten())
        .unwrap_or_default();
    logging::init(&config.log_filter);

    // Only read stdin for commands that need it (avoids blocking on terminal)
    let stdin = if cli.command.needs_stdin() { read_stdin() } else { String::new() };

    let output = cli::run(cli, &stdin);

    for msg in output.stdout {
        println!("{msg}");
    }
    for msg in output.stderr {
        eprintln!("{msg}");
    }

    output.exit_code
}

fn read_stdin() -> String {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("Error reading stdin: {e}");
    }
    input
}
