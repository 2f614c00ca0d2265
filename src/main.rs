use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use ptyscribe::args::{Cli, Command};
use ptyscribe::config::Config;
use ptyscribe::lifecycle::{self, SessionOptions};
use ptyscribe::logging::init_tracing;
use ptyscribe::term::{OuterTerminal, WindowSize};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<u8> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    cli.apply(&mut config);

    if let Some(Command::Size) = cli.command {
        return print_size();
    }

    if let Err(err) = init_tracing(&config.logging) {
        eprintln!(
            "Warning: cannot open log file '{}': {err}",
            config.logging.path.display()
        );
    }

    let options = SessionOptions::from_config(&config);
    info!(
        shell = %options.shell.display(),
        transcript = %options.transcript.display(),
        "Starting session"
    );

    let outer = OuterTerminal::stdio().context("Cannot access the terminal")?;
    let outcome = lifecycle::run(&outer, &options).context("Session failed")?;
    info!(
        code = outcome.exit_code(),
        bytes = outcome.transcript_bytes,
        "Exiting"
    );
    Ok(outcome.exit_code())
}

fn print_size() -> anyhow::Result<u8> {
    let outer = OuterTerminal::stdio().context("Cannot access the terminal")?;
    let size = WindowSize::query(outer.control()).context("Cannot read the terminal size")?;
    println!("TTY size: {} (w) x {} (h) .", size.cols, size.rows);
    Ok(0)
}
