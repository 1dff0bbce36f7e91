#[path = "puremail-cli/args.rs"]
mod args;
#[path = "puremail-cli/mx.rs"]
mod mx;
#[path = "puremail-cli/output.rs"]
mod output;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use puremail::Address;
use std::io::{self, BufRead};
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};
use output::OutputRow;

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());
    let mode = cli.parse_mode();

    let inputs: Vec<String> = if cli.stdin {
        io::stdin()
            .lock()
            .lines()
            .map(|line| line.context("read stdin"))
            .filter(|line| !matches!(line, Ok(l) if l.trim().is_empty()))
            .collect::<Result<_>>()?
    } else if let Some(Commands::Validate { email, .. }) = &cli.cmd {
        vec![email.clone()]
    } else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let parsed: Vec<_> = inputs
        .iter()
        .map(|raw| Address::parse(raw.trim(), mode))
        .collect();
    let mut rows: Vec<OutputRow> = inputs
        .into_iter()
        .zip(&parsed)
        .map(|(input, result)| OutputRow::new(input, result))
        .collect();

    if cli.mx {
        let addresses = parsed.into_iter().map(Result::ok).collect();
        let summaries = mx::check_all(addresses, cli.cache_options()?)?;
        for (row, summary) in rows.iter_mut().zip(summaries) {
            row.mx = summary;
        }
    }

    output::emit(&rows, &cli)?;

    // codes de sortie : 0 OK, 2 invalids, 1 fatal
    if rows.iter().any(|r| !r.is_ok()) {
        std::process::exit(2);
    }
    Ok(())
}
