/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::{Context, Result};
use clap::Parser;
use tadpole::{Board, Cli, Engine, EngineCommand};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // `RUST_LOG` takes precedence over the command line
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut engine = Engine::new(cli.hash_size());

    if let Some(fen) = &cli.fen {
        engine.set_board(Board::from_fen(fen)?);
    }

    if !cli.command.is_empty() {
        let command = EngineCommand::try_parse_from(&cli.command)?;
        engine.send_command(command)?;
    }

    engine
        .run()
        .with_context(|| format!("{} encountered an error", engine.name()))
}
