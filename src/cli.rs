/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::str::FromStr;

use clap::Parser;

use crate::TTable;

/// Command-line arguments for the engine binary.
#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Size of the transposition table, in megabytes.
    #[arg(long, default_value_t = TTable::DEFAULT_SIZE)]
    pub hash: usize,

    /// Log level used when `RUST_LOG` is not set.
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Position to start from, instead of the standard starting position.
    #[arg(long)]
    pub fen: Option<String>,

    /// A command to execute before reading from `stdin`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Size of the transposition table, clamped to the supported range.
    #[inline(always)]
    pub fn hash_size(&self) -> usize {
        self.hash.clamp(TTable::MIN_SIZE, TTable::MAX_SIZE)
    }
}

/// A command to be sent to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    multicall = true,
    about,
    rename_all = "lower",
    override_usage("<ENGINE COMMAND>")
)]
pub enum EngineCommand {
    /// Run a fixed-depth search on a suite of positions, then check the KPK tables.
    Bench {
        /// Override the default benchmark depth.
        depth: Option<usize>,
    },

    /// Clear the transposition table.
    Clear,

    /// Print a visual representation of the current board state.
    #[command(alias = "d")]
    Display,

    /// Print an evaluation of the current position.
    Eval,

    /// Generate and print a FEN string for the current position.
    Fen,

    /// Search the current position.
    ///
    /// Limits are given as pairs: `depth N`, `nodes N`, `movetime MS`,
    /// and a clock as `wtime MS`, `btime MS`, `winc MS`, `binc MS`, `movestogo N`.
    Go {
        #[arg(trailing_var_arg = true)]
        limits: Vec<String>,
    },

    /// Resize the transposition table to the given number of megabytes.
    Hash { size: usize },

    /// Display information about the transposition table.
    #[command(aliases = ["tt", "ttable"])]
    HashInfo,

    /// Run the KPK self-check, and probe the current position if it is a KPK ending.
    Kpk,

    /// Apply the provided move to the board, if it is legal.
    Move { mv: String },

    /// Shows all legal moves in the current position.
    Moves,

    /// Performs a perft on the current position at the supplied depth, printing total node count.
    Perft { depth: usize },

    /// Set up a position: `startpos`, `kiwipete`, or a FEN, optionally followed by `moves ...`.
    Position {
        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            required = true,
            num_args = 1..
        )]
        args: Vec<String>,
    },

    /// Quit the engine.
    #[command(alias = "exit")]
    Quit,

    /// Performs a split perft on the current position at the supplied depth.
    #[command(alias = "sperft")]
    Splitperft { depth: usize },

    /// Ask the current search to stop as soon as possible.
    Stop,

    /// Take back the last move.
    Undo,

    /// Await the current search, blocking until it completes.
    Wait,
}

impl FromStr for EngineCommand {
    type Err = clap::Error;

    /// Attempt to parse an [`EngineCommand`] from a line of input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse_from(s.split_ascii_whitespace())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("d".parse::<EngineCommand>().unwrap(), EngineCommand::Display);
        assert_eq!(
            "perft 4".parse::<EngineCommand>().unwrap(),
            EngineCommand::Perft { depth: 4 }
        );
        assert_eq!(
            "go depth 5 nodes 100".parse::<EngineCommand>().unwrap(),
            EngineCommand::Go {
                limits: ["depth", "5", "nodes", "100"].map(String::from).to_vec()
            }
        );
        assert!("perft".parse::<EngineCommand>().is_err());
        assert!("frobnicate".parse::<EngineCommand>().is_err());
    }

    #[test]
    fn test_parse_position_with_fen() {
        let cmd = "position 8/8/8/8/8/8/8/K6k w - - 0 1 moves a1b1"
            .parse::<EngineCommand>()
            .unwrap();

        let EngineCommand::Position { args } = cmd else {
            panic!("Expected a position command, got {cmd:?}");
        };
        assert_eq!(args.len(), 8);
        assert_eq!(args[2], "-");
        assert_eq!(args[7], "a1b1");
    }

    #[test]
    fn test_cli_clamps_hash() {
        let cli = Cli::try_parse_from(["tadpole", "--hash", "100000", "perft", "3"]).unwrap();
        assert_eq!(cli.hash_size(), TTable::MAX_SIZE);
        assert_eq!(cli.command, ["perft", "3"]);
        assert_eq!(cli.log_level, "warn");

        let cli = Cli::try_parse_from(["tadpole", "--hash", "0"]).unwrap();
        assert_eq!(cli.hash_size(), TTable::MIN_SIZE);
        assert!(cli.command.is_empty());
    }
}
