/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Board representation, move generation, and move execution.
mod board;

/// Process arguments and the interactive command set.
mod cli;

/// Code related to the engine's functionality, such as user input handling.
mod engine;

/// Evaluation of chess positions.
mod eval;

/// King and Pawn versus King endgame tables.
mod kpk;

/// Static exchange evaluation and move ordering.
mod movepicker;

/// Scores and their mate encoding.
mod score;

/// Main engine logic; all search related code.
mod search;

/// Transposition table for caching search results.
mod ttable;

/// Misc utility functions, constants, and types.
mod utils;

pub use board::*;
pub use cli::*;
pub use engine::*;
pub use eval::*;
pub use kpk::*;
pub use movepicker::*;
pub use score::*;
pub use search::*;
pub use ttable::*;
pub use utils::*;
