/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

/// Move generation over the mailbox.
mod movegen;

/// Moves, their text forms, and their compact encoding.
mod moves;

/// Move path enumeration, for validating move generation.
mod perft;

/// Colors, piece kinds, and pieces.
mod piece;

/// The board itself: placement, state, undo log, and attack cache.
mod position;

/// Squares, files, ranks, and the step tables used to walk between them.
mod square;

/// Zobrist hashing keys.
mod zobrist;

pub use moves::*;
pub use perft::*;
pub use piece::*;
pub use position::*;
pub use square::*;
pub use zobrist::*;
