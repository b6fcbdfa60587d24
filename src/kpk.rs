/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! King and Pawn versus King, solved by retrograde analysis.
//!
//! The table holds one bit per position: for White to move, whether White wins,
//! and for Black to move, whether Black loses. Positions are indexed by the White king square,
//! the pawn file (mirrored onto files A through D) and rank, and the Black king square.
//!
//! Internally squares are numbered file-major (`8 * file + rank`), so that a one-rank step is a one-bit shift
//! and a whole file fits in a byte of a square set.

use std::{sync::OnceLock, time::Instant};

use tracing::{error, info};

use crate::{Board, Color, File, Square};

/// Entries per side to move: 64 White king squares times 32 pawn squares on files A through D.
const NUM_ENTRIES: usize = 64 * 32;

/// Square steps in the file-major numbering.
const NORTH: i32 = 1;
const EAST: i32 = 8;

const KING_STEPS: [i32; 8] = [
    NORTH - EAST,
    NORTH,
    NORTH + EAST,
    -EAST,
    EAST,
    -NORTH - EAST,
    -NORTH,
    -NORTH + EAST,
];

/// The first-rank square of every file.
const FIRST_RANK: u64 = 0x0101_0101_0101_0101;

/// Non-draw counts published by Steven J. Edwards (1996): legal positions with White to move,
/// legal positions with Black to move, White wins, and Black losses.
const REFERENCE_COUNTS: [usize; 4] = [163328 / 2, 168024 / 2, 124960 / 2, 97604 / 2];

type Table = [[u64; NUM_ENTRIES]; Color::COUNT];

static TABLE: OnceLock<Box<Table>> = OnceLock::new();

/// Result of a KPK probe, from the side to move's perspective.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum KpkOutcome {
    /// The side to move, which owns the pawn, wins.
    Win,

    Draw,

    /// The side to move, which faces the pawn, loses.
    Loss,
}

#[inline(always)]
const fn file_of(square: usize) -> usize {
    square >> 3
}

#[inline(always)]
const fn rank_of(square: usize) -> usize {
    square & 7
}

#[inline(always)]
const fn bit(square: usize) -> u64 {
    1 << square
}

#[inline(always)]
const fn distance(a: usize, b: usize) -> usize {
    let files = file_of(a).abs_diff(file_of(b));
    let ranks = rank_of(a).abs_diff(rank_of(b));
    if files > ranks {
        files
    } else {
        ranks
    }
}

/// Every square one king step away from a square in `set`.
#[inline(always)]
const fn king_reach(set: u64) -> u64 {
    let north = (set << 1) & !FIRST_RANK;
    let south = (set & !FIRST_RANK) >> 1;
    let column = set | north | south;

    (column >> 8) | (column << 8) | north | south
}

#[inline(always)]
const fn white_king(index: usize) -> usize {
    index >> 5
}

#[inline(always)]
const fn white_pawn(index: usize) -> usize {
    8 * ((index >> 3) & 3) + (index & 7)
}

/// Pawns on the first or last rank cannot be part of a position that is still being played.
#[inline(always)]
const fn in_pawn_zone(pawn: usize) -> bool {
    rank_of(pawn) != 0 && rank_of(pawn) != 7
}

#[inline(always)]
const fn white_in_check(white_king: usize, black_king: usize) -> bool {
    distance(white_king, black_king) == 1
}

#[inline(always)]
const fn black_in_check(white_king: usize, pawn: usize, black_king: usize) -> bool {
    distance(white_king, black_king) == 1
        || (file_of(pawn) != 0 && pawn + 1 - 8 == black_king)
        || (file_of(pawn) != 7 && pawn + 1 + 8 == black_king)
}

/// Runs the retrograde analysis to its fixpoint.
fn generate() -> Box<Table> {
    let start = Instant::now();
    let mut table: Box<Table> = Box::new([[0; NUM_ENTRIES]; Color::COUNT]);
    let mut valid = vec![0u64; NUM_ENTRIES];

    let white = Color::White.index();
    let black = Color::Black.index();

    for index in 0..NUM_ENTRIES {
        let (king, pawn) = (white_king(index), white_pawn(index));

        // Black to move right after promotion loses, unless the new queen can be taken.
        // Stalemates are impossible with a queen and king that are not next to Black's king.
        if rank_of(pawn) == 7 && king != pawn {
            let mut lost = !king_reach(bit(king)) & !bit(king) & !bit(pawn);
            if distance(king, pawn) > 1 {
                lost &= !king_reach(bit(pawn));
            }
            table[black][index] = lost;
        }

        // Squares the Black king may stand on after its own move. Taking the pawn is allowed.
        valid[index] = !king_reach(bit(king));
        if file_of(pawn) != 0 {
            valid[index] &= !bit(pawn + 1 - 8);
        }
        if file_of(pawn) != 7 {
            valid[index] &= !bit(pawn + 1 + 8);
        }
    }

    let mut passes = 0;
    loop {
        passes += 1;

        // White wins if some move reaches a position that Black loses
        for index in 0..NUM_ENTRIES {
            let (king, pawn) = (white_king(index), white_pawn(index));
            if !in_pawn_zone(pawn) {
                continue;
            }

            let mut won = 0;
            for step in KING_STEPS {
                let to = ((king as i32 + step) & 63) as usize;
                if distance(king, to) == 1 && to != pawn {
                    let next = (to << 5) | (index & 31);
                    won |= table[black][next] & !king_reach(bit(to));
                }
            }

            if pawn + 1 != king {
                won |= table[black][index + 1] & !bit(pawn + 1);
                if rank_of(pawn) == 1 && pawn + 2 != king {
                    won |= table[black][index + 2] & !bit(pawn + 1) & !bit(pawn + 2);
                }
            }

            table[white][index] = won & !bit(pawn);
        }

        // Black loses if it has a move and every move reaches a position that White wins
        let mut changed = false;
        for index in 0..NUM_ENTRIES {
            if !in_pawn_zone(white_pawn(index)) {
                continue;
            }

            let bad = table[white][index] | !valid[index];
            let can_draw = king_reach(!bad);
            let has_moves = king_reach(valid[index]);
            let lost = has_moves & !can_draw;

            changed |= table[black][index] != lost;
            table[black][index] = lost;
        }

        if !changed {
            break;
        }
    }

    info!(
        passes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "generated KPK table"
    );
    table
}

#[inline(always)]
fn table() -> &'static Table {
    TABLE.get_or_init(generate)
}

/// Converts a [`Square`] into the file-major numbering, mirrored if `mirror` is set.
#[inline(always)]
fn internal(square: Square, mirror: bool) -> usize {
    let file = if mirror {
        7 - square.file().index()
    } else {
        square.file().index()
    };
    8 * file + square.rank().index()
}

/// Looks up a position with a White king, White pawn, and Black king.
///
/// The table is generated on first use.
///
/// # Example
/// ```
/// # use tadpole::*;
/// // The pawn runs, and the Black king is too far away to catch it
/// let outcome = kpk_probe(Color::White, Square::A1, Square::A2, Square::H8);
/// assert_eq!(outcome, KpkOutcome::Win);
///
/// // Black keeps the opposition in front of the pawn
/// let outcome = kpk_probe(Color::White, Square::E4, Square::E3, Square::E6);
/// assert_eq!(outcome, KpkOutcome::Draw);
/// ```
pub fn kpk_probe(
    side_to_move: Color,
    white_king: Square,
    white_pawn: Square,
    black_king: Square,
) -> KpkOutcome {
    let mirror = white_pawn.file() >= File::E;
    let king = internal(white_king, mirror);
    let pawn = internal(white_pawn, mirror);
    let enemy = internal(black_king, mirror);

    let index = (king << 5) | (file_of(pawn) << 3) | rank_of(pawn);
    let decided = table()[side_to_move.index()][index] >> enemy & 1 != 0;

    match (decided, side_to_move) {
        (false, _) => KpkOutcome::Draw,
        (true, Color::White) => KpkOutcome::Win,
        (true, Color::Black) => KpkOutcome::Loss,
    }
}

/// Compares the number of legal and decided positions in the table against published totals.
///
/// Returns `false` if any count differs.
pub fn kpk_self_check() -> bool {
    let table = table();
    let white = Color::White.index();
    let black = Color::Black.index();
    let mut counts = [0; 4];

    for index in 0..NUM_ENTRIES {
        let (king, pawn) = (white_king(index), white_pawn(index));
        if !in_pawn_zone(pawn) {
            continue;
        }

        for enemy in 0..Square::COUNT {
            if king == pawn || pawn == enemy || king == enemy {
                continue;
            }

            // A side to move may not be able to capture the enemy king
            let white_to_move = !black_in_check(king, pawn, enemy);
            let black_to_move = !white_in_check(king, enemy);

            counts[0] += white_to_move as usize;
            counts[1] += black_to_move as usize;
            counts[2] += (white_to_move && table[white][index] >> enemy & 1 != 0) as usize;
            counts[3] += (black_to_move && table[black][index] >> enemy & 1 != 0) as usize;
        }
    }

    if counts == REFERENCE_COUNTS {
        info!(?counts, "KPK self-check passed");
        true
    } else {
        error!(?counts, expected = ?REFERENCE_COUNTS, "KPK self-check failed");
        false
    }
}

/// Probes a King and Pawn versus King position on `board`, if that is all that is on it.
///
/// Works for either color owning the pawn. The result is from the side to move's perspective.
pub fn kpk_probe_board(board: &Board) -> Option<KpkOutcome> {
    let mut kings = [None; Color::COUNT];
    let mut pawn = None;

    for (square, piece) in board.pieces() {
        if piece.is_king() {
            kings[piece.color()] = Some(square);
        } else if piece.is_pawn() && pawn.is_none() {
            pawn = Some((square, piece.color()));
        } else {
            return None;
        }
    }

    let [Some(white_king), Some(black_king)] = kings else {
        return None;
    };
    let (pawn, owner) = pawn?;
    let stm = board.side_to_move();

    // Seen from the pawn's owner, as if it were White
    let outcome = match owner {
        Color::White => kpk_probe(stm, white_king, pawn, black_king),
        Color::Black => kpk_probe(
            !stm,
            black_king.flipped_rank(),
            pawn.flipped_rank(),
            white_king.flipped_rank(),
        ),
    };

    Some(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    #[test]
    fn test_self_check() {
        assert!(kpk_self_check(), "Table counts must match the published totals");
    }

    #[test]
    fn test_known_positions() {
        use KpkOutcome::*;
        let (white, black) = (Color::White, Color::Black);

        #[rustfmt::skip]
        let cases = [
            (white, "a1", "a2", "a8", Draw),
            (white, "a1", "a2", "h8", Win),
            (black, "a1", "a2", "a8", Draw),
            (black, "a1", "a2", "h8", Loss),
            (black, "a1", "a2", "g2", Draw),
            (black, "a1", "a2", "g1", Loss),
            (white, "a5", "a4", "d4", Win),
            (black, "a5", "a4", "d4", Draw),
            (white, "a1", "f4", "a3", Win),
            (black, "a1", "f4", "a3", Draw),
            (black, "a3", "a4", "f3", Loss),
            (white, "h6", "g6", "g8", Win),
            (white, "h3", "h2", "b7", Win),
            (black, "a5", "a4", "e6", Draw),
            (black, "f8", "g6", "h8", Draw),
            (white, "f6", "g5", "g8", Win),
            (white, "d1", "c3", "f8", Win),
            (white, "d4", "c4", "e6", Win),
            (white, "c6", "d6", "d8", Win),
            (black, "d6", "e6", "d8", Loss),
            (white, "g6", "g5", "h8", Win),
            (black, "g6", "g5", "h8", Loss),
            (white, "e4", "e3", "e6", Draw),
            (black, "e4", "e3", "e6", Loss),
            (black, "h3", "b2", "h5", Loss),
            (white, "g2", "b2", "g5", Win),
        ];

        for (stm, king, pawn, enemy, expected) in cases {
            let square = |s: &str| Square::from_uci(s).unwrap();
            let outcome = kpk_probe(stm, square(king), square(pawn), square(enemy));
            assert_eq!(
                outcome, expected,
                "{stm:?} to move with K{king} P{pawn} vs k{enemy}"
            );
        }
    }

    #[test]
    fn test_probe_board_either_color() {
        let outcome = |fen: &str| kpk_probe_board(&Board::from_fen(fen).unwrap());

        assert_eq!(outcome("7k/8/8/8/8/8/P7/K7 w - - 0 1"), Some(KpkOutcome::Win));
        assert_eq!(outcome("7k/8/8/8/8/8/P7/K7 b - - 0 1"), Some(KpkOutcome::Loss));
        assert_eq!(outcome("k7/8/8/8/8/8/P7/K7 w - - 0 1"), Some(KpkOutcome::Draw));

        // The same positions with colors swapped
        assert_eq!(outcome("k7/p7/8/8/8/8/8/7K b - - 0 1"), Some(KpkOutcome::Win));
        assert_eq!(outcome("k7/p7/8/8/8/8/8/7K w - - 0 1"), Some(KpkOutcome::Loss));
        assert_eq!(outcome("k7/p7/8/8/8/8/8/K7 b - - 0 1"), Some(KpkOutcome::Draw));

        // Mirrored onto the other wing
        assert_eq!(outcome("k7/8/8/8/8/8/7P/7K w - - 0 1"), Some(KpkOutcome::Win));

        assert_eq!(outcome(FEN_STARTPOS), None);
        assert_eq!(outcome("4k3/8/8/8/8/8/PP6/4K3 w - - 0 1"), None);
    }
}
