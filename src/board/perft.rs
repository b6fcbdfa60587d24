/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{Board, Move};

/// Counts the leaf nodes of the legal move tree `depth` plies deep.
///
/// This performs bulk counting, meaning that, at depth 1, it returns the number of legal moves
/// rather than making each of them.
///
/// # Example
/// ```
/// # use tadpole::*;
/// let mut board = Board::default();
/// assert_eq!(perft(&mut board, 3), 8_902);
/// ```
#[inline(always)]
pub fn perft(board: &mut Board, depth: usize) -> u64 {
    perft_generic::<true>(board, depth)
}

/// Like [`perft`], but also returns the node count below each legal root move, in generation order.
pub fn splitperft(board: &mut Board, depth: usize) -> (u64, Vec<(Move, u64)>) {
    if depth == 0 {
        return (1, Vec::new());
    }

    let mut split = Vec::new();
    for mv in board.generate_moves() {
        board.make_move(mv);
        if board.was_legal_move() {
            split.push((mv, perft(board, depth - 1)));
        }
        board.undo_move();
    }

    (split.iter().map(|(_, nodes)| nodes).sum(), split)
}

/// Generic version of [`perft`].
///
/// If `BULK` is set to `true`, legal moves at depth 1 are counted instead of made.
pub fn perft_generic<const BULK: bool>(board: &mut Board, depth: usize) -> u64 {
    if depth == 0 {
        return 1;
    }

    if BULK && depth == 1 {
        return board.legal_moves().len() as u64;
    }

    let mut nodes = 0;
    for mv in board.generate_moves() {
        board.make_move(mv);
        if board.was_legal_move() {
            nodes += perft_generic::<BULK>(board, depth - 1);
        }
        board.undo_move();
    }

    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FEN_KIWIPETE;

    #[test]
    fn test_splitperft_sums_to_perft() {
        let mut board = Board::from_fen(FEN_KIWIPETE).unwrap();
        let (total, split) = splitperft(&mut board, 2);
        assert_eq!(split.len(), 48);
        assert_eq!(total, 2_039);
        assert_eq!(total, perft_generic::<false>(&mut board, 2));
    }

    #[test]
    fn test_perft_leaves_board_untouched() {
        let mut board = Board::from_fen(FEN_KIWIPETE).unwrap();
        let before = board.clone();
        perft(&mut board, 3);
        assert_eq!(board, before);
    }
}
