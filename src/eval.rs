/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use crate::{kpk_probe_board, Board, Color, KpkOutcome, PieceKind, Score};

/// Scores a position for the search.
///
/// Scores are from the side-to-move's perspective: a positive number is good for the side to move.
/// An evaluation must stay within `-Score::MAX_EVAL..=Score::MAX_EVAL`, as anything beyond is reserved for proven results.
pub trait Evaluate {
    fn evaluate(&self, board: &Board) -> Score;
}

/// Weights used by [`MaterialEvaluator`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EvalParams {
    /// Value of each piece kind, in centipawns. Indexed by [`PieceKind::index`].
    pub piece_values: [i32; PieceKind::COUNT],

    /// Bonus for the winning side of a King and Pawn versus King position.
    pub kpk_win_bonus: i32,

    /// Bonus for having the move.
    pub tempo: i32,
}

impl EvalParams {
    #[inline(always)]
    pub const fn value_of(&self, kind: PieceKind) -> i32 {
        self.piece_values[kind.index()]
    }
}

impl Default for EvalParams {
    #[inline(always)]
    fn default() -> Self {
        Self {
            piece_values: [100, 300, 325, 500, 900, 0],
            kpk_win_bonus: 2_000,
            tempo: 10,
        }
    }
}

/// Counts material, and recognizes a few endings that cannot be lost or won.
///
/// - A bare king on each side, or a single knight or bishop against a bare king, is a draw.
/// - King and Pawn versus King is looked up in the KPK table.
///
/// Any other position scores material plus a tempo bonus. Zero is reserved for draws.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MaterialEvaluator {
    params: EvalParams,
}

impl MaterialEvaluator {
    #[inline(always)]
    pub const fn new(params: EvalParams) -> Self {
        Self { params }
    }

    #[inline(always)]
    pub const fn params(&self) -> &EvalParams {
        &self.params
    }

    /// Material of both sides, in centipawns, along with the number of pieces that are not kings.
    fn material(&self, board: &Board) -> ([i32; Color::COUNT], usize) {
        let mut material = [0; Color::COUNT];
        let mut pieces = 0;

        for (_, piece) in board.pieces().filter(|(_, piece)| !piece.is_king()) {
            material[piece.color()] += self.params.value_of(piece.kind());
            pieces += 1;
        }

        (material, pieces)
    }

    /// Returns `true` if neither side can possibly deliver mate.
    fn is_insufficient_material(board: &Board, pieces: usize) -> bool {
        match pieces {
            0 => true,
            1 => board.pieces().any(|(_, piece)| {
                matches!(piece.kind(), PieceKind::Knight | PieceKind::Bishop)
            }),
            _ => false,
        }
    }
}

impl Evaluate for MaterialEvaluator {
    fn evaluate(&self, board: &Board) -> Score {
        let (material, pieces) = self.material(board);
        if Self::is_insufficient_material(board, pieces) {
            return Score::DRAW;
        }

        let stm = board.side_to_move();
        let mut score = material[stm] - material[!stm] + self.params.tempo;

        if pieces == 1 {
            match kpk_probe_board(board) {
                Some(KpkOutcome::Draw) => return Score::DRAW,
                Some(KpkOutcome::Win) => score += self.params.kpk_win_bonus,
                Some(KpkOutcome::Loss) => score -= self.params.kpk_win_bonus,
                None => {}
            }
        }

        // Zero means a draw, so anything else must not score exactly that
        if score == 0 {
            score = 1;
        }

        Score::new(score).clamp_eval()
    }
}

impl fmt::Display for MaterialEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "values")?;
        for kind in PieceKind::all() {
            write!(f, " {}={}", kind.to_uci(), self.params.value_of(kind))?;
        }
        write!(
            f,
            " kpk={} tempo={}",
            self.params.kpk_win_bonus, self.params.tempo
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn eval(fen: &str) -> Score {
        let board = Board::from_fen(fen).unwrap();
        MaterialEvaluator::default().evaluate(&board)
    }

    #[test]
    fn test_startpos_is_tempo() {
        assert_eq!(eval(FEN_STARTPOS), EvalParams::default().tempo);
    }

    #[test]
    fn test_symmetric() {
        let white = eval("4k3/8/8/8/8/8/8/3QK3 w - - 0 1");
        let black = eval("3qk3/8/8/8/8/8/8/4K3 b - - 0 1");
        assert_eq!(white, black, "Mirrored positions must score the same");
        assert!(white > 0);

        let losing = eval("4k3/8/8/8/8/8/8/3QK3 b - - 0 1");
        assert!(losing < 0, "The side without the queen is worse, got {losing}");
    }

    #[test]
    fn test_insufficient_material_is_drawn() {
        assert_eq!(eval("4k3/8/8/8/8/8/8/4K3 w - - 0 1"), Score::DRAW);
        assert_eq!(eval("4k3/8/8/8/8/8/8/2B1K3 b - - 0 1"), Score::DRAW);
        assert_eq!(eval("4k3/8/8/3n4/8/8/8/4K3 w - - 0 1"), Score::DRAW);
        assert_ne!(eval("4k3/8/8/8/8/8/8/3RK3 w - - 0 1"), Score::DRAW);
    }

    #[test]
    fn test_kpk_positions() {
        // Drawn: the defending king is in front of the pawn
        assert_eq!(eval("k7/8/8/8/8/8/P7/K7 w - - 0 1"), Score::DRAW);

        let bonus = EvalParams::default().kpk_win_bonus;
        assert!(eval("7k/8/8/8/8/8/P7/K7 w - - 0 1") > bonus);
        assert!(eval("7k/8/8/8/8/8/P7/K7 b - - 0 1") < -bonus);
    }

    #[test]
    fn test_never_zero_unless_drawn() {
        // Material is even and the tempo bonus is cancelled out
        let params = EvalParams {
            tempo: 0,
            ..Default::default()
        };
        let board = Board::default();
        assert_eq!(MaterialEvaluator::new(params).evaluate(&board), 1);
    }
}
