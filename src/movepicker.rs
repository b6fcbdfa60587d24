/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::cmp::Reverse;

use arrayvec::ArrayVec;

use crate::{
    Board, Move, MoveList, PieceKind, Rank, ATTACK_KING, ATTACK_MINOR, ATTACK_PAWN, ATTACK_QUEEN,
    ATTACK_ROOK, MAX_NUM_MOVES,
};

/// Pass as a minimum score to keep every move.
pub const KEEP_ALL: i32 = i32::MIN;

/// Captures scoring at least this much are tried before killer moves.
const GOOD_CAPTURE: i32 = 3;

/// Weight a piece contributes to the attack table on the squares it attacks.
///
/// Pawns contribute nothing here, as a pawn moving forward does not attack its destination.
#[inline(always)]
const fn attack_weight(kind: PieceKind) -> u16 {
    match kind {
        PieceKind::Pawn => 0,
        PieceKind::Knight | PieceKind::Bishop => ATTACK_MINOR,
        PieceKind::Rook => ATTACK_ROOK,
        PieceKind::Queen => ATTACK_QUEEN,
        PieceKind::King => ATTACK_KING,
    }
}

/// Static exchange evaluation on a single square.
///
/// The side owning `attackers` may capture a piece worth `next`.
/// Attackers are used cheapest first, and either side may stop capturing when it stops paying off.
/// Pawn captures onto the last rank gain `promotion_gain` on top.
fn see(mut next: i32, attackers: i32, defenders: i32, promotion_gain: i32) -> i32 {
    const PAWN: i32 = ATTACK_PAWN as i32;
    const MINOR: i32 = ATTACK_MINOR as i32;
    const ROOK: i32 = ATTACK_ROOK as i32;
    const QUEEN: i32 = ATTACK_QUEEN as i32;

    if attackers == 0 {
        return 0;
    }

    if attackers >= PAWN {
        next += promotion_gain
            - see(1 + promotion_gain, defenders, attackers - PAWN, promotion_gain);
    } else if attackers >= MINOR {
        next -= see(3, defenders, attackers - MINOR, promotion_gain);
    } else if attackers >= ROOK {
        next -= see(5, defenders, attackers - ROOK, promotion_gain);
    } else if attackers >= QUEEN {
        next -= see(9, defenders, attackers - QUEEN, promotion_gain);
    } else if defenders != 0 {
        // Only the king is left, and it cannot capture onto a defended square
        return 0;
    }

    next.max(0)
}

impl Board {
    /// Estimates the material outcome of `mv`, in pawn units, from the mover's point of view.
    ///
    /// Captures score the victim's value minus what the opponent can win back on the destination square.
    /// Non-captures start at `-1`, so that they rank below captures that merely trade evenly.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// // The pawn on d6 is protected, so the queen would be lost for it
    /// let mut board = Board::from_fen("4k3/2p5/3p4/8/8/8/8/3QK3 w - - 0 1").unwrap();
    /// let capture = board.parse_move("d1d6").unwrap();
    /// assert_eq!(board.exchange_score(capture), 1 - 9);
    /// ```
    ///
    /// # Panics
    /// If there is no piece on the origin square of `mv`.
    pub fn exchange_score(&mut self, mv: Move) -> i32 {
        let (from, to) = (mv.from(), mv.to());
        let Some(piece) = self.piece_at(from) else {
            panic!("No piece to score at {from} in move {mv:?} on {:?}", self.to_fen());
        };
        let us = self.side_to_move();

        let mut score = self
            .piece_at(to)
            .map_or(-1, |victim| victim.kind().exchange_value());
        let mut next = piece.kind().exchange_value();

        // The moving piece no longer supports the exchange after it lands
        let mut attackers = self.attacks_on(us, to) as i32 - attack_weight(piece.kind()) as i32;
        if piece.is_pawn() && score >= 0 {
            attackers -= ATTACK_PAWN as i32;
        }

        if let Some(promotion) = mv.promotion() {
            next = promotion.exchange_value();
            score += next - 1;
        }

        let last_rank = to.rank() == Rank::ONE || to.rank() == Rank::EIGHT;
        let defenders = self.attacks_on(!us, to) as i32;
        if defenders != 0 {
            score -= see(next, defenders, attackers, if last_rank { 8 } else { 0 });
        }

        score
    }
}

/// A list of moves and their exchange scores, best first.
#[derive(Clone, Debug, Default)]
pub struct OrderedMoves(ArrayVec<(Move, i32), MAX_NUM_MOVES>);

impl OrderedMoves {
    /// Scores `moves` with [`Board::exchange_score`], drops those below `min_score`, and sorts the rest.
    ///
    /// Moves with equal scores keep their generation order.
    pub fn new(board: &mut Board, moves: &MoveList, min_score: i32) -> Self {
        let mut scored = ArrayVec::new();
        for &mv in moves {
            let score = board.exchange_score(mv);
            if score >= min_score {
                scored.push((mv, score));
            }
        }

        scored.sort_by_key(|&(_, score)| Reverse(score));
        Self(scored)
    }

    /// Drops every move that leaves the mover in check.
    pub fn retain_legal(&mut self, board: &mut Board) {
        self.0.retain(|&mut (mv, _)| board.is_legal_move(mv));
    }

    /// Moves `mv` to the front of the list, keeping the order of the others.
    ///
    /// A moved entry loses its score. Returns `false` if `mv` is not in the list.
    #[inline(always)]
    pub fn move_to_front(&mut self, mv: Option<Move>) -> bool {
        mv.is_some_and(|mv| self.move_to_front_from(0, mv))
    }

    fn move_to_front_from(&mut self, start: usize, mv: Move) -> bool {
        let Some(index) = self.0[start..].iter().position(|&(other, _)| other == mv) else {
            return false;
        };

        self.0[start..=start + index].rotate_right(1);
        self.0[start] = (mv, 0);
        true
    }

    /// Moves `killers` right behind the captures that win material, the first killer foremost.
    pub fn killers_to_front(&mut self, killers: &[Option<Move>]) {
        let start = self
            .0
            .iter()
            .position(|&(_, score)| score < GOOD_CAPTURE)
            .unwrap_or(self.0.len());

        for &killer in killers.iter().rev().flatten() {
            self.move_to_front_from(start, killer);
        }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The move at `index`, if any.
    #[inline(always)]
    pub fn get(&self, index: usize) -> Option<Move> {
        self.0.get(index).map(|&(mv, _)| mv)
    }

    /// Iterates over the moves and their scores, best first.
    #[inline(always)]
    pub fn iter(&self) -> impl Iterator<Item = (Move, i32)> + '_ {
        self.0.iter().copied()
    }
}

/// Stage of a [`MovePicker`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Stage {
    /// Try the move from the transposition table before generating anything else.
    HashMove,

    /// Score and sort all moves.
    Generate,

    /// Walk the sorted moves.
    Remaining,
}

/// Lazily yields legal moves, making each on the board before returning it.
///
/// The hash move is tried first, then every other move ordered by exchange score,
/// with killer moves placed right after the winning captures.
#[derive(Debug)]
pub struct MovePicker {
    stage: Stage,

    hash_move: Option<Move>,

    /// Pseudo-legal moves, once generated.
    generated: Option<MoveList>,

    moves: OrderedMoves,

    /// Index of the next move to try.
    current: usize,
}

impl MovePicker {
    pub fn new(hash_move: Option<Move>) -> Self {
        Self {
            stage: Stage::HashMove,
            hash_move,
            generated: None,
            moves: OrderedMoves::default(),
            current: 0,
        }
    }

    /// Makes the next legal move on `board`, returning it along with its exchange score.
    ///
    /// The caller must undo the move before asking for the next one.
    /// Returns `None` once every move has been tried.
    pub fn make_next(
        &mut self,
        board: &mut Board,
        killers: &[Option<Move>],
    ) -> Option<(Move, i32)> {
        if self.stage == Stage::HashMove {
            self.stage = Stage::Generate;

            if let Some(mv) = self.hash_move {
                // A key collision could hand us a move that does not belong to this position
                let generated = self.generated.insert(board.generate_moves());
                if generated.contains(&mv) {
                    board.make_move(mv);
                    if board.was_legal_move() {
                        return Some((mv, 0));
                    }
                    board.undo_move();
                }
            }
        }

        if self.stage == Stage::Generate {
            self.stage = Stage::Remaining;

            let generated = match self.generated.take() {
                Some(generated) => generated,
                None => board.generate_moves(),
            };
            self.moves = OrderedMoves::new(board, &generated, KEEP_ALL);
            self.moves.killers_to_front(killers);

            // The hash move was already tried
            self.current = self.moves.move_to_front(self.hash_move) as usize;
        }

        while let Some(&(mv, score)) = self.moves.0.get(self.current) {
            self.current += 1;

            board.make_move(mv);
            if board.was_legal_move() {
                return Some((mv, score));
            }
            board.undo_move();
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn score_of(fen: &str, mv: &str) -> i32 {
        let mut board = Board::from_fen(fen).unwrap();
        let mv = board.parse_move(mv).unwrap();
        board.exchange_score(mv)
    }

    #[test]
    fn test_exchange_scores() {
        // Undefended queen
        assert_eq!(score_of("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1", "e4d5"), 9);

        // Defended pawn
        assert_eq!(score_of("4k3/2p5/3p4/8/8/8/8/3QK3 w - - 0 1", "d1d6"), -8);

        // Quiet moves to safe squares
        assert_eq!(score_of(FEN_STARTPOS, "g1f3"), -1);
        assert_eq!(score_of(FEN_STARTPOS, "e2e4"), -1);
    }

    #[test]
    fn test_promotion_scores() {
        let fen = "8/4P3/8/8/8/8/k7/7K w - - 0 1";
        assert_eq!(score_of(fen, "e7e8q"), 7);
        assert_eq!(score_of(fen, "e7e8n"), 1);
    }

    #[test]
    fn test_ordered_moves_are_sorted_and_filtered() {
        let mut board = Board::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let generated = board.generate_moves();

        let all = OrderedMoves::new(&mut board, &generated, KEEP_ALL);
        assert_eq!(all.len(), generated.len());
        assert_eq!(all.get(0).map(|mv| mv.to_string()), Some(String::from("e4d5")));
        assert!(
            all.iter().zip(all.iter().skip(1)).all(|(a, b)| a.1 >= b.1),
            "Moves must be sorted by descending score"
        );

        let winning = OrderedMoves::new(&mut board, &generated, 0);
        assert_eq!(winning.len(), 1, "Only the capture does not lose material");
    }

    #[test]
    fn test_move_to_front() {
        let mut board = Board::default();
        let generated = board.generate_moves();
        let mut moves = OrderedMoves::new(&mut board, &generated, KEEP_ALL);

        let last = moves.get(moves.len() - 1);
        let second = moves.get(1);
        assert!(moves.move_to_front(last));
        assert_eq!(moves.get(0), last);
        assert_eq!(moves.get(2), second, "Others keep their relative order");
        assert_eq!(moves.len(), 20);

        assert!(!moves.move_to_front(None));
    }

    #[test]
    fn test_killers_follow_winning_captures() {
        let mut board = Board::from_fen("4k3/8/8/3q4/4P3/8/8/4K3 w - - 0 1").unwrap();
        let generated = board.generate_moves();
        let mut moves = OrderedMoves::new(&mut board, &generated, KEEP_ALL);

        let e1e2 = board.parse_move("e1e2").ok();
        let e1f1 = board.parse_move("e1f1").ok();
        assert!(e1e2.is_some() && e1f1.is_some());
        moves.killers_to_front(&[e1f1, None, e1e2]);

        assert_eq!(moves.get(0).map(|mv| mv.to_string()), Some(String::from("e4d5")));
        assert_eq!(moves.get(1), e1f1);
        assert_eq!(moves.get(2), e1e2);
    }

    #[test]
    fn test_picker_tries_hash_move_first() {
        let mut board = Board::from_fen(FEN_KIWIPETE).unwrap();
        let legal = board.legal_moves();
        let hash_move = board.parse_move("a2a3").ok();

        let mut picker = MovePicker::new(hash_move);
        let mut seen = Vec::new();
        while let Some((mv, _)) = picker.make_next(&mut board, &[]) {
            board.undo_move();
            seen.push(mv);
        }

        assert_eq!(seen.first().copied(), hash_move);
        assert_eq!(seen.len(), legal.len(), "Every legal move exactly once");
        assert!(legal.iter().all(|mv| seen.contains(mv)));
        assert_eq!(board.to_fen(), FEN_KIWIPETE, "The picker must leave the board as it was");
    }

    #[test]
    fn test_picker_ignores_foreign_hash_move() {
        // A move from another position, with no piece on its origin square here
        let mut other = Board::from_fen(FEN_KIWIPETE).unwrap();
        let foreign = other.parse_move("e5f7").ok();

        let mut board = Board::default();
        let mut picker = MovePicker::new(foreign);
        let mut count = 0;
        while picker.make_next(&mut board, &[]).is_some() {
            board.undo_move();
            count += 1;
        }
        assert_eq!(count, 20);
    }
}
