/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use super::{
    Board, CastlingRights, Color, File, Move, MoveKind, MoveList, Piece, PieceKind, Rank, Square,
    BISHOP_DIRECTIONS, KING_STEPS, KNIGHT_STEPS, ROOK_DIRECTIONS,
};

impl Board {
    /// Generates all pseudo-legal moves for the side to move.
    ///
    /// Moves may leave the mover's own king in check, except king moves, which never step onto an attacked square,
    /// and castling, which is only generated when the king does not start in, pass through, or land on an attacked square.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// // The knight on c3 is pinned, but its moves are still generated
    /// let mut board = Board::from_fen("4k3/8/8/b7/8/2N5/8/4K3 w - - 0 1").unwrap();
    /// let pseudo = board.generate_moves();
    /// let legal = board.legal_moves();
    /// assert_eq!(pseudo.len(), legal.len() + 8);
    /// ```
    pub fn generate_moves(&mut self) -> MoveList {
        self.refresh_attacks();

        let us = self.side_to_move();
        let mut moves = MoveList::new();

        for (from, piece) in self.pieces() {
            if piece.color() != us {
                continue;
            }

            match piece.kind() {
                PieceKind::Pawn => self.generate_pawn_moves(us, from, &mut moves),
                PieceKind::Knight => self.generate_step_moves(us, from, &KNIGHT_STEPS, &mut moves),
                PieceKind::Bishop => {
                    self.generate_slider_moves(us, from, &BISHOP_DIRECTIONS, &mut moves)
                }
                PieceKind::Rook => {
                    self.generate_slider_moves(us, from, &ROOK_DIRECTIONS, &mut moves)
                }
                PieceKind::Queen => {
                    self.generate_slider_moves(us, from, &ROOK_DIRECTIONS, &mut moves);
                    self.generate_slider_moves(us, from, &BISHOP_DIRECTIONS, &mut moves);
                }
                PieceKind::King => {
                    self.generate_king_moves(us, from, &mut moves);
                    self.generate_castling_moves(us, from, &mut moves);
                }
            }
        }

        moves
    }

    /// Returns `true` if `square` is empty or holds an enemy of `us`.
    #[inline(always)]
    fn is_enterable(&self, us: Color, square: Square) -> bool {
        self[square].is_none_or(|piece| piece.color() != us)
    }

    fn generate_step_moves(
        &self,
        us: Color,
        from: Square,
        steps: &[(i8, i8)],
        moves: &mut MoveList,
    ) {
        for &(df, dr) in steps {
            if let Some(to) = from.offset(df, dr).filter(|&to| self.is_enterable(us, to)) {
                moves.push(Move::new(from, to, MoveKind::Normal));
            }
        }
    }

    fn generate_slider_moves(
        &self,
        us: Color,
        from: Square,
        directions: &[(i8, i8)],
        moves: &mut MoveList,
    ) {
        for &(df, dr) in directions {
            let mut current = from;
            while let Some(to) = current.offset(df, dr) {
                match self[to] {
                    None => moves.push(Move::new(from, to, MoveKind::Normal)),
                    Some(piece) => {
                        if piece.color() != us {
                            moves.push(Move::new(from, to, MoveKind::Normal));
                        }
                        break;
                    }
                }
                current = to;
            }
        }
    }

    /// King steps onto squares not attacked by the opponent.
    fn generate_king_moves(&self, us: Color, from: Square, moves: &mut MoveList) {
        let attacked = &self.cache.attacks[us.opponent()];
        for &(df, dr) in &KING_STEPS {
            if let Some(to) = from
                .offset(df, dr)
                .filter(|&to| attacked[to] == 0 && self.is_enterable(us, to))
            {
                moves.push(Move::new(from, to, MoveKind::Normal));
            }
        }
    }

    fn generate_castling_moves(&self, us: Color, from: Square, moves: &mut MoveList) {
        let rank = Rank::first(us);
        let attacked = &self.cache.attacks[us.opponent()];

        if from != Square::new(File::E, rank) || attacked[from] != 0 {
            return;
        }

        let rook = Some(Piece::new(us, PieceKind::Rook));
        let empty = |files: &[File]| files.iter().all(|&f| self[Square::new(f, rank)].is_none());
        let safe = |files: &[File]| files.iter().all(|&f| attacked[Square::new(f, rank)] == 0);

        if self.castling_rights().contains(CastlingRights::short(us))
            && self[Square::new(File::H, rank)] == rook
            && empty(&[File::F, File::G])
            && safe(&[File::F, File::G])
        {
            moves.push(Move::new(from, Square::new(File::G, rank), MoveKind::Castle));
        }

        if self.castling_rights().contains(CastlingRights::long(us))
            && self[Square::new(File::A, rank)] == rook
            && empty(&[File::B, File::C, File::D])
            && safe(&[File::C, File::D])
        {
            moves.push(Move::new(from, Square::new(File::C, rank), MoveKind::Castle));
        }
    }

    fn generate_pawn_moves(&self, us: Color, from: Square, moves: &mut MoveList) {
        let mut push = |to: Square, kind: MoveKind| {
            if to.rank() == Rank::eighth(us) {
                for promotion in PieceKind::PROMOTIONS {
                    moves.push(Move::new(from, to, MoveKind::Promotion(promotion)));
                }
            } else {
                moves.push(Move::new(from, to, kind));
            }
        };

        // Pushes
        if let Some(one) = from.forward(us).filter(|&sq| self[sq].is_none()) {
            push(one, MoveKind::Normal);

            if from.rank() == Rank::second(us) {
                if let Some(two) = one.forward(us).filter(|&sq| self[sq].is_none()) {
                    push(two, MoveKind::DoublePush);
                }
            }
        }

        // Captures
        for df in [-1, 1] {
            let Some(to) = from.offset(df, us.forward()) else {
                continue;
            };

            match self[to] {
                Some(victim) if victim.color() != us => push(to, MoveKind::Normal),
                None if self.ep_square() == Some(to) => push(to, MoveKind::EnPassant),
                _ => {}
            }
        }
    }
}
