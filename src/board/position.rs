/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    fmt,
    ops::{BitOr, Index},
    str::FromStr,
};

use thiserror::Error;

use super::{
    Color, File, Move, MoveKind, MoveList, MoveTextError, Piece, PieceKind, Rank, Square,
    ZobristKey, BISHOP_DIRECTIONS, KING_STEPS, KNIGHT_STEPS, ROOK_DIRECTIONS,
};
use crate::FEN_STARTPOS;

/// Attack weight of a king. Attack tables hold the sum of all attackers' weights.
pub const ATTACK_KING: u16 = 1;
/// Attack weight of a queen.
pub const ATTACK_QUEEN: u16 = 2;
/// Attack weight of a rook.
pub const ATTACK_ROOK: u16 = 4;
/// Attack weight of a knight or bishop.
pub const ATTACK_MINOR: u16 = 16;
/// Attack weight of a pawn.
pub const ATTACK_PAWN: u16 = 64;

/// Reasons a FEN string could not be set up as a [`Board`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    #[error("FEN string must have piece placements")]
    MissingPlacements,

    #[error("invalid piece placements {0:?}")]
    BadPlacement(String),

    #[error("invalid side to move {0:?}: must be `w` or `b`")]
    BadSideToMove(String),

    #[error("invalid castling rights {0:?}: must be `-` or a subset of `KQkq`")]
    BadCastling(String),

    #[error("invalid en passant square {0:?}")]
    BadEnPassant(String),

    #[error("invalid move counter {0:?}")]
    BadCounter(String),

    #[error("{color:?} must have exactly one king, found {count}")]
    KingCount { color: Color, count: usize },
}

/// The four castling rights, as a set of bit flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: Self = Self(0);
    pub const WHITE_SHORT: Self = Self(1);
    pub const WHITE_LONG: Self = Self(2);
    pub const BLACK_SHORT: Self = Self(4);
    pub const BLACK_LONG: Self = Self(8);
    pub const ALL: Self = Self(15);

    #[inline(always)]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Kingside right of `color`.
    #[inline(always)]
    pub const fn short(color: Color) -> Self {
        [Self::WHITE_SHORT, Self::BLACK_SHORT][color.index()]
    }

    /// Queenside right of `color`.
    #[inline(always)]
    pub const fn long(color: Color) -> Self {
        [Self::WHITE_LONG, Self::BLACK_LONG][color.index()]
    }

    /// Returns `true` if every right in `other` is also in `self`.
    #[inline(always)]
    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `self` with all rights in `other` removed.
    #[inline(always)]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for CastlingRights {
    type Output = Self;
    #[inline(always)]
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "-");
        }

        for (right, c) in [
            (Self::WHITE_SHORT, 'K'),
            (Self::WHITE_LONG, 'Q'),
            (Self::BLACK_SHORT, 'k'),
            (Self::BLACK_LONG, 'q'),
        ] {
            if self.contains(right) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// Castling rights lost when any piece leaves or lands on a square.
const CASTLING_LOST: [CastlingRights; Square::COUNT] = {
    let mut lost = [CastlingRights::NONE; Square::COUNT];
    lost[Square::A1.index()] = CastlingRights::WHITE_LONG;
    lost[Square::E1.index()] =
        CastlingRights(CastlingRights::WHITE_SHORT.0 | CastlingRights::WHITE_LONG.0);
    lost[Square::H1.index()] = CastlingRights::WHITE_SHORT;
    lost[Square::A8.index()] = CastlingRights::BLACK_LONG;
    lost[Square::E8.index()] =
        CastlingRights(CastlingRights::BLACK_SHORT.0 | CastlingRights::BLACK_LONG.0);
    lost[Square::H8.index()] = CastlingRights::BLACK_SHORT;
    lost
};

/// A single reversible edit, recorded before the edited field changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Undo {
    /// Marks the start of a move's edits.
    Boundary,
    Square(Square, Option<Piece>),
    Castling(CastlingRights),
    EnPassant(Option<Square>),
    HalfmoveClock(u16),
}

/// Per-side attack tables and king squares, valid only for the ply they were computed at.
#[derive(Clone, Debug)]
pub(super) struct AttackCache {
    /// Ply at which the tables were computed, or `None` after any edit.
    valid_at: Option<u32>,

    /// Sum of the attack weights of every piece of a color attacking a square.
    pub(super) attacks: [[u16; Square::COUNT]; Color::COUNT],

    pub(super) kings: [Square; Color::COUNT],
}

impl AttackCache {
    const fn new() -> Self {
        Self {
            valid_at: None,
            attacks: [[0; Square::COUNT]; Color::COUNT],
            kings: [Square::E1, Square::E8],
        }
    }

    #[inline(always)]
    fn invalidate(&mut self) {
        self.valid_at = None;
    }
}

/// A chess position, mutated in place by making and undoing moves.
///
/// Every edit done by [`Board::make_move`] is recorded in an undo log,
/// so [`Board::undo_move`] restores the exact previous position.
#[derive(Clone, Debug)]
pub struct Board {
    squares: [Option<Piece>; Square::COUNT],

    /// Half-moves since the start of the game. Even means White to move.
    ply: u32,

    castling: CastlingRights,

    /// Square a pawn passed over in a double push, kept only if it can be captured en passant.
    ep_square: Option<Square>,

    /// Half-moves since the last capture or pawn move.
    halfmove: u16,

    key: ZobristKey,

    /// Key of the position before each move made since setup.
    history: Vec<ZobristKey>,

    undo: Vec<Undo>,

    pub(super) cache: AttackCache,
}

impl Board {
    /// Sets up a [`Board`] from a FEN string.
    ///
    /// The halfmove and fullmove counters may be omitted.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// let board = Board::from_fen(FEN_STARTPOS).unwrap();
    /// assert_eq!(board.to_fen(), FEN_STARTPOS);
    ///
    /// let no_black_king = Board::from_fen("8/8/8/8/8/8/8/4K3 w - - 0 1");
    /// assert!(no_black_king.is_err());
    /// ```
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        let mut split = fen.split_ascii_whitespace();
        let placements = split.next().ok_or(FenError::MissingPlacements)?;
        let squares = Self::parse_placements(placements)?;

        for color in Color::all() {
            let count = squares
                .iter()
                .flatten()
                .filter(|&&piece| piece == Piece::new(color, PieceKind::King))
                .count();

            if count != 1 {
                return Err(FenError::KingCount { color, count });
            }
        }

        let side_to_move = match split.next().unwrap_or("w") {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::BadSideToMove(other.to_string())),
        };

        let castling_str = split.next().unwrap_or("-");
        let mut castling = CastlingRights::NONE;
        if castling_str != "-" {
            for c in castling_str.chars() {
                castling = castling
                    | match c {
                        'K' => CastlingRights::WHITE_SHORT,
                        'Q' => CastlingRights::WHITE_LONG,
                        'k' => CastlingRights::BLACK_SHORT,
                        'q' => CastlingRights::BLACK_LONG,
                        _ => return Err(FenError::BadCastling(castling_str.to_string())),
                    };
            }
        }

        // Rights without the king and rook on their home squares can never be used
        for (right, king, rook) in [
            (CastlingRights::WHITE_SHORT, Square::E1, Square::H1),
            (CastlingRights::WHITE_LONG, Square::E1, Square::A1),
            (CastlingRights::BLACK_SHORT, Square::E8, Square::H8),
            (CastlingRights::BLACK_LONG, Square::E8, Square::A8),
        ] {
            let color = if right.bits() < 4 { Color::White } else { Color::Black };
            if squares[king] != Some(Piece::new(color, PieceKind::King))
                || squares[rook] != Some(Piece::new(color, PieceKind::Rook))
            {
                castling = castling.without(right);
            }
        }

        let ep_str = split.next().unwrap_or("-");
        let ep_square = match ep_str {
            "-" => None,
            square => {
                let square = Square::from_uci(square)
                    .map_err(|_| FenError::BadEnPassant(ep_str.to_string()))?;

                // The passed-over square is behind the side that just moved
                let expected = [Rank::SIX, Rank::THREE][side_to_move.index()];
                if square.rank() != expected {
                    return Err(FenError::BadEnPassant(ep_str.to_string()));
                }
                Some(square)
            }
        };

        let halfmove_str = split.next().unwrap_or("0");
        let halfmove = halfmove_str
            .parse::<u16>()
            .map_err(|_| FenError::BadCounter(halfmove_str.to_string()))?;

        // Half of the ply range is kept free for the moves played from this position
        let fullmove_str = split.next().unwrap_or("1");
        let ply = fullmove_str
            .parse::<u32>()
            .ok()
            .and_then(|fullmove| fullmove.max(1).checked_sub(1)?.checked_mul(2))
            .and_then(|ply| ply.checked_add(side_to_move.index() as u32))
            .filter(|&ply| ply <= u32::MAX / 2)
            .ok_or_else(|| FenError::BadCounter(fullmove_str.to_string()))?;

        let mut board = Self {
            squares,
            ply,
            castling,
            ep_square: None,
            halfmove,
            key: ZobristKey::default(),
            history: Vec::new(),
            undo: Vec::new(),
            cache: AttackCache::new(),
        };
        board.key = board.compute_key();

        if let Some(target) = ep_square {
            board.set_en_passant(Some(target));
            board.normalize_en_passant();
        }

        board.undo.clear();
        board.history.clear();
        Ok(board)
    }

    /// Parses the first field of a FEN string, rank 8 first.
    fn parse_placements(placements: &str) -> Result<[Option<Piece>; Square::COUNT], FenError> {
        let bad = || FenError::BadPlacement(placements.to_string());
        let mut squares = [None; Square::COUNT];

        let ranks = placements.split('/').collect::<Vec<_>>();
        if ranks.len() != Rank::COUNT {
            return Err(bad());
        }

        // Reversed so that White's pieces are at the "bottom" of the board
        for (rank, row) in ranks.into_iter().rev().enumerate() {
            let mut file = 0;
            for c in row.chars() {
                if let Some(empty) = c.to_digit(10).filter(|n| (1..=8).contains(n)) {
                    file += empty as usize;
                } else {
                    let piece = Piece::from_uci(c).map_err(|_| bad())?;
                    if file >= File::COUNT {
                        return Err(bad());
                    }
                    squares[rank * 8 + file] = Some(piece);
                    file += 1;
                }
            }

            if file != File::COUNT {
                return Err(bad());
            }
        }

        Ok(squares)
    }

    /// Generates a FEN string for this position.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// let mut board = Board::default();
    /// board.make_move_text("e2e4").unwrap();
    /// // No black pawn can capture on e3, so the en passant square is omitted
    /// assert_eq!(
    ///     board.to_fen(),
    ///     "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
    /// );
    /// ```
    pub fn to_fen(&self) -> String {
        let mut placements = String::new();
        for rank in Rank::iter().rev() {
            let mut empty = 0;
            for file in File::iter() {
                match self.squares[Square::new(file, rank)] {
                    Some(piece) => {
                        if empty > 0 {
                            placements.push_str(&empty.to_string());
                            empty = 0;
                        }
                        placements.push(piece.to_uci());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                placements.push_str(&empty.to_string());
            }
            if rank != Rank::ONE {
                placements.push('/');
            }
        }

        let en_passant = self
            .ep_square
            .map(|sq| sq.to_string())
            .unwrap_or(String::from("-"));

        format!(
            "{placements} {} {} {en_passant} {} {}",
            self.side_to_move(),
            self.castling,
            self.halfmove,
            self.fullmove()
        )
    }

    #[inline(always)]
    pub const fn side_to_move(&self) -> Color {
        Color::from_bool(self.ply & 1 != 0)
    }

    /// Half-moves played since the start of the game.
    #[inline(always)]
    pub const fn ply(&self) -> u32 {
        self.ply
    }

    #[inline(always)]
    pub const fn fullmove(&self) -> u32 {
        self.ply / 2 + 1
    }

    #[inline(always)]
    pub const fn halfmove(&self) -> u16 {
        self.halfmove
    }

    #[inline(always)]
    pub const fn castling_rights(&self) -> CastlingRights {
        self.castling
    }

    #[inline(always)]
    pub const fn ep_square(&self) -> Option<Square> {
        self.ep_square
    }

    /// The incrementally maintained Zobrist key of this position.
    #[inline(always)]
    pub const fn key(&self) -> ZobristKey {
        self.key
    }

    /// Keys of every position before each move made since setup, oldest first.
    #[inline(always)]
    pub fn history(&self) -> &[ZobristKey] {
        &self.history
    }

    #[inline(always)]
    pub const fn piece_at(&self, square: Square) -> Option<Piece> {
        self.squares[square.index()]
    }

    /// Iterates over every occupied square and its piece.
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::iter().filter_map(|sq| self.squares[sq].map(|piece| (sq, piece)))
    }

    /// Recomputes the Zobrist key of this position from scratch.
    pub fn compute_key(&self) -> ZobristKey {
        ZobristKey::from_parts(
            self.pieces(),
            self.castling,
            self.ep_square.map(|sq| sq.file()),
            self.side_to_move(),
        )
    }

    /*----------------------------------------------------------------------------------------------
     * Logged edits
     *--------------------------------------------------------------------------------------------*/

    /// Places `piece` (or nothing) on `square`, logging the old contents and updating the key.
    #[inline(always)]
    fn set_square(&mut self, square: Square, piece: Option<Piece>) {
        let old = self.squares[square];
        self.undo.push(Undo::Square(square, old));

        if let Some(old) = old {
            self.key.hash_piece(square, old);
        }
        if let Some(new) = piece {
            self.key.hash_piece(square, new);
        }

        self.squares[square] = piece;
    }

    #[inline(always)]
    fn set_castling(&mut self, rights: CastlingRights) {
        self.undo.push(Undo::Castling(self.castling));
        self.key.hash_castling(self.castling);
        self.key.hash_castling(rights);
        self.castling = rights;
    }

    #[inline(always)]
    fn set_en_passant(&mut self, ep_square: Option<Square>) {
        self.undo.push(Undo::EnPassant(self.ep_square));
        if let Some(old) = self.ep_square {
            self.key.hash_ep_file(old.file());
        }
        if let Some(new) = ep_square {
            self.key.hash_ep_file(new.file());
        }
        self.ep_square = ep_square;
    }

    #[inline(always)]
    fn set_halfmove(&mut self, halfmove: u16) {
        self.undo.push(Undo::HalfmoveClock(self.halfmove));
        self.halfmove = halfmove;
    }

    /// Opens a new entry in the undo log and the key history.
    #[inline(always)]
    fn begin_move(&mut self) {
        self.history.push(self.key);
        self.undo.push(Undo::Boundary);
    }

    /// Passes the turn to the other side.
    #[inline(always)]
    fn end_move(&mut self) {
        self.ply += 1;
        self.key.hash_turn();
        self.cache.invalidate();
    }

    /*----------------------------------------------------------------------------------------------
     * Making and undoing moves
     *--------------------------------------------------------------------------------------------*/

    /// Applies a pseudo-legal move. No enforcement of legality.
    ///
    /// Call [`Board::was_legal_move`] afterwards to find out whether the mover's king was left in check.
    ///
    /// # Panics
    /// If there is no piece on the origin square of `mv`.
    pub fn make_move(&mut self, mv: Move) {
        let (from, to) = (mv.from(), mv.to());
        let Some(mut piece) = self.squares[from] else {
            panic!("No piece to move at {from} in move {mv:?} on {:?}", self.to_fen());
        };

        self.begin_move();

        if self.ep_square.is_some() {
            self.set_en_passant(None);
        }

        // Captures and pawn moves reset the 50-move counter
        if piece.is_pawn() || self.squares[to].is_some() {
            self.set_halfmove(0);
        } else {
            self.set_halfmove(self.halfmove.saturating_add(1));
        }

        match mv.kind() {
            MoveKind::Castle => {
                let rank = from.rank();
                let (rook_from, rook_to) = if to.file() == File::G {
                    (Square::new(File::H, rank), Square::new(File::F, rank))
                } else {
                    (Square::new(File::A, rank), Square::new(File::D, rank))
                };
                let rook = self.squares[rook_from];
                self.set_square(rook_from, None);
                self.set_square(rook_to, rook);
            }

            // The captured pawn is beside the origin, not on the destination
            MoveKind::EnPassant => self.set_square(Square::new(to.file(), from.rank()), None),

            MoveKind::Promotion(kind) => piece = piece.promoted(kind),

            MoveKind::Normal | MoveKind::DoublePush => {}
        }

        self.set_square(to, Some(piece));
        self.set_square(from, None);

        let lost = CASTLING_LOST[from].bits() | CASTLING_LOST[to].bits();
        if self.castling.bits() & lost != 0 {
            self.set_castling(self.castling.without(CastlingRights(lost)));
        }

        self.end_move();

        if mv.kind() == MoveKind::DoublePush {
            self.set_en_passant(from.forward(piece.color()));
            self.normalize_en_passant();
        }

        debug_assert_eq!(
            self.key,
            self.compute_key(),
            "Incremental key diverged after {mv} on {:?}",
            self.to_fen()
        );
    }

    /// Reverts the last move (or null move) made, restoring every field exactly.
    ///
    /// # Panics
    /// If there is no move to undo.
    pub fn undo_move(&mut self) {
        loop {
            match self.undo.pop() {
                Some(Undo::Boundary) => break,
                Some(Undo::Square(square, piece)) => self.squares[square] = piece,
                Some(Undo::Castling(rights)) => self.castling = rights,
                Some(Undo::EnPassant(ep_square)) => self.ep_square = ep_square,
                Some(Undo::HalfmoveClock(halfmove)) => self.halfmove = halfmove,
                None => panic!("Undo log underflow on {:?}", self.to_fen()),
            }
        }

        let Some(key) = self.history.pop() else {
            panic!("Key history underflow on {:?}", self.to_fen());
        };

        self.key = key;
        self.ply -= 1;
        self.cache.invalidate();
    }

    /// Passes the turn without moving a piece. Reverted by [`Board::undo_move`].
    pub fn make_null_move(&mut self) {
        self.begin_move();

        if self.ep_square.is_some() {
            self.set_en_passant(None);
        }
        self.set_halfmove(self.halfmove.saturating_add(1));

        self.end_move();
    }

    /// Number of moves that can currently be undone.
    #[inline(always)]
    pub fn num_undoable(&self) -> usize {
        self.history.len()
    }

    /*----------------------------------------------------------------------------------------------
     * Attacks and legality
     *--------------------------------------------------------------------------------------------*/

    /// Recomputes the attack tables, unless they are already valid for the current ply.
    ///
    /// # Panics
    /// If either side has no king.
    pub(super) fn refresh_attacks(&mut self) {
        if self.cache.valid_at == Some(self.ply) {
            return;
        }

        let mut attacks = [[0; Square::COUNT]; Color::COUNT];
        let mut kings = [None; Color::COUNT];

        for (from, piece) in self.pieces() {
            let color = piece.color();
            let side = &mut attacks[color];

            match piece.kind() {
                PieceKind::Pawn => {
                    let captures = [(-1, color.forward()), (1, color.forward())];
                    add_step_attacks(side, from, &captures, ATTACK_PAWN)
                }
                PieceKind::Knight => add_step_attacks(side, from, &KNIGHT_STEPS, ATTACK_MINOR),
                PieceKind::King => {
                    add_step_attacks(side, from, &KING_STEPS, ATTACK_KING);
                    kings[color] = Some(from);
                }
                PieceKind::Bishop => {
                    self.add_ray_attacks(side, from, &BISHOP_DIRECTIONS, ATTACK_MINOR)
                }
                PieceKind::Rook => self.add_ray_attacks(side, from, &ROOK_DIRECTIONS, ATTACK_ROOK),
                PieceKind::Queen => {
                    self.add_ray_attacks(side, from, &ROOK_DIRECTIONS, ATTACK_QUEEN);
                    self.add_ray_attacks(side, from, &BISHOP_DIRECTIONS, ATTACK_QUEEN);
                }
            }
        }

        let [Some(white), Some(black)] = kings else {
            panic!("Both sides must have a king on {:?}", self.to_fen());
        };

        self.cache.attacks = attacks;
        self.cache.kings = [white, black];
        self.cache.valid_at = Some(self.ply);
    }

    /// Adds `weight` to every square reached by sliding from `from`, up to and including the first blocker.
    fn add_ray_attacks(
        &self,
        side: &mut [u16; Square::COUNT],
        from: Square,
        directions: &[(i8, i8)],
        weight: u16,
    ) {
        for &(df, dr) in directions {
            let mut current = from;
            while let Some(to) = current.offset(df, dr) {
                side[to] += weight;
                if self.squares[to].is_some() {
                    break;
                }
                current = to;
            }
        }
    }

    /// Sum of the attack weights of `color`'s pieces on `square`.
    #[inline(always)]
    pub fn attacks_on(&mut self, color: Color, square: Square) -> u16 {
        self.refresh_attacks();
        self.cache.attacks[color][square]
    }

    #[inline(always)]
    pub fn king_square(&mut self, color: Color) -> Square {
        self.refresh_attacks();
        self.cache.kings[color]
    }

    /// Returns `true` if the side to move is in check.
    #[inline(always)]
    pub fn in_check(&mut self) -> bool {
        let stm = self.side_to_move();
        let king = self.king_square(stm);
        self.cache.attacks[stm.opponent()][king] != 0
    }

    /// After [`Board::make_move`], returns `false` if the move left the mover's king attacked.
    ///
    /// The caller must still undo an illegal move.
    #[inline(always)]
    pub fn was_legal_move(&mut self) -> bool {
        let stm = self.side_to_move();
        let king = self.king_square(stm.opponent());
        self.cache.attacks[stm][king] == 0
    }

    /// Returns `true` if the pseudo-legal `mv` does not leave the mover in check.
    pub fn is_legal_move(&mut self, mv: Move) -> bool {
        self.make_move(mv);
        let legal = self.was_legal_move();
        self.undo_move();
        legal
    }

    /// Clears the en passant square if no pawn can legally capture onto it.
    pub fn normalize_en_passant(&mut self) {
        let Some(target) = self.ep_square else {
            return;
        };

        let us = self.side_to_move();
        let our_pawn = Piece::new(us, PieceKind::Pawn);
        let their_pawn = Piece::new(us.opponent(), PieceKind::Pawn);
        let behind = -us.forward();

        let double_pushed = target
            .offset(0, behind)
            .is_some_and(|sq| self.squares[sq] == Some(their_pawn));

        let can_capture = double_pushed
            && self.squares[target].is_none()
            && [-1, 1].into_iter().any(|df| {
                target
                    .offset(df, behind)
                    .filter(|&sq| self.squares[sq] == Some(our_pawn))
                    .is_some_and(|sq| {
                        self.is_legal_move(Move::new(sq, target, MoveKind::EnPassant))
                    })
            });

        if !can_capture {
            self.set_en_passant(None);
        }
    }

    /// Returns every legal move in this position.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// let mut board = Board::default();
    /// assert_eq!(board.legal_moves().len(), 20);
    /// ```
    pub fn legal_moves(&mut self) -> MoveList {
        let mut moves = self.generate_moves();
        moves.retain(|mv| self.is_legal_move(*mv));
        moves
    }

    /// Parses `text` against the legal moves of this position.
    #[inline(always)]
    pub fn parse_move(&mut self, text: &str) -> Result<Move, MoveTextError> {
        let legal = self.legal_moves();
        Move::parse(text, &legal)
    }

    /// Parses `text` and, if it names a legal move, makes it.
    pub fn make_move_text(&mut self, text: &str) -> Result<Move, MoveTextError> {
        let mv = self.parse_move(text)?;
        self.make_move(mv);
        Ok(mv)
    }

    /*----------------------------------------------------------------------------------------------
     * Draw detection
     *--------------------------------------------------------------------------------------------*/

    /// Returns `true` if the current position repeats.
    ///
    /// Only positions since the last capture or pawn move are considered.
    /// A position counts as repeated if it occurred twice before (a threefold repetition),
    /// or once within the last `search_ply` half-moves.
    pub fn is_repetition(&self, search_ply: usize) -> bool {
        let len = self.history.len();
        if self.halfmove < 4 || len < 4 {
            return false;
        }

        let last_zeroing = len.saturating_sub(self.halfmove as usize);
        let search_root = len.saturating_sub(search_ply);
        let mut count = 1;

        // Positions with the same side to move, starting 4 plies back
        let mut i = len - 4;
        loop {
            if i < last_zeroing {
                return false;
            }

            if self.history[i] == self.key {
                count += 1;
                if count >= 3 || i >= search_root {
                    return true;
                }
            }

            if i < 2 {
                return false;
            }
            i -= 2;
        }
    }
}

/// Adds `weight` to every square one step away from `from`.
#[inline(always)]
fn add_step_attacks(
    side: &mut [u16; Square::COUNT],
    from: Square,
    steps: &[(i8, i8)],
    weight: u16,
) {
    for &(df, dr) in steps {
        if let Some(to) = from.offset(df, dr) {
            side[to] += weight;
        }
    }
}

impl Default for Board {
    /// The standard starting position.
    #[inline(always)]
    fn default() -> Self {
        match Self::from_fen(FEN_STARTPOS) {
            Ok(board) => board,
            Err(err) => panic!("Invalid starting position: {err}"),
        }
    }
}

impl FromStr for Board {
    type Err = FenError;
    #[inline(always)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_fen(s)
    }
}

impl PartialEq for Board {
    /// Boards are equal if every position field, the key history, and the undo log are equal.
    ///
    /// The attack cache is derived data and is not compared.
    fn eq(&self, other: &Self) -> bool {
        self.squares == other.squares
            && self.ply == other.ply
            && self.castling == other.castling
            && self.ep_square == other.ep_square
            && self.halfmove == other.halfmove
            && self.key == other.key
            && self.history == other.history
            && self.undo == other.undo
    }
}

impl Eq for Board {}

impl Index<Square> for Board {
    type Output = Option<Piece>;
    #[inline(always)]
    fn index(&self, index: Square) -> &Self::Output {
        &self.squares[index]
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in Rank::iter().rev() {
            write!(f, "{rank}|")?;
            for file in File::iter() {
                let c = self.squares[Square::new(file, rank)]
                    .map(|piece| piece.to_uci())
                    .unwrap_or('.');
                write!(f, " {c}")?;
            }
            writeln!(f)?;
        }
        writeln!(f, " +----------------")?;
        writeln!(f, "   a b c d e f g h")?;
        writeln!(f)?;
        writeln!(f, "FEN: {}", self.to_fen())?;
        write!(f, "Key: {}", self.key)
    }
}
