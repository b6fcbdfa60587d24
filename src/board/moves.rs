/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

use thiserror::Error;

use super::{File, PieceKind, Square};

/// Capacity of a [`MoveList`].
///
/// No position has more than [218 legal moves](<https://www.chessprogramming.org/Chess_Position#cite_note-4>),
/// but pseudo-legal move lists can be slightly longer.
pub const MAX_NUM_MOVES: usize = 256;

/// An alias for an [`arrayvec::ArrayVec`] containing at most [`MAX_NUM_MOVES`] moves.
pub type MoveList = arrayvec::ArrayVec<Move, MAX_NUM_MOVES>;

/// Reasons a piece of move text could not be turned into a [`Move`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoveTextError {
    /// The text is not in any accepted move notation.
    #[error("malformed move {0:?}")]
    Malformed(String),

    /// The text is well-formed, but no legal move matches it.
    #[error("illegal move {0:?}")]
    Illegal(String),

    /// The text matches more than one legal move.
    #[error("ambiguous move {0:?}")]
    Ambiguous(String),
}

/// The special-move tag carried by a [`Move`].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, Default)]
pub enum MoveKind {
    /// Any move (capture or not) without special side effects.
    #[default]
    Normal,

    /// A pawn advancing two squares from its starting rank.
    DoublePush,

    /// The king moving two squares towards a rook, which jumps over it.
    Castle,

    /// A pawn capturing a pawn that just double-pushed past it.
    EnPassant,

    /// A pawn reaching the last rank and becoming the given kind.
    Promotion(PieceKind),
}

impl MoveKind {
    /// 4-bit code of this kind, used for compact storage.
    #[inline(always)]
    const fn bits(&self) -> u16 {
        match self {
            Self::Normal => 0,
            Self::DoublePush => 1,
            Self::Castle => 2,
            Self::EnPassant => 3,
            Self::Promotion(PieceKind::Knight) => 4,
            Self::Promotion(PieceKind::Bishop) => 5,
            Self::Promotion(PieceKind::Rook) => 6,
            Self::Promotion(_) => 7,
        }
    }

    #[inline(always)]
    const fn from_bits(bits: u16) -> Self {
        match bits & 0xF {
            1 => Self::DoublePush,
            2 => Self::Castle,
            3 => Self::EnPassant,
            4 => Self::Promotion(PieceKind::Knight),
            5 => Self::Promotion(PieceKind::Bishop),
            6 => Self::Promotion(PieceKind::Rook),
            7 => Self::Promotion(PieceKind::Queen),
            _ => Self::Normal,
        }
    }
}

/// Represents a move made on a chess board.
///
/// Moves are plain values: an origin, a destination and a [`MoveKind`] tag.
/// Only the move generator creates them; other code compares against generated moves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Move {
    from: Square,
    to: Square,
    kind: MoveKind,
}

impl Move {
    const SQUARE_MASK: u16 = 0b11_1111;
    const TO_SHIFT: u16 = 6;
    const KIND_SHIFT: u16 = 12;

    /// Creates a new [`Move`].
    #[inline(always)]
    pub(crate) const fn new(from: Square, to: Square, kind: MoveKind) -> Self {
        Self { from, to, kind }
    }

    #[inline(always)]
    pub const fn from(&self) -> Square {
        self.from
    }

    #[inline(always)]
    pub const fn to(&self) -> Square {
        self.to
    }

    #[inline(always)]
    pub const fn kind(&self) -> MoveKind {
        self.kind
    }

    /// The piece kind this move promotes to, if it is a promotion.
    #[inline(always)]
    pub const fn promotion(&self) -> Option<PieceKind> {
        match self.kind {
            MoveKind::Promotion(kind) => Some(kind),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn is_castle(&self) -> bool {
        matches!(self.kind, MoveKind::Castle)
    }

    #[inline(always)]
    pub const fn is_en_passant(&self) -> bool {
        matches!(self.kind, MoveKind::EnPassant)
    }

    /// Packs an optional move into 16 bits, with `0` standing for "no move".
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// let mut board = Board::default();
    /// let mv = board.legal_moves()[0];
    /// assert_eq!(Move::unpack(Move::pack(Some(mv))), Some(mv));
    /// assert_eq!(Move::unpack(Move::pack(None)), None);
    /// ```
    #[inline(always)]
    pub const fn pack(mv: Option<Self>) -> u16 {
        match mv {
            Some(mv) => {
                mv.from.0 as u16
                    | (mv.to.0 as u16) << Self::TO_SHIFT
                    | mv.kind.bits() << Self::KIND_SHIFT
            }
            None => 0,
        }
    }

    /// Inverse of [`Move::pack`].
    #[inline(always)]
    pub const fn unpack(bits: u16) -> Option<Self> {
        let from = Square((bits & Self::SQUARE_MASK) as u8);
        let to = Square((bits >> Self::TO_SHIFT & Self::SQUARE_MASK) as u8);

        // A move never stays on its own square, so this pattern is free to mean "none"
        if from.0 == to.0 {
            return None;
        }

        Some(Self::new(from, to, MoveKind::from_bits(bits >> Self::KIND_SHIFT)))
    }

    /// Parses `text` and matches it against `legal`, returning the single legal move it names.
    ///
    /// Accepts coordinate notation with an optional promotion letter (`e2e4`, `e7e8q`),
    /// and castling as `O-O`/`O-O-O`, also spelled with `0`, lowercase `o`, or without dashes.
    /// Trailing check and annotation marks (`+`, `#`, `!`, `?`) are ignored. A promotion
    /// without a piece letter promotes to a queen.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// let mut board = Board::default();
    /// let legal = board.legal_moves();
    /// assert_eq!(Move::parse("e2e4", &legal).unwrap().to_string(), "e2e4");
    /// assert_eq!(Move::parse("e2e5", &legal), Err(MoveTextError::Illegal("e2e5".into())));
    /// assert_eq!(Move::parse("hello", &legal), Err(MoveTextError::Malformed("hello".into())));
    /// ```
    pub fn parse(text: &str, legal: &[Self]) -> Result<Self, MoveTextError> {
        let trimmed = text.trim().trim_end_matches(['+', '#', '!', '?']);

        let mut candidates = if let Some(short) = Self::parse_castle(trimmed) {
            let file = if short { File::G } else { File::C };
            legal
                .iter()
                .filter(|mv| mv.is_castle() && mv.to().file() == file)
                .copied()
                .collect::<Vec<_>>()
        } else {
            let malformed = || MoveTextError::Malformed(text.to_string());
            let (from, to) = (
                trimmed.get(0..2).ok_or_else(malformed)?,
                trimmed.get(2..4).ok_or_else(malformed)?,
            );
            let from = Square::from_uci(from).map_err(|_| malformed())?;
            let to = Square::from_uci(to).map_err(|_| malformed())?;

            let promotion = match trimmed.get(4..) {
                None | Some("") => None,
                Some(p) if p.len() == 1 => Some(
                    p.chars()
                        .next()
                        .and_then(|c| PieceKind::from_uci(c).ok())
                        .filter(|kind| PieceKind::PROMOTIONS.contains(kind))
                        .ok_or_else(malformed)?,
                ),
                Some(_) => return Err(malformed()),
            };

            let mut candidates = legal
                .iter()
                .filter(|mv| mv.from() == from && mv.to() == to)
                .filter(|mv| promotion.is_none() || mv.promotion() == promotion)
                .copied()
                .collect::<Vec<_>>();

            let queen = Some(PieceKind::Queen);
            if promotion.is_none() && candidates.iter().any(|mv| mv.promotion() == queen) {
                candidates.retain(|mv| mv.promotion() == queen);
            }

            candidates
        };

        match candidates.len() {
            0 => Err(MoveTextError::Illegal(text.to_string())),
            1 => Ok(candidates.remove(0)),
            _ => Err(MoveTextError::Ambiguous(text.to_string())),
        }
    }

    /// Returns `Some(true)` for a kingside castling spelling, `Some(false)` for queenside.
    ///
    /// A spelling repeats one of `O`, `o` or `0`, either with a dash between every pair or with
    /// no dashes at all.
    fn parse_castle(text: &str) -> Option<bool> {
        let oh = text.chars().next().filter(|c| matches!(c, 'O' | 'o' | '0'))?;

        let count = if text.contains('-') {
            text.split('-').try_fold(0usize, |n, part| {
                (part.len() == 1 && part.starts_with(oh)).then_some(n + 1)
            })?
        } else {
            text.chars().all(|c| c == oh).then_some(text.len())?
        };

        match count {
            2 => Some(true),
            3 => Some(false),
            _ => None,
        }
    }
}

impl PartialEq<&str> for Move {
    #[inline(always)]
    fn eq(&self, other: &&str) -> bool {
        self.to_string() == *other
    }
}

impl fmt::Display for Move {
    /// A [`Move`] is displayed in coordinate notation, like `e7e8q`.
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(promotion) = self.promotion() {
            write!(f, "{}{}{}", self.from, self.to, promotion)
        } else {
            write!(f, "{}{}", self.from, self.to)
        }
    }
}

impl fmt::Debug for Move {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} ({:?})", self.kind)
    }
}
