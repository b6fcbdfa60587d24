/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::fmt;

pub type ScoreInternal = i32;

/// A numerical representation of the evaluation of a position, in centipawns, from the side to move's perspective.
///
/// Scores beyond [`Score::MAX_EVAL`] are proven wins, and scores close to [`Score::MATE`] count down the plies to mate.
#[derive(Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Score(ScoreInternal);

impl Score {
    /// Larger than any score a search can return. Used as the initial window.
    pub const INF: Self = Self(i16::MAX as ScoreInternal);

    /// Score of delivering mate right now.
    pub const MATE: Self = Self(32_000);

    /// Largest score that is not a proven win.
    pub const MAX_EVAL: Self = Self(29_999);

    /// Score of a draw.
    pub const DRAW: Self = Self(0);

    #[inline(always)]
    pub const fn new(score: ScoreInternal) -> Self {
        Self(score)
    }

    #[inline(always)]
    pub const fn inner(&self) -> ScoreInternal {
        self.0
    }

    /// Score of the side to move being checkmated, `ply` half-moves from the root.
    #[inline(always)]
    pub const fn mated_in(ply: usize) -> Self {
        Self(-Self::MATE.0 + ply as ScoreInternal)
    }

    /// Score of the side to move delivering mate `ply` half-moves from the root.
    #[inline(always)]
    pub const fn mate_in(ply: usize) -> Self {
        Self(Self::MATE.0 - ply as ScoreInternal)
    }

    /// Returns `true` if this score is a proven win for the side to move.
    #[inline(always)]
    pub const fn is_win(&self) -> bool {
        self.0 > Self::MAX_EVAL.0
    }

    /// Returns `true` if this score is a proven loss for the side to move.
    #[inline(always)]
    pub const fn is_loss(&self) -> bool {
        self.0 < -Self::MAX_EVAL.0
    }

    /// Returns `true` if this score carries a distance to mate.
    ///
    /// `MAX_EVAL + 1` is a proven win without a known distance, so it is not a mate score.
    #[inline(always)]
    pub const fn is_mate(&self) -> bool {
        self.0.abs() > Self::MAX_EVAL.0 + 1
    }

    /// Returns the number of plies (half moves) this score is from mate.
    #[inline(always)]
    pub const fn plies_to_mate(&self) -> ScoreInternal {
        Self::MATE.0 - self.0.abs()
    }

    /// Returns the number of moves (full moves) this score is from mate.
    ///
    /// Negative if the side to move is getting mated.
    #[inline(always)]
    pub const fn moves_to_mate(&self) -> ScoreInternal {
        let plies = self.plies_to_mate();

        // The winning side needs to make the mating move itself
        if self.0 > 0 {
            (plies + 1) / 2
        } else {
            -plies / 2
        }
    }

    /// Clamps this score into the range of non-proven evaluations.
    #[inline(always)]
    pub const fn clamp_eval(self) -> Self {
        if self.0 > Self::MAX_EVAL.0 {
            Self::MAX_EVAL
        } else if self.0 < -Self::MAX_EVAL.0 {
            Self(-Self::MAX_EVAL.0)
        } else {
            self
        }
    }

    /// Returns the absolute value of this [`Score`].
    #[inline(always)]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

macro_rules! impl_binary_op {
    ($trait:tt, $fn:ident) => {
        impl std::ops::$trait for Score {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: Self) -> Self::Output {
                Self(self.0.$fn(rhs.0))
            }
        }

        impl std::ops::$trait<ScoreInternal> for Score {
            type Output = Self;

            #[inline(always)]
            fn $fn(self, rhs: ScoreInternal) -> Self::Output {
                Self(self.0.$fn(rhs))
            }
        }
    };
}

macro_rules! impl_binary_op_assign {
    ($trait:tt, $fn:ident) => {
        impl std::ops::$trait for Score {
            #[inline(always)]
            fn $fn(&mut self, rhs: Self) {
                self.0.$fn(rhs.0);
            }
        }

        impl std::ops::$trait<ScoreInternal> for Score {
            #[inline(always)]
            fn $fn(&mut self, rhs: ScoreInternal) {
                self.0.$fn(rhs);
            }
        }
    };
}

impl_binary_op!(Add, add);
impl_binary_op!(Sub, sub);

impl_binary_op_assign!(AddAssign, add_assign);
impl_binary_op_assign!(SubAssign, sub_assign);

impl std::ops::Neg for Score {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl PartialEq<ScoreInternal> for Score {
    #[inline(always)]
    fn eq(&self, other: &ScoreInternal) -> bool {
        self.0.eq(other)
    }
}

impl PartialOrd<ScoreInternal> for Score {
    #[inline(always)]
    fn partial_cmp(&self, other: &ScoreInternal) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

impl fmt::Display for Score {
    /// Mate scores are displayed as `mate N`, everything else as `cp N`.
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mate() {
            write!(f, "mate {}", self.moves_to_mate())
        } else {
            write!(f, "cp {}", self.0)
        }
    }
}

impl fmt::Debug for Score {
    #[inline(always)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mate() {
            write!(
                f,
                "{} (mate in {} plies {} moves)",
                self.0,
                self.plies_to_mate(),
                self.moves_to_mate()
            )
        } else {
            write!(f, "{}", self.0)
        }
    }
}
