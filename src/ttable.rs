/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::mem::size_of;

use tracing::trace;

use crate::{Move, Score, ZobristKey};

/// Number of bytes in a megabyte
pub const BYTES_IN_MB: usize = 1024 * 1024;

/// Number of slots sharing one bucket. Must be a power of two.
pub const BUCKET_LEN: usize = 4;

/// Number of bits used to store the depth of an entry.
const DEPTH_BITS: u32 = 8;

/// Number of bits used to store the generation an entry was written in.
const DATE_BITS: u32 = 12;

const DATE_MASK: u16 = (1 << DATE_BITS) - 1;

/// Number of slots inspected by [`TTable::load`].
const LOAD_SAMPLE: usize = 10_000;

/// A single slot of the table, exactly as stored in memory.
///
/// The key is stored XOR'ed with the data, so that a slot whose halves were written separately
/// no longer matches any key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
struct Slot {
    key: u64,
    data: u64,
}

/// An unpacked entry of the [`TTable`].
///
/// Bound flags follow a fail-soft convention:
/// `upper` means the real score is at most `score`, `lower` means it is at least `score`,
/// and neither means `score` is exact.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TTableEntry {
    /// Salted hash of the position, used to find the slot on write.
    key: u64,

    /// Best move found for this position.
    pub bestmove: Option<Move>,

    /// Best score found for this position.
    pub score: Score,

    /// Depth at which the data for this entry was found.
    pub depth: u8,

    /// Generation during which this entry was written.
    date: u16,

    pub upper: bool,

    pub lower: bool,

    /// The score is a game-theoretical value that holds regardless of depth.
    pub hard: bool,

    /// The score is a win or loss stored relative to the position itself, not the search root.
    pub win_loss: bool,
}

impl TTableEntry {
    const MOVE_SHIFT: u32 = 0;
    const SCORE_SHIFT: u32 = 16;
    const DEPTH_SHIFT: u32 = 32;
    const DATE_SHIFT: u32 = Self::DEPTH_SHIFT + DEPTH_BITS;
    const UPPER_SHIFT: u32 = Self::DATE_SHIFT + DATE_BITS;
    const LOWER_SHIFT: u32 = Self::UPPER_SHIFT + 1;
    const HARD_SHIFT: u32 = Self::LOWER_SHIFT + 1;
    const WIN_LOSS_SHIFT: u32 = Self::HARD_SHIFT + 1;

    /// An empty entry for `key`, as returned on a table miss.
    #[inline(always)]
    fn empty(key: u64) -> Self {
        Self::unpack(key, 0)
    }

    /// Returns `true` if this entry holds neither a move nor any bound.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.bestmove.is_none() && !self.upper && !self.lower && self.depth == 0
    }

    #[inline(always)]
    const fn pack(&self) -> u64 {
        (Move::pack(self.bestmove) as u64) << Self::MOVE_SHIFT
            | (self.score.inner() as i16 as u16 as u64) << Self::SCORE_SHIFT
            | (self.depth as u64) << Self::DEPTH_SHIFT
            | ((self.date & DATE_MASK) as u64) << Self::DATE_SHIFT
            | (self.upper as u64) << Self::UPPER_SHIFT
            | (self.lower as u64) << Self::LOWER_SHIFT
            | (self.hard as u64) << Self::HARD_SHIFT
            | (self.win_loss as u64) << Self::WIN_LOSS_SHIFT
    }

    #[inline(always)]
    fn unpack(key: u64, data: u64) -> Self {
        let flag = |shift: u32| data >> shift & 1 != 0;

        Self {
            key,
            bestmove: Move::unpack((data >> Self::MOVE_SHIFT) as u16),
            score: Score::new((data >> Self::SCORE_SHIFT) as u16 as i16 as i32),
            depth: (data >> Self::DEPTH_SHIFT) as u8,
            date: (data >> Self::DATE_SHIFT) as u16 & DATE_MASK,
            upper: flag(Self::UPPER_SHIFT),
            lower: flag(Self::LOWER_SHIFT),
            hard: flag(Self::HARD_SHIFT),
            win_loss: flag(Self::WIN_LOSS_SHIFT),
        }
    }
}

/// Transposition Table.
///
/// A power-of-two number of slots, grouped into buckets of [`BUCKET_LEN`].
/// Each position maps to exactly one bucket, and may occupy any slot within it.
///
/// Clearing the table does not touch its memory: a salt mixed into every lookup is changed instead,
/// orphaning all existing entries.
#[derive(Debug)]
pub struct TTable {
    slots: Vec<Slot>,

    /// Current generation. Entries from older generations are replaced first.
    now: u16,

    /// Mixed into every key before lookup.
    salt: u64,

    /// Key of the last root position searched.
    last_root: Option<ZobristKey>,
}

impl TTable {
    /// Default size of the Transposition Table, in megabytes.
    pub const DEFAULT_SIZE: usize = 16;

    /// Minimum size of the Transposition Table, in megabytes.
    pub const MIN_SIZE: usize = 1;

    /// Maximum size of the Transposition Table, in megabytes.
    pub const MAX_SIZE: usize = 1_024;

    /// Create a new [`TTable`] that is `size` megabytes.
    #[inline(always)]
    pub fn new(size: usize) -> Self {
        Self::from_bytes(size * BYTES_IN_MB)
    }

    /// Create a new [`TTable`] of at most `bytes` bytes, but never smaller than a single bucket.
    pub fn from_bytes(bytes: usize) -> Self {
        let mut table = Self {
            slots: vec![Slot::default(); BUCKET_LEN],
            now: 0,
            salt: 0,
            last_root: None,
        };
        table.resize(bytes);
        table
    }

    /// Changes the size of this table to the largest power of two slots fitting in `bytes`.
    ///
    /// Growing duplicates every bucket into its new aliases. Shrinking keeps,
    /// for every slot of the smaller table, the highest-priority entry among the slots folding onto it.
    pub fn resize(&mut self, bytes: usize) {
        let slot_size = size_of::<Slot>();
        let bytes = bytes.max(BUCKET_LEN * slot_size);

        let mut new_len = BUCKET_LEN;
        while 2 * new_len * slot_size <= bytes {
            new_len *= 2;
        }

        let old_len = self.slots.len();
        if new_len < old_len {
            for i in 0..old_len {
                let j = i & (new_len - 1);
                if self.priority(j) < self.priority(i) {
                    self.slots[j] = self.slots[i];
                }
            }
            self.slots.truncate(new_len);
            self.slots.shrink_to_fit();
        } else if new_len > old_len {
            self.slots.reserve_exact(new_len - old_len);
            for i in old_len..new_len {
                let slot = self.slots[i & (old_len - 1)];
                self.slots.push(slot);
            }
        }

        trace!(old_len, new_len, "resized transposition table");
    }

    /// Orphans every entry of this table in constant time.
    pub fn clear(&mut self) {
        // xorshift64*
        let mut x = !self.salt;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        x = x.wrapping_mul(2685821657736338717);
        self.salt = !x;
        self.last_root = None;

        trace!(salt = self.salt, "cleared transposition table");
    }

    /// Informs the table that a search is starting from `root`.
    ///
    /// If `root` differs from the previous root, a new generation begins.
    /// Returns `true` in that case.
    pub fn new_search(&mut self, root: ZobristKey) -> bool {
        if self.last_root == Some(root) {
            return false;
        }

        self.last_root = Some(root);
        self.now = (self.now + 1) & DATE_MASK;
        true
    }

    /// Returns the number of slots in this [`TTable`].
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the size of this [`TTable`], in bytes.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.slots.len() * size_of::<Slot>()
    }

    /// Fraction of slots (sampled from the start of the table) written in the current generation.
    pub fn load(&self) -> f64 {
        let sample = &self.slots[..self.slots.len().min(LOAD_SAMPLE)];
        let current = sample
            .iter()
            .filter(|slot| TTableEntry::unpack(0, slot.data).date == self.now)
            .count();

        current as f64 / sample.len() as f64
    }

    /// Index of the first slot of the bucket of a salted hash.
    #[inline(always)]
    fn bucket(&self, hash: u64) -> usize {
        hash as usize & (self.slots.len() - BUCKET_LEN)
    }

    /// Replacement priority of the slot at `index`. Recent and deep entries are kept longest.
    #[inline(always)]
    fn priority(&self, index: usize) -> i32 {
        let entry = TTableEntry::unpack(0, self.slots[index].data);
        let age = self.now.wrapping_sub(entry.date) & DATE_MASK;
        (-(age as i32) << DEPTH_BITS) + entry.depth as i32
    }

    /// Looks up `key`, returning its entry, or an empty entry if it is absent.
    ///
    /// Win/loss scores are re-expressed relative to the search root, `root_distance` plies above.
    pub fn read(&self, key: ZobristKey, root_distance: usize) -> TTableEntry {
        let hash = key.inner() ^ self.salt;
        let bucket = self.bucket(hash);

        for slot in &self.slots[bucket..bucket + BUCKET_LEN] {
            if slot.key ^ slot.data == hash {
                let mut entry = TTableEntry::unpack(hash, slot.data);
                if entry.win_loss {
                    let distance = root_distance as i32;
                    entry.score += if entry.score >= 0 { -distance } else { distance };
                }
                return entry;
            }
        }

        TTableEntry::empty(hash)
    }

    /// Stores a search result for the position `entry` was read for, and returns the score to use.
    ///
    /// The bound kind is derived from `score` and the window `(alpha, beta)`.
    /// A hard bound already in `entry` that the new score cannot improve is kept, and its score returned instead.
    pub fn write(
        &mut self,
        mut entry: TTableEntry,
        depth: usize,
        score: Score,
        alpha: Score,
        beta: Score,
        root_distance: usize,
    ) -> Score {
        if entry.hard
            && ((entry.lower && score <= entry.score) || (entry.upper && score >= entry.score))
        {
            return entry.score;
        }

        entry.score = score;
        entry.depth = depth.min(u8::MAX as usize) as u8;
        entry.date = self.now;
        entry.upper = score <= alpha;
        entry.lower = score >= beta;
        entry.hard = false;
        entry.win_loss = false;

        // Proven results are stored relative to this position, and hold at any depth
        if score.is_win() {
            if score > Score::MAX_EVAL + 1 {
                entry.score += root_distance as i32;
                entry.win_loss = true;
            }
            entry.hard = entry.lower;
        }

        if score.is_loss() {
            if score < -Score::MAX_EVAL - 1 {
                entry.score -= root_distance as i32;
                entry.win_loss = true;
            }
            entry.hard = entry.upper;
        }

        // The slot already holding this key, or else the lowest priority slot of the bucket
        let bucket = self.bucket(entry.key);
        let index = (bucket..bucket + BUCKET_LEN)
            .find(|&i| self.slots[i].key ^ self.slots[i].data == entry.key)
            .unwrap_or_else(|| {
                (bucket..bucket + BUCKET_LEN)
                    .min_by_key(|&i| self.priority(i))
                    .unwrap_or(bucket)
            });

        let data = entry.pack();
        self.slots[index] = Slot {
            key: entry.key ^ data,
            data,
        };

        score
    }
}

impl Default for TTable {
    #[inline(always)]
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    /// Keys of `n` distinct positions reachable from the start position.
    fn distinct_keys(n: usize) -> Vec<ZobristKey> {
        let mut board = Board::default();
        let mut keys = vec![board.key()];
        for mv in board.legal_moves() {
            board.make_move(mv);
            for reply in board.legal_moves() {
                board.make_move(reply);
                keys.push(board.key());
                board.undo_move();
            }
            board.undo_move();
        }
        keys.truncate(n);
        keys
    }

    #[test]
    fn test_size_is_power_of_two() {
        let tt = TTable::new(1);
        assert_eq!(tt.size(), BYTES_IN_MB);
        assert!(tt.capacity().is_power_of_two());

        let tt = TTable::from_bytes(3 * BYTES_IN_MB);
        assert_eq!(tt.size(), 2 * BYTES_IN_MB, "Sizes round down to a power of two");

        let tt = TTable::from_bytes(0);
        assert_eq!(tt.capacity(), BUCKET_LEN, "Never smaller than one bucket");
    }

    #[test]
    fn test_write_then_read() {
        let mut tt = TTable::new(1);
        let key = Board::default().key();
        let (alpha, beta) = (Score::new(-50), Score::new(50));

        let mut entry = tt.read(key, 0);
        assert!(entry.is_empty(), "A fresh table has no entries");

        let mv = Board::default().legal_moves()[0];
        entry.bestmove = Some(mv);
        assert_eq!(tt.write(entry, 5, Score::new(12), alpha, beta, 0), 12);

        let entry = tt.read(key, 0);
        assert_eq!(entry.score, 12);
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.bestmove, Some(mv));
        assert!(!entry.upper && !entry.lower, "Inside the window is exact");

        tt.write(entry, 6, Score::new(-70), alpha, beta, 0);
        let entry = tt.read(key, 0);
        assert!(entry.upper && !entry.lower, "Failing low is an upper bound");

        tt.write(entry, 6, Score::new(90), alpha, beta, 0);
        let entry = tt.read(key, 0);
        assert!(entry.lower && !entry.upper, "Failing high is a lower bound");
    }

    #[test]
    fn test_mate_scores_are_root_relative() {
        let mut tt = TTable::new(1);
        let key = Board::default().key();

        // Found mate in 5 plies from the root, at a node 3 plies deep
        let score = Score::mate_in(5);
        let entry = tt.read(key, 3);
        tt.write(entry, 1, score, Score::new(0), Score::new(1), 3);

        let entry = tt.read(key, 3);
        assert_eq!(entry.score, score, "Same node distance gives the same score");
        assert!(entry.hard && entry.lower && entry.win_loss);

        // The same position reached 1 ply from a later root is mate in 3 from there
        let entry = tt.read(key, 1);
        assert_eq!(entry.score, Score::mate_in(3));

        // Losses are adjusted the other way
        let key = Board::from_fen(FEN_KIWIPETE).unwrap().key();
        let entry = tt.read(key, 4);
        tt.write(entry, 1, Score::mated_in(6), Score::new(0), Score::new(1), 4);
        let entry = tt.read(key, 2);
        assert_eq!(entry.score, Score::mated_in(4));
        assert!(entry.hard && entry.upper && entry.win_loss);
    }

    #[test]
    fn test_hard_bound_is_kept() {
        let mut tt = TTable::new(1);
        let key = Board::default().key();

        let entry = tt.read(key, 0);
        tt.write(entry, 1, Score::mate_in(9), Score::new(0), Score::new(1), 0);

        // A lower bound that is worse than the proven one does not replace it
        let entry = tt.read(key, 0);
        let kept = tt.write(entry, 20, Score::new(300), Score::new(0), Score::new(1), 0);
        assert_eq!(kept, Score::mate_in(9));
        assert_eq!(tt.read(key, 0).score, Score::mate_in(9));
    }

    #[test]
    fn test_replacement_within_bucket() {
        // A single bucket: every key competes for the same slots
        let mut tt = TTable::from_bytes(0);
        let keys = distinct_keys(BUCKET_LEN + 1);
        let (alpha, beta) = (Score::new(-1), Score::new(1));

        for (depth, &key) in keys.iter().take(BUCKET_LEN).enumerate() {
            let entry = tt.read(key, 0);
            tt.write(entry, depth + 1, Score::DRAW, alpha, beta, 0);
        }
        for &key in &keys[..BUCKET_LEN] {
            assert!(!tt.read(key, 0).is_empty());
        }

        // The shallowest entry is evicted
        let entry = tt.read(keys[BUCKET_LEN], 0);
        tt.write(entry, 10, Score::DRAW, alpha, beta, 0);
        assert!(tt.read(keys[0], 0).is_empty());
        assert_eq!(tt.read(keys[BUCKET_LEN], 0).depth, 10);

        // Rewriting an existing key updates it in place, regardless of priority
        let entry = tt.read(keys[1], 0);
        tt.write(entry, 0, Score::new(7), alpha, beta, 0);
        assert_eq!(tt.read(keys[1], 0).score, 7);
        assert_eq!(tt.read(keys[BUCKET_LEN], 0).depth, 10);
    }

    #[test]
    fn test_older_generations_are_replaced_first() {
        let mut tt = TTable::from_bytes(0);
        let keys = distinct_keys(BUCKET_LEN + 1);
        let (alpha, beta) = (Score::new(-1), Score::new(1));

        for &key in &keys[..BUCKET_LEN] {
            let entry = tt.read(key, 0);
            tt.write(entry, 30, Score::DRAW, alpha, beta, 0);
        }

        // A new root starts a new generation, in which even a shallow entry wins a slot
        tt.new_search(keys[BUCKET_LEN]);
        let entry = tt.read(keys[BUCKET_LEN], 0);
        tt.write(entry, 1, Score::DRAW, alpha, beta, 0);
        assert_eq!(tt.read(keys[BUCKET_LEN], 0).depth, 1);
    }

    #[test]
    fn test_clear_orphans_entries() {
        let mut tt = TTable::new(1);
        let key = Board::default().key();

        let entry = tt.read(key, 0);
        tt.write(entry, 3, Score::new(25), Score::new(0), Score::new(50), 0);
        assert!(!tt.read(key, 0).is_empty());

        tt.clear();
        assert!(tt.read(key, 0).is_empty(), "Cleared entries are unreachable");
    }

    #[test]
    fn test_resize_keeps_entries() {
        let mut tt = TTable::new(1);
        let keys = distinct_keys(200);
        let (alpha, beta) = (Score::new(-1), Score::new(1));

        for &key in &keys {
            let entry = tt.read(key, 0);
            tt.write(entry, 4, Score::new(3), alpha, beta, 0);
        }

        tt.resize(4 * BYTES_IN_MB);
        assert_eq!(tt.size(), 4 * BYTES_IN_MB);
        for &key in &keys {
            assert_eq!(tt.read(key, 0).score, 3, "Growing must keep every entry");
        }

        // Shrinking to one bucket keeps only the best entries, but must not corrupt any
        tt.resize(0);
        let kept = keys.iter().filter(|&&key| !tt.read(key, 0).is_empty()).count();
        assert!(kept <= BUCKET_LEN);
    }

    #[test]
    fn test_load() {
        let mut tt = TTable::from_bytes(64 * size_of::<Slot>());
        tt.new_search(Board::default().key());
        assert_eq!(tt.load(), 0.0);

        for &key in &distinct_keys(300) {
            let entry = tt.read(key, 0);
            tt.write(entry, 1, Score::DRAW, Score::new(-1), Score::new(1), 0);
        }
        assert!(tt.load() > 0.0);
    }
}
