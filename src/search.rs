/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{
    Board, Evaluate, Move, MovePicker, OrderedMoves, PieceKind, Score, TTable, KEEP_ALL,
};

/// Maximum depth that can be searched
pub const MAX_DEPTH: usize = u8::MAX as usize / 2;

/// Number of nodes between checks of the clock and the cancellation token.
const CHECK_INTERVAL: u64 = 1024;

/// Number of killer moves remembered per ply.
const NUM_KILLERS: usize = 5;

/// Slot a new killer move enters at. Killers before it must prove themselves twice.
const NEW_KILLER_INDEX: usize = 2;

/// Time kept in reserve on the clock when allotting time to a move.
const CLOCK_SAFETY: Duration = Duration::from_millis(2_500);

/// Least time allotted to a move.
const MIN_MOVE_TIME: Duration = Duration::from_millis(30);

/// Number of moves the clock is spread over when the time control does not say.
const DEFAULT_MOVES_TO_GO: u32 = 25;

type Killers = [Option<Move>; NUM_KILLERS];

/// A shareable flag that asks a running search to stop as soon as possible.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[inline(always)]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Raised inside the search when a limit is hit, and caught at the root.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Aborted;

/// Represents the best sequence of moves found during a search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PrincipalVariation(Vec<Move>);

impl PrincipalVariation {
    #[inline(always)]
    pub fn moves(&self) -> &[Move] {
        &self.0
    }

    #[inline(always)]
    pub fn first(&self) -> Option<Move> {
        self.0.first().copied()
    }
}

impl fmt::Display for PrincipalVariation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mv) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{mv}")?;
        }
        Ok(())
    }
}

/// The result of a search, containing the best move found, score, and total nodes searched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    /// The depth of the last completed iteration.
    pub depth: usize,

    /// Number of nodes searched.
    pub nodes: u64,

    /// Score of the position, from the side to move's perspective.
    pub score: Score,

    /// Best move found during the search, or `None` if there are no legal moves.
    pub bestmove: Option<Move>,

    /// Expected reply to `bestmove`, if the principal variation has one.
    pub ponder: Option<Move>,

    /// Principal variation of the last completed iteration.
    pub pv: PrincipalVariation,

    /// Time spent searching.
    pub elapsed: Duration,
}

/// Configuration variables for executing a [`Search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchConfig {
    /// Maximum depth to execute the search.
    pub max_depth: usize,

    /// Node allowance.
    ///
    /// If the search exceeds this many nodes, it will exit as quickly as possible.
    pub max_nodes: u64,

    /// Hard limit on search time.
    ///
    /// During *any* point in the search, if this limit is exceeded, the search will cancel.
    pub movetime: Option<Duration>,

    /// Soft limit on search time.
    ///
    /// No new iteration is started once half of this has passed, since it would probably not
    /// finish in time.
    pub target: Option<Duration>,
}

impl SearchConfig {
    /// Sets the time limits for a move played on `clock`.
    ///
    /// `halfmove` is the halfmove clock of the position to search. The longer a game goes without
    /// captures or pawn moves, the fewer moves the remaining time is spread over.
    ///
    /// # Example
    /// ```
    /// # use std::time::Duration;
    /// # use tadpole::*;
    /// let clock = Clock {
    ///     time: Duration::from_secs(60),
    ///     ..Default::default()
    /// };
    /// let config = SearchConfig::default().with_clock(clock, 0);
    /// assert_eq!(config.target, Some(Duration::from_millis(2_300)));
    /// assert!(config.movetime.unwrap() > config.target.unwrap());
    /// ```
    pub fn with_clock(mut self, clock: Clock, halfmove: u16) -> Self {
        let mut moves_to_go = clock
            .movestogo
            .filter(|&moves| moves > 0)
            .unwrap_or(DEFAULT_MOVES_TO_GO);

        let idle_moves = halfmove / 2;
        moves_to_go = match idle_moves {
            15 => moves_to_go.min(5),
            25 => moves_to_go.min(4),
            35 => moves_to_go.min(3),
            45 => moves_to_go.min(2),
            _ => moves_to_go,
        };
        let panic_moves = moves_to_go.min(if idle_moves < 35 { 3 } else { 1 });

        self.target = Some(clock.allot(moves_to_go));
        self.movetime = Some(clock.allot(panic_moves).min(clock.allot(1)));
        self
    }
}

impl Default for SearchConfig {
    /// A default [`SearchConfig`] will permit an "infinite" search.
    #[inline(always)]
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_nodes: u64::MAX,
            movetime: None,
            target: None,
        }
    }
}

/// Time left on the clock of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Clock {
    /// Time remaining.
    pub time: Duration,

    /// Time added after every move.
    pub inc: Duration,

    /// Moves until the next time control, if known.
    pub movestogo: Option<u32>,
}

impl Clock {
    /// Time for each of the next `moves` moves, if the clock is shared evenly between them.
    fn allot(&self, moves: u32) -> Duration {
        let moves = moves.max(1);
        let total = self
            .time
            .saturating_add(self.inc.saturating_mul(moves - 1))
            .saturating_sub(CLOCK_SAFETY);

        (total / moves).max(MIN_MOVE_TIME)
    }
}

/// Executes a search on a [`Board`].
///
/// Iterative deepening drives a principal variation search. Every move after the first is tried with
/// a null-window scout, and only re-searched with the full window if it might be better.
/// Scout nodes use null move pruning, internal iterative deepening, late move reductions, and killer moves.
/// All leaves are resolved by a quiescence search over captures that do not lose material.
pub struct Search<'a, E> {
    board: &'a mut Board,

    /// Transposition table used to cache information during search.
    ttable: &'a mut TTable,

    evaluator: &'a E,

    /// Configuration variables for this instance of the search.
    config: SearchConfig,

    /// If this is ever set, the search must exit as soon as possible.
    token: CancellationToken,

    starttime: Instant,

    /// Number of nodes searched.
    nodes: u64,

    /// Number of undoable moves on the board when the search started.
    root_moves: usize,

    /// Principal variation, as a flat list indexed by ply.
    pv: Vec<Move>,

    /// Moves that recently caused a cutoff, per ply.
    killers: Vec<Killers>,

    /// Stays set during an iteration as long as every alternative move was proven to be a mate or a draw.
    mate_stop: bool,
}

impl<'a, E: Evaluate> Search<'a, E> {
    /// Construct a new [`Search`] instance to execute.
    pub fn new(
        board: &'a mut Board,
        ttable: &'a mut TTable,
        evaluator: &'a E,
        config: SearchConfig,
        token: CancellationToken,
    ) -> Self {
        let root_moves = board.num_undoable();

        Self {
            board,
            ttable,
            evaluator,
            config,
            token,
            starttime: Instant::now(),
            nodes: 0,
            root_moves,
            pv: Vec::new(),
            killers: Vec::new(),
            mate_stop: false,
        }
    }

    /// Start the search, returning a [`SearchResult`].
    ///
    /// `progress` is called after every completed iteration, and may return `true` to stop the search.
    /// The board is left as it was found.
    ///
    /// # Example
    /// ```
    /// # use tadpole::*;
    /// let mut board = Board::from_fen("k7/8/KQ6/8/8/8/8/8 w - - 0 1").unwrap();
    /// let mut ttable = TTable::new(1);
    /// let config = SearchConfig {
    ///     max_depth: 3,
    ///     ..Default::default()
    /// };
    ///
    /// let evaluator = MaterialEvaluator::default();
    /// let search = Search::new(
    ///     &mut board,
    ///     &mut ttable,
    ///     &evaluator,
    ///     config,
    ///     CancellationToken::new(),
    /// );
    /// let result = search.start(|_| false);
    /// assert_eq!(result.score, Score::mate_in(1));
    /// ```
    pub fn start(mut self, mut progress: impl FnMut(&SearchResult) -> bool) -> SearchResult {
        self.ttable.new_search(self.board.key());

        debug!(
            fen = %self.board.to_fen(),
            max_depth = self.config.max_depth,
            max_nodes = self.config.max_nodes,
            movetime = ?self.config.movetime,
            target = ?self.config.target,
            "starting search"
        );

        // Initialize `bestmove` to the first move available
        let mut result = SearchResult {
            bestmove: self.board.legal_moves().first().copied(),
            ..Default::default()
        };

        for depth in 0..=self.config.max_depth {
            self.mate_stop = true;

            let score = match self.pv_search(depth, -Score::INF, Score::INF, 0) {
                Ok(score) => score,
                Err(Aborted) => {
                    self.unwind();

                    // A root move only replaces the first one after a complete search proved it better
                    if let Some(&mv) = self.pv.first() {
                        if result.bestmove != Some(mv) {
                            result.bestmove = Some(mv);
                            result.ponder = None;
                            result.pv = PrincipalVariation(vec![mv]);
                        }
                    }

                    result.nodes = self.nodes;
                    result.elapsed = self.starttime.elapsed();
                    debug!(depth, nodes = self.nodes, "search aborted");
                    break;
                }
            };

            result.depth = depth;
            result.nodes = self.nodes;
            result.score = score;
            result.pv = PrincipalVariation(self.pv.clone());
            if let Some(mv) = result.pv.first() {
                if result.bestmove != Some(mv) {
                    result.ponder = None;
                }
                result.bestmove = Some(mv);
            }
            if let Some(&reply) = result.pv.moves().get(1) {
                result.ponder = Some(reply);
            }
            result.elapsed = self.starttime.elapsed();

            debug!(
                depth,
                nodes = self.nodes,
                score = %score,
                pv = %result.pv,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "completed iteration"
            );

            let past_target = self
                .config
                .target
                .is_some_and(|target| result.elapsed >= target / 2);

            if progress(&result)
                || (score.is_mate() && self.mate_stop && depth > 0)
                || past_target
                || self.should_stop()
            {
                break;
            }
        }

        result
    }

    /// Number of moves made since the root of the search.
    #[inline(always)]
    fn ply(&self) -> usize {
        self.board.num_undoable() - self.root_moves
    }

    /// Undoes every move made since the root of the search.
    fn unwind(&mut self) {
        while self.board.num_undoable() > self.root_moves {
            self.board.undo_move();
        }
    }

    /// Returns `true` if the search was cancelled or ran out of time.
    #[inline(always)]
    fn should_stop(&self) -> bool {
        self.token.is_cancelled()
            || self
                .config
                .movetime
                .is_some_and(|movetime| self.starttime.elapsed() >= movetime)
    }

    /// Raises an abort if any limit of the search was reached.
    #[inline(always)]
    fn check_abort(&self) -> Result<(), Aborted> {
        if self.nodes >= self.config.max_nodes
            || (self.nodes % CHECK_INTERVAL == 0 && self.should_stop())
        {
            return Err(Aborted);
        }
        Ok(())
    }

    /// Score of a position without legal moves.
    #[inline(always)]
    fn end_score(&self, in_check: bool) -> Score {
        if in_check {
            Score::mated_in(self.ply())
        } else {
            Score::DRAW
        }
    }

    /// Principal variation search with the window `(alpha, beta)`.
    ///
    /// The best line found from here is written into the PV, starting at `pv_index`.
    /// If the PV already holds a move at `pv_index`, it is searched first.
    fn pv_search(
        &mut self,
        depth: usize,
        alpha: Score,
        beta: Score,
        pv_index: usize,
    ) -> Result<Score, Aborted> {
        self.nodes += 1;
        let ply = self.ply();
        let is_root = ply == 0;

        if !is_root && self.board.is_repetition(ply) {
            self.pv.truncate(pv_index);
            return Ok(Score::DRAW);
        }

        let mut entry = self.ttable.read(self.board.key(), ply);
        if !is_root
            && (entry.depth as usize >= depth || entry.hard)
            && ((entry.upper && entry.score <= alpha)
                || (entry.lower && entry.score >= beta)
                || (entry.upper && entry.lower && alpha < entry.score && entry.score < beta))
        {
            self.pv.truncate(pv_index);
            return Ok(entry.score);
        }

        let in_check = self.board.in_check();
        let extension = in_check as usize;
        let mut min_score = KEEP_ALL;
        let mut best = -Score::INF;

        // Stand pat at the horizon, then only look at captures that do not lose material
        if depth == 0 && !in_check {
            best = self.evaluator.evaluate(self.board);
            if best >= beta {
                self.pv.truncate(pv_index);
                return Ok(self.ttable.write(entry, depth, best, alpha, beta, ply));
            }
            min_score = 0;
        }

        let generated = self.board.generate_moves();
        let mut moves = OrderedMoves::new(self.board, &generated, min_score);
        moves.retain_legal(self.board);
        moves.move_to_front(entry.bestmove);

        let Some(first) = moves.get(0) else {
            self.pv.truncate(pv_index);
            if best == -Score::INF {
                best = self.end_score(in_check);
            }
            return Ok(self.ttable.write(entry, depth, best, alpha, beta, ply));
        };

        // Follow the previous PV, or extend it
        let mut first = first;
        if pv_index < self.pv.len() {
            if moves.move_to_front(Some(self.pv[pv_index])) {
                first = self.pv[pv_index];
            } else {
                self.pv.truncate(pv_index);
            }
        }
        if pv_index >= self.pv.len() {
            self.pv.push(first);
        }

        // The first move gets the full window
        self.board.make_move(first);
        let new_depth = (depth + extension).saturating_sub(1);
        let score = -self.pv_search(new_depth, -beta, -alpha.max(best), pv_index + 1)?;
        self.board.undo_move();

        if score > best {
            best = score;
            entry.bestmove = Some(first);
        } else {
            self.pv.truncate(pv_index);
        }

        // The others get a reduced null window, and a full re-search if they look better
        for mv in (1..moves.len()).filter_map(|i| moves.get(i)) {
            if best >= beta {
                break;
            }

            self.board.make_move(mv);
            let new_alpha = alpha.max(best);
            let reduced = (depth + extension).saturating_sub(3);
            let score = -self.scout(reduced, -(new_alpha + 1), 1)?;

            if !score.is_mate() && score != Score::DRAW {
                self.mate_stop = false;
            }

            if score > best {
                let pv_len = self.pv.len();
                self.pv.push(mv);

                let score = -self.pv_search(new_depth, -beta, -new_alpha, pv_len + 1)?;
                if score > best {
                    best = score;
                    entry.bestmove = Some(mv);
                    self.pv.drain(pv_index..pv_len);
                } else {
                    self.pv.truncate(pv_len);
                }
            }

            self.board.undo_move();
        }

        Ok(self.ttable.write(entry, depth, best, alpha, beta, ply))
    }

    /// Null-window search around `alpha`, returning a fail-soft bound.
    ///
    /// Odd values of `node_type` are expected cut nodes, even values expected all nodes.
    fn scout(&mut self, depth: usize, alpha: Score, node_type: u32) -> Result<Score, Aborted> {
        self.nodes += 1;
        let ply = self.ply();

        if self.board.is_repetition(ply) {
            return Ok(Score::DRAW);
        }
        if depth == 0 {
            return Ok(self.qsearch(alpha));
        }
        self.check_abort()?;

        // No mate from here can be faster than this
        let mate_bound = Score::MATE - ply as i32 - 2;
        if alpha >= mate_bound {
            return Ok(mate_bound);
        }

        let is_cut_node = node_type & 1 == 1;
        let in_check = self.board.in_check();
        let key = self.board.key();
        let mut entry = self.ttable.read(key, ply);

        // Internal iterative deepening
        if depth >= 3 && is_cut_node && entry.bestmove.is_none() {
            self.scout(depth - 2, alpha, node_type)?;
            entry = self.ttable.read(key, ply);
        }

        if (entry.depth as usize >= depth || entry.hard)
            && ((entry.upper && entry.score <= alpha) || (entry.lower && entry.score > alpha))
        {
            return Ok(entry.score);
        }

        // Null move pruning
        if depth >= 2
            && is_cut_node
            && -Score::MAX_EVAL <= alpha
            && alpha < Score::MAX_EVAL
            && !in_check
            && self.allow_null_move()
        {
            self.board.make_null_move();
            let score = -self.scout(depth.saturating_sub(3), -(alpha + 1), node_type + 1)?;
            self.board.undo_move();

            if score > alpha {
                return Ok(self.ttable.write(entry, depth, score, alpha, alpha + 1, ply));
            }
        }

        if self.killers.len() <= ply {
            self.killers.resize(ply + 1, [None; NUM_KILLERS]);
        }

        let new_depth = depth + in_check as usize - 1;
        let mut best = -Score::INF;
        let mut picker = MovePicker::new(entry.bestmove);
        let mut tried = 0;

        while let Some((mv, exchange)) = picker.make_next(self.board, &self.killers[ply]) {
            // Late move reductions for quiet moves
            let reduction = depth >= 4 && tried >= 1 && exchange < 0 && is_cut_node;
            let reduced = new_depth.saturating_sub(reduction as usize);

            let mut score = -self.scout(reduced, -(alpha + 1), node_type + 1)?;
            if score > alpha && reduced < new_depth {
                score = -self.scout(new_depth, -(alpha + 1), node_type + 1)?;
            }
            self.board.undo_move();

            best = best.max(score);
            if score > alpha {
                entry.bestmove = Some(mv);
                if tried > 0 {
                    self.update_killers(ply, mv);
                }
                break;
            }

            tried += 1;
        }

        if best == -Score::INF {
            best = self.end_score(in_check);
        }

        Ok(self.ttable.write(entry, depth, best, alpha, alpha + 1, ply))
    }

    /// Quiescence search with a null window around `alpha`.
    ///
    /// Only captures that do not lose material are searched, unless the side to move is in check.
    fn qsearch(&mut self, alpha: Score) -> Score {
        let ply = self.ply();
        let mut entry = self.ttable.read(self.board.key(), ply);
        if (entry.upper && entry.score <= alpha) || (entry.lower && entry.score > alpha) {
            return entry.score;
        }

        let in_check = self.board.in_check();
        let mut best = if in_check {
            -Score::INF
        } else {
            self.evaluator.evaluate(self.board)
        };
        if best > alpha {
            return self.ttable.write(entry, 0, best, alpha, alpha + 1, ply);
        }

        let generated = self.board.generate_moves();
        let min_score = if in_check { KEEP_ALL } else { 0 };
        let mut moves = OrderedMoves::new(self.board, &generated, min_score);
        moves.move_to_front(entry.bestmove);

        for (mv, _) in moves.iter() {
            if best > alpha {
                break;
            }

            self.board.make_move(mv);
            if self.board.was_legal_move() {
                self.nodes += 1;
                let score = -self.qsearch(-(alpha + 1));
                best = best.max(score);
                if score > alpha {
                    entry.bestmove = Some(mv);
                }
            }
            self.board.undo_move();
        }

        if best == -Score::INF {
            best = self.end_score(in_check);
        }

        self.ttable.write(entry, 0, best, alpha, alpha + 1, ply)
    }

    /// Null moves are only tried if both sides have a piece, and at least one of them is a slider.
    /// Without that, zugzwang is too likely.
    fn allow_null_move(&self) -> bool {
        const SLIDER: u8 = 1;
        const WHITE_PIECE: u8 = 2;
        const BLACK_PIECE: u8 = 4;

        let mut bits = 0;
        for (_, piece) in self.board.pieces() {
            let kind = piece.kind();
            if matches!(kind, PieceKind::Pawn | PieceKind::King) {
                continue;
            }

            bits |= if piece.color().is_white() {
                WHITE_PIECE
            } else {
                BLACK_PIECE
            };
            if kind.is_slider() {
                bits |= SLIDER;
            }
        }

        bits == SLIDER | WHITE_PIECE | BLACK_PIECE
    }

    /// Records `mv` as a killer at `ply`.
    ///
    /// A new killer enters at [`NEW_KILLER_INDEX`], pushing the later ones down.
    /// A known killer moves up by one slot.
    fn update_killers(&mut self, ply: usize, mv: Move) {
        let killers = &mut self.killers[ply];

        match killers.iter().position(|&killer| killer == Some(mv)) {
            None => {
                killers[NEW_KILLER_INDEX..].rotate_right(1);
                killers[NEW_KILLER_INDEX] = Some(mv);
            }
            Some(index) if index > 0 => killers.swap(index - 1, index),
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn search(fen: &str, config: SearchConfig) -> (SearchResult, Board) {
        let mut board = Board::from_fen(fen).unwrap();
        let mut ttable = TTable::new(1);
        let evaluator = MaterialEvaluator::default();

        let result = Search::new(
            &mut board,
            &mut ttable,
            &evaluator,
            config,
            CancellationToken::new(),
        )
        .start(|_| false);

        (result, board)
    }

    fn to_depth(depth: usize) -> SearchConfig {
        SearchConfig {
            max_depth: depth,
            ..Default::default()
        }
    }

    #[test]
    fn test_finds_mate_in_one() {
        let fen = "k7/8/KQ6/8/8/8/8/8 w - - 0 1";
        let (result, mut board) = search(fen, to_depth(3));

        assert_eq!(result.score, Score::mate_in(1), "Got {:?}", result.score);

        let Some(bestmove) = result.bestmove else {
            panic!("A mating move must be found");
        };
        board.make_move(bestmove);
        assert!(board.in_check() && board.legal_moves().is_empty(), "{bestmove} must mate");
    }

    #[test]
    fn test_stalemate_scores_zero() {
        let (result, _) = search("k7/8/KQ6/8/8/8/8/8 b - - 0 1", to_depth(2));
        assert_eq!(result.score, Score::DRAW);
        assert_eq!(result.bestmove, None);
        assert!(result.pv.moves().is_empty());
    }

    #[test]
    fn test_checkmated_scores_as_loss() {
        // Fool's mate
        let fen = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";
        let (result, _) = search(fen, to_depth(2));
        assert_eq!(result.score, Score::mated_in(0));
        assert_eq!(result.bestmove, None);
    }

    #[test]
    fn test_captures_with_promotion() {
        let (result, _) = search("3q1n2/4P3/8/8/8/8/k7/7K w - - 0 1", to_depth(3));
        assert_eq!(result.bestmove.map(|mv| mv.to_string()), Some(String::from("e7d8q")));
    }

    #[test]
    fn test_board_is_restored() {
        let (_, board) = search(FEN_KIWIPETE, to_depth(3));
        assert_eq!(board.to_fen(), FEN_KIWIPETE);
        assert_eq!(board.key(), board.compute_key());
        assert_eq!(board.num_undoable(), 0);
    }

    #[test]
    fn test_node_limit_aborts() {
        let config = SearchConfig {
            max_nodes: 2_000,
            ..Default::default()
        };
        let (result, board) = search(FEN_KIWIPETE, config);

        assert!(result.bestmove.is_some(), "Aborted searches still return a move");
        assert!(result.depth < MAX_DEPTH);
        assert_eq!(board.to_fen(), FEN_KIWIPETE, "Aborting must unwind the board");
    }

    #[test]
    fn test_cancelled_search_completes_depth_zero() {
        let mut board = Board::default();
        let mut ttable = TTable::new(1);
        let token = CancellationToken::new();
        token.cancel();

        let result = Search::new(
            &mut board,
            &mut ttable,
            &MaterialEvaluator::default(),
            SearchConfig::default(),
            token,
        )
        .start(|_| false);

        assert_eq!(result.depth, 0);
        assert!(result.bestmove.is_some());
    }

    #[test]
    fn test_progress_can_stop() {
        let mut board = Board::default();
        let mut ttable = TTable::new(1);
        let mut depths = Vec::new();

        let result = Search::new(
            &mut board,
            &mut ttable,
            &MaterialEvaluator::default(),
            SearchConfig::default(),
            CancellationToken::new(),
        )
        .start(|result| {
            depths.push(result.depth);
            result.depth == 2
        });

        assert_eq!(depths, [0, 1, 2]);
        assert_eq!(result.depth, 2);
        assert_eq!(result.pv.first(), result.bestmove);
    }

    #[test]
    fn test_killer_updates() {
        let mut board = Board::default();
        let mut ttable = TTable::new(1);
        let evaluator = MaterialEvaluator::default();
        let mut search = Search::new(
            &mut board,
            &mut ttable,
            &evaluator,
            SearchConfig::default(),
            CancellationToken::new(),
        );

        let moves = Board::default().legal_moves();
        search.killers.resize(1, [None; NUM_KILLERS]);

        search.update_killers(0, moves[0]);
        assert_eq!(search.killers[0][NEW_KILLER_INDEX], Some(moves[0]));

        search.update_killers(0, moves[1]);
        assert_eq!(search.killers[0][NEW_KILLER_INDEX], Some(moves[1]));
        assert_eq!(search.killers[0][NEW_KILLER_INDEX + 1], Some(moves[0]));

        // Known killers are promoted one slot at a time
        search.update_killers(0, moves[0]);
        assert_eq!(search.killers[0][NEW_KILLER_INDEX], Some(moves[0]));
        search.update_killers(0, moves[0]);
        assert_eq!(search.killers[0][NEW_KILLER_INDEX - 1], Some(moves[0]));
    }

    #[test]
    fn test_null_move_needs_pieces_on_both_sides() {
        let mut ttable = TTable::new(1);
        let evaluator = MaterialEvaluator::default();
        let mut allowed = |fen: &str| {
            let mut board = Board::from_fen(fen).unwrap();
            let search = Search::new(
                &mut board,
                &mut ttable,
                &evaluator,
                SearchConfig::default(),
                CancellationToken::new(),
            );
            search.allow_null_move()
        };

        assert!(allowed(FEN_STARTPOS));
        assert!(!allowed("4k3/pppppppp/8/8/8/8/PPPPPPPP/4K3 w - - 0 1"));
        assert!(!allowed("4k3/8/8/8/8/8/8/2R1K3 w - - 0 1"), "Black has no piece");
        assert!(!allowed("4kn2/8/8/8/8/8/8/1N2K3 w - - 0 1"), "No slider");
        assert!(allowed("4kn2/8/8/8/8/8/8/1B2K3 w - - 0 1"));
    }

    #[test]
    fn test_avoids_repetition_when_winning() {
        // White is a rook up, so repeating the position is never the best outcome
        let fen = "4k3/8/8/8/8/8/8/R3K3 w - - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        for mv in ["a1a2", "e8d8", "a2a1", "d8e8"] {
            board.make_move_text(mv).unwrap();
        }

        let mut ttable = TTable::new(1);
        let result = Search::new(
            &mut board,
            &mut ttable,
            &MaterialEvaluator::default(),
            to_depth(4),
            CancellationToken::new(),
        )
        .start(|_| false);

        assert!(result.score > 0, "Got {:?}", result.score);
    }

    #[test]
    fn test_exact_table_score_ends_pv_node() {
        let mut board = Board::default();
        let mut ttable = TTable::new(1);
        let e2e4 = board.parse_move("e2e4").unwrap();

        // Make e2e4 the first root move, and store the reply position as exactly -300 for Black
        let mut root = ttable.read(board.key(), 0);
        root.bestmove = Some(e2e4);
        ttable.write(root, 0, Score::DRAW, -Score::INF, Score::INF, 0);

        // A score that is both an upper and a lower bound is exact
        let exact = Score::new(-300);
        board.make_move(e2e4);
        let reply = ttable.read(board.key(), 0);
        ttable.write(reply, 10, exact, exact, exact, 0);
        let reply = ttable.read(board.key(), 0);
        assert!(reply.upper && reply.lower);
        board.undo_move();

        let result = Search::new(
            &mut board,
            &mut ttable,
            &MaterialEvaluator::default(),
            to_depth(1),
            CancellationToken::new(),
        )
        .start(|_| false);

        assert_eq!(result.score, -exact);
        assert_eq!(result.bestmove, Some(e2e4));
        assert_eq!(result.pv.moves(), &[e2e4]);
    }

    #[test]
    fn test_ponder_move_is_second_pv_move() {
        let (result, _) = search(FEN_STARTPOS, to_depth(3));

        assert!(result.pv.moves().len() >= 2);
        assert_eq!(result.bestmove, result.pv.first());
        assert_eq!(result.ponder, result.pv.moves().get(1).copied());
    }

    #[test]
    fn test_soft_target_stops_between_iterations() {
        let config = SearchConfig {
            target: Some(Duration::ZERO),
            ..Default::default()
        };
        let (result, _) = search(FEN_KIWIPETE, config);

        assert_eq!(result.depth, 0, "No iteration starts after the target");
        assert!(result.bestmove.is_some());
    }

    #[test]
    fn test_clock_allotment() {
        let minute = Clock {
            time: Duration::from_secs(60),
            ..Default::default()
        };

        // 57.5s after the safety margin, spread over 25 moves with a 3 move hard limit
        let config = SearchConfig::default().with_clock(minute, 0);
        assert_eq!(config.target, Some(Duration::from_millis(2_300)));
        assert_eq!(config.movetime, Some(Duration::from_millis(57_500) / 3));

        let config = SearchConfig::default().with_clock(
            Clock {
                movestogo: Some(10),
                inc: Duration::from_secs(1),
                ..minute
            },
            0,
        );
        assert_eq!(config.target, Some(Duration::from_millis(6_650)));

        // A long stretch without progress spends more time on this move
        let config = SearchConfig::default().with_clock(minute, 30);
        assert_eq!(config.target, Some(Duration::from_millis(11_500)));
        let config = SearchConfig::default().with_clock(minute, 90);
        assert_eq!(config.target, Some(Duration::from_millis(28_750)));
        assert_eq!(config.movetime, Some(Duration::from_millis(57_500)));

        // The safety margin never leaves less than the minimum
        let config = SearchConfig::default().with_clock(
            Clock {
                time: Duration::from_secs(1),
                ..Default::default()
            },
            0,
        );
        assert_eq!(config.target, Some(MIN_MOVE_TIME));
        assert_eq!(config.movetime, Some(MIN_MOVE_TIME));
    }
}
