/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
    io,
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, warn};

use crate::{
    kpk_probe_board, kpk_self_check, perft, splitperft, Board, CancellationToken, Clock,
    EngineCommand, EvalParams, Evaluate, MaterialEvaluator, Search, SearchConfig, SearchResult,
    TTable, BENCHMARK_FENS, BYTES_IN_MB, FEN_KIWIPETE, MAX_DEPTH,
};

/// Default depth at which to run the benchmark searches.
const BENCH_DEPTH: usize = 5;

/// The Tadpole chess engine.
#[derive(Debug)]
pub struct Engine {
    /// The current state of the chess board, as known to the engine.
    board: Board,

    /// Shared with the search thread while a search is running.
    ttable: Arc<Mutex<TTable>>,

    /// Weights handed to the evaluator of every search.
    params: EvalParams,

    /// Cancels the running search, if any.
    token: CancellationToken,

    /// One half of a channel, responsible for sending commands to the engine to execute.
    sender: Sender<EngineCommand>,

    /// One half of a channel, responsible for receiving commands for the engine to execute.
    receiver: Receiver<EngineCommand>,

    /// Handle to the currently-running search thread, if one exists.
    search_thread: Option<JoinHandle<SearchResult>>,
}

impl Engine {
    /// Constructs a new [`Engine`] with a transposition table of `hash_size` megabytes.
    pub fn new(hash_size: usize) -> Self {
        let (sender, receiver) = channel();

        Self {
            board: Board::default(),
            ttable: Arc::new(Mutex::new(TTable::new(hash_size))),
            params: EvalParams::default(),
            token: CancellationToken::new(),
            sender,
            receiver,
            search_thread: None,
        }
    }

    /// Returns a string of the engine's name and current version.
    pub fn name(&self) -> String {
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }

    /// The position the engine is working on.
    #[inline(always)]
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Replaces the current position.
    #[inline(always)]
    pub fn set_board(&mut self, board: Board) {
        self.board = board;
    }

    /// Sends an [`EngineCommand`] to the engine to be executed.
    pub fn send_command(&self, command: EngineCommand) -> Result<()> {
        self.sender
            .send(command)
            .context("Engine command channel is closed")
    }

    /// Execute the main event loop for the engine.
    ///
    /// This function spawns a thread to handle input from `stdin` and waits on received commands.
    pub fn run(&mut self) -> Result<()> {
        let sender = self.sender.clone();
        thread::spawn(|| {
            if let Err(err) = input_handler(sender) {
                debug!("Input handler thread stopping: {err:#}");
            }
        });

        while let Ok(cmd) = self.receiver.recv() {
            if cmd == EngineCommand::Quit {
                self.token.cancel();
                self.await_search();
                break;
            }

            // Keep running, even on error
            if let Err(err) = self.execute(cmd) {
                eprintln!("Error: {err:#}");
            }
        }

        Ok(())
    }

    /// Executes a single [`EngineCommand`].
    pub fn execute(&mut self, cmd: EngineCommand) -> Result<()> {
        match cmd {
            EngineCommand::Bench { depth } => self.bench(depth.unwrap_or(BENCH_DEPTH))?,

            EngineCommand::Clear => self.ttable()?.clear(),

            EngineCommand::Display => println!("{}", self.board),

            EngineCommand::Eval => {
                let evaluator = MaterialEvaluator::new(self.params);
                println!("{evaluator}");
                println!("{}", evaluator.evaluate(&self.board));
            }

            EngineCommand::Fen => println!("{}", self.board.to_fen()),

            EngineCommand::Go { limits } => {
                let config = parse_limits(&limits, &self.board)?;
                self.start_search(config)?;
            }

            EngineCommand::Hash { size } => {
                let size = size.clamp(TTable::MIN_SIZE, TTable::MAX_SIZE);
                self.ttable()?.resize(size * BYTES_IN_MB);
            }

            EngineCommand::HashInfo => {
                let ttable = self.ttable()?;
                println!("size     : {} MB", ttable.size() / BYTES_IN_MB);
                println!("capacity : {} entries", ttable.capacity());
                println!("load     : {:.1}%", ttable.load() * 100.0);
            }

            EngineCommand::Kpk => self.kpk(),

            EngineCommand::Move { mv } => {
                self.board.make_move_text(&mv)?;
            }

            EngineCommand::Moves => {
                let moves = self.board.legal_moves();

                // If there are none, print "(none)"
                let moves_string = if moves.is_empty() {
                    String::from("(none)")
                } else {
                    moves
                        .iter()
                        .map(|mv| mv.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!("{moves_string}");
            }

            EngineCommand::Perft { depth } => {
                let now = Instant::now();
                let nodes = perft(&mut self.board, depth);
                print_node_count(nodes, now.elapsed());
            }

            EngineCommand::Position { args } => self.board = parse_position(&args)?,

            // Handled by the event loop
            EngineCommand::Quit => {}

            EngineCommand::Splitperft { depth } => {
                let now = Instant::now();
                let (nodes, split) = splitperft(&mut self.board, depth);
                for (mv, nodes) in split {
                    println!("{mv:<5} {nodes}");
                }
                println!();
                print_node_count(nodes, now.elapsed());
            }

            EngineCommand::Stop => self.token.cancel(),

            EngineCommand::Undo => {
                if self.board.num_undoable() == 0 {
                    bail!("There are no moves to undo");
                }
                self.board.undo_move();
            }

            EngineCommand::Wait => {
                self.await_search();
            }
        }

        Ok(())
    }

    /// Locks the transposition table, stopping a running search first.
    fn ttable(&mut self) -> Result<MutexGuard<'_, TTable>> {
        self.token.cancel();
        self.await_search();
        self.ttable
            .lock()
            .map_err(|_| anyhow!("Transposition table is poisoned"))
    }

    /// Returns `true` if the engine is currently executing a search.
    fn is_searching(&self) -> bool {
        self.search_thread
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Starts a search on the current position in a new thread, given the parameters in `config`.
    ///
    /// Progress is printed after every iteration, and the best move once the search ends.
    fn start_search(&mut self, config: SearchConfig) -> Result<()> {
        if self.is_searching() {
            bail!("A search is already running");
        }
        self.await_search();
        self.token.reset();

        // Clone the parameters that will be sent into the thread
        let mut board = self.board.clone();
        let ttable = Arc::clone(&self.ttable);
        let token = self.token.clone();
        let params = self.params;

        let handle = thread::spawn(move || {
            let mut ttable = ttable.lock().unwrap_or_else(PoisonError::into_inner);
            let evaluator = MaterialEvaluator::new(params);

            let result = Search::new(&mut board, &mut ttable, &evaluator, config, token).start(
                |progress| {
                    print_progress(progress);
                    false
                },
            );

            match (result.bestmove, result.ponder) {
                (Some(mv), Some(ponder)) => println!("bestmove {mv} ponder {ponder}"),
                (Some(mv), None) => println!("bestmove {mv}"),
                (None, _) => println!("bestmove (none)"),
            }

            result
        });

        self.search_thread = Some(handle);
        Ok(())
    }

    /// Awaits the current search thread, blocking until it finishes and returning its result.
    fn await_search(&mut self) -> Option<SearchResult> {
        let handle = self.search_thread.take()?;

        let id = handle.thread().id();
        let Ok(result) = handle.join() else {
            warn!("Failed to join on search thread {id:?}");
            return None;
        };

        Some(result)
    }

    /// Execute the `bench` command, running a fixed search on a series of positions and displaying the results.
    ///
    /// The current position is left untouched.
    fn bench(&mut self, depth: usize) -> Result<()> {
        let config = SearchConfig {
            max_depth: depth.min(MAX_DEPTH),
            ..Default::default()
        };
        let evaluator = MaterialEvaluator::new(self.params);
        let token = CancellationToken::new();
        let mut ttable = self.ttable()?;

        let num_tests = BENCHMARK_FENS.len();
        let mut nodes = 0;
        let starttime = Instant::now();

        for (i, fen) in BENCHMARK_FENS.into_iter().enumerate() {
            println!("Benchmark position {}/{num_tests}: {fen}", i + 1);

            let mut board = Board::from_fen(fen)?;
            ttable.clear();

            let result = Search::new(&mut board, &mut ttable, &evaluator, config, token.clone())
                .start(|_| false);
            nodes += result.nodes;
        }

        let elapsed = starttime.elapsed();
        println!();
        print_node_count(nodes, elapsed);

        let kpk = if kpk_self_check() { "ok" } else { "FAILED" };
        println!("kpk self-check: {kpk}");

        Ok(())
    }

    /// Execute the `kpk` command.
    fn kpk(&self) {
        let status = if kpk_self_check() { "ok" } else { "FAILED" };
        println!("kpk self-check: {status}");

        if let Some(outcome) = kpk_probe_board(&self.board) {
            println!("{:?} for {}", outcome, self.board.side_to_move());
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(TTable::DEFAULT_SIZE)
    }
}

/// Prints a node count with the time it took to reach it.
fn print_node_count(nodes: u64, elapsed: Duration) {
    let nps = (nodes as f64 / elapsed.as_secs_f64().max(f64::EPSILON)) as u64;
    println!("{nodes} nodes {} ms {nps} nps", elapsed.as_millis());
}

/// Prints the result of a completed search iteration.
fn print_progress(progress: &SearchResult) {
    println!(
        "info depth {} score {} nodes {} time {} pv {}",
        progress.depth,
        progress.score,
        progress.nodes,
        progress.elapsed.as_millis(),
        progress.pv
    );
}

/// Parses the arguments of a `position` command.
///
/// The position is `startpos`, `kiwipete`, or a FEN (optionally preceded by `fen`),
/// and may be followed by `moves` and a list of moves to play from it.
fn parse_position(args: &[String]) -> Result<Board> {
    let split = args
        .iter()
        .position(|arg| arg == "moves")
        .unwrap_or(args.len());
    let (setup, moves) = args.split_at(split);

    let mut board = match setup {
        [] => bail!("Expected `startpos`, `kiwipete`, or a FEN"),
        [name] if name == "startpos" => Board::default(),
        [name] if name == "kiwipete" => Board::from_fen(FEN_KIWIPETE)?,
        [keyword, fen @ ..] if keyword == "fen" => Board::from_fen(&fen.join(" "))?,
        fen => Board::from_fen(&fen.join(" "))?,
    };

    // Skip the `moves` keyword itself
    for mv in moves.iter().skip(1) {
        board
            .make_move_text(mv)
            .with_context(|| format!("Failed to apply move {mv:?}"))?;
    }

    Ok(board)
}

/// Parses the limits of a `go` command, given as `name value` pairs, for a search on `board`.
///
/// Clock times are in milliseconds. Only the clock of the side to move is used, and
/// `movetime` overrides the hard limit it sets.
fn parse_limits(limits: &[String], board: &Board) -> Result<SearchConfig> {
    let mut config = SearchConfig::default();
    let mut clocks = [Clock::default(); 2];
    let mut movetime = None;
    let mut tokens = limits.iter();

    while let Some(name) = tokens.next() {
        let value = tokens
            .next()
            .with_context(|| format!("Missing value for search limit {name:?}"))?;

        match name.as_str() {
            "depth" => config.max_depth = value.parse::<usize>()?.min(MAX_DEPTH),
            "nodes" => config.max_nodes = value.parse()?,
            "movetime" => movetime = Some(parse_millis(value)?),
            "wtime" => clocks[0].time = parse_millis(value)?,
            "btime" => clocks[1].time = parse_millis(value)?,
            "winc" => clocks[0].inc = parse_millis(value)?,
            "binc" => clocks[1].inc = parse_millis(value)?,
            "movestogo" => {
                let moves = Some(value.parse()?);
                clocks[0].movestogo = moves;
                clocks[1].movestogo = moves;
            }
            _ => bail!("Unknown search limit {name:?}"),
        }
    }

    let clock = clocks[board.side_to_move().index()];
    if !clock.time.is_zero() || !clock.inc.is_zero() {
        config = config.with_clock(clock, board.halfmove());
    }
    if movetime.is_some() {
        config.movetime = movetime;
    }

    Ok(config)
}

/// Parses a number of milliseconds.
fn parse_millis(value: &str) -> Result<Duration> {
    Ok(Duration::from_millis(value.parse()?))
}

/// Loops endlessly to await input via `stdin`, sending all successfully-parsed commands through the supplied `sender`.
fn input_handler(sender: Sender<EngineCommand>) -> Result<()> {
    let mut buffer = String::with_capacity(2048);

    loop {
        buffer.clear();
        let bytes = io::stdin()
            .read_line(&mut buffer)
            .context("Failed to read line from stdin")?;

        // For ctrl + d
        if 0 == bytes {
            sender
                .send(EngineCommand::Quit)
                .context("Failed to send 'quit' command after receiving empty input")?;

            bail!("Engine received input of 0 bytes and is quitting");
        }

        let buf = buffer.trim();
        if buf.is_empty() {
            continue;
        }

        match buf.parse::<EngineCommand>() {
            Ok(cmd) => sender
                .send(cmd)
                .context("Failed to send command to engine")?,

            // If an invalid command was received, just print the error and continue running
            Err(err) => eprintln!("{err}"),
        }
    }
}
