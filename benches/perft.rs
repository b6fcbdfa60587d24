/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tadpole::{
    perft, Board, CancellationToken, MaterialEvaluator, Search, SearchConfig, TTable,
    FEN_KIWIPETE, FEN_STARTPOS,
};

struct BenchCase {
    name: &'static str,
    fen: &'static str,
    depth: usize,
    expected_nodes: u64,
}

const PERFT_CASES: &[BenchCase] = &[
    BenchCase {
        name: "startpos",
        fen: FEN_STARTPOS,
        depth: 4,
        expected_nodes: 197_281,
    },
    BenchCase {
        name: "kiwipete",
        fen: FEN_KIWIPETE,
        depth: 3,
        expected_nodes: 97_862,
    },
    BenchCase {
        name: "position_3",
        fen: "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        depth: 5,
        expected_nodes: 674_624,
    },
];

fn bench_perft(c: &mut Criterion) {
    let mut group = c.benchmark_group("perft");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(10));

    for case in PERFT_CASES {
        let mut board = Board::from_fen(case.fen).unwrap();

        group.throughput(Throughput::Elements(case.expected_nodes));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_d{}", case.name, case.depth)),
            &case.depth,
            |b, &depth| {
                b.iter(|| {
                    let nodes = perft(black_box(&mut board), black_box(depth));
                    assert_eq!(nodes, case.expected_nodes);
                    nodes
                });
            },
        );
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let config = SearchConfig {
        max_depth: 4,
        ..Default::default()
    };
    let evaluator = MaterialEvaluator::default();

    for (name, fen) in [("startpos", FEN_STARTPOS), ("kiwipete", FEN_KIWIPETE)] {
        let mut board = Board::from_fen(fen).unwrap();
        let mut ttable = TTable::new(16);

        group.bench_function(BenchmarkId::new("depth_4", name), |b| {
            b.iter(|| {
                ttable.clear();
                let result = Search::new(
                    black_box(&mut board),
                    &mut ttable,
                    &evaluator,
                    config,
                    CancellationToken::new(),
                )
                .start(|_| false);
                result.nodes
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_perft, bench_search);
criterion_main!(benches);
