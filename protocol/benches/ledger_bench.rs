// Ledger and wire-codec benchmarks.
//
// Covers first commits against a growing ledger, duplicate rejection,
// frame decode, and metrics recording under the recorder's single lock.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ledgerflow_protocol::config::Role;
use ledgerflow_protocol::metrics::MetricsRecorder;
use ledgerflow_protocol::storage::Ledger;
use ledgerflow_protocol::transaction::Transaction;

fn transactions(n: usize) -> Vec<Transaction> {
    (0..n)
        .map(|i| Transaction::new(format!("Transaction_{i}_from_Client")))
        .collect()
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger/commit");
    for size in [100usize, 1_000, 10_000] {
        let txs = transactions(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &txs, |b, txs| {
            b.iter(|| {
                let ledger = Ledger::new();
                for tx in txs {
                    ledger.commit(tx);
                }
                ledger.len()
            });
        });
    }
    group.finish();
}

fn bench_duplicate(c: &mut Criterion) {
    let ledger = Ledger::new();
    let txs = transactions(10_000);
    for tx in &txs {
        ledger.commit(tx);
    }
    let probe = &txs[txs.len() / 2];

    c.bench_function("ledger/duplicate", |b| {
        b.iter(|| ledger.commit(probe));
    });
}

fn bench_codec(c: &mut Criterion) {
    let tx = Transaction::new("Transaction_42_from_Client");
    let frame = tx.encode();

    c.bench_function("codec/new", |b| {
        b.iter(|| Transaction::new("Transaction_42_from_Client"));
    });
    c.bench_function("codec/decode", |b| {
        b.iter(|| Transaction::decode(frame.as_bytes()));
    });
}

fn bench_recorder(c: &mut Criterion) {
    let recorder = MetricsRecorder::new(Role::Committer);
    c.bench_function("metrics/record_commit", |b| {
        b.iter(|| recorder.record_commit(Duration::from_micros(250), 1));
    });
    c.bench_function("metrics/snapshot_1k", |b| {
        let recorder = MetricsRecorder::new(Role::Client);
        for _ in 0..1_000 {
            recorder.record_round_trip(Duration::from_millis(3));
        }
        b.iter(|| recorder.snapshot());
    });
}

criterion_group!(benches, bench_commit, bench_duplicate, bench_codec, bench_recorder);
criterion_main!(benches);
