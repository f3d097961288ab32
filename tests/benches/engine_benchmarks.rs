//! # ArchiveChain Engine Benchmarks
//!
//! Hot paths of block production and gossip intake.
//!
//! ```bash
//! cargo bench --package ac-tests --bench engine_benchmarks
//! cargo bench --package ac-tests --bench engine_benchmarks -- crypto
//! ```
//!
//! | Group | Path |
//! |-------|------|
//! | crypto | transaction signature check, single and parallel batch |
//! | consensus | merkle root over a full block body |
//! | math | checked decimal addition against the supply ceiling |
//! | mempool | admission into the pending pool |

use ac_01_safe_math::{SafeMath, DEFAULT_MAX_SUPPLY};
use ac_06_consensus::domain::merkle_root;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use node_runtime::container::MempoolConfig;
use node_runtime::Mempool;
use rust_decimal::Decimal;
use shared_crypto::{sign_transaction, verify_transaction, PrivateKey};
use shared_types::{TokenAction, Transaction, TransactionPayload};
use std::time::Duration;

/// `count` signed transfers spread over 50 senders.
fn generate_transactions(count: usize) -> Vec<Transaction> {
    let keys: Vec<PrivateKey> = (10..60u8)
        .map(|seed| PrivateKey::from_bytes(&[seed; 32]).unwrap())
        .collect();
    (0..count)
        .map(|i| {
            let sender = &keys[i % keys.len()];
            let mut tx = Transaction::new(
                sender.address(),
                (i / keys.len()) as u64,
                1_000,
                Decimal::ONE,
                TransactionPayload::Token {
                    recipient: [0x44; 20],
                    amount: Decimal::new(i as i64 + 1, 2),
                    action: TokenAction::Transfer,
                },
            );
            sign_transaction(&mut tx, sender).unwrap();
            tx
        })
        .collect()
}

fn bench_crypto(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto/verify");
    group.measurement_time(Duration::from_secs(10));

    let single = generate_transactions(1).remove(0);
    group.bench_function("single", |b| {
        b.iter(|| verify_transaction(black_box(&single)).is_ok())
    });

    for size in [64, 256, 1_000] {
        let batch = generate_transactions(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("batch", size), &batch, |b, txs| {
            b.iter(|| {
                let verdicts = Mempool::verify_signatures(txs.clone());
                black_box(verdicts.iter().filter(|(_, ok)| ok.is_ok()).count())
            })
        });
    }
    group.finish();
}

fn bench_merkle(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus/merkle_root");
    for size in [1, 100, 1_000] {
        let body = generate_transactions(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &body, |b, txs| {
            b.iter(|| merkle_root(black_box(txs)))
        });
    }
    group.finish();
}

fn bench_safe_math(c: &mut Criterion) {
    let math = SafeMath::new(DEFAULT_MAX_SUPPLY);
    let mut group = c.benchmark_group("math/safe_add");
    group.bench_function("within_ceiling", |b| {
        b.iter(|| math.safe_add(black_box(Decimal::new(123_456_789, 8)), black_box(Decimal::ONE)))
    });
    group.bench_function("overflow", |b| {
        b.iter(|| math.safe_add(black_box(DEFAULT_MAX_SUPPLY), black_box(Decimal::ONE)))
    });
    group.finish();
}

fn bench_mempool(c: &mut Criterion) {
    let mut group = c.benchmark_group("mempool/insert");
    let txs = generate_transactions(1_000);
    group.throughput(Throughput::Elements(txs.len() as u64));
    group.bench_function("1000_signed", |b| {
        b.iter(|| {
            let pool = Mempool::new(MempoolConfig {
                max_transactions: 2_000,
            });
            for tx in &txs {
                let _ = pool.insert(tx.clone());
            }
            black_box(pool.len())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_crypto, bench_merkle, bench_safe_math, bench_mempool);
criterion_main!(benches);
