//! Retrieval performance benchmarks
//!
//! Measures performance of:
//! - Hybrid score fusion at growing result-set sizes
//! - In-memory BM25 search
//! - FTS5 search against the SQLite store

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use regrag_core::search::{fuse, tokenize, FusionWeights};
use regrag_core::{Bm25Index, Database, IndexHit, PassageMetadata};
use tempfile::TempDir;

const SAMPLE_PASSAGES: &[(&str, &str)] = &[
    (
        "capital-rules",
        "Banks must hold a capital conservation buffer of 2.5 percent of risk-weighted assets.",
    ),
    (
        "liquidity-rules",
        "Credit institutions shall maintain a liquidity coverage ratio of at least 100 percent.",
    ),
    (
        "payment-licensing",
        "A payment institution must obtain a licence from the central bank before offering payment services.",
    ),
    (
        "ministry-history",
        "The Ministry of Finance was founded in 1921 and supervises public revenue.",
    ),
    (
        "aml-reporting",
        "Obliged entities report suspicious transactions to the financial intelligence unit without delay.",
    ),
    (
        "deposit-guarantee",
        "Deposits are protected up to 100000 euro per depositor per institution.",
    ),
];

fn hits(count: usize, offset: usize) -> Vec<IndexHit> {
    (0..count)
        .map(|i| IndexHit {
            source_id: format!("passage-{}", (i * 7 + offset) % (count * 2)),
            text: format!("passage text number {}", (i * 7 + offset) % (count * 2)),
            score: 1.0 / (i as f64 + 1.0),
            metadata: PassageMetadata::default(),
        })
        .collect()
}

fn bench_fusion(c: &mut Criterion) {
    let mut group = c.benchmark_group("hybrid_fusion");

    for size in [5, 15, 50, 200] {
        let dense = hits(size, 0);
        let sparse = hits(size, 3);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| fuse(black_box(&dense), black_box(&sparse), FusionWeights::default()));
        });
    }

    group.finish();
}

fn bench_bm25(c: &mut Criterion) {
    let mut index = Bm25Index::new();
    for (id, text) in SAMPLE_PASSAGES {
        index.add(*id, *text, PassageMetadata::default());
    }

    let mut group = c.benchmark_group("bm25_search");
    for (name, query) in [
        ("single_word", "capital"),
        ("two_words", "payment licence"),
        ("question", "When was the Ministry of Finance founded?"),
    ] {
        let tokens = tokenize(query);
        group.bench_with_input(BenchmarkId::from_parameter(name), &tokens, |b, tokens| {
            b.iter(|| index.search(black_box(tokens), 5));
        });
    }
    group.finish();
}

fn bench_fts(c: &mut Criterion) {
    let temp = TempDir::new().unwrap();
    let db = Database::open(temp.path().join("bench.sqlite")).unwrap();
    db.initialize().unwrap();
    for (id, text) in SAMPLE_PASSAGES {
        db.insert_passage(id, text, &PassageMetadata::default())
            .unwrap();
    }

    let tokens = tokenize("capital buffer requirements");
    c.bench_function("fts5_search", |b| {
        b.iter(|| db.search_fts(black_box(&tokens), 5).unwrap());
    });
}

criterion_group!(benches, bench_fusion, bench_bm25, bench_fts);
criterion_main!(benches);
