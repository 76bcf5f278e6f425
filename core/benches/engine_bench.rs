use criterion::{criterion_group, criterion_main, Criterion};
use mmdb_core::{IndexBuilder, IndexRegistry, QueryEngine, RawDocument};
use std::collections::BTreeMap;

const WORDS: &[&str] = &[
    "love", "night", "dance", "heart", "fire", "rain", "road", "home", "light", "dream", "baby", "time", "gold",
    "river", "summer", "city", "lonely", "stars", "forever", "wild",
];

fn corpus(n: usize) -> Vec<RawDocument> {
    (0..n)
        .map(|i| {
            let text: Vec<&str> = (0..60).map(|j| WORDS[(i * 7 + j * 13 + j * j) % WORDS.len()]).collect();
            RawDocument { doc_id: format!("doc{i:06}"), text: text.join(" "), fields: BTreeMap::new() }
        })
        .collect()
}

fn bench_build(c: &mut Criterion) {
    let docs = corpus(5_000);
    c.bench_function("build_5k_docs", |b| {
        b.iter(|| IndexBuilder::new().build("bench", docs.iter().cloned().map(Ok)).unwrap())
    });
}

fn bench_search(c: &mut Criterion) {
    let registry = IndexRegistry::new();
    let token = registry.begin_build("bench").unwrap();
    let artifact = IndexBuilder::new().build("bench", corpus(20_000).into_iter().map(Ok)).unwrap();
    registry.publish(token, artifact);
    let engine = QueryEngine::new(registry);
    c.bench_function("search_top10_20k_docs", |b| b.iter(|| engine.search("bench", "lonely summer night", 10).unwrap()));
}

criterion_group!(benches, bench_build, bench_search);
criterion_main!(benches);
