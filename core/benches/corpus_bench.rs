use corpus_core::tokenizer::{filter_tokens, tokenize};
use corpus_core::{Corpus, RawDocument};
use criterion::{criterion_group, criterion_main, Criterion};

const WORDS: &[&str] = &[
    "nurse", "ward", "care", "assistant", "developer", "rust", "backend", "team", "shift", "senior", "support",
    "customer", "service", "driver", "warehouse", "manager", "sales", "full-time", "part-time", "salary",
];

fn synthetic(n: usize) -> Vec<RawDocument> {
    (0..n)
        .map(|i| {
            let body: Vec<&str> = (0..80).map(|k| WORDS[(i * 7 + k * 13 + k * k) % WORDS.len()]).collect();
            RawDocument::new(format!("{i:06}"), format!("<p>The {} &amp; more.</p>", body.join(" ")))
        })
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let text = "<p>Staff Nurse required for a busy surgical ward &amp; day unit.</p><br/>Full-time, £28,000.";
    c.bench_function("tokenize_and_filter", |b| b.iter(|| filter_tokens(&tokenize(text))));
}

fn bench_build(c: &mut Criterion) {
    let docs = synthetic(2_000);
    c.bench_function("build_2000_docs", |b| b.iter(|| Corpus::build(docs.clone()).map(|(c, _)| c.documents().len())));
}

fn bench_queries(c: &mut Criterion) {
    let (corpus, _) = Corpus::build(synthetic(2_000)).expect("synthetic corpus");
    c.bench_function("similar_words", |b| b.iter(|| corpus.query().similar_words("nurse", 10)));
    c.bench_function("jaccard_similarity", |b| b.iter(|| corpus.query().jaccard_similarity("000042")));
    c.bench_function("project_2d", |b| b.iter(|| corpus.query().project_2d()));
}

criterion_group!(benches, bench_tokenize, bench_build, bench_queries);
criterion_main!(benches);
