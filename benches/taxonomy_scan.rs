use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use bd_intel_core::enrich::taxonomy::TaxonomyHits;

const SHORT_TEXT: &str = "Thanks for reaching out, let's grab coffee next week.";

const LONG_TEXT: &str = concat!(
    "Our fund is looking to deploy series A and series B capital into defi and ",
    "web3 protocols this quarter. As CEO I need a decision by end of week — this ",
    "is time sensitive and our investment committee meets Friday. Thanks for the ",
    "warm intro, my network includes several LPs and angel investors who might be ",
    "interested in a follow-on round. See you at the conference next month, let's ",
    "set up a meeting there to discuss due diligence and valuation. We are also ",
    "exploring crypto staking yields and liquidity pools for treasury management. ",
    "Our CTO has reviewed the technical architecture and the API integration looks ",
    "solid. Happy to sign an NDA and move to term sheet once legal reviews the cap ",
    "table and equity split for this round of funding.",
);

fn bench_scan_single_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("taxonomy_scan");
    for (label, text) in [("short", SHORT_TEXT), ("long", LONG_TEXT)] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), text, |b, text| {
            b.iter(|| {
                let hits = TaxonomyHits::scan(black_box(text));
                black_box(hits.weighted_score());
            })
        });
    }
    group.finish();
}

fn bench_scan_and_merge_batch(c: &mut Criterion) {
    let messages: Vec<&str> = std::iter::repeat(LONG_TEXT).take(200).collect();

    c.bench_function("taxonomy_scan_merge_200_messages", |b| {
        b.iter(|| {
            let mut total = TaxonomyHits::default();
            for text in &messages {
                total.merge(&TaxonomyHits::scan(black_box(text)));
            }
            black_box(total.weighted_score());
        })
    });
}

criterion_group!(benches, bench_scan_single_message, bench_scan_and_merge_batch);
criterion_main!(benches);
