use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use snrfilter::{
    new_shared_cache, EngineConfig, FilterCriteria, FilterEngine, Filtering, Record,
    SearchEngine, SearchParams, Searching, SharedDataset,
};

const ROWS: usize = 100_000;

fn dataset() -> Arc<SharedDataset> {
    let records = (0..ROWS)
        .map(|i| {
            let i = i as i32;
            Record::new(i % 16, (i / 16) % 64, (i / 1024) % 32, f64::from(i % 4000) / 100.0)
        })
        .collect();
    Arc::new(SharedDataset::new(records))
}

fn config(cache_enabled: bool) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cache.enabled = cache_enabled;
    config
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ROWS as u64));
    let criteria = FilterCriteria::new().pre(2, 9).snr(10.0, 30.0);

    group.bench_function("scan_uncached", |b| {
        let config = config(false);
        let engine = FilterEngine::new(dataset(), new_shared_cache(&config.cache), &config);

        b.iter(|| {
            black_box(engine.apply_filter(&criteria).unwrap());
        });
    });

    group.bench_function("cached", |b| {
        let config = config(true);
        let engine = FilterEngine::new(dataset(), new_shared_cache(&config.cache), &config);
        engine.apply_filter(&criteria).unwrap();

        b.iter(|| {
            black_box(engine.apply_filter(&criteria).unwrap());
        });
    });

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(20);
    group.throughput(Throughput::Elements(ROWS as u64));

    group.bench_function("fuzzy_uncached", |b| {
        let config = config(false);
        let engine = SearchEngine::new(dataset(), new_shared_cache(&config.cache), &config);
        let params = SearchParams::new().snr(25.0).tolerance(0.5);

        b.iter(|| {
            black_box(engine.search_fuzzy(&params).unwrap());
        });
    });

    group.bench_function("suggestions", |b| {
        let config = config(true);
        let engine = SearchEngine::new(dataset(), new_shared_cache(&config.cache), &config);

        b.iter(|| {
            black_box(engine.get_search_suggestions("main=1"));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_filter, bench_search);
criterion_main!(benches);
