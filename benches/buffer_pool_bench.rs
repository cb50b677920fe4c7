// Page manager performance: buffer-cache hit rate under a hot/cold access
// pattern, page fetch latency, and eviction cost once the cache is
// saturated (spec.md §4.2).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rusty_db::config::EngineConfig;
use rusty_db::container::Container;
use rusty_db::storage::page_manager::PageManager;
use std::sync::Arc;
use tempfile::TempDir;

fn page_manager(capacity_pages: usize) -> (Arc<PageManager>, TempDir) {
    let dir = TempDir::new().unwrap();
    let config = EngineConfig {
        data_dir: dir.path().to_string_lossy().to_string(),
        page_size: 4096,
        min_extension_pages: 256,
        ..EngineConfig::default()
    };
    let container = Arc::new(Container::open(dir.path().join("data.scdb"), &config).unwrap());
    (Arc::new(PageManager::new(container, capacity_pages)), dir)
}

fn bench_fetch_cold(c: &mut Criterion) {
    c.bench_function("fetch_page_cold", |b| {
        let (manager, _dir) = page_manager(1000);
        let page_id = manager.new_page().unwrap();
        b.iter(|| {
            black_box(manager.fetch_page(black_box(page_id)).unwrap());
        });
    });
}

fn bench_hot_cold_hit_rate(c: &mut Criterion) {
    let mut group = c.benchmark_group("hit_rate_80_20");

    for capacity in [20usize, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            &capacity,
            |b, &capacity| {
                b.iter(|| {
                    let (manager, _dir) = page_manager(capacity);
                    let pages: Vec<_> = (0..100).map(|_| manager.new_page().unwrap()).collect();
                    let hot = &pages[..20];
                    for i in 0..1000u32 {
                        let page_id = if i % 10 < 8 {
                            hot[(i as usize) % hot.len()]
                        } else {
                            pages[(i as usize) % pages.len()]
                        };
                        black_box(manager.fetch_page(page_id).unwrap());
                    }
                    black_box(manager.metrics().hit_rate());
                });
            },
        );
    }

    group.finish();
}

fn bench_eviction_under_pressure(c: &mut Criterion) {
    c.bench_function("eviction_under_pressure", |b| {
        b.iter(|| {
            let (manager, _dir) = page_manager(50);
            for _ in 0..500 {
                let page_id = manager.new_page().unwrap();
                black_box(manager.fetch_page(page_id).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_fetch_cold,
    bench_hot_cold_hit_rate,
    bench_eviction_under_pressure
);
criterion_main!(benches);
