// Rate Limiter Benchmarks
//
// Measures the hot path of the limiter:
// - Admission for a fresh actor
// - Rejection of an actor that is over quota
// - Remaining-attempts lookups
// - Contended checks on one key from several threads
//
// Usage:
//   cargo bench --bench check_limit

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::thread;
use storefront_throttle::rate_limit::{Category, CategoryLimit, RateLimitConfig, RateLimiter};

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_limit");

    group.bench_function("admit_distinct_actors", |b| {
        let limiter: RateLimiter<i64> = RateLimiter::default_config();
        let mut actor = 0i64;
        b.iter(|| {
            actor += 1;
            black_box(limiter.check(&actor, Category::Message))
        });
    });

    group.bench_function("reject_over_quota", |b| {
        let limiter: RateLimiter<i64> = RateLimiter::default_config();
        while limiter.check(&1, Category::Payment).is_allowed() {}
        b.iter(|| black_box(limiter.check(&1, Category::Payment)));
    });

    group.bench_function("unknown_category", |b| {
        let limiter: RateLimiter<i64> = RateLimiter::default_config();
        b.iter(|| black_box(limiter.check_limit(Some(&1), "refund")));
    });

    group.finish();
}

fn bench_remaining(c: &mut Criterion) {
    let config = RateLimitConfig::default()
        .with_category("message", CategoryLimit::new(10_000, 60, 2.0));
    let limiter: RateLimiter<i64> = RateLimiter::new(config);
    for _ in 0..1_000 {
        limiter.check(&1, Category::Message);
    }

    c.bench_function("get_remaining_attempts_1000_records", |b| {
        b.iter(|| black_box(limiter.get_remaining_attempts(Some(&1), "message")));
    });
}

fn bench_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_key");
    group.sample_size(20);

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &n| {
            let limiter: RateLimiter<i64> = RateLimiter::default_config();
            b.iter(|| {
                let handles: Vec<_> = (0..n)
                    .map(|_| {
                        let limiter = limiter.clone();
                        thread::spawn(move || {
                            for _ in 0..100 {
                                black_box(limiter.check(&7, Category::Command));
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_admission, bench_remaining, bench_contention);
criterion_main!(benches);
