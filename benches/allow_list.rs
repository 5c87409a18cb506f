//! Benchmarks for allow-list checks and target resolution.
//!
//! Every relayed request pays for these before any upstream work starts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tambayan_relay::config::RelayConfig;
use tambayan_relay::policy::AllowListPolicy;
use tambayan_relay::relay::target::resolve_target;

fn default_policy() -> AllowListPolicy {
    AllowListPolicy::new(RelayConfig::default().allowed_hosts)
}

/// A long list where only the last rule matches.
fn large_policy() -> AllowListPolicy {
    let mut rules: Vec<String> = (0..200).map(|i| format!("cdn{i}.example.net")).collect();
    rules.push("akamaized.net".to_string());
    AllowListPolicy::new(rules)
}

fn bench_is_allowed(c: &mut Criterion) {
    let mut group = c.benchmark_group("is_allowed");
    let hosts = [
        ("exact", "akamaized.net"),
        ("subdomain", "qp-pldt-live-grp-01-prod.akamaized.net"),
        ("rejected", "evil-akamaized.net"),
    ];

    for (name, policy) in [("default", default_policy()), ("large", large_policy())] {
        for (case, host) in hosts {
            group.bench_with_input(BenchmarkId::new(name, case), &host, |b, host| {
                b.iter(|| policy.is_allowed(black_box(host)))
            });
        }
    }

    group.finish();
}

fn bench_resolve_target(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_target");
    let policy = default_policy();

    let plain = "url=https://qp-pldt-live-grp-01-prod.akamaized.net/out/u/index.mpd";
    let encoded = "url=https%3A%2F%2Fqp-pldt-live-grp-01-prod.akamaized.net%2Fout%2Fu%2Findex.mpd%3Ftoken%3Dabc";

    group.bench_function("plain", |b| {
        b.iter(|| black_box(resolve_target(black_box(Some(plain)), &policy).is_ok()))
    });
    group.bench_function("percent_encoded", |b| {
        b.iter(|| black_box(resolve_target(black_box(Some(encoded)), &policy).is_ok()))
    });

    group.finish();
}

criterion_group!(benches, bench_is_allowed, bench_resolve_target);
criterion_main!(benches);
