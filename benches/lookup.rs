use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use procsym::formats::elf::hash::{gnu_hash, sysv_hash};
use procsym::ModuleFlags;
use std::hint::black_box;

const NAMES: &[&str] = &[
    "getpid",
    "pthread_mutex_lock",
    "__libc_start_main",
    "_ZNSt6vectorIiSaIiEE9push_backERKi",
    "XzUnpacker_IsStreamWasFinished",
];

fn bench_hashes(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");
    let bytes: u64 = NAMES.iter().map(|n| n.len() as u64).sum();
    group.throughput(Throughput::Bytes(bytes));
    group.bench_function("sysv", |b| {
        b.iter(|| {
            for name in NAMES {
                black_box(sysv_hash(black_box(name.as_bytes())));
            }
        })
    });
    group.bench_function("gnu", |b| {
        b.iter(|| {
            for name in NAMES {
                black_box(gnu_hash(black_box(name.as_bytes())));
            }
        })
    });
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.bench_function("open_libc", |b| {
        b.iter(|| procsym::open(black_box("libc.so.6"), ModuleFlags::EXPORTED))
    });
    if let Some(libc) = procsym::open("libc.so.6", ModuleFlags::EXPORTED) {
        group.bench_function("exported_hit", |b| {
            b.iter(|| libc.exported_function(black_box("getpid")))
        });
        group.bench_function("exported_miss", |b| {
            b.iter(|| libc.exported_function(black_box("procsym_missing")))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hashes, bench_lookup);
criterion_main!(benches);
