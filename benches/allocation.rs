use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rusqlite::Connection;
use std::sync::Arc;
use tagmint::{codec, FixedDeviceIdentity, IdAllocator, MemoryCache, Registry, SqliteStore, TableSpec};

fn test_allocator() -> IdAllocator {
    let registry = Registry::new(vec![TableSpec {
        table_name: "transactions".to_string(),
        primary_key_column: "transaction_id".to_string(),
        entity_type: "Transaction".to_string(),
    }])
    .unwrap();
    let conn = Connection::open_in_memory().unwrap();
    conn.execute(
        "CREATE TABLE transactions (transaction_id TEXT PRIMARY KEY, amount REAL)",
        [],
    )
    .unwrap();
    IdAllocator::new(
        registry,
        Arc::new(SqliteStore::from_connection(conn)),
        Arc::new(MemoryCache::new()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    )
}

/// Benchmark the warm allocation path (memory cache hit + durable write)
fn bench_allocate_warm(c: &mut Criterion) {
    let alloc = test_allocator();
    // Prime the caches so every measured iteration is a warm hit.
    alloc.allocate_next("transactions").unwrap();

    c.bench_function("allocate_next_warm", |b| {
        b.iter(|| {
            black_box(alloc.allocate_next("transactions").unwrap());
        });
    });
}

/// Benchmark the codec in isolation
fn bench_codec(c: &mut Criterion) {
    c.bench_function("codec_next", |b| {
        b.iter(|| {
            black_box(codec::next("AAA", Some(black_box("AAA-099999"))).unwrap());
        });
    });

    c.bench_function("codec_decode", |b| {
        b.iter(|| {
            black_box(codec::decode(black_box("AAA-012345")).unwrap());
        });
    });
}

criterion_group!(benches, bench_allocate_warm, bench_codec);
criterion_main!(benches);
