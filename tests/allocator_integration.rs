//! End-to-end allocator tests against on-disk SQLite state.

use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::sync::Arc;
use tagmint::{
    FixedDeviceIdentity, IdAllocator, MemoryCache, Registry, SqliteCache, SqliteStore, TableSpec,
};
use tempfile::TempDir;

fn registry() -> Registry {
    Registry::from_toml_str(
        r#"
        [[table]]
        table_name = "accounts"
        primary_key_column = "account_id"
        entity_type = "Account"

        [[table]]
        table_name = "transactions"
        primary_key_column = "transaction_id"
        entity_type = "Transaction"
        "#,
    )
    .unwrap()
}

fn create_schema(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS accounts (account_id TEXT PRIMARY KEY, name TEXT);
         CREATE TABLE IF NOT EXISTS transactions (transaction_id TEXT PRIMARY KEY, amount REAL);",
    )
    .unwrap();
}

fn insert_transaction(conn: &Connection, id: &str) {
    conn.execute(
        "INSERT INTO transactions (transaction_id, amount) VALUES (?1, 0.0)",
        params![id],
    )
    .unwrap();
}

#[test]
fn allocation_survives_process_restart_via_durable_cache() {
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("app.db");
    let cache_path = dir.path().join("tagmint.db");

    {
        let conn = Connection::open(&store_path).unwrap();
        create_schema(&conn);
    }

    let first_run: Vec<String> = {
        let alloc = IdAllocator::new(
            registry(),
            Arc::new(SqliteStore::open(&store_path).unwrap()),
            Arc::new(SqliteCache::open(&cache_path).unwrap()),
            Arc::new(FixedDeviceIdentity::new("AAA")),
        );
        (0..3)
            .map(|_| alloc.allocate_next("transactions").unwrap())
            .collect()
    };
    assert_eq!(first_run, vec!["AAA-01", "AAA-02", "AAA-03"]);

    // "Restart": a fresh allocator over the same files resumes the stream.
    let alloc = IdAllocator::new(
        registry(),
        Arc::new(SqliteStore::open(&store_path).unwrap()),
        Arc::new(SqliteCache::open(&cache_path).unwrap()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    );
    assert_eq!(alloc.allocate_next("transactions").unwrap(), "AAA-04");
}

#[test]
fn reinstall_recovers_from_store_rows_alone() {
    // Wiped durable cache, rows still in the store: the scan rebuilds the
    // baseline, including across a counter overflow.
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("app.db");

    {
        let conn = Connection::open(&store_path).unwrap();
        create_schema(&conn);
        for id in ["AAA-98", "AAA-99", "AAA-100", "BBB-500"] {
            insert_transaction(&conn, id);
        }
    }

    let alloc = IdAllocator::new(
        registry(),
        Arc::new(SqliteStore::open(&store_path).unwrap()),
        Arc::new(SqliteCache::open_in_memory().unwrap()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    );
    assert_eq!(alloc.allocate_next("transactions").unwrap(), "AAA-101");
}

#[test]
fn two_devices_never_collide_despite_overlapping_counters() {
    // Each device has its own installation (store copy + cache); their
    // numeric counters overlap completely, their IDs never do.
    let mut streams: Vec<Vec<String>> = Vec::new();
    for tag in ["AAA", "BBB"] {
        let conn = Connection::open_in_memory().unwrap();
        create_schema(&conn);
        let alloc = IdAllocator::new(
            registry(),
            Arc::new(SqliteStore::from_connection(conn)),
            Arc::new(MemoryCache::new()),
            Arc::new(FixedDeviceIdentity::new(tag)),
        );
        streams.push(
            (0..40)
                .map(|_| alloc.allocate_next("transactions").unwrap())
                .collect(),
        );
    }

    let all: HashSet<&String> = streams.iter().flatten().collect();
    assert_eq!(all.len(), 80, "duplicate ID across device streams");
}

#[test]
fn synced_foreign_rows_do_not_disturb_the_local_stream() {
    // Replication delivered another device's rows into the local store;
    // scans and reconciliation must keep ignoring them.
    let conn = Connection::open_in_memory().unwrap();
    create_schema(&conn);
    for id in ["BBB-01", "BBB-02", "BBB-900"] {
        insert_transaction(&conn, id);
    }
    let alloc = IdAllocator::new(
        registry(),
        Arc::new(SqliteStore::from_connection(conn)),
        Arc::new(MemoryCache::new()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    );

    let report = alloc.reconcile();
    assert!(report.is_clean());
    assert_eq!(alloc.allocate_next("transactions").unwrap(), "AAA-01");
}

#[test]
fn concurrent_callers_get_pairwise_distinct_ids() {
    let conn = Connection::open_in_memory().unwrap();
    create_schema(&conn);
    let alloc = Arc::new(IdAllocator::new(
        registry(),
        Arc::new(SqliteStore::from_connection(conn)),
        Arc::new(MemoryCache::new()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let alloc = Arc::clone(&alloc);
            std::thread::spawn(move || {
                (0..25)
                    .map(|_| alloc.allocate_next("transactions").unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id.clone()), "duplicate ID handed out: {id}");
        }
    }
    assert_eq!(seen.len(), 200);
}

#[test]
fn reconcile_then_allocate_continues_past_the_widest_key() {
    let conn = Connection::open_in_memory().unwrap();
    create_schema(&conn);
    // AAA-012 must beat AAA-99: greater digit width models real overflow.
    insert_transaction(&conn, "AAA-99");
    insert_transaction(&conn, "AAA-012");

    let alloc = IdAllocator::new(
        registry(),
        Arc::new(SqliteStore::from_connection(conn)),
        Arc::new(MemoryCache::new()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    );
    let report = alloc.reconcile();
    assert_eq!(report.merged.len(), 2);
    assert_eq!(alloc.allocate_next("transactions").unwrap(), "AAA-013");
}

#[test]
fn shared_connection_serves_both_store_and_cache() {
    // Single-file deployments keep the application's rows and the
    // allocator's cache table in one database.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("single.db");

    {
        let conn = Connection::open(&path).unwrap();
        create_schema(&conn);
    }

    let alloc = IdAllocator::new(
        registry(),
        Arc::new(SqliteStore::open(&path).unwrap()),
        Arc::new(SqliteCache::open(&path).unwrap()),
        Arc::new(FixedDeviceIdentity::new("AAA")),
    );
    assert_eq!(alloc.allocate_next("accounts").unwrap(), "AAA-01");
    assert_eq!(alloc.allocate_next("accounts").unwrap(), "AAA-02");

    // The cache table landed next to the application schema.
    let conn = Connection::open(&path).unwrap();
    let cached: String = conn
        .query_row(
            "SELECT value FROM tagmint_cache WHERE key = 'accounts'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(cached.contains("AAA-02"));
}

#[test]
fn registry_can_be_loaded_from_a_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("tables.toml");
    std::fs::write(
        &config_path,
        r#"
        [[table]]
        table_name = "accounts"
        primary_key_column = "account_id"
        entity_type = "Account"
        "#,
    )
    .unwrap();

    let registry = Registry::from_path(&config_path).unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get("accounts").unwrap(),
        &TableSpec {
            table_name: "accounts".to_string(),
            primary_key_column: "account_id".to_string(),
            entity_type: "Account".to_string(),
        }
    );
}
