#![no_main]
use libfuzzer_sys::fuzz_target;
use tagmint::resolver;

// Resolution must never panic, and any accepted name must resolve to a
// fixed point: resolving a canonical table name returns it unchanged.
fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else { return };

    if let Ok(canonical) = resolver::canonical_table_name(name) {
        let again = resolver::canonical_table_name(&canonical)
            .expect("canonical names must stay resolvable");
        assert_eq!(again, canonical);
    }
});
