#![no_main]
use libfuzzer_sys::fuzz_target;
use tagmint::codec;

// The codec must never panic on arbitrary ID strings, and a successful
// increment must be exactly +1 on the decoded counter.
fuzz_target!(|data: &[u8]| {
    let Ok(id) = std::str::from_utf8(data) else { return };

    let _ = codec::is_canonical(id);
    let _ = codec::split(id);
    let _ = codec::previous(id);

    if let (Ok((_, n)), Ok(next)) = (codec::decode(id), codec::next("AAA", Some(id))) {
        let (_, m) = codec::decode(&next).expect("next output must decode");
        assert_eq!(m, n + 1);
    }
});
