//! Canonical table-name resolution.
//!
//! Service code refers to entities by type name (`"Account"`,
//! `"ITransactionService"`); the allocator keys everything by canonical
//! table name (`"accounts"`, `"transactions"`). Resolution strips the
//! interface marker and type-suffix conventions, lower-cases, and
//! pluralizes. It is total and deterministic for well-formed names;
//! an empty or malformed name is a configuration error, never a silent
//! default.

use crate::error::{MintError, Result};

/// Type-name suffixes stripped before normalization, longest first.
const TYPE_SUFFIXES: &[&str] = &["Service", "Entity", "Model", "Dto"];

/// Resolve an entity type or table name to its canonical table name.
///
/// Already-canonical names pass through unchanged, so the operation is
/// idempotent: `canonical_table_name("accounts")` is `"accounts"`.
pub fn canonical_table_name(name: &str) -> Result<String> {
    let mut stem = name.trim();
    if stem.is_empty() {
        return Err(MintError::InvalidTypeName(name.to_string()));
    }

    // Leading interface marker: an 'I' immediately followed by another
    // uppercase letter, as in "IAccountService".
    let bytes = stem.as_bytes();
    if bytes.len() >= 2 && bytes[0] == b'I' && bytes[1].is_ascii_uppercase() {
        stem = &stem[1..];
    }

    for suffix in TYPE_SUFFIXES {
        if stem.len() > suffix.len() && stem.ends_with(suffix) {
            stem = &stem[..stem.len() - suffix.len()];
            break;
        }
    }

    if !stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(MintError::InvalidTypeName(name.to_string()));
    }

    Ok(pluralize(&stem.to_ascii_lowercase()))
}

/// Naive English pluralization, matching how the tracked tables are named:
/// trailing `s` is left alone (already plural), consonant + `y` becomes
/// `ies`, everything else gains an `s`.
fn pluralize(word: &str) -> String {
    if word.ends_with('s') {
        return word.to_string();
    }
    let bytes = word.as_bytes();
    if bytes.len() >= 2
        && bytes[bytes.len() - 1] == b'y'
        && !matches!(bytes[bytes.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u')
    {
        return format!("{}ies", &word[..word.len() - 1]);
    }
    format!("{word}s")
}
