//! ID string codec: parse, build, increment, and decrement device-prefixed
//! sequential IDs.
//!
//! An ID is `<prefix>-<counter>`. The counter is the rightmost contiguous
//! run of ASCII digits, rendered zero-padded to at least two digits. The
//! width grows once the value outgrows its padding (`"AAA-99"` ->
//! `"AAA-100"`) and is never truncated. Everything before the digit run is
//! opaque literal text and survives increment/decrement unchanged.

use crate::error::{MintError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Minimum rendered counter width.
pub const MIN_COUNTER_WIDTH: usize = 2;

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{3}-\d{2,}$").expect("valid literal regex"))
}

/// Whether `id` has the canonical shape: a 3-character alphanumeric device
/// tag, a separator, and a counter of at least two digits.
pub fn is_canonical(id: &str) -> bool {
    id_pattern().is_match(id)
}

/// Split an ID into its literal part and the rightmost run of digits.
///
/// Fails when the ID carries no digits at all; an empty literal part (an
/// all-digit ID) is accepted.
pub fn split(id: &str) -> Result<(&str, &str)> {
    let bytes = id.as_bytes();
    let mut start = bytes.len();
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == bytes.len() {
        return Err(MintError::MalformedId(id.to_string()));
    }
    Ok((&id[..start], &id[start..]))
}

/// Decode an ID into `(prefix, counter)`.
///
/// A single trailing separator is trimmed from the prefix so that
/// `decode(encode(p, n)) == (p, n)`.
pub fn decode(id: &str) -> Result<(&str, u64)> {
    let (literal, digits) = split(id)?;
    let counter = digits
        .parse::<u64>()
        .map_err(|_| MintError::CounterOverflow(id.to_string()))?;
    Ok((literal.strip_suffix('-').unwrap_or(literal), counter))
}

/// Build a canonical ID from a device prefix and a counter value.
///
/// `encode("AAA", 7)` is `"AAA-07"`; `encode("AAA", 100)` is `"AAA-100"`.
pub fn encode(prefix: &str, counter: u64) -> String {
    format!("{prefix}-{counter:02}")
}

fn render(literal: &str, counter: u64, prior_width: usize) -> String {
    let width = prior_width.max(MIN_COUNTER_WIDTH);
    format!("{literal}{counter:0width$}")
}

/// The ID after `last`.
///
/// An absent or empty `last` seeds the sequence at `"<prefix>-01"`. The
/// literal part of `last` is preserved verbatim; the counter keeps its
/// prior zero-padding and grows in width on overflow rather than wrapping
/// or truncating.
pub fn next(prefix: &str, last: Option<&str>) -> Result<String> {
    let last = last.unwrap_or("");
    if last.is_empty() {
        return Ok(encode(prefix, 1));
    }
    let (literal, digits) = split(last)?;
    let counter = digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| MintError::CounterOverflow(last.to_string()))?;
    Ok(render(literal, counter, digits.len()))
}

/// The ID before `id`, or `None` when the counter is already at its
/// minimum of 1.
///
/// The input's digit width is preserved (`previous("AAA-013")` is
/// `"AAA-012"`) so a decrement never strips zero-padding inherited from
/// the stream. The one exception is an exact overflow boundary, where the
/// decrement undoes the width growth: `previous("AAA-100")` is `"AAA-99"`.
pub fn previous(id: &str) -> Result<Option<String>> {
    let (literal, digits) = split(id)?;
    let counter = digits
        .parse::<u64>()
        .map_err(|_| MintError::CounterOverflow(id.to_string()))?;
    if counter <= 1 {
        return Ok(None);
    }
    let width = digits.len();
    // 10^(width-1) is the smallest counter that needs this width without
    // padding; stepping below it is the overflow boundary in reverse.
    let at_boundary = 10u64
        .checked_pow(width.saturating_sub(1) as u32)
        .is_some_and(|floor| counter == floor);
    let prior_width = if at_boundary { width - 1 } else { width };
    Ok(Some(render(literal, counter - 1, prior_width)))
}

/// Width of the digit run, used by reconciliation to rank candidates.
/// `None` for IDs that do not decode.
pub fn digit_width(id: &str) -> Option<usize> {
    split(id).ok().map(|(_, digits)| digits.len())
}
