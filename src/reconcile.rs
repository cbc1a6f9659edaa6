//! Reconciliation: merging cached and scanned allocation state.
//!
//! On startup (or on demand) every tracked table gets an authoritative
//! baseline: the cached record and the store scan are merged, preferring
//! the candidate with the greater digit width — real overflow means
//! `AAA-012` supersedes `AAA-99` — and breaking width ties lexically.
//! The driver lives on [`crate::allocator::IdAllocator`], which runs it
//! under the same lock as allocation; this module holds the merge rule
//! and the per-run outcome report.

use crate::codec;

/// Pick the authoritative candidate out of the cached and scanned values.
///
/// Candidates that do not decode are corruption and drop out of the
/// contest. Greater digit width wins; equal widths fall back to the
/// lexically greater string.
pub fn merge_winner<'a>(cached: Option<&'a str>, scanned: Option<&'a str>) -> Option<&'a str> {
    let cached = cached.filter(|id| codec::digit_width(id).is_some());
    let scanned = scanned.filter(|id| codec::digit_width(id).is_some());
    match (cached, scanned) {
        (Some(a), Some(b)) => {
            let (wa, wb) = (codec::digit_width(a), codec::digit_width(b));
            if wa != wb {
                if wa > wb {
                    Some(a)
                } else {
                    Some(b)
                }
            } else if a >= b {
                Some(a)
            } else {
                Some(b)
            }
        }
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Aggregate outcome of one reconciliation run.
///
/// Per-table storage faults abort that table only; they are collected
/// here rather than propagated, so reconciliation never takes down
/// process startup.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Tables whose baseline was merged (or confirmed empty).
    pub merged: Vec<String>,
    /// Tables skipped with the rendered error that stopped them.
    pub failed: Vec<(String, String)>,
    /// True when the run was a no-op because the allocator had already
    /// reconciled this process lifetime.
    pub already_reconciled: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wider_candidate_wins_regardless_of_lexical_order() {
        assert_eq!(
            merge_winner(Some("AAA-05"), Some("AAA-012")),
            Some("AAA-012")
        );
        assert_eq!(
            merge_winner(Some("AAA-012"), Some("AAA-99")),
            Some("AAA-012")
        );
    }

    #[test]
    fn equal_width_falls_back_to_lexical_max() {
        assert_eq!(merge_winner(Some("AAA-05"), Some("AAA-09")), Some("AAA-09"));
        assert_eq!(merge_winner(Some("AAA-09"), Some("AAA-05")), Some("AAA-09"));
    }

    #[test]
    fn missing_sides_yield_the_other() {
        assert_eq!(merge_winner(Some("AAA-05"), None), Some("AAA-05"));
        assert_eq!(merge_winner(None, Some("AAA-05")), Some("AAA-05"));
        assert_eq!(merge_winner(None, None), None);
    }

    #[test]
    fn undecodable_candidates_drop_out() {
        assert_eq!(merge_winner(Some("garbage"), Some("AAA-05")), Some("AAA-05"));
        assert_eq!(merge_winner(Some("garbage"), None), None);
    }
}
