//! Composite match-key construction

use crate::row::Row;
use crate::rules::{MatchRule, Side};

/// Terminates every key segment (ASCII unit separator)
///
/// Segments are terminated rather than joined so that `("a", "b")` and
/// `("ab", "")` never collide.
pub const KEY_DELIMITER: char = '\u{1f}';

/// Build the composite key of `row` as seen from `side`
///
/// For each rule, in order, the side's column value is appended
/// (lower-cased unless the rule is case-sensitive) followed by
/// [`KEY_DELIMITER`]. A missing column contributes an empty segment, so it
/// keys the same as an empty value.
///
/// With no rules every row gets the empty key, which makes every row of A
/// match every row of B.
pub fn build_key(row: &Row, side: Side, rules: &[MatchRule]) -> String {
    let mut key = String::new();
    for rule in rules {
        if let Some(value) = row.get(rule.column(side)) {
            if rule.case_sensitive {
                key.push_str(value);
            } else {
                key.push_str(&value.to_lowercase());
            }
        }
        key.push(KEY_DELIMITER);
    }
    key
}
