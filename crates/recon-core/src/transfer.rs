//! Transfer-rule application between matched rows

use crate::row::Row;
use crate::rules::TransferRule;

/// Apply `rules` in order to a matched pair
///
/// Each rule copies its source column from the source row into the
/// destination column of the other row, overwriting whatever is there
/// (including a value written by an earlier rule). Rules whose source
/// column is absent do nothing. Returns the number of values written.
pub fn apply_transfer_rules(row_a: &mut Row, row_b: &mut Row, rules: &[TransferRule]) -> usize {
    let mut written = 0;
    for rule in rules {
        let (source, destination) = if rule.is_source_a {
            (&*row_a, &mut *row_b)
        } else {
            (&*row_b, &mut *row_a)
        };

        if let Some(value) = source.get(&rule.source_column) {
            let value = value.to_string();
            destination.set(&rule.destination_column, value);
            written += 1;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(line: &str, headers: &[&str]) -> Row {
        let headers: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
        Row::from_line(0, line, &headers, ',')
    }

    #[test]
    fn test_copies_a_to_b() {
        let mut a = row("1,alice", &["id", "name"]);
        let mut b = row("1,NYC", &["id", "city"]);

        let written = apply_transfer_rules(&mut a, &mut b, &[TransferRule::a_to_b("name", "owner")]);

        assert_eq!(written, 1);
        assert_eq!(b.get("owner"), Some("alice"));
        assert_eq!(a.get("owner"), None);
    }

    #[test]
    fn test_copies_b_to_a() {
        let mut a = row("1,alice", &["id", "name"]);
        let mut b = row("1,NYC", &["id", "city"]);

        apply_transfer_rules(&mut a, &mut b, &[TransferRule::b_to_a("city", "name")]);

        assert_eq!(a.get("name"), Some("NYC"));
        assert_eq!(b.get("city"), Some("NYC"));
    }

    #[test]
    fn test_last_rule_wins() {
        let mut a = row("1,alice,smith", &["id", "first", "last"]);
        let mut b = row("1", &["id"]);
        let rules = vec![
            TransferRule::a_to_b("first", "owner"),
            TransferRule::a_to_b("last", "owner"),
        ];

        apply_transfer_rules(&mut a, &mut b, &rules);
        assert_eq!(b.get("owner"), Some("smith"));
    }

    #[test]
    fn test_missing_source_is_noop() {
        let mut a = row("1", &["id", "name"]);
        let mut b = row("1,keep", &["id", "owner"]);

        let written = apply_transfer_rules(&mut a, &mut b, &[TransferRule::a_to_b("name", "owner")]);

        assert_eq!(written, 0);
        assert_eq!(b.get("owner"), Some("keep"));
    }

    #[test]
    fn test_rules_see_earlier_writes() {
        let mut a = row("1,alice", &["id", "name"]);
        let mut b = row("1", &["id"]);
        let rules = vec![
            TransferRule::a_to_b("name", "owner"),
            TransferRule::b_to_a("owner", "echo"),
        ];

        apply_transfer_rules(&mut a, &mut b, &rules);
        assert_eq!(a.get("echo"), Some("alice"));
    }
}
