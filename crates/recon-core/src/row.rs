//! Row type for records read from a delimited file

use serde::{Deserialize, Serialize};

/// A single data line of a source file
///
/// Values are kept in header order. A column the line did not reach is
/// absent (`get` returns `None`), which is distinct from an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// Position of the row in its file (0-based, header excluded)
    index: usize,
    /// Column name / value pairs, unique names, header order
    values: Vec<(String, String)>,
    /// Line text exactly as read, without the line terminator
    original: String,
}

impl Row {
    /// Create an empty row for the given line
    pub fn new(index: usize, original: impl Into<String>) -> Self {
        Self {
            index,
            values: Vec::new(),
            original: original.into(),
        }
    }

    /// Split `line` on `separator` and pair the fields with `headers`
    ///
    /// Missing trailing fields stay absent, extra fields are dropped.
    /// Duplicate header names keep the last field.
    pub fn from_line(index: usize, line: &str, headers: &[String], separator: char) -> Self {
        let mut row = Row {
            index,
            values: Vec::with_capacity(headers.len()),
            original: line.to_string(),
        };
        for (header, value) in headers.iter().zip(line.split(separator)) {
            row.set(header.as_str(), value);
        }
        row
    }

    /// Position of the row in its file
    pub fn index(&self) -> usize {
        self.index
    }

    /// The unparsed line text
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Look up a column value
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// True if the row has a value (possibly empty) for `column`
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Set a column value, overwriting an existing one or appending a new column
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.values.iter_mut().find(|(name, _)| name == column) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((column.to_string(), value)),
        }
    }

    /// Number of columns present
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no column is present
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(column, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Values for `headers`, in header order, with missing columns rendered empty
    pub fn project<'a>(&'a self, headers: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        headers.iter().map(move |h| self.get(h).unwrap_or(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_line_maps_headers() {
        let row = Row::from_line(3, "1,alice,NYC", &headers(&["id", "name", "city"]), ',');

        assert_eq!(row.index(), 3);
        assert_eq!(row.get("id"), Some("1"));
        assert_eq!(row.get("name"), Some("alice"));
        assert_eq!(row.get("city"), Some("NYC"));
        assert_eq!(row.original(), "1,alice,NYC");
    }

    #[test]
    fn test_short_line_leaves_columns_absent() {
        let row = Row::from_line(0, "1", &headers(&["id", "name"]), ',');

        assert_eq!(row.get("id"), Some("1"));
        assert_eq!(row.get("name"), None);
        assert!(!row.contains("name"));
    }

    #[test]
    fn test_empty_field_is_present() {
        let row = Row::from_line(0, "1,", &headers(&["id", "name"]), ',');
        assert_eq!(row.get("name"), Some(""));
    }

    #[test]
    fn test_long_line_drops_extras() {
        let row = Row::from_line(0, "1;a;extra;more", &headers(&["id", "name"]), ';');
        assert_eq!(row.len(), 2);
        assert_eq!(row.original(), "1;a;extra;more");
    }

    #[test]
    fn test_set_overwrites_and_appends() {
        let mut row = Row::from_line(0, "1,a", &headers(&["id", "name"]), ',');
        row.set("name", "b");
        row.set("owner", "alice");

        let pairs: Vec<_> = row.iter().collect();
        assert_eq!(pairs, vec![("id", "1"), ("name", "b"), ("owner", "alice")]);
    }

    #[test]
    fn test_project_follows_header_order() {
        let row = Row::from_line(0, "1,a", &headers(&["id", "name"]), ',');
        let cols = headers(&["name", "missing", "id"]);
        let values: Vec<_> = row.project(&cols).collect();
        assert_eq!(values, vec!["a", "", "1"]);
    }
}
