//! Streaming reader for delimited record files
//!
//! Lines are split on the raw separator character; quoting is not
//! interpreted. The first line always provides the headers. Bytes that are
//! not valid UTF-8 are replaced with U+FFFD instead of failing the read.

use crate::error::{Error, Result};
use crate::row::Row;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Number of rows kept by [`load_preview`] when loading a file
pub const PREVIEW_ROWS: usize = 100;

/// A validated single-character field separator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Separator(char);

impl Separator {
    pub const COMMA: Separator = Separator(',');
    pub const SEMICOLON: Separator = Separator(';');
    pub const TAB: Separator = Separator('\t');
    pub const PIPE: Separator = Separator('|');

    /// Parse a separator; anything but exactly one character is rejected
    pub fn parse(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(Error::InvalidSeparator(s.to_string())),
        }
    }

    /// Validate a separator character; line breaks cannot separate fields
    pub fn from_char(c: char) -> Result<Self> {
        if c != '\n' && c != '\r' {
            Ok(Separator(c))
        } else {
            Err(Error::InvalidSeparator(c.to_string()))
        }
    }

    pub fn as_char(self) -> char {
        self.0
    }

    /// The separator as a single byte, if it is ASCII
    pub fn as_byte(self) -> Option<u8> {
        self.0.is_ascii().then_some(self.0 as u8)
    }
}

impl Default for Separator {
    fn default() -> Self {
        Separator::COMMA
    }
}

impl fmt::Display for Separator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Separator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Separator::parse(s)
    }
}

impl TryFrom<String> for Separator {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Separator::parse(&s)
    }
}

impl From<Separator> for String {
    fn from(sep: Separator) -> String {
        sep.0.to_string()
    }
}

/// Forward-only, single-pass reader producing one [`Row`] per data line
///
/// The underlying file handle is released when the reader is dropped.
pub struct RecordReader<R> {
    reader: R,
    headers: Vec<String>,
    separator: Separator,
    next_index: usize,
    source: PathBuf,
    raw: Vec<u8>,
    buf: String,
}

impl RecordReader<BufReader<File>> {
    /// Open a file and consume its header line
    pub fn open<P: AsRef<Path>>(path: P, separator: Separator) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        RecordReader::from_reader(BufReader::new(file), separator, path)
    }
}

impl<R: BufRead> RecordReader<R> {
    /// Wrap an already opened source; `source` is only used in error messages
    pub fn from_reader(reader: R, separator: Separator, source: impl Into<PathBuf>) -> Result<Self> {
        let mut this = Self {
            reader,
            headers: Vec::new(),
            separator,
            next_index: 0,
            source: source.into(),
            raw: Vec::new(),
            buf: String::new(),
        };

        if this.read_line()? {
            let line = this.buf.strip_prefix('\u{feff}').unwrap_or(&this.buf);
            this.headers = line.split(separator.as_char()).map(str::to_string).collect();
        }
        debug!(
            path = %this.source.display(),
            columns = this.headers.len(),
            "opened record file"
        );

        Ok(this)
    }

    /// Header names from the first line (empty for an empty file)
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn separator(&self) -> Separator {
        self.separator
    }

    /// Index the next returned row will carry
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Advance past one data line without parsing it
    ///
    /// Returns false at end of file.
    pub fn skip_line(&mut self) -> Result<bool> {
        if self.read_line()? {
            self.next_index += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Skip up to `count` data lines, returning how many were skipped
    pub fn skip_rows(&mut self, count: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < count && self.skip_line()? {
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Read the next line into `buf` without its terminator
    fn read_line(&mut self) -> Result<bool> {
        self.raw.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.raw)
            .map_err(|e| Error::FileRead {
                path: self.source.clone(),
                source: e,
            })?;
        if n == 0 {
            return Ok(false);
        }
        if self.raw.last() == Some(&b'\n') {
            self.raw.pop();
            if self.raw.last() == Some(&b'\r') {
                self.raw.pop();
            }
        }
        self.buf.clear();
        self.buf.push_str(&String::from_utf8_lossy(&self.raw));
        Ok(true)
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_line() {
            Ok(true) => {
                let row = Row::from_line(
                    self.next_index,
                    &self.buf,
                    &self.headers,
                    self.separator.as_char(),
                );
                self.next_index += 1;
                Some(Ok(row))
            }
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Headers and the leading rows of a file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preview {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// Read the headers and at most `limit` rows of a file
///
/// Memory use is bounded by `limit`, independent of the file size.
pub fn load_preview<P: AsRef<Path>>(path: P, separator: Separator, limit: usize) -> Result<Preview> {
    let reader = RecordReader::open(path, separator)?;
    let headers = reader.headers().to_vec();
    let rows = reader.take(limit).collect::<Result<Vec<_>>>()?;
    Ok(Preview { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(content: &str, sep: char) -> RecordReader<Cursor<Vec<u8>>> {
        RecordReader::from_reader(
            Cursor::new(content.as_bytes().to_vec()),
            Separator::from_char(sep).unwrap(),
            "test.csv",
        )
        .unwrap()
    }

    #[test]
    fn test_separator_parse() {
        assert_eq!(Separator::parse(";").unwrap().as_char(), ';');
        assert_eq!(Separator::parse("\t").unwrap(), Separator::TAB);
        assert!(Separator::parse("").is_err());
        assert!(Separator::parse(",,").is_err());
        assert!(Separator::parse("\n").is_err());
        assert!(Separator::parse("\r").is_err());
        assert_eq!(Separator::parse("\u{a6}").unwrap().as_char(), '\u{a6}');
        assert_eq!(Separator::parse("§").unwrap().as_byte(), None);
        assert_eq!(Separator::SEMICOLON.as_byte(), Some(b';'));
        assert!(matches!(
            Separator::parse("ab").unwrap_err(),
            Error::InvalidSeparator(_)
        ));
    }

    #[test]
    fn test_separator_serde() {
        let sep: Separator = serde_json::from_str("\";\"").unwrap();
        assert_eq!(sep, Separator::SEMICOLON);
        assert_eq!(serde_json::to_string(&Separator::PIPE).unwrap(), "\"|\"");
        assert!(serde_json::from_str::<Separator>("\"::\"").is_err());
    }

    #[test]
    fn test_headers_excluded_from_rows() {
        let rows: Vec<Row> = reader("id;name\n1;foo\n2;bar\n", ';')
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index(), 0);
        assert_eq!(rows[1].get("name"), Some("bar"));
    }

    #[test]
    fn test_crlf_and_bom_are_stripped() {
        let mut r = reader("\u{feff}id,name\r\n1,foo\r\n", ',');
        assert_eq!(r.headers(), &["id".to_string(), "name".to_string()]);

        let row = r.next().unwrap().unwrap();
        assert_eq!(row.get("name"), Some("foo"));
        assert_eq!(row.original(), "1,foo");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut r = RecordReader::from_reader(
            Cursor::new(b"id,name\n1,Jos\xe9\n2,Ana\n".to_vec()),
            Separator::COMMA,
            "latin1.csv",
        )
        .unwrap();

        let row = r.next().unwrap().unwrap();
        assert_eq!(row.get("id"), Some("1"));
        assert_eq!(row.get("name"), Some("Jos\u{fffd}"));
        assert_eq!(r.next().unwrap().unwrap().get("name"), Some("Ana"));
        assert!(r.next().is_none());
    }

    #[test]
    fn test_non_ascii_separator_splits() {
        let rows: Vec<Row> = reader("id§name\n1§alice\n", '§').collect::<Result<_>>().unwrap();
        assert_eq!(rows[0].get("name"), Some("alice"));
    }

    #[test]
    fn test_blank_line_is_a_row() {
        let rows: Vec<Row> = reader("id,name\n1,a\n\n2,b\n", ',').collect::<Result<_>>().unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].index(), 1);
        assert_eq!(rows[1].original(), "");
        assert_eq!(rows[1].get("id"), Some(""));
        assert_eq!(rows[2].get("name"), Some("b"));
    }

    #[test]
    fn test_last_line_without_newline() {
        let rows: Vec<Row> = reader("id\n1\n2", ',').collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("id"), Some("2"));
    }

    #[test]
    fn test_empty_file_has_no_headers() {
        let mut r = reader("", ',');
        assert!(r.headers().is_empty());
        assert!(r.next().is_none());
    }

    #[test]
    fn test_skip_rows_keeps_indices() {
        let mut r = reader("id\n0\n1\n2\n3\n", ',');
        assert_eq!(r.skip_rows(2).unwrap(), 2);

        let row = r.next().unwrap().unwrap();
        assert_eq!(row.index(), 2);
        assert_eq!(row.get("id"), Some("2"));
        assert_eq!(r.skip_rows(10).unwrap(), 1);
    }

    #[test]
    fn test_open_missing_file_is_read_error() {
        let err = RecordReader::open("/definitely/not/here.csv", Separator::COMMA)
            .err()
            .unwrap();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_load_preview_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.csv");
        let mut content = String::from("id,value\n");
        for i in 0..500 {
            content.push_str(&format!("{},{}\n", i, i * 2));
        }
        std::fs::write(&path, content).unwrap();

        let preview = load_preview(&path, Separator::COMMA, PREVIEW_ROWS).unwrap();
        assert_eq!(preview.headers, vec!["id", "value"]);
        assert_eq!(preview.rows.len(), PREVIEW_ROWS);
        assert_eq!(preview.rows[99].get("value"), Some("198"));
    }
}
