//! Delimited-text export of result rows
//!
//! Output is one header line followed by one line per row, fields in header
//! order. Columns a row does not have are written as empty fields. Values
//! are written verbatim, never quoted, so an exported file reads back to the
//! same values.

use crate::error::{Error, Result};
use crate::reader::Separator;
use crate::row::Row;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Write `headers` and `rows` to `writer`
pub fn write_rows<W: Write>(
    writer: W,
    headers: &[String],
    rows: &[Row],
    separator: Separator,
) -> std::result::Result<(), csv::Error> {
    let Some(delimiter) = separator.as_byte() else {
        return write_joined(writer, headers, rows, separator.as_char()).map_err(csv::Error::from);
    };

    let mut csv_writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Never)
        .has_headers(false)
        .from_writer(writer);

    csv_writer.write_record(headers)?;
    for row in rows {
        csv_writer.write_record(row.project(headers))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Multi-byte separators, which the csv writer cannot take as a delimiter
fn write_joined<W: Write>(writer: W, headers: &[String], rows: &[Row], separator: char) -> io::Result<()> {
    let mut out = BufWriter::new(writer);
    let mut buf = [0u8; 4];
    let separator = separator.encode_utf8(&mut buf).as_bytes();

    write_line(&mut out, headers.iter().map(String::as_str), separator)?;
    for row in rows {
        write_line(&mut out, row.project(headers), separator)?;
    }
    out.flush()
}

fn write_line<'a, W: Write>(
    out: &mut W,
    fields: impl Iterator<Item = &'a str>,
    separator: &[u8],
) -> io::Result<()> {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.write_all(separator)?;
        }
        out.write_all(field.as_bytes())?;
    }
    out.write_all(b"\n")
}

/// Write `headers` and `rows` to the file at `path`, replacing it
pub fn export_rows<P: AsRef<Path>>(
    path: P,
    headers: &[String],
    rows: &[Row],
    separator: Separator,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    write_rows(BufWriter::new(file), headers, rows, separator).map_err(|e| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), rows = rows.len(), "exported rows");
    Ok(())
}

/// Render `headers` and `rows` to a string
pub fn rows_to_string(headers: &[String], rows: &[Row], separator: Separator) -> Result<String> {
    let mut out = Vec::new();
    write_rows(&mut out, headers, rows, separator).map_err(|e| Error::Csv {
        path: "<memory>".into(),
        source: e,
    })?;
    String::from_utf8(out).map_err(|e| {
        Error::Io(io::Error::new(io::ErrorKind::InvalidData, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_order_and_missing_values() {
        let source = headers(&["id", "city"]);
        let mut row = Row::from_line(0, "1,NYC", &source, ',');
        row.set("owner", "alice");
        let short = Row::from_line(1, "2", &source, ',');

        let text = rows_to_string(&headers(&["owner", "id", "city"]), &[row, short], Separator::COMMA)
            .unwrap();

        assert_eq!(text, "owner,id,city\nalice,1,NYC\n,2,\n");
    }

    #[test]
    fn test_uses_separator_without_quoting() {
        let cols = headers(&["id", "note"]);
        let mut row = Row::new(0, "");
        row.set("id", "1");
        row.set("note", "a;b");

        let text = rows_to_string(&cols, &[row], Separator::SEMICOLON).unwrap();
        assert_eq!(text, "id;note\n1;a;b\n");
    }

    #[test]
    fn test_non_ascii_separator() {
        let cols = headers(&["id", "name"]);
        let row = Row::from_line(0, "1§alice", &cols, '§');
        let separator = Separator::from_char('§').unwrap();

        let text = rows_to_string(&cols, &[row], separator).unwrap();
        assert_eq!(text, "id§name\n1§alice\n");
    }

    #[test]
    fn test_export_reads_back_unchanged() {
        use crate::reader::RecordReader;

        let dir = tempfile::tempdir().unwrap();
        let cols = headers(&["id", "name"]);
        let rows = vec![Row::from_line(0, "1,\"bob\" jr", &cols, ',')];

        let first = dir.path().join("first.csv");
        export_rows(&first, &cols, &rows, Separator::COMMA).unwrap();
        let reread: Vec<Row> = RecordReader::open(&first, Separator::COMMA)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(reread[0].get("name"), Some("\"bob\" jr"));

        let second = dir.path().join("second.csv");
        export_rows(&second, &cols, &reread, Separator::COMMA).unwrap();
        assert_eq!(
            std::fs::read(&first).unwrap(),
            std::fs::read(&second).unwrap()
        );
    }

    #[test]
    fn test_export_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let cols = headers(&["id", "name"]);
        let rows = vec![
            Row::from_line(0, "1,alice", &cols, ','),
            Row::from_line(1, "2,\"bob\"", &cols, ','),
        ];

        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        export_rows(&first, &cols, &rows, Separator::COMMA).unwrap();
        export_rows(&second, &cols, &rows, Separator::COMMA).unwrap();

        assert_eq!(
            std::fs::read(&first).unwrap(),
            std::fs::read(&second).unwrap()
        );
    }

    #[test]
    fn test_export_to_missing_dir_fails() {
        let err = export_rows(
            "/definitely/not/here/out.csv",
            &headers(&["id"]),
            &[],
            Separator::COMMA,
        )
        .unwrap_err();
        assert!(matches!(err, Error::FileWrite { .. }));
    }
}
