// Comma-separated table codec for the deletion log, snapshot and report.
//
// One header line, then one record per row. Quoting and record splitting
// are left to `csv`; fields are quoted only when they contain a comma,
// quote or line break, so plain tables stay byte-compatible with readers
// that split on commas. Rows are decoded one at a time from raw bytes, so a
// single bad row never hides the rest of the table.

use std::io;

use csv::{ByteRecord, QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use thiserror::Error;

use crate::types::{DeletedItem, DeletionRecord, ElementId, SnapshotRecord};

pub const DELETION_LOG_HEADER: &str = "Project Name,Element ID,Time,User";
pub const SNAPSHOT_HEADER: &str = "Project Name,Element ID,Element Type,Element Name,Level";
pub const REPORT_HEADER: &str =
    "Project Name,Element ID,Element Type,Element Name,Level,Time,User";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TableError {
    #[error("line {line}: expected {expected} columns, found {found}")]
    MissingColumns { line: usize, expected: usize, found: usize },

    #[error("line {line}: element id `{value}` is not an integer")]
    InvalidId { line: usize, value: String },

    #[error("line {line}: column {column} is not valid UTF-8")]
    InvalidUtf8 { line: usize, column: usize },

    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

impl TableError {
    /// 1-based line number the row starts on.
    pub fn line(&self) -> usize {
        match self {
            Self::MissingColumns { line, .. }
            | Self::InvalidId { line, .. }
            | Self::InvalidUtf8 { line, .. }
            | Self::Malformed { line, .. } => *line,
        }
    }
}

/// A record type with a fixed column layout.
pub trait TableRow: Sized {
    const HEADER: &'static str;
    const COLUMNS: usize;

    fn element_id(&self) -> ElementId;
    fn to_fields(&self) -> Vec<String>;
    fn from_fields(line: usize, fields: &[String]) -> Result<Self, TableError>;
}

/// Rows decoded from a table, plus the rows that failed to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTable<T> {
    pub rows: Vec<T>,
    pub rejected: Vec<TableError>,
}

impl<T> Default for ParsedTable<T> {
    fn default() -> Self {
        Self { rows: Vec::new(), rejected: Vec::new() }
    }
}

/// Decode a whole table. The first row is the header and is not validated.
/// Blank rows are ignored; rows that fail to decode land in `rejected`.
pub fn parse_table<T: TableRow>(contents: impl AsRef<[u8]>) -> ParsedTable<T> {
    let contents = contents.as_ref();
    let contents = contents.strip_prefix(UTF8_BOM).unwrap_or(contents);
    let mut reader = ReaderBuilder::new().has_headers(true).flexible(true).from_reader(contents);
    let mut table = ParsedTable::default();
    let mut record = ByteRecord::new();

    loop {
        match reader.read_byte_record(&mut record) {
            Ok(false) => break,
            Ok(true) => {
                let line = record.position().map_or(0, |p| p.line() as usize);
                if is_blank(&record) {
                    continue;
                }
                match decode_fields(line, &record).and_then(|f| T::from_fields(line, &f)) {
                    Ok(row) => table.rows.push(row),
                    Err(error) => table.rejected.push(error),
                }
            }
            Err(error) => {
                // Byte records from a slice only fail on broken framing,
                // after which the reader cannot resynchronize.
                let line = error.position().map_or(0, |p| p.line() as usize);
                table.rejected.push(TableError::Malformed { line, message: error.to_string() });
                break;
            }
        }
    }

    table
}

/// Render rows without a header, one newline-terminated line each.
pub fn render_rows<'a, T: TableRow + 'a>(
    rows: impl IntoIterator<Item = &'a T>,
) -> io::Result<String> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.to_fields())?;
    }
    let bytes = writer.into_inner().map_err(|error| error.into_error())?;
    String::from_utf8(bytes).map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))
}

/// Render a full table (header + rows), newline-terminated.
pub fn render_table<'a, T: TableRow + 'a>(
    rows: impl IntoIterator<Item = &'a T>,
) -> io::Result<String> {
    let mut out = String::from(T::HEADER);
    out.push('\n');
    out.push_str(&render_rows(rows)?);
    Ok(out)
}

fn is_blank(record: &ByteRecord) -> bool {
    record.iter().all(|field| field.iter().all(u8::is_ascii_whitespace))
}

fn decode_fields(line: usize, record: &ByteRecord) -> Result<Vec<String>, TableError> {
    record
        .iter()
        .enumerate()
        .map(|(column, field)| {
            std::str::from_utf8(field)
                .map(str::to_string)
                .map_err(|_| TableError::InvalidUtf8 { line, column: column + 1 })
        })
        .collect()
}

fn require_columns(line: usize, fields: &[String], expected: usize) -> Result<(), TableError> {
    if fields.len() < expected {
        return Err(TableError::MissingColumns { line, expected, found: fields.len() });
    }
    Ok(())
}

fn parse_id(line: usize, value: &str) -> Result<ElementId, TableError> {
    value
        .trim()
        .parse()
        .map_err(|_| TableError::InvalidId { line, value: value.to_string() })
}

// Column order differs from field order: id sits second in every table.

impl TableRow for DeletionRecord {
    const HEADER: &'static str = DELETION_LOG_HEADER;
    const COLUMNS: usize = 4;

    fn element_id(&self) -> ElementId {
        self.element_id
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.project_name.clone(),
            self.element_id.to_string(),
            self.timestamp.clone(),
            self.user_name.clone(),
        ]
    }

    fn from_fields(line: usize, fields: &[String]) -> Result<Self, TableError> {
        require_columns(line, fields, Self::COLUMNS)?;
        Ok(Self {
            project_name: fields[0].clone(),
            element_id: parse_id(line, &fields[1])?,
            timestamp: fields[2].clone(),
            user_name: fields[3].clone(),
        })
    }
}

impl TableRow for SnapshotRecord {
    const HEADER: &'static str = SNAPSHOT_HEADER;
    const COLUMNS: usize = 5;

    fn element_id(&self) -> ElementId {
        self.element_id
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.project_name.clone(),
            self.element_id.to_string(),
            self.element_type.clone(),
            self.element_name.clone(),
            self.level.clone(),
        ]
    }

    fn from_fields(line: usize, fields: &[String]) -> Result<Self, TableError> {
        require_columns(line, fields, Self::COLUMNS)?;
        Ok(Self {
            project_name: fields[0].clone(),
            element_id: parse_id(line, &fields[1])?,
            element_type: fields[2].clone(),
            element_name: fields[3].clone(),
            level: fields[4].clone(),
        })
    }
}

impl TableRow for DeletedItem {
    const HEADER: &'static str = REPORT_HEADER;
    const COLUMNS: usize = 7;

    fn element_id(&self) -> ElementId {
        self.element_id
    }

    fn to_fields(&self) -> Vec<String> {
        vec![
            self.project_name.clone(),
            self.element_id.to_string(),
            self.element_type.clone(),
            self.element_name.clone(),
            self.level.clone(),
            self.timestamp.clone(),
            self.user_name.clone(),
        ]
    }

    fn from_fields(line: usize, fields: &[String]) -> Result<Self, TableError> {
        require_columns(line, fields, Self::COLUMNS)?;
        Ok(Self {
            project_name: fields[0].clone(),
            element_id: parse_id(line, &fields[1])?,
            element_type: fields[2].clone(),
            element_name: fields[3].clone(),
            level: fields[4].clone(),
            timestamp: fields[5].clone(),
            user_name: fields[6].clone(),
        })
    }
}
