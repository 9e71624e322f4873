use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deltrack_common::table::{parse_table, render_rows, ParsedTable, DELETION_LOG_HEADER};
use deltrack_common::types::DeletionRecord;

/// Append-only CSV of every drained deletion.
///
/// Prior lines are never rewritten or deduplicated; the header is written
/// once, when the file is first created.
#[derive(Debug, Clone)]
pub struct DeletionLog {
    path: PathBuf,
}

impl DeletionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records` in order, creating the file with its header if
    /// needed. Returns the number of lines appended.
    pub fn append(&self, records: &[DeletionRecord]) -> io::Result<usize> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut buf = String::new();
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(error) if error.kind() == io::ErrorKind::NotFound => true,
            Err(error) => return Err(error),
        };
        if needs_header {
            buf.push_str(DELETION_LOG_HEADER);
            buf.push('\n');
        }
        buf.push_str(&render_rows(records)?);

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        // One write call per batch keeps a batch contiguous in the file.
        file.write_all(buf.as_bytes())?;
        file.sync_data()?;
        Ok(records.len())
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<ParsedTable<DeletionRecord>> {
        let contents = fs::read(&self.path).with_context(|| {
            format!("failed to read deletion log `{}`", self.path.display())
        })?;
        Ok(parse_table(&contents))
    }
}
