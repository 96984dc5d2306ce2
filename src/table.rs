use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::export::ExportRecord;
use crate::reconcile::MergedRecord;

pub const PLAIN_COLUMNS: &[&str] = &[
    "post_id",
    "title",
    "post_type",
    "post_date",
    "category",
    "link",
    "excerpt",
    "content",
    "attachment_url",
];

pub const MERGED_COLUMNS: &[&str] = &[
    "post_id",
    "title",
    "post_type",
    "post_date",
    "category",
    "link",
    "excerpt",
    "content",
    "attachment_url",
    "attachment_id",
];

pub const ANNOTATED_COLUMNS: &[&str] = &[
    "post_id",
    "title",
    "post_type",
    "post_date",
    "category",
    "link",
    "excerpt",
    "content",
    "attachment_url",
    "attachment_id",
    "attachment_filename",
    "needs_review",
    "review_reason",
];

/// A row type with a fixed column layout. `COLUMNS` must list the serialized
/// fields in declaration order.
pub trait TableRow: Serialize {
    const COLUMNS: &'static [&'static str];
}

impl<T: TableRow> TableRow for &T {
    const COLUMNS: &'static [&'static str] = T::COLUMNS;
}

impl TableRow for ExportRecord {
    const COLUMNS: &'static [&'static str] = PLAIN_COLUMNS;
}

impl TableRow for MergedRecord {
    const COLUMNS: &'static [&'static str] = ANNOTATED_COLUMNS;
}

/// Merged layout: content plus attachment, without the review columns.
#[derive(Debug, Serialize)]
pub struct MergedRow<'a> {
    pub post_id: &'a str,
    pub title: &'a str,
    pub post_type: &'a str,
    pub post_date: &'a str,
    pub category: &'a str,
    pub link: &'a str,
    pub excerpt: &'a str,
    pub content: &'a str,
    pub attachment_url: &'a str,
    pub attachment_id: &'a str,
}

impl<'a> From<&'a MergedRecord> for MergedRow<'a> {
    fn from(m: &'a MergedRecord) -> Self {
        MergedRow {
            post_id: &m.post_id,
            title: &m.title,
            post_type: &m.post_type,
            post_date: &m.post_date,
            category: &m.category,
            link: &m.link,
            excerpt: &m.excerpt,
            content: &m.content,
            attachment_url: &m.attachment_url,
            attachment_id: &m.attachment_id,
        }
    }
}

impl TableRow for MergedRow<'_> {
    const COLUMNS: &'static [&'static str] = MERGED_COLUMNS;
}

/// Header row, then one row per record. The header is written even when
/// there are no rows.
pub fn write_rows<T: TableRow, W: Write>(writer: W, rows: &[T]) -> Result<usize> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(T::COLUMNS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

pub fn write_table<T: TableRow>(path: &Path, rows: &[T]) -> Result<usize> {
    let mut count = 0;
    write_atomically(path, |out| {
        count = write_rows(out, rows)?;
        Ok(())
    })?;
    Ok(count)
}

pub fn read_rows<T: DeserializeOwned, R: io::Read>(reader: R) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_reader(reader);
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("Malformed table row {}", i + 1)))
        .collect()
}

pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_rows(file).with_context(|| format!("Failed to read table {}", path.display()))
}

/// Untyped table, for passes that must hand back whatever columns they got.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(String::from).collect();
        let mut rows = Vec::new();
        for (i, record) in rdr.records().enumerate() {
            let mut row: Vec<String> = record?.iter().map(String::from).collect();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            } else if row.len() > headers.len() {
                warn!(
                    "Row {} has {} fields for {} columns; extra fields kept",
                    i + 1,
                    row.len(),
                    headers.len()
                );
            }
            rows.push(row);
        }
        Ok(RawTable { headers, rows })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed to read table {}", path.display()))
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomically(path, |out| self.write_to(out))
    }
}

/// Write next to `path` and rename into place only once everything is
/// flushed; a failed run leaves no half-written table behind.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let partial = partial_path(path);
    let file = File::create(&partial)
        .with_context(|| format!("Failed to create {}", partial.display()))?;
    let mut out = BufWriter::new(file);

    let written = write(&mut out).and_then(|_| out.flush().map_err(Into::into));
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(e.context(format!("Failed to write {}", path.display())));
    }
    drop(out);

    fs::rename(&partial, path)
        .with_context(|| format!("Failed to move {} into place", partial.display()))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    path.with_file_name(name)
}

// ── Tests ──
