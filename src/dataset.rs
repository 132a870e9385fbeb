//! In-memory CSV table.
//!
//! Cells are kept as the exact strings read from the file so that columns the
//! step does not touch are written back unchanged.

use std::fmt::Write as _;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::error::{CleaningError, Result};

const UTF8_BOM: char = '\u{feff}';

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file).map_err(|e| match e {
            CleaningError::Parse(msg) => {
                CleaningError::Parse(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Reads a header row followed by records. Ragged rows and non UTF-8 content
    /// are parse errors, as is a file without a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .map_err(csv_parse_error)?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(CleaningError::Parse("missing header row".to_string()));
        }

        let mut rows = Vec::new();
        for record in csv_reader.records() {
            let record = record.map_err(csv_parse_error)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| CleaningError::Parse(format!("missing required column '{}'", name)))
    }

    /// Fails on the first column in `names` the table does not carry.
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.require_column(name)?;
        }
        Ok(())
    }

    /// Keeps only the rows for which `keep` returns true, preserving order.
    /// Returns the number of rows dropped.
    pub fn retain_rows<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(&[String]) -> bool,
    {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Rewrites every cell of one column in place.
    pub fn map_column<F>(&mut self, index: usize, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(index) {
                *cell = f(cell);
            }
        }
    }

    /// Writes header + rows. No index column, `\n` terminators, quoting only
    /// where a cell needs it.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .quote_style(csv::QuoteStyle::Necessary)
            .from_writer(writer);
        csv_writer.write_record(&self.headers).map_err(csv_write_error)?;
        for row in &self.rows {
            csv_writer.write_record(row).map_err(csv_write_error)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }

    /// First `n` rows as an aligned text block, for eyeballing a load.
    pub fn preview(&self, n: usize) -> String {
        let shown: Vec<&Vec<String>> = self.rows.iter().take(n).collect();
        let index_width = shown.len().saturating_sub(1).to_string().len();
        let widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                shown
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|c| c.chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut out = String::new();
        let _ = write!(out, "{:width$}", "", width = index_width);
        for (h, w) in self.headers.iter().zip(&widths) {
            let _ = write!(out, "  {:>w$}", h, w = *w);
        }
        for (i, row) in shown.iter().enumerate() {
            out.push('\n');
            let _ = write!(out, "{:<width$}", i, width = index_width);
            for (cell, w) in row.iter().zip(&widths) {
                let _ = write!(out, "  {:>w$}", cell, w = *w);
            }
        }
        let _ = write!(out, "\n\n[{} rows x {} columns]", self.rows.len(), self.headers.len());
        out
    }
}

fn csv_parse_error(e: csv::Error) -> CleaningError {
    if !e.is_io_error() {
        return CleaningError::Parse(e.to_string());
    }
    match e.into_kind() {
        csv::ErrorKind::Io(io) => CleaningError::Io(io),
        other => CleaningError::Parse(format!("{:?}", other)),
    }
}

fn csv_write_error(e: csv::Error) -> CleaningError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => CleaningError::Io(io),
        other => CleaningError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{:?}", other),
        )),
    }
}
