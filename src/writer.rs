//! Tab-separated table output.
//!
//! A [`TableWriter`] owns one file and checks every row against the column
//! count it was opened with. Paths ending in `.gz` or `.bz2` are compressed.

use crate::config::WRITER_BUFFER_SIZE;
use crate::error::ImportError;
use crate::relations::Relation;
use anyhow::{Context, Result};
use bzip2::write::BzEncoder;
use csv::{QuoteStyle, WriterBuilder};
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output byte stream, compressed according to the file extension
pub enum OutputStream {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Bzip2(BzEncoder<BufWriter<File>>),
}

impl OutputStream {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = BufWriter::with_capacity(WRITER_BUFFER_SIZE, File::create(path)?);
        Ok(match path.extension().and_then(|ext| ext.to_str()) {
            Some("gz") => OutputStream::Gzip(GzEncoder::new(file, flate2::Compression::default())),
            Some("bz2") => {
                OutputStream::Bzip2(BzEncoder::new(file, bzip2::Compression::default()))
            }
            _ => OutputStream::Plain(file),
        })
    }

    /// Uncompressed regardless of extension
    pub fn create_plain(path: &Path) -> io::Result<Self> {
        Ok(OutputStream::Plain(BufWriter::with_capacity(
            WRITER_BUFFER_SIZE,
            File::create(path)?,
        )))
    }

    /// Writes the compression trailer (if any) and flushes the file
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputStream::Plain(mut file) => file.flush(),
            OutputStream::Gzip(encoder) => encoder.finish()?.flush(),
            OutputStream::Bzip2(encoder) => encoder.finish()?.flush(),
        }
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::Plain(w) => w.write(buf),
            OutputStream::Gzip(w) => w.write(buf),
            OutputStream::Bzip2(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::Plain(w) => w.flush(),
            OutputStream::Gzip(w) => w.flush(),
            OutputStream::Bzip2(w) => w.flush(),
        }
    }
}

pub struct TableWriter {
    relation: Relation,
    columns: usize,
    rows: u64,
    path: PathBuf,
    inner: csv::Writer<OutputStream>,
}

impl TableWriter {
    /// Opens `path` and writes the header row
    pub fn open(relation: Relation, columns: &[&str], path: &Path) -> Result<Self> {
        let stream = OutputStream::create(path)
            .with_context(|| format!("Failed to create {} file {}", relation.name(), path.display()))?;
        let mut writer = Self::from_stream(relation, columns.len(), path, stream);
        writer
            .inner
            .write_record(columns)
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
        Ok(writer)
    }

    /// Opens a headerless, uncompressed fragment; the header lives in a
    /// separate file written by [`write_header_file`].
    pub fn open_fragment(relation: Relation, columns: usize, path: &Path) -> Result<Self> {
        let stream = OutputStream::create_plain(path)
            .with_context(|| format!("Failed to create fragment {}", path.display()))?;
        Ok(Self::from_stream(relation, columns, path, stream))
    }

    fn from_stream(relation: Relation, columns: usize, path: &Path, stream: OutputStream) -> Self {
        let inner = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .has_headers(false)
            .from_writer(stream);
        Self {
            relation,
            columns,
            rows: 0,
            path: path.to_path_buf(),
            inner,
        }
    }

    pub fn write(&mut self, fields: &[&str]) -> Result<()> {
        if fields.len() != self.columns {
            return Err(ImportError::ColumnCount {
                relation: self.relation.name().to_string(),
                expected: self.columns,
                actual: fields.len(),
            }
            .into());
        }
        self.inner
            .write_record(fields)
            .with_context(|| format!("Failed to write row to {}", self.path.display()))?;
        self.rows += 1;
        Ok(())
    }

    /// Flushes and closes the file, returning the number of data rows written
    pub fn close(self) -> Result<u64> {
        let path = self.path;
        let stream = self
            .inner
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("Failed to flush {}", path.display()))?;
        stream
            .finish()
            .with_context(|| format!("Failed to close {}", path.display()))?;
        Ok(self.rows)
    }
}

/// Writes a single header line to `path` (uncompressed)
pub fn write_header_file(path: &Path, columns: &[&str]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create header file {}", path.display()))?;
    writeln!(file, "{}", columns.join("\t"))
        .with_context(|| format!("Failed to write header file {}", path.display()))?;
    Ok(())
}
