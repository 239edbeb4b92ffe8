use anyhow::{Context, Result};
use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Line reader over a JSON dump, from a file or stdin (`-`).
///
/// `.bz2` and `.gz` inputs are decompressed on the fly; multi-stream
/// archives (as produced by parallel compressors) are read to the end.
pub struct DumpReader {
    reader: Box<dyn BufRead + Send>,
}

impl DumpReader {
    pub fn open(input: &Path) -> Result<Self> {
        if input.as_os_str() == "-" {
            return Ok(Self::from_reader(io::stdin()));
        }
        let file = File::open(input)
            .with_context(|| format!("Failed to open input {}", input.display()))?;
        let reader: Box<dyn Read + Send> = match input.extension().and_then(|e| e.to_str()) {
            Some("bz2") => Box::new(MultiBzDecoder::new(file)),
            Some("gz") => Box::new(MultiGzDecoder::new(file)),
            _ => Box::new(file),
        };
        Ok(Self::from_reader(reader))
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader)),
        }
    }

    /// Reads the next raw line (without the trailing newline) into `buf`.
    /// Returns false at end of input.
    pub fn next_line(&mut self, buf: &mut Vec<u8>) -> Result<bool> {
        buf.clear();
        let read = self
            .reader
            .read_until(b'\n', buf)
            .context("Failed to read input line")?;
        if read == 0 {
            return Ok(false);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        Ok(true)
    }
}

/// Strips whitespace and the trailing array comma from a dump line.
/// Returns `None` for lines that hold no record (`[`, `]`, blank).
pub fn clean_line(line: &[u8]) -> Option<&[u8]> {
    let mut line = line.trim_ascii();
    if let Some(stripped) = line.strip_suffix(b",") {
        line = stripped;
    }
    (line.len() > 1).then_some(line)
}
